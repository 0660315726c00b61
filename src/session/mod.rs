//! Editor session layer: wire protocol, per-connection state, dispatch, and
//! WebSocket plumbing.
//!
//! A connection upgrades, receives a greeting, and must send
//! `fs_initialize_client` before anything else. From then on each `{type,
//! payload}` frame is decoded into a [`protocol::ClientEvent`] and dispatched
//! by [`router::Session::handle`]; every frame gets exactly one response,
//! errors included. [`ws`] owns the reader/writer task pair and the
//! heartbeat.

pub mod protocol;
pub mod router;
pub mod ws;

pub use protocol::{ClientEvent, ServerEvent};
pub use router::{Binding, Session, SessionDeps};
pub use ws::{ws_handler, WsContext};
