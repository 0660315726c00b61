//! questlab: ephemeral per-user coding sandboxes.
//!
//! Two deployables share this crate:
//! - the **runner**, one per sandbox pod, serving the editor WebSocket over
//!   a confined workspace and reconciling changes to durable storage
//! - the **gateway**, the admission surface that creates, ends, and deletes
//!   lab instances under a capacity ceiling
//!
//! Module map:
//! - [`models`] — lab instance documents, dirty entries, wire shapes
//! - [`errors`] — per-subsystem error enums
//! - [`registry`] — shared lab-instance registry with atomic update contracts
//! - [`tracker`] — dirty-path bookkeeping on top of the registry
//! - [`workspace`] — confined filesystem adapter
//! - [`session`] — editor protocol, dispatch, and WebSocket transport
//! - [`sync`] — reconciliation engine and durable object store
//! - [`admission`] — lab lifecycle control under the capacity ceiling
//! - [`gateway`] — admission HTTP surface
//! - [`runner`] — in-pod service wiring
//! - [`orchestrator`] / [`catalog`] — cluster and quest-catalog seams
//! - [`config`] — environment-driven configuration

pub mod admission;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod session;
pub mod sync;
pub mod tracker;
pub mod workspace;
