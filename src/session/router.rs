//! Per-connection session state and event dispatch.
//!
//! A session starts unbound. The first frame must be `fs_initialize_client`,
//! which binds the session to a lab id and language exactly once; every
//! other frame is rejected until then, and re-initialization is rejected
//! after. Handler failures become `fs_error` frames and never close the
//! connection — faults are isolated per request.
//!
//! `handle` is called for one frame at a time per connection, so handlers
//! never overlap within a session. Sessions run fully concurrently with each
//! other.

use std::sync::Arc;

use tracing::info;

use crate::errors::{RegistryError, WorkspaceError};
use crate::session::protocol::{ClientEvent, ServerEvent};
use crate::sync::ReconcileEngine;
use crate::tracker::DirtyTracker;
use crate::workspace::Workspace;

/// Everything a session's handlers touch.
#[derive(Clone)]
pub struct SessionDeps {
    pub workspace: Arc<Workspace>,
    pub tracker: DirtyTracker,
    pub engine: Arc<ReconcileEngine>,
}

/// The lab identity a session is bound to via the handshake.
#[derive(Debug, Clone)]
pub struct Binding {
    pub language: String,
    pub lab_id: String,
}

/// One connection's session state.
#[derive(Default)]
pub struct Session {
    binding: Option<Binding>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Dispatch one decoded frame. Always produces exactly one response
    /// frame; failures are reported, never propagated.
    pub async fn handle(&mut self, deps: &SessionDeps, event: ClientEvent) -> ServerEvent {
        match event {
            ClientEvent::InitializeClient { language, lab_id } if self.binding.is_none() => {
                self.bind(language, lab_id)
            }
            // Re-initialization falls through to the bound dispatcher, which
            // rejects it like any other out-of-place frame.
            other => match &self.binding {
                None => ServerEvent::error(
                    "Session not initialized",
                    "Send fs_initialize_client before any other event",
                ),
                Some(binding) => {
                    let binding = binding.clone();
                    self.dispatch_bound(deps, &binding, other).await
                }
            },
        }
    }

    fn bind(&mut self, language: String, lab_id: String) -> ServerEvent {
        info!(language, lab_id, "client initialized");
        let details = serde_json::json!({ "language": language, "labId": lab_id });
        self.binding = Some(Binding { language, lab_id });
        ServerEvent::Info {
            message: "Client initialized".into(),
            details: Some(details),
        }
    }

    async fn dispatch_bound(
        &self,
        deps: &SessionDeps,
        binding: &Binding,
        event: ClientEvent,
    ) -> ServerEvent {
        match event {
            ClientEvent::InitializeClient { .. } => ServerEvent::error(
                "Session already initialized",
                "The session is already bound to a lab",
            ),

            ClientEvent::LoadDir { path } => match deps.workspace.list(&path) {
                Ok(files) => ServerEvent::DirContent { path, files },
                Err(e) => workspace_error(e),
            },

            ClientEvent::FetchFileContent { path } => match deps.workspace.read(&path) {
                Ok(bytes) => ServerEvent::FileContent {
                    path,
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                },
                Err(e) => workspace_error(e),
            },

            ClientEvent::FileContentUpdate { path, content } => {
                if let Err(e) = deps.workspace.write(&path, content.as_bytes()) {
                    return workspace_error(e);
                }
                if let Err(e) = deps.tracker.record_edit(&binding.lab_id, &path).await {
                    return registry_error(e);
                }
                ServerEvent::FileUpdated { path, success: true }
            }

            ClientEvent::NewFile { path, is_dir, content } => {
                if let Err(e) =
                    deps.workspace.create(&path, is_dir, content.as_deref().map(str::as_bytes))
                {
                    return workspace_error(e);
                }
                // Directories are not synced, so only files get tracked.
                if !is_dir {
                    if let Err(e) = deps.tracker.record_edit(&binding.lab_id, &path).await {
                        return registry_error(e);
                    }
                }
                ServerEvent::FileCreated { path, is_dir, success: true }
            }

            ClientEvent::DeleteFile { path } => match deps.workspace.delete(&path) {
                Ok(was_file) => {
                    if was_file {
                        if let Err(e) = deps.tracker.record_delete(&binding.lab_id, &path).await {
                            return registry_error(e);
                        }
                    }
                    ServerEvent::FileDeleted { path, success: true }
                }
                Err(e) => workspace_error(e),
            },

            ClientEvent::EditFileMeta { old_path, new_path } => {
                if let Err(e) = deps.workspace.rename(&old_path, &new_path) {
                    return workspace_error(e);
                }
                if let Err(e) =
                    deps.tracker.record_rename(&binding.lab_id, &old_path, &new_path).await
                {
                    return registry_error(e);
                }
                ServerEvent::FileRenamed { old_path, new_path, success: true }
            }

            ClientEvent::FetchQuestMeta { path } => match deps.workspace.walk(&path) {
                Ok(entries) => ServerEvent::QuestMeta { path, files: entries.collect() },
                Err(e) => workspace_error(e),
            },

            ClientEvent::SyncFiles {} => {
                match deps.engine.sync_and_clean(&binding.lab_id, &deps.tracker).await {
                    Ok(report) => match report.fatal {
                        None => ServerEvent::SyncComplete {
                            synced: report.applied.len(),
                            failures: report.soft_failures,
                        },
                        Some(err) => {
                            ServerEvent::error("Sync failed", err.to_string())
                        }
                    },
                    Err(e) => registry_error(e),
                }
            }
        }
    }
}

fn workspace_error(err: WorkspaceError) -> ServerEvent {
    let message = match &err {
        WorkspaceError::NotFound { .. } => "Not found",
        WorkspaceError::Traversal { .. } => "Invalid path",
        WorkspaceError::Io { .. } => "Handler execution failed",
    };
    ServerEvent::error(message, err.to_string())
}

fn registry_error(err: RegistryError) -> ServerEvent {
    ServerEvent::error("Handler execution failed", err.to_string())
}
