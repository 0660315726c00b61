//! Wire format for the editor session: JSON frames `{type, payload}`.
//!
//! Both directions use closed enums so dispatch is an exhaustive match; an
//! unknown `type` simply fails to decode and is answered with an error frame
//! without touching any state.

use serde::{Deserialize, Serialize};

use crate::models::FileInfo;

/// Frames the editor client sends to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    /// Handshake. Must be the first frame; binds the session to a lab.
    #[serde(rename = "fs_initialize_client")]
    InitializeClient {
        language: String,
        #[serde(rename = "labId")]
        lab_id: String,
    },

    #[serde(rename = "fs_load_dir")]
    LoadDir {
        #[serde(default)]
        path: String,
    },

    #[serde(rename = "fs_fetch_file_content")]
    FetchFileContent { path: String },

    #[serde(rename = "fs_file_content_update")]
    FileContentUpdate { path: String, content: String },

    #[serde(rename = "fs_new_file")]
    NewFile {
        path: String,
        #[serde(rename = "isDir", default)]
        is_dir: bool,
        #[serde(default)]
        content: Option<String>,
    },

    #[serde(rename = "fs_delete_file")]
    DeleteFile { path: String },

    #[serde(rename = "fs_edit_file_meta")]
    EditFileMeta {
        #[serde(rename = "oldPath")]
        old_path: String,
        #[serde(rename = "newPath")]
        new_path: String,
    },

    #[serde(rename = "fs_fetch_quest_meta")]
    FetchQuestMeta {
        #[serde(default)]
        path: String,
    },

    /// Reconcile the dirty set to durable storage. Sent by the gateway at
    /// teardown; payload is empty.
    #[serde(rename = "fs_sync_files_to_s3")]
    SyncFiles {},
}

/// Frames the runner sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "fs_info")]
    Info {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },

    #[serde(rename = "fs_dir_content")]
    DirContent { path: String, files: Vec<FileInfo> },

    #[serde(rename = "fs_file_content")]
    FileContent { path: String, content: String },

    #[serde(rename = "fs_file_updated")]
    FileUpdated { path: String, success: bool },

    #[serde(rename = "fs_file_created")]
    FileCreated {
        path: String,
        #[serde(rename = "isDir")]
        is_dir: bool,
        success: bool,
    },

    #[serde(rename = "fs_file_deleted")]
    FileDeleted { path: String, success: bool },

    #[serde(rename = "fs_file_renamed")]
    FileRenamed {
        #[serde(rename = "oldPath")]
        old_path: String,
        #[serde(rename = "newPath")]
        new_path: String,
        success: bool,
    },

    #[serde(rename = "fs_quest_meta")]
    QuestMeta { path: String, files: Vec<FileInfo> },

    #[serde(rename = "fs_sync_complete")]
    SyncComplete { synced: usize, failures: usize },

    #[serde(rename = "fs_error")]
    Error { message: String, detail: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            detail: detail.into(),
        }
    }
}
