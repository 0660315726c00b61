//! Shared data model for lab instances and the session wire format.
//!
//! Field names serialize in camelCase (`labId`, `codeLink`, `isDir`, ...)
//! to match the editor client and the durable registry documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a lab instance.
///
/// `Created` → `Booting` → `Active`, with `Error` reachable from any state.
/// There is no automatic transition out of `Error`; teardown removes the
/// record entirely regardless of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabStatus {
    Created,
    Booting,
    Active,
    Error,
}

/// Which service appended a progress-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrigin {
    FileSystem,
    Gateway,
    Sync,
    Orchestrator,
}

/// One append-only entry in a lab instance's progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub timestamp: i64,
    pub status: LabStatus,
    pub message: String,
    pub origin: ServiceOrigin,
}

impl ProgressEntry {
    pub fn now(status: LabStatus, message: impl Into<String>, origin: ServiceOrigin) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            status,
            message: message.into(),
            origin,
        }
    }
}

/// Pending action on a workspace path, not yet reconciled to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyAction {
    Edit,
    Delete,
}

/// One dirty path: a workspace-relative file path plus its latest action.
///
/// Invariant (maintained by the tracker): at most one entry per path; the
/// latest action supersedes any prior entry for the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyFileEntry {
    pub path: String,
    pub action: DirtyAction,
}

/// Registry document for one ephemeral sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabInstance {
    pub lab_id: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Root prefix of this instance's content in durable object storage.
    pub code_link: String,
    pub status: LabStatus,
    pub created_at: i64,
    pub last_updated_at: i64,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    #[serde(default)]
    pub dirty: Vec<DirtyFileEntry>,
}

impl LabInstance {
    pub fn new(
        lab_id: impl Into<String>,
        language: impl Into<String>,
        user_id: Option<String>,
        code_link: impl Into<String>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            lab_id: lab_id.into(),
            language: language.into(),
            user_id,
            code_link: code_link.into(),
            status: LabStatus::Created,
            created_at: now,
            last_updated_at: now,
            progress: Vec::new(),
            dirty: Vec::new(),
        }
    }

    /// Look up the dirty entry for a path, if any.
    pub fn dirty_entry(&self, path: &str) -> Option<&DirtyFileEntry> {
        self.dirty.iter().find(|e| e.path == path)
    }
}

/// Read-only metadata projection of one workspace entry. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    /// Path relative to the workspace root, forward slashes.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Modification time, RFC 3339.
    pub mod_time: String,
}

impl FileInfo {
    pub fn format_mod_time(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LabStatus::Created).unwrap(), "\"created\"");
        assert_eq!(serde_json::to_string(&LabStatus::Booting).unwrap(), "\"booting\"");
        assert_eq!(serde_json::to_string(&LabStatus::Active).unwrap(), "\"active\"");
        assert_eq!(serde_json::to_string(&LabStatus::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn dirty_entry_wire_shape() {
        let entry = DirtyFileEntry {
            path: "src/main.go".to_string(),
            action: DirtyAction::Edit,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"path":"src/main.go","action":"edit"}"#);
    }

    #[test]
    fn lab_instance_uses_camel_case_keys() {
        let lab = LabInstance::new("lab-1", "go", Some("user-9".into()), "code/go/lab-1");
        let json = serde_json::to_string(&lab).unwrap();
        assert!(json.contains("\"labId\":\"lab-1\""));
        assert!(json.contains("\"codeLink\":\"code/go/lab-1\""));
        assert!(json.contains("\"userId\":\"user-9\""));
        assert!(json.contains("\"lastUpdatedAt\""));
    }

    #[test]
    fn lab_instance_omits_absent_user_id() {
        let lab = LabInstance::new("lab-1", "go", None, "code/go/lab-1");
        let json = serde_json::to_string(&lab).unwrap();
        assert!(!json.contains("userId"));
    }

    #[test]
    fn lab_instance_deserializes_with_missing_collections() {
        let json = r#"{
            "labId": "lab-2",
            "language": "node",
            "codeLink": "code/node/lab-2",
            "status": "active",
            "createdAt": 100,
            "lastUpdatedAt": 200
        }"#;
        let lab: LabInstance = serde_json::from_str(json).unwrap();
        assert_eq!(lab.status, LabStatus::Active);
        assert!(lab.progress.is_empty());
        assert!(lab.dirty.is_empty());
    }

    #[test]
    fn new_instance_starts_created_and_clean() {
        let lab = LabInstance::new("lab-3", "react", None, "code/react/lab-3");
        assert_eq!(lab.status, LabStatus::Created);
        assert!(lab.dirty.is_empty());
        assert!(lab.progress.is_empty());
        assert_eq!(lab.created_at, lab.last_updated_at);
    }

    #[test]
    fn file_info_mod_time_is_rfc3339() {
        let t = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(FileInfo::format_mod_time(t), "2024-06-01T12:00:00Z");
    }
}
