//! Typed error hierarchy for the lab service.
//!
//! Four enums cover the four subsystems:
//! - `WorkspaceError` — confined filesystem adapter failures
//! - `RegistryError` — instance registry and dirty-tracker failures
//! - `SyncError` — reconciliation / durable-storage failures
//! - `AdmissionError` — lab creation and lifecycle failures

use thiserror::Error;

/// Errors from the workspace filesystem adapter.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Path escapes the workspace root: {path}")]
    Traversal { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    /// Map an I/O failure on `path`, folding NotFound into its own variant.
    pub fn from_io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::NotFound { path: path.to_string() }
        } else {
            WorkspaceError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

/// Errors from the lab instance registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Lab instance {lab_id} not found")]
    InstanceNotFound { lab_id: String },

    #[error("Lab instance {lab_id} already exists")]
    AlreadyExists { lab_id: String },

    #[error("Admission ceiling reached: {active} active of {ceiling} allowed")]
    Capacity { active: usize, ceiling: usize },

    #[error("Registry store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errors from the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Upload failed for {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sync task panicked")]
    TaskPanicked,
}

/// Errors from the admission controller and lifecycle flows.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("User limit exceeded: {0}")]
    UserLimit(String),

    #[error("Quest not found: {slug}")]
    QuestNotFound { slug: String },

    #[error("Lab instance {lab_id} not found")]
    LabNotFound { lab_id: String },

    #[error("Admission ceiling reached: {active} active of {ceiling} allowed")]
    Capacity { active: usize, ceiling: usize },

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[source] anyhow::Error),

    #[error(transparent)]
    Registry(RegistryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<RegistryError> for AdmissionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Capacity { active, ceiling } => {
                AdmissionError::Capacity { active, ceiling }
            }
            RegistryError::InstanceNotFound { lab_id } => AdmissionError::LabNotFound { lab_id },
            other => AdmissionError::Registry(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_from_io_maps_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = WorkspaceError::from_io("src/a.go", io_err);
        match &err {
            WorkspaceError::NotFound { path } => assert_eq!(path, "src/a.go"),
            _ => panic!("Expected NotFound variant"),
        }
    }

    #[test]
    fn workspace_from_io_keeps_other_kinds() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = WorkspaceError::from_io("src/a.go", io_err);
        match &err {
            WorkspaceError::Io { path, source } => {
                assert_eq!(path, "src/a.go");
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn traversal_error_carries_offending_path() {
        let err = WorkspaceError::Traversal { path: "../etc/passwd".into() };
        assert!(err.to_string().contains("../etc/passwd"));
    }

    #[test]
    fn registry_capacity_carries_counts() {
        let err = RegistryError::Capacity { active: 5, ceiling: 5 };
        assert!(err.to_string().contains('5'));
        assert!(matches!(err, RegistryError::Capacity { active: 5, ceiling: 5 }));
    }

    #[test]
    fn admission_error_converts_registry_capacity() {
        let err: AdmissionError = RegistryError::Capacity { active: 6, ceiling: 5 }.into();
        assert!(matches!(err, AdmissionError::Capacity { active: 6, ceiling: 5 }));
    }

    #[test]
    fn admission_error_converts_registry_not_found() {
        let err: AdmissionError =
            RegistryError::InstanceNotFound { lab_id: "lab-1".into() }.into();
        match err {
            AdmissionError::LabNotFound { lab_id } => assert_eq!(lab_id, "lab-1"),
            _ => panic!("Expected LabNotFound"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkspaceError::NotFound { path: "x".into() });
        assert_std_error(&RegistryError::InstanceNotFound { lab_id: "x".into() });
        assert_std_error(&SyncError::TaskPanicked);
        assert_std_error(&AdmissionError::Validation("x".into()));
    }
}
