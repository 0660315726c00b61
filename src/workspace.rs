//! Confined filesystem adapter for one lab instance.
//!
//! Every logical path from the wire is resolved against the workspace root
//! with [`Workspace::resolve`], which lexically normalizes the path and
//! rejects any attempt to climb out of the root. No operation in this module
//! ever touches a path outside the root.
//!
//! The adapter is purely about files; it knows nothing about dirty tracking.
//! Session handlers compose it with [`crate::tracker::DirtyTracker`].

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::errors::WorkspaceError;
use crate::models::FileInfo;

pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| WorkspaceError::from_io(&root.to_string_lossy(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path to an absolute path under the root.
    ///
    /// Normalization is lexical: `.` segments drop out, `..` pops the
    /// previous segment, and a `..` with nothing left to pop is a traversal
    /// attempt and is rejected. Leading separators are neutralized so
    /// absolute-looking input stays inside the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, WorkspaceError> {
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(logical).components() {
            match component {
                Component::Normal(seg) => parts.push(seg),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(WorkspaceError::Traversal { path: logical.to_string() });
                    }
                }
                Component::Prefix(_) => {
                    return Err(WorkspaceError::Traversal { path: logical.to_string() });
                }
            }
        }
        let mut resolved = self.root.clone();
        for part in parts {
            resolved.push(part);
        }
        Ok(resolved)
    }

    /// Direct children of `dir`. Fails with NotFound if the directory is
    /// absent.
    pub fn list(&self, dir: &str) -> Result<Vec<FileInfo>, WorkspaceError> {
        let target = self.resolve(dir)?;
        let entries = fs::read_dir(&target).map_err(|e| WorkspaceError::from_io(dir, e))?;

        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::from_io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            infos.push(file_info(&name, &join_logical(dir, &name), &meta));
        }
        Ok(infos)
    }

    /// Full byte content of a file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| WorkspaceError::from_io(path, e))
    }

    /// Write `content` to `path`, creating parent directories as needed and
    /// overwriting any existing file.
    pub fn write(&self, path: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::from_io(path, e))?;
        }
        fs::write(&target, content).map_err(|e| WorkspaceError::from_io(path, e))
    }

    /// Create a file or directory (with parents). Files get `content`, or
    /// empty content when none is given.
    pub fn create(
        &self,
        path: &str,
        is_dir: bool,
        content: Option<&[u8]>,
    ) -> Result<(), WorkspaceError> {
        let target = self.resolve(path)?;
        if is_dir {
            fs::create_dir_all(&target).map_err(|e| WorkspaceError::from_io(path, e))
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| WorkspaceError::from_io(path, e))?;
            }
            fs::write(&target, content.unwrap_or_default())
                .map_err(|e| WorkspaceError::from_io(path, e))
        }
    }

    /// Remove a file, or a directory recursively. Fails with NotFound if the
    /// path is absent. Returns true when the removed entry was a file — only
    /// files participate in sync, so only those get a dirty entry.
    pub fn delete(&self, path: &str) -> Result<bool, WorkspaceError> {
        let target = self.resolve(path)?;
        let meta = fs::symlink_metadata(&target).map_err(|e| WorkspaceError::from_io(path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| WorkspaceError::from_io(path, e))?;
            Ok(false)
        } else {
            fs::remove_file(&target).map_err(|e| WorkspaceError::from_io(path, e))?;
            Ok(true)
        }
    }

    /// Move `old_path` to `new_path`, creating destination parents.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<(), WorkspaceError> {
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::from_io(new_path, e))?;
        }
        fs::rename(&from, &to).map_err(|e| WorkspaceError::from_io(old_path, e))
    }

    /// Lazy walk of the full subtree under `subpath`, including the subtree
    /// root itself. Entries that disappear or become unreadable mid-walk are
    /// skipped. The iterator is finite and not restartable.
    pub fn walk(
        &self,
        subpath: &str,
    ) -> Result<impl Iterator<Item = FileInfo> + '_, WorkspaceError> {
        let target = self.resolve(subpath)?;
        if !target.exists() {
            return Err(WorkspaceError::NotFound { path: subpath.to_string() });
        }
        let root = self.root.clone();
        Ok(WalkDir::new(target).into_iter().filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry during walk");
                    return None;
                }
            };
            let meta = entry.metadata().ok()?;
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let rel = if rel.is_empty() { ".".to_string() } else { rel };
            let name = entry.file_name().to_string_lossy().into_owned();
            Some(file_info(&name, &rel, &meta))
        }))
    }
}

fn join_logical(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn file_info(name: &str, logical: &str, meta: &fs::Metadata) -> FileInfo {
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    FileInfo {
        name: name.to_string(),
        path: logical.to_string(),
        is_dir: meta.is_dir(),
        size: meta.len(),
        mod_time: FileInfo::format_mod_time(modified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        (dir, ws)
    }

    #[test]
    fn resolve_stays_under_root() {
        let (_guard, ws) = workspace();
        let p = ws.resolve("src/main.go").unwrap();
        assert!(p.starts_with(ws.root()));
        assert!(p.ends_with("src/main.go"));
    }

    #[test]
    fn resolve_rejects_parent_traversal() {
        let (_guard, ws) = workspace();
        assert!(matches!(
            ws.resolve("../etc/passwd"),
            Err(WorkspaceError::Traversal { .. })
        ));
        assert!(matches!(
            ws.resolve("src/../../secret"),
            Err(WorkspaceError::Traversal { .. })
        ));
    }

    #[test]
    fn resolve_neutralizes_absolute_and_dot_segments() {
        let (_guard, ws) = workspace();
        assert_eq!(ws.resolve("/etc/passwd").unwrap(), ws.root().join("etc/passwd"));
        assert_eq!(ws.resolve("./a/./b.txt").unwrap(), ws.root().join("a/b.txt"));
        // `..` inside the tree is fine as long as it never leaves the root.
        assert_eq!(ws.resolve("a/b/../c.txt").unwrap(), ws.root().join("a/c.txt"));
    }

    #[test]
    fn write_creates_parents_and_read_roundtrips() {
        let (_guard, ws) = workspace();
        ws.write("deep/nested/file.txt", b"hello").unwrap();
        assert_eq!(ws.read("deep/nested/file.txt").unwrap(), b"hello");
        ws.write("deep/nested/file.txt", b"world").unwrap();
        assert_eq!(ws.read("deep/nested/file.txt").unwrap(), b"world");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let (_guard, ws) = workspace();
        assert!(matches!(ws.read("ghost.txt"), Err(WorkspaceError::NotFound { .. })));
    }

    #[test]
    fn list_returns_direct_children_only() {
        let (_guard, ws) = workspace();
        ws.write("a.txt", b"a").unwrap();
        ws.write("sub/b.txt", b"b").unwrap();
        let mut infos = ws.list("").unwrap();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "a.txt");
        assert!(!infos[0].is_dir);
        assert_eq!(infos[0].path, "a.txt");
        assert_eq!(infos[1].name, "sub");
        assert!(infos[1].is_dir);
    }

    #[test]
    fn list_missing_dir_is_not_found() {
        let (_guard, ws) = workspace();
        assert!(matches!(ws.list("nope"), Err(WorkspaceError::NotFound { .. })));
    }

    #[test]
    fn list_nested_dir_paths_are_workspace_relative() {
        let (_guard, ws) = workspace();
        ws.write("src/lib/a.go", b"x").unwrap();
        let infos = ws.list("src/lib").unwrap();
        assert_eq!(infos[0].path, "src/lib/a.go");
    }

    #[test]
    fn create_file_and_directory() {
        let (_guard, ws) = workspace();
        ws.create("notes.md", false, Some(b"hi")).unwrap();
        assert_eq!(ws.read("notes.md").unwrap(), b"hi");
        ws.create("empty.txt", false, None).unwrap();
        assert_eq!(ws.read("empty.txt").unwrap(), b"");
        ws.create("src/bin", true, None).unwrap();
        assert!(ws.root().join("src/bin").is_dir());
    }

    #[test]
    fn delete_reports_file_vs_directory() {
        let (_guard, ws) = workspace();
        ws.write("a.txt", b"a").unwrap();
        ws.write("dir/inner.txt", b"x").unwrap();
        assert!(ws.delete("a.txt").unwrap());
        assert!(!ws.delete("dir").unwrap());
        assert!(!ws.root().join("dir").exists());
    }

    #[test]
    fn double_delete_is_not_found() {
        let (_guard, ws) = workspace();
        ws.write("a.txt", b"a").unwrap();
        ws.delete("a.txt").unwrap();
        assert!(matches!(ws.delete("a.txt"), Err(WorkspaceError::NotFound { .. })));
    }

    #[test]
    fn rename_moves_content_and_creates_parents() {
        let (_guard, ws) = workspace();
        ws.write("src/a.go", b"package main").unwrap();
        ws.rename("src/a.go", "pkg/deep/b.go").unwrap();
        assert!(matches!(ws.read("src/a.go"), Err(WorkspaceError::NotFound { .. })));
        assert_eq!(ws.read("pkg/deep/b.go").unwrap(), b"package main");
    }

    #[test]
    fn rename_missing_source_is_not_found() {
        let (_guard, ws) = workspace();
        assert!(matches!(
            ws.rename("ghost.go", "b.go"),
            Err(WorkspaceError::NotFound { .. })
        ));
    }

    #[test]
    fn walk_covers_full_subtree() {
        let (_guard, ws) = workspace();
        ws.write("a.txt", b"a").unwrap();
        ws.write("src/b.txt", b"b").unwrap();
        ws.write("src/deep/c.txt", b"c").unwrap();
        let paths: Vec<String> = ws.walk("").unwrap().map(|f| f.path).collect();
        assert!(paths.contains(&"a.txt".to_string()));
        assert!(paths.contains(&"src/b.txt".to_string()));
        assert!(paths.contains(&"src/deep/c.txt".to_string()));
        assert!(paths.contains(&"src".to_string()));
    }

    #[test]
    fn walk_missing_subtree_is_not_found() {
        let (_guard, ws) = workspace();
        assert!(ws.walk("nope").is_err());
    }
}
