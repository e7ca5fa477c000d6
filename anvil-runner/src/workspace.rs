//! Workspace management
//!
//! Each build gets a private scratch directory at
//! `<base>/<application key>/<build number>`, mounted into every step
//! container. The directory is purged when the build ends, whatever the
//! outcome.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::WorkspaceError;

/// Allocates per-build workspaces under a base directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Creates the workspace for one build
    ///
    /// The returned guard purges the directory when dropped.
    pub fn allocate(&self, app_key: &str, build_number: u32) -> Result<Workspace, WorkspaceError> {
        let path = allocate(&self.base, app_key, build_number)?;
        Ok(Workspace { path: Some(path) })
    }
}

/// A build's workspace directory, purged on drop
#[derive(Debug)]
pub struct Workspace {
    path: Option<PathBuf>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Purges the workspace now
    ///
    /// # Returns
    /// Number of entries that could not be removed
    pub fn release(mut self) -> usize {
        self.path.take().map(|p| purge(&p)).unwrap_or(0)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            purge(&path);
        }
    }
}

/// Creates `<base>/<app key>/<build number>`, including missing parents
pub fn allocate(base: &Path, app_key: &str, build_number: u32) -> Result<PathBuf, WorkspaceError> {
    let path = base
        .join(sanitize_key(app_key))
        .join(build_number.to_string());

    std::fs::create_dir_all(&path).map_err(|source| WorkspaceError::Create {
        path: path.clone(),
        source,
    })?;

    info!("Workspace allocated at {}", path.display());
    Ok(path)
}

/// Recursively removes a directory tree, deepest entries first
///
/// Never fails: each entry that cannot be removed is logged and skipped so
/// the rest of the tree is still cleaned up.
///
/// # Returns
/// Number of entries that could not be removed
pub fn purge(path: &Path) -> usize {
    if !path.exists() {
        debug!("Workspace {} already gone", path.display());
        return 0;
    }

    let mut failures = 0;

    for entry in WalkDir::new(path).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read workspace entry: {}", e);
                failures += 1;
                continue;
            }
        };

        let removed = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };

        if let Err(e) = removed {
            warn!("Failed to remove {}: {}", entry.path().display(), e);
            failures += 1;
        }
    }

    if failures == 0 {
        info!("Workspace {} purged", path.display());
    } else {
        warn!(
            "Workspace {} purged with {} failure(s)",
            path.display(),
            failures
        );
    }

    failures
}

/// Encodes an application key as a single safe path component
///
/// Bytes outside `[A-Za-z0-9.-]` become `_xx` hex escapes, as does a leading
/// `.`, so distinct keys never share a directory and the result is never
/// `.` or `..`. An empty key maps to `_`.
fn sanitize_key(key: &str) -> String {
    if key.is_empty() {
        return "_".to_string();
    }

    let mut encoded = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && i > 0);
        if plain {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02x}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_creates_nested_path() {
        let base = TempDir::new().unwrap();
        let path = allocate(&base.path().join("deep/er"), "A1", 7).unwrap();

        assert!(path.is_dir());
        assert!(path.ends_with("A1/7"));
    }

    #[test]
    fn test_allocate_is_unique_per_build_number() {
        let base = TempDir::new().unwrap();
        let first = allocate(base.path(), "A1", 1).unwrap();
        let second = allocate(base.path(), "A1", 2).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_allocate_fails_when_base_is_a_file() {
        let base = TempDir::new().unwrap();
        let file = base.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = allocate(&file, "A1", 1).unwrap_err();
        assert!(matches!(err, WorkspaceError::Create { .. }));
    }

    #[test]
    fn test_purge_removes_tree() {
        let base = TempDir::new().unwrap();
        let path = allocate(base.path(), "A1", 1).unwrap();
        std::fs::create_dir_all(path.join("src/nested")).unwrap();
        std::fs::write(path.join("src/nested/file.txt"), "data").unwrap();
        std::fs::write(path.join("README"), "data").unwrap();

        assert_eq!(purge(&path), 0);
        assert!(!path.exists());
        // Parent application directory is left alone
        assert!(base.path().join("A1").is_dir());
    }

    #[test]
    fn test_purge_missing_path_is_noop() {
        let base = TempDir::new().unwrap();
        assert_eq!(purge(&base.path().join("missing")), 0);
    }

    #[test]
    fn test_workspace_guard_purges_on_drop() {
        let base = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(base.path());

        let path = {
            let workspace = manager.allocate("A1", 3).unwrap();
            std::fs::write(workspace.path().join("out.bin"), "x").unwrap();
            workspace.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_release() {
        let base = TempDir::new().unwrap();
        let workspace = WorkspaceManager::new(base.path()).allocate("A1", 4).unwrap();
        let path = workspace.path().to_path_buf();

        assert_eq!(workspace.release(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("my-app1.0"), "my-app1.0");
        assert_eq!(sanitize_key("my_app"), "my_5fapp");
        assert_eq!(sanitize_key("../../etc"), "_2e._2f.._2fetc");
        assert_eq!(sanitize_key("a/b c"), "a_2fb_20c");
        assert_eq!(sanitize_key("."), "_2e");
        assert_eq!(sanitize_key(".."), "_2e.");
        assert_eq!(sanitize_key(""), "_");
        assert_eq!(sanitize_key("é"), "_c3_a9");
    }

    #[test]
    fn test_distinct_keys_get_distinct_workspaces() {
        let base = TempDir::new().unwrap();
        let keys = ["team/web", "team_web", "team_2fweb", "team web", ".x", "_2ex", "", "_"];

        let paths: Vec<PathBuf> = keys
            .iter()
            .map(|key| allocate(base.path(), key, 1).unwrap())
            .collect();

        for (i, a) in paths.iter().enumerate() {
            assert_eq!(a.parent().unwrap().parent().unwrap(), base.path());
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
