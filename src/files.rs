//! Per-user file areas.
//!
//! Every authenticated user gets a directory named after their
//! username under the configured root, created on first access.
//! Caller-supplied relative paths are normalized component by
//! component; `..`, absolute paths, and separator tricks never reach
//! the filesystem.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UserFileError {
    #[error("Invalid path")]
    InvalidPath,
    #[error("Unknown path")]
    UnknownPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A directory listing entry, serialized into response messages.
#[derive(Debug, Clone, Serialize)]
pub struct FolderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Filesystem-backed store of per-user directories.
#[derive(Debug, Clone)]
pub struct UserFiles {
    root: PathBuf,
}

impl UserFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The user's base directory, created if absent.
    fn ensure_user_dir(&self, username: &str) -> Result<PathBuf, UserFileError> {
        let dir = self.root.join(username);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn resolve(&self, username: &str, relative: &str) -> Result<PathBuf, UserFileError> {
        let base = self.ensure_user_dir(username)?;
        Ok(base.join(clean_relative(relative).ok_or(UserFileError::InvalidPath)?))
    }

    /// Write a file at a relative path inside the user's area. Parent
    /// directories are not created implicitly; `create_folder` exists
    /// for that.
    pub fn write_file(
        &self,
        username: &str,
        relative: &str,
        content: &str,
    ) -> Result<(), UserFileError> {
        let path = self.resolve(username, relative)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a folder (and any missing parents) inside the user's area.
    pub fn create_folder(&self, username: &str, relative: &str) -> Result<(), UserFileError> {
        let path = self.resolve(username, relative)?;
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// List a folder inside the user's area. `.` or an empty path lists
    /// the base directory.
    pub fn list_folder(
        &self,
        username: &str,
        relative: &str,
    ) -> Result<Vec<FolderEntry>, UserFileError> {
        let path = self.resolve(username, relative)?;
        if !path.exists() {
            return Err(UserFileError::UnknownPath);
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                "dir"
            } else if file_type.is_symlink() {
                "symlink"
            } else {
                "file"
            };
            entries.push(FolderEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: kind.to_string(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Normalize a caller-supplied relative path. Returns `None` for
/// anything that could step outside the base directory.
fn clean_relative(relative: &str) -> Option<PathBuf> {
    if relative.contains('\\') {
        return None;
    }
    let trimmed = relative.trim_start_matches('/');
    let mut cleaned = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(cleaned)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_store() -> (TempDir, UserFiles) {
        let tmp = TempDir::new().unwrap();
        let files = UserFiles::new(tmp.path());
        (tmp, files)
    }

    #[test]
    fn write_and_list_scoped_to_username() {
        let (tmp, files) = fresh_store();

        files.write_file("alice", "notes.txt", "hello").unwrap();
        assert!(tmp.path().join("alice").join("notes.txt").exists());

        let entries = files.list_folder("alice", "").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "notes.txt");
        assert_eq!(entries[0].kind, "file");
    }

    #[test]
    fn create_folder_then_write_inside_it() {
        let (_tmp, files) = fresh_store();

        files.create_folder("alice", "projects/demo").unwrap();
        files
            .write_file("alice", "projects/demo/readme.md", "demo")
            .unwrap();

        let entries = files.list_folder("alice", "projects").unwrap();
        assert_eq!(entries[0].name, "demo");
        assert_eq!(entries[0].kind, "dir");
    }

    #[test]
    fn write_without_parent_folder_fails() {
        let (_tmp, files) = fresh_store();
        let err = files.write_file("alice", "missing/notes.txt", "x").unwrap_err();
        assert!(matches!(err, UserFileError::Io(_)));
    }

    #[test]
    fn listing_unknown_path_fails() {
        let (_tmp, files) = fresh_store();
        let err = files.list_folder("alice", "nowhere").unwrap_err();
        assert!(matches!(err, UserFileError::UnknownPath));
    }

    #[test]
    fn listing_base_dir_creates_it_on_first_access() {
        let (tmp, files) = fresh_store();
        let entries = files.list_folder("alice", "").unwrap();
        assert!(entries.is_empty());
        assert!(tmp.path().join("alice").is_dir());
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let (tmp, files) = fresh_store();
        std::fs::write(tmp.path().join("secret.txt"), "root-level").unwrap();

        for path in ["../secret.txt", "a/../../secret.txt", "..", "a\\..\\b"] {
            assert!(
                matches!(
                    files.write_file("alice", path, "x"),
                    Err(UserFileError::InvalidPath)
                ),
                "{path:?} should be rejected"
            );
        }
        // A leading slash is treated as relative, not absolute.
        files.write_file("alice", "/rooted.txt", "ok").unwrap();
        assert!(tmp.path().join("alice").join("rooted.txt").exists());
    }

    #[test]
    fn users_cannot_see_each_other() {
        let (_tmp, files) = fresh_store();
        files.write_file("alice", "private.txt", "alice's").unwrap();

        let entries = files.list_folder("bob", "").unwrap();
        assert!(entries.is_empty());
    }
}
