//! Managed script areas.
//!
//! Two flat directories under the configured scripts root: `public/`
//! (runnable by any authenticated session) and `private/` (admin
//! only). Script names are single path components; anything that could
//! escape the area (separators, `..`, absolute paths) is rejected
//! before any filesystem access.

use std::path::{Path, PathBuf};

/// Which script area a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptArea {
    Public,
    Private,
}

impl ScriptArea {
    fn dir_name(self) -> &'static str {
        match self {
            ScriptArea::Public => "public",
            ScriptArea::Private => "private",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Invalid script name")]
    InvalidName,
    #[error("Script already exists under this name")]
    AlreadyExists,
    #[error("Unable to store script")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed script store.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    root: PathBuf,
}

impl ScriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn area_dir(&self, area: ScriptArea) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Resolve a caller-supplied script name inside an area.
    pub fn resolve(&self, area: ScriptArea, name: &str) -> Result<PathBuf, ScriptError> {
        if !valid_script_name(name) {
            return Err(ScriptError::InvalidName);
        }
        Ok(self.area_dir(area).join(name))
    }

    /// Script names in an area; a missing directory lists as empty.
    pub fn list(&self, area: ScriptArea) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = std::fs::read_dir(self.area_dir(area)) else {
            return names;
        };
        for entry in entries.flatten() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    /// Store a new script. Refuses to overwrite an existing one.
    pub fn upload(&self, area: ScriptArea, name: &str, content: &str) -> Result<(), ScriptError> {
        let path = self.resolve(area, name)?;
        std::fs::create_dir_all(self.area_dir(area))?;
        if path.exists() {
            return Err(ScriptError::AlreadyExists);
        }
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// A script name must be one plain path component.
fn valid_script_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !Path::new(name).is_absolute()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_store() -> (TempDir, ScriptStore) {
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn upload_then_list_per_area() {
        let (_tmp, store) = fresh_store();

        store.upload(ScriptArea::Public, "backup.sh", "echo backup").unwrap();
        store.upload(ScriptArea::Private, "wipe.sh", "echo wipe").unwrap();

        assert_eq!(store.list(ScriptArea::Public), vec!["backup.sh"]);
        assert_eq!(store.list(ScriptArea::Private), vec!["wipe.sh"]);
    }

    #[test]
    fn missing_area_lists_empty() {
        let (_tmp, store) = fresh_store();
        assert!(store.list(ScriptArea::Public).is_empty());
    }

    #[test]
    fn upload_refuses_overwrite() {
        let (_tmp, store) = fresh_store();

        store.upload(ScriptArea::Public, "job.sh", "first").unwrap();
        let err = store.upload(ScriptArea::Public, "job.sh", "second").unwrap_err();
        assert!(matches!(err, ScriptError::AlreadyExists));

        let path = store.resolve(ScriptArea::Public, "job.sh").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first");
    }

    #[test]
    fn traversal_names_are_rejected() {
        let (_tmp, store) = fresh_store();

        for name in ["", ".", "..", "../escape.sh", "a/b.sh", "a\\b.sh", "/etc/passwd"] {
            assert!(
                store.resolve(ScriptArea::Public, name).is_err(),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolve_stays_inside_the_area() {
        let (tmp, store) = fresh_store();
        let path = store.resolve(ScriptArea::Private, "task.py").unwrap();
        assert!(path.starts_with(tmp.path().join("private")));
    }
}
