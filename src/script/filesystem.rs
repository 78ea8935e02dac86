//! The file-system indirection.
//!
//! Scripts reference project files by path; the engine never touches the
//! disk itself. Hosts hand in whatever resolution suits them: an archive,
//! a memory map, or [`StdFileSystem`] for plain directories.

use std::path::PathBuf;

use crate::errors::QuestError;

/// Resolves text files by path (or any name scheme the host likes).
pub trait FileSystem {
    fn get_text_file(&self, path: &str) -> Result<String, QuestError>;
}

/// The default resolver: refuses everything. Useful when a script is known
/// to carry no `projects:` entries.
#[derive(Debug, Default)]
pub struct NullFileSystem;

impl FileSystem for NullFileSystem {
    fn get_text_file(&self, path: &str) -> Result<String, QuestError> {
        Err(QuestError::FileSystem(format!(
            "no file system configured, cannot read `{path}`"
        )))
    }
}

/// Standard-library file access, rooted at a base directory.
#[derive(Debug)]
pub struct StdFileSystem {
    root: PathBuf,
}

impl StdFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystem for StdFileSystem {
    fn get_text_file(&self, path: &str) -> Result<String, QuestError> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full)
            .map_err(|e| QuestError::FileSystem(format!("`{}`: {e}", full.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_file_system_refuses() {
        let err = NullFileSystem.get_text_file("any.quest").unwrap_err();
        assert!(matches!(err, QuestError::FileSystem(_)));
    }

    #[test]
    fn test_std_file_system_reads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.quest"), "version 1 0\n").unwrap();
        let fs = StdFileSystem::new(dir.path());
        assert_eq!(fs.get_text_file("a.quest").unwrap(), "version 1 0\n");
        assert!(fs.get_text_file("missing.quest").is_err());
    }
}
