//! Book directories on the local filesystem

use super::{join_path, EntryKind, RepoEntry, Repository, RepositoryError};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A local directory exposed as a [`Repository`]
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Create a repository rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the repository
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.trim_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl Repository for LocalRepository {
    fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, RepositoryError> {
        let dir = self.resolve(path);
        if !dir.is_dir() {
            return Err(RepositoryError::NotFound(dir.display().to_string()));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| RepositoryError::Io {
                path: dir.clone(),
                source: std::io::Error::other(e),
            })?;

            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = if entry.file_type().is_dir() {
                EntryKind::Dir
            } else if entry.file_type().is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            entries.push(RepoEntry {
                path: join_path(path, &name),
                name,
                kind,
            });
        }

        Ok(entries)
    }

    fn download_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
        let file = self.resolve(path);
        fs::read(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RepositoryError::NotFound(file.display().to_string()),
            _ => RepositoryError::Io {
                path: file.clone(),
                source: e,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_directory_sorted_with_kinds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("2. Akt")).unwrap();
        fs::create_dir(dir.path().join("1. Akt")).unwrap();
        fs::write(dir.path().join("meta.json"), "{}").unwrap();

        let repository = LocalRepository::new(dir.path());
        let entries = repository.list_directory("").unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["1. Akt", "2. Akt", "meta.json"]);
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[2].kind, EntryKind::File);
        assert_eq!(entries[0].path, "1. Akt");
    }

    #[test]
    fn test_nested_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Buch/1. Akt")).unwrap();
        fs::write(dir.path().join("Buch/1. Akt/1. Kapitel.md"), "Text").unwrap();

        let repository = LocalRepository::new(dir.path());
        let entries = repository.list_directory("Buch/1. Akt").unwrap();

        assert_eq!(entries[0].path, "Buch/1. Akt/1. Kapitel.md");
        assert_eq!(repository.download_file(&entries[0].path).unwrap(), b"Text");
    }

    #[test]
    fn test_missing_paths_are_not_found() {
        let dir = TempDir::new().unwrap();
        let repository = LocalRepository::new(dir.path());

        assert!(repository.list_directory("fehlt").unwrap_err().is_not_found());
        assert!(repository.download_file("fehlt.md").unwrap_err().is_not_found());
    }
}
