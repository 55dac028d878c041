//! Shared file directory
//!
//! Clients can list the regular files in one directory and download them by
//! exact name. Names coming off the wire are never joined onto the
//! directory path until they have been checked to be a single plain path
//! component.

use crate::error::StorageError;
use crate::protocol::DELIMITER;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};

/// Read-only view of the server's shared files
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Serve files from `root`
    ///
    /// The directory does not have to exist yet; a missing directory simply
    /// lists as empty.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory being served
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the regular files in the directory, sorted
    ///
    /// Entries whose names are not valid UTF-8, or that contain a newline or
    /// the param delimiter, are skipped: they could not be listed or
    /// requested over the wire.
    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                if !name.contains('\n') && !name.contains(DELIMITER) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Open a shared file for streaming
    ///
    /// Returns the open file and its size, taken from metadata before any
    /// bytes are read.
    ///
    /// # Errors
    ///
    /// - `InvalidFilename` if `name` is not a plain file name
    /// - `FileNotFound` if no regular file by that name exists
    pub async fn open(&self, name: &str) -> Result<(File, u64), StorageError> {
        let path = self.root.join(sanitize_filename(name)?);
        let not_found = || StorageError::FileNotFound {
            name: name.to_string(),
        };

        // Symlinks could point outside the shared directory
        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(not_found());
        }

        let file = File::open(&path).await?;
        Ok((file, metadata.len()))
    }
}

/// Check that `name` is a single, plain path component
///
/// Rejects empty names, `.` and `..`, anything with a path separator or NUL,
/// and absolute or prefixed paths.
pub fn sanitize_filename(name: &str) -> Result<&str, StorageError> {
    let invalid = || StorageError::InvalidFilename {
        name: name.to_string(),
    };

    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename(".hidden").unwrap(), ".hidden");
        assert_eq!(sanitize_filename("notes:v2.txt").unwrap(), "notes:v2.txt");

        for bad in ["", ".", "..", "../secret", "a/b", "/etc/passwd", "a\\b", "nul\0"] {
            assert!(
                matches!(sanitize_filename(bad), Err(StorageError::InvalidFilename { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_only_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let store = FileStore::new(dir.path());
        assert_eq!(store.list().await.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_open_returns_size_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello world").unwrap();

        let store = FileStore::new(dir.path());
        let (mut file, size) = store.open("hello.txt").await.unwrap();
        assert_eq!(size, 11);

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn test_open_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let store = FileStore::new(dir.path());

        assert!(matches!(
            store.open("missing.txt").await,
            Err(StorageError::FileNotFound { .. })
        ));
        assert!(matches!(
            store.open("subdir").await,
            Err(StorageError::FileNotFound { .. })
        ));
        assert!(matches!(
            store.open("../escape").await,
            Err(StorageError::InvalidFilename { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_not_served() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("link")).unwrap();

        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.open("link").await,
            Err(StorageError::FileNotFound { .. })
        ));
    }
}
