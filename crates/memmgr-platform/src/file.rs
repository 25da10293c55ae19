use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// An open transfer file.
pub trait TransferFile: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> TransferFile for T {}

#[derive(Debug, Error)]
pub enum FileCheckError {
    #[error("filename is empty")]
    EmptyPath,

    #[error("{path}: directory is not writable ({reason})")]
    DirNotWritable { path: PathBuf, reason: String },

    #[error("{path}: file is not readable ({reason})")]
    NotReadable { path: PathBuf, reason: String },
}

/// Filesystem access used by the bulk transfer engine.
pub trait FileStore: Send + Sync {
    type File: TransferFile;

    /// Opens `path` read-write, creating it if needed and discarding any previous contents.
    fn create(&self, path: &Path) -> io::Result<Self::File>;

    fn open_read(&self, path: &Path) -> io::Result<Self::File>;

    /// Size of the file as reported by the filesystem.
    fn size(&self, path: &Path) -> io::Result<u64>;

    fn close(&self, mut file: Self::File) -> io::Result<()> {
        file.flush()
    }

    /// Checks that a file can be created at `path`.
    fn verify_dir_for_write(&self, path: &Path) -> Result<(), FileCheckError>;

    /// Checks that `path` names an existing, readable regular file.
    fn verify_file_for_read(&self, path: &Path) -> Result<(), FileCheckError>;
}

/// [`FileStore`] over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileStore;

impl FileStore for StdFileStore {
    type File = File;

    fn create(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn close(&self, mut file: File) -> io::Result<()> {
        file.flush()?;
        // Surface deferred write errors before the handle is dropped.
        file.sync_data().or_else(|err| match err.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput => Ok(()),
            _ => Err(err),
        })
    }

    fn verify_dir_for_write(&self, path: &Path) -> Result<(), FileCheckError> {
        if path.as_os_str().is_empty() {
            return Err(FileCheckError::EmptyPath);
        }
        let not_writable = |reason: &str| FileCheckError::DirNotWritable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if path.is_dir() {
            return Err(not_writable("path names a directory"));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let meta = fs::metadata(dir).map_err(|err| not_writable(&err.to_string()))?;
        if !meta.is_dir() {
            return Err(not_writable("parent is not a directory"));
        }
        if meta.permissions().readonly() {
            return Err(not_writable("parent directory is read-only"));
        }
        Ok(())
    }

    fn verify_file_for_read(&self, path: &Path) -> Result<(), FileCheckError> {
        if path.as_os_str().is_empty() {
            return Err(FileCheckError::EmptyPath);
        }
        let not_readable = |reason: String| FileCheckError::NotReadable {
            path: path.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|err| not_readable(err.to_string()))?;
        if !meta.is_file() {
            return Err(not_readable("not a regular file".to_string()));
        }
        File::open(path).map_err(|err| not_readable(err.to_string()))?;
        Ok(())
    }
}
