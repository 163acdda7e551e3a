use std::{
    fs,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use shared_types::StorageError;

/// Destination for the one-shot bulk copy of a finished node file, plus
/// positioned reads once the copy has committed. The copy is blocking and
/// one-directional; the local store becomes read-only afterwards.
pub trait RemoteStore {
    /// Copies the local file to the remote object. Idempotent: when the
    /// remote object already exists the call is a no-op success.
    fn copy(&mut self, local: &Path) -> Result<(), StorageError>;

    /// Fills `buf` from the committed remote object, starting at `offset`.
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;
}

/// Remote store backed by a plain filesystem path, standing in for a durable
/// object store.
pub struct DirRemoteStore {
    object: PathBuf,
    reader: Option<File>,
}

impl DirRemoteStore {
    pub fn new<P: Into<PathBuf>>(object: P) -> Self {
        Self {
            object: object.into(),
            reader: None,
        }
    }

    pub fn object_path(&self) -> &Path {
        &self.object
    }
}

impl RemoteStore for DirRemoteStore {
    fn copy(&mut self, local: &Path) -> Result<(), StorageError> {
        if !self.object.exists() {
            if let Some(parent) = self.object.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::copy(local, &self.object)?;
        }
        self.reader = Some(File::open(&self.object)?);
        Ok(())
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            StorageError::InvalidOperation("remote object has not been committed".to_string())
        })?;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}
