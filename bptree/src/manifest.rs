use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
};

use bincode::{Decode, Encode, config::standard};
use serde::{Deserialize, Serialize};
use shared_types::StorageError;

/// Sidecar metadata for a node file. The slot geometry of a store depends on
/// the order and the codec widths it was built with, so they are recorded
/// next to the file and read back before reopening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct IndexManifest {
    pub order: usize,
    pub key_length: usize,
    pub record_length: usize,
}

impl IndexManifest {
    pub fn new(order: usize, key_length: usize, record_length: usize) -> Self {
        Self {
            order,
            key_length,
            record_length,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        bincode::encode_to_vec(self, standard())
            .map_err(|err| StorageError::CorruptedData(err.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StorageError> {
        let (decoded, _len): (IndexManifest, usize) = bincode::decode_from_slice(data, standard())
            .map_err(|err| StorageError::CorruptedData(err.to_string()))?;
        Ok(decoded)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let data = self.to_bytes()?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_manifest_round_trip() {
        let manifest = IndexManifest::new(7, 10, 8);
        let bytes = manifest.to_bytes().unwrap();
        assert_eq!(IndexManifest::from_bytes(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_manifest_file_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();
        let manifest = IndexManifest::new(4, 10, 8);
        manifest.save_to_file(temp_file.path()).unwrap();
        let loaded = IndexManifest::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, manifest);
    }
}
