use byteorder::{ByteOrder, LittleEndian};

use bptree::Converter;
use shared_types::StorageError;

pub const KEY_LENGTH: usize = 10;
pub const RECORD_LENGTH: usize = 8;

/// Fixed-width codec for the batting index: 10-byte space-padded player ids
/// and 8-byte record file offsets.
pub struct BattingConverter;

impl Converter<String, i64> for BattingConverter {
    fn key_to_bytes(&self, key: &String) -> Result<Vec<u8>, StorageError> {
        if key.len() > KEY_LENGTH {
            return Err(StorageError::InvalidInput(format!(
                "key value {:?} is too long",
                key
            )));
        }
        let mut bytes = vec![b' '; KEY_LENGTH];
        bytes[..key.len()].copy_from_slice(key.as_bytes());
        Ok(bytes)
    }

    fn bytes_to_key(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let key = std::str::from_utf8(bytes).map_err(|_| {
            StorageError::CorruptedData("key bytes are not valid UTF-8".to_string())
        })?;
        Ok(key.trim_end().to_string())
    }

    fn record_to_bytes(&self, record: &i64) -> Result<Vec<u8>, StorageError> {
        let mut bytes = vec![0u8; RECORD_LENGTH];
        LittleEndian::write_i64(&mut bytes, *record);
        Ok(bytes)
    }

    fn bytes_to_record(&self, bytes: &[u8]) -> Result<i64, StorageError> {
        if bytes.len() < RECORD_LENGTH {
            return Err(StorageError::CorruptedData(format!(
                "record needs {} bytes, got {}",
                RECORD_LENGTH,
                bytes.len()
            )));
        }
        Ok(LittleEndian::read_i64(bytes))
    }

    fn key_length(&self) -> usize {
        KEY_LENGTH
    }

    fn record_length(&self) -> usize {
        RECORD_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_key_is_padded() {
        let converter = BattingConverter;
        let bytes = converter.key_to_bytes(&"abc".to_string()).unwrap();
        assert_eq!(bytes.len(), KEY_LENGTH);
        assert_eq!(&bytes, b"abc       ");
        assert_eq!(converter.bytes_to_key(&bytes).unwrap(), "abc");
    }

    #[test]
    fn test_boundary_length_key_round_trips() {
        let converter = BattingConverter;
        let key = "aardsda01x".to_string();
        assert_eq!(key.len(), KEY_LENGTH);
        let bytes = converter.key_to_bytes(&key).unwrap();
        assert_eq!(bytes.len(), KEY_LENGTH);
        assert_eq!(converter.bytes_to_key(&bytes).unwrap(), key);
    }

    #[test]
    fn test_over_length_key_is_rejected() {
        let converter = BattingConverter;
        let result = converter.key_to_bytes(&"elevenchars".to_string());
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_record_round_trips() {
        let converter = BattingConverter;
        for value in [0i64, 1, -1, 123_456_789, i64::MAX, i64::MIN] {
            let bytes = converter.record_to_bytes(&value).unwrap();
            assert_eq!(bytes.len(), RECORD_LENGTH);
            assert_eq!(converter.bytes_to_record(&bytes).unwrap(), value);
        }
    }
}
