use shared_types::StorageError;

/// Translates keys and records between their in-memory form and the
/// fixed-width byte strings stored in the node file.
///
/// Every implementation fixes `key_length` and `record_length`; beyond those
/// two lengths the tree and the node file are type-agnostic. Encoding a value
/// that does not fit its configured width is an `InvalidInput` error; shorter
/// values are right-padded to the full width.
pub trait Converter<K, V> {
    /// Encodes a key to exactly `key_length()` bytes.
    fn key_to_bytes(&self, key: &K) -> Result<Vec<u8>, StorageError>;

    /// Decodes a key from a `key_length()`-byte slice.
    fn bytes_to_key(&self, bytes: &[u8]) -> Result<K, StorageError>;

    /// Encodes a record to exactly `record_length()` bytes.
    fn record_to_bytes(&self, record: &V) -> Result<Vec<u8>, StorageError>;

    /// Decodes a record from a `record_length()`-byte slice.
    fn bytes_to_record(&self, bytes: &[u8]) -> Result<V, StorageError>;

    fn key_length(&self) -> usize;

    fn record_length(&self) -> usize;
}
