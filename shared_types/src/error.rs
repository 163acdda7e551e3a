//! Error types shared across modules

#[derive(Debug)]
pub enum StorageError {
    CorruptedData(String),
    InvalidInput(String),
    IoError(String),
    InvalidOperation(String),
    InvariantViolation(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
            StorageError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            StorageError::IoError(msg) => write!(f, "IO error: {}", msg),
            StorageError::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            StorageError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

impl std::error::Error for StorageError {}
