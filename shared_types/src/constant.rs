// Constants used across modules
pub const NODE_FILE_MAGIC: u32 = 0xB7EEF11E; // Node file format identifier
pub const NO_SIBLING: i64 = -1; // Absent sibling or child offset
