use std::path::Path;

use bptree::node::{InternalNode, LeafNode, Node};
use bptree::{Converter, DirRemoteStore, TreeFile};
use byteorder::{ByteOrder, LittleEndian};
use shared_types::{NO_SIBLING, StorageError};
use tempfile::tempdir;

/// Codec for the tests: 10-byte space-padded string keys, 8-byte offsets.
struct AsciiConverter;

impl Converter<String, i64> for AsciiConverter {
    fn key_to_bytes(&self, key: &String) -> Result<Vec<u8>, StorageError> {
        if key.len() > 10 {
            return Err(StorageError::InvalidInput(format!(
                "key {:?} is too long",
                key
            )));
        }
        let mut bytes = vec![b' '; 10];
        bytes[..key.len()].copy_from_slice(key.as_bytes());
        Ok(bytes)
    }

    fn bytes_to_key(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let key = std::str::from_utf8(bytes)
            .map_err(|_| StorageError::CorruptedData("bad key bytes".to_string()))?;
        Ok(key.trim_end().to_string())
    }

    fn record_to_bytes(&self, record: &i64) -> Result<Vec<u8>, StorageError> {
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_i64(&mut bytes, *record);
        Ok(bytes)
    }

    fn bytes_to_record(&self, bytes: &[u8]) -> Result<i64, StorageError> {
        Ok(LittleEndian::read_i64(bytes))
    }

    fn key_length(&self) -> usize {
        10
    }

    fn record_length(&self) -> usize {
        8
    }
}

fn open_file(path: &Path, order: usize) -> TreeFile<String, i64, AsciiConverter> {
    TreeFile::open(path, order, AsciiConverter).unwrap()
}

#[test]
fn test_leaf_record_round_trip() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("leaf.idx"), 4);

    let leaf = LeafNode {
        keys: vec!["aa".to_string(), "bb".to_string()],
        values: vec![7, 9],
        left: NO_SIBLING,
        right: 777,
    };
    let offset = file.append_leaf(&leaf).unwrap();

    match file.read_node(offset).unwrap() {
        Node::Leaf(read) => {
            assert_eq!(read.keys, leaf.keys);
            assert_eq!(read.values, leaf.values);
            assert_eq!(read.left, leaf.left);
            assert_eq!(read.right, leaf.right);
        }
        Node::Internal(_) => panic!("leaf slot decoded as internal node"),
    }
}

#[test]
fn test_internal_record_round_trip() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("internal.idx"), 4);

    let internal = InternalNode {
        keys: vec!["mm".to_string(), "tt".to_string()],
        children: vec![100, 200, 300],
        left: 55,
        right: NO_SIBLING,
    };
    let offset = file.append_internal(&internal).unwrap();

    match file.read_node(offset).unwrap() {
        Node::Internal(read) => {
            assert_eq!(read.keys, internal.keys);
            assert_eq!(read.children, internal.children);
            assert_eq!(read.left, internal.left);
            assert_eq!(read.right, internal.right);
        }
        Node::Leaf(_) => panic!("internal slot decoded as leaf"),
    }
}

#[test]
fn test_appends_are_slot_aligned() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("slots.idx"), 4);
    let slot = file.node_size() as i64;

    let leaf: LeafNode<String, i64> = LeafNode::new();
    // Slot 0 is the root slot, so the first append lands one slot in.
    assert_eq!(file.append_leaf(&leaf).unwrap(), slot);
    assert_eq!(file.append_leaf(&leaf).unwrap(), 2 * slot);
    assert_eq!(file.next_offset().unwrap(), 3 * slot);
}

#[test]
fn test_overwrite_in_place() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("overwrite.idx"), 4);

    let mut leaf: LeafNode<String, i64> = LeafNode::new();
    leaf.insert(4, "k1".to_string(), 1);
    let offset = file.append_leaf(&leaf).unwrap();

    leaf.insert(4, "k2".to_string(), 2);
    leaf.right = 999;
    file.write_leaf(&leaf, offset).unwrap();

    match file.read_node(offset).unwrap() {
        Node::Leaf(read) => {
            assert_eq!(read.keys, vec!["k1".to_string(), "k2".to_string()]);
            assert_eq!(read.right, 999);
        }
        Node::Internal(_) => panic!("expected leaf"),
    }
}

#[test]
fn test_fresh_file_has_no_root_recorded() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("fresh.idx"), 4);
    let (offset, is_leaf) = file.read_root_slot().unwrap();
    assert_eq!(offset, NO_SIBLING);
    assert!(is_leaf);
}

#[test]
fn test_root_slot_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rootslot.idx");
    {
        let mut file = open_file(&path, 4);
        let leaf: LeafNode<String, i64> = LeafNode::new();
        let offset = file.append_leaf(&leaf).unwrap();
        file.write_root_slot(offset, true).unwrap();
    }
    let mut file = open_file(&path, 4);
    let (offset, is_leaf) = file.read_root_slot().unwrap();
    assert_eq!(offset, file.node_size() as i64);
    assert!(is_leaf);
}

#[test]
fn test_read_past_end_of_file_is_rejected() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("eof.idx"), 4);
    let way_past = (file.node_size() * 50) as i64;
    assert!(matches!(
        file.read_node(way_past),
        Err(StorageError::CorruptedData(_))
    ));
}

#[test]
fn test_header_offset_is_rejected() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("header.idx"), 4);
    assert!(matches!(
        file.read_node(0),
        Err(StorageError::CorruptedData(_))
    ));
}

#[test]
fn test_bad_magic_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.idx");
    std::fs::write(&path, vec![0u8; 256]).unwrap();
    let mut file = open_file(&path, 4);
    assert!(matches!(
        file.read_root_slot(),
        Err(StorageError::CorruptedData(_))
    ));
}

#[test]
fn test_order_below_three_is_rejected() {
    let dir = tempdir().unwrap();
    let result = TreeFile::<String, i64, _>::open(dir.path().join("tiny.idx"), 2, AsciiConverter);
    assert!(matches!(result, Err(StorageError::InvalidInput(_))));
}

#[test]
fn test_sealed_file_rejects_writes_and_reads_remotely() {
    let dir = tempdir().unwrap();
    let mut file = open_file(&dir.path().join("sealed.idx"), 4);

    let mut leaf: LeafNode<String, i64> = LeafNode::new();
    leaf.insert(4, "k1".to_string(), 1);
    let offset = file.append_leaf(&leaf).unwrap();
    file.write_root_slot(offset, true).unwrap();

    let remote = DirRemoteStore::new(dir.path().join("remote/sealed.idx"));
    file.seal(Box::new(remote)).unwrap();
    assert!(file.is_sealed());

    assert!(matches!(
        file.write_leaf(&leaf, offset),
        Err(StorageError::InvalidOperation(_))
    ));
    assert!(matches!(
        file.append_leaf(&leaf),
        Err(StorageError::InvalidOperation(_))
    ));

    // Reads now come from the remote copy.
    match file.read_node(offset).unwrap() {
        Node::Leaf(read) => assert_eq!(read.keys, vec!["k1".to_string()]),
        Node::Internal(_) => panic!("expected leaf"),
    }
    let (root_offset, is_leaf) = file.read_root_slot().unwrap();
    assert_eq!(root_offset, offset);
    assert!(is_leaf);
}
