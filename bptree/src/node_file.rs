use std::{
    fs::{File, OpenOptions},
    io::{Cursor, Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use shared_types::{
    StorageError,
    constant::{NODE_FILE_MAGIC, NO_SIBLING},
};

use crate::{
    codec::Converter,
    node::{InternalNode, LeafNode, Node},
    remote::RemoteStore,
};

const LEAF_TAG: u8 = 0;
const INTERNAL_TAG: u8 = 1;

/// Bytes shared by both record kinds before the key region: tag(1) plus key
/// count(4).
const NODE_PREFIX: usize = 5;

/// Maps nodes to fixed-size slots in one random-access file, little-endian.
///
/// Slot 0 is the reserved root slot: `[magic(4)] [root offset(8)] [root
/// kind(1)]`, zero padded to a full slot. Node slots follow, addressed by
/// their byte offset. Both record kinds are padded to the larger of the two
/// so the tag byte can be read before the contents are parsed:
///
/// ```text
/// leaf:     [tag=0(1)] [key count(4)] [(M-1) keys] [(M-1) records] [left(8)] [right(8)]
/// internal: [tag=1(1)] [key count(4)] [(M-1) keys] [child count(4)] [M children(8 each)] [left(8)] [right(8)]
/// ```
///
/// Slots freed by merges are never reclaimed. After `seal` the store is
/// read-only: writes are rejected and reads are served by the remote store.
pub struct TreeFile<K, V, C> {
    file: File,
    path: PathBuf,
    order: usize,
    node_size: usize,
    converter: C,
    remote: Option<Box<dyn RemoteStore>>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> TreeFile<K, V, C>
where
    C: Converter<K, V>,
{
    /// Opens or creates the node file. A fresh file gets its root slot
    /// initialized with no root recorded yet.
    pub fn open<P: AsRef<Path>>(path: P, order: usize, converter: C) -> Result<Self, StorageError> {
        if order < 3 {
            return Err(StorageError::InvalidInput(format!(
                "tree order must be at least 3, got {}",
                order
            )));
        }
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let key_length = converter.key_length();
        let record_length = converter.record_length();
        let leaf_size = NODE_PREFIX + (order - 1) * (key_length + record_length) + 16;
        let internal_size = NODE_PREFIX + (order - 1) * key_length + 4 + order * 8 + 16;
        let node_size = leaf_size.max(internal_size);

        let mut tree_file = Self {
            file,
            path,
            order,
            node_size,
            converter,
            remote: None,
            _marker: PhantomData,
        };
        if tree_file.file.metadata()?.len() == 0 {
            tree_file.init_root_slot()?;
        }
        Ok(tree_file)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn node_size(&self) -> usize {
        self.node_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_sealed(&self) -> bool {
        self.remote.is_some()
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), StorageError> {
        if self.is_sealed() {
            return Err(StorageError::InvalidOperation(
                "store has been synced to remote storage and is read-only".to_string(),
            ));
        }
        Ok(())
    }

    /// Runs the codec over a pair without storing anything, so an oversized
    /// key or record is rejected before any slot is touched.
    pub(crate) fn check_encodes(&self, key: &K, value: &V) -> Result<(), StorageError> {
        self.converter.key_to_bytes(key)?;
        self.converter.record_to_bytes(value)?;
        Ok(())
    }

    /// The offset the next `append` will return.
    pub fn next_offset(&mut self) -> Result<i64, StorageError> {
        Ok(self.file.seek(SeekFrom::End(0))? as i64)
    }

    /// Reads the slot at `offset` and decodes the variant its tag byte names.
    pub fn read_node(&mut self, offset: i64) -> Result<Node<K, V>, StorageError> {
        if offset < self.node_size as i64 {
            return Err(StorageError::CorruptedData(format!(
                "node offset {} points into the file header",
                offset
            )));
        }
        let mut buf = vec![0u8; self.node_size];
        self.read_at(offset as u64, &mut buf)?;
        match buf[0] {
            LEAF_TAG => Ok(Node::Leaf(self.decode_leaf(&buf)?)),
            INTERNAL_TAG => Ok(Node::Internal(self.decode_internal(&buf)?)),
            tag => Err(StorageError::CorruptedData(format!(
                "unknown node tag: {}",
                tag
            ))),
        }
    }

    pub fn write_node(&mut self, node: &Node<K, V>, offset: i64) -> Result<(), StorageError> {
        match node {
            Node::Leaf(leaf) => self.write_leaf(leaf, offset),
            Node::Internal(internal) => self.write_internal(internal, offset),
        }
    }

    pub fn write_leaf(&mut self, leaf: &LeafNode<K, V>, offset: i64) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let buf = self.encode_leaf(leaf)?;
        self.write_at(offset as u64, &buf)
    }

    pub fn write_internal(
        &mut self,
        internal: &InternalNode<K>,
        offset: i64,
    ) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let buf = self.encode_internal(internal)?;
        self.write_at(offset as u64, &buf)
    }

    /// Writes the node at the end of the file and returns the slot offset it
    /// landed on. Split nodes obtain their identity this way; callers must
    /// capture the offset before appending again.
    pub fn append(&mut self, node: &Node<K, V>) -> Result<i64, StorageError> {
        match node {
            Node::Leaf(leaf) => self.append_leaf(leaf),
            Node::Internal(internal) => self.append_internal(internal),
        }
    }

    pub fn append_leaf(&mut self, leaf: &LeafNode<K, V>) -> Result<i64, StorageError> {
        self.ensure_writable()?;
        let buf = self.encode_leaf(leaf)?;
        self.append_buf(&buf)
    }

    pub fn append_internal(&mut self, internal: &InternalNode<K>) -> Result<i64, StorageError> {
        self.ensure_writable()?;
        let buf = self.encode_internal(internal)?;
        self.append_buf(&buf)
    }

    /// Records the current root's offset and kind in the reserved slot.
    pub fn write_root_slot(&mut self, offset: i64, is_leaf: bool) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_u32::<LittleEndian>(NODE_FILE_MAGIC)?;
        self.file.write_i64::<LittleEndian>(offset)?;
        self.file
            .write_u8(if is_leaf { LEAF_TAG } else { INTERNAL_TAG })?;
        self.file.flush()?;
        Ok(())
    }

    /// Reads the root slot back as `(offset, is_leaf)`. A freshly initialized
    /// store reports a negative offset: no root has been written yet.
    pub fn read_root_slot(&mut self) -> Result<(i64, bool), StorageError> {
        let mut buf = [0u8; 13];
        self.read_at(0, &mut buf)?;
        let mut cursor = Cursor::new(&buf[..]);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != NODE_FILE_MAGIC {
            return Err(StorageError::CorruptedData(
                "invalid node file magic number".to_string(),
            ));
        }
        let offset = cursor.read_i64::<LittleEndian>()?;
        let is_leaf = match cursor.read_u8()? {
            LEAF_TAG => true,
            INTERNAL_TAG => false,
            tag => {
                return Err(StorageError::CorruptedData(format!(
                    "unknown root kind tag: {}",
                    tag
                )));
            }
        };
        Ok((offset, is_leaf))
    }

    /// Copies the finished file to the remote store and seals this store
    /// read-only. Sealing twice is a no-op success.
    pub fn seal(&mut self, mut remote: Box<dyn RemoteStore>) -> Result<(), StorageError> {
        if self.is_sealed() {
            return Ok(());
        }
        self.file.flush()?;
        self.file.sync_all()?;
        remote.copy(&self.path)?;
        self.remote = Some(remote);
        Ok(())
    }

    fn init_root_slot(&mut self) -> Result<(), StorageError> {
        let mut slot = vec![0u8; self.node_size];
        {
            let mut cursor = Cursor::new(&mut slot[..]);
            cursor.write_u32::<LittleEndian>(NODE_FILE_MAGIC)?;
            cursor.write_i64::<LittleEndian>(NO_SIBLING)?;
            cursor.write_u8(LEAF_TAG)?;
        }
        self.write_at(0, &slot)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        if let Some(remote) = self.remote.as_mut() {
            return remote.read_range(offset, buf);
        }
        if offset + buf.len() as u64 > self.file.metadata()?.len() {
            return Err(StorageError::CorruptedData(format!(
                "node read at offset {} past end of file",
                offset
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }

    fn append_buf(&mut self, buf: &[u8]) -> Result<i64, StorageError> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(offset as i64)
    }

    fn leaf_values_start(&self) -> usize {
        NODE_PREFIX + (self.order - 1) * self.converter.key_length()
    }

    fn leaf_links_start(&self) -> usize {
        self.leaf_values_start() + (self.order - 1) * self.converter.record_length()
    }

    fn internal_children_start(&self) -> usize {
        NODE_PREFIX + (self.order - 1) * self.converter.key_length() + 4
    }

    fn internal_links_start(&self) -> usize {
        self.internal_children_start() + self.order * 8
    }

    fn encode_leaf(&self, leaf: &LeafNode<K, V>) -> Result<Vec<u8>, StorageError> {
        debug_assert!(leaf.keys.len() <= self.order - 1);
        debug_assert_eq!(leaf.keys.len(), leaf.values.len());
        let mut buf = vec![0u8; self.node_size];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_u8(LEAF_TAG)?;
            cursor.write_u32::<LittleEndian>(leaf.keys.len() as u32)?;
            for key in &leaf.keys {
                cursor.write_all(&self.converter.key_to_bytes(key)?)?;
            }
            cursor.set_position(self.leaf_values_start() as u64);
            for value in &leaf.values {
                cursor.write_all(&self.converter.record_to_bytes(value)?)?;
            }
            cursor.set_position(self.leaf_links_start() as u64);
            cursor.write_i64::<LittleEndian>(leaf.left)?;
            cursor.write_i64::<LittleEndian>(leaf.right)?;
        }
        Ok(buf)
    }

    fn encode_internal(&self, internal: &InternalNode<K>) -> Result<Vec<u8>, StorageError> {
        debug_assert!(internal.keys.len() <= self.order - 1);
        debug_assert_eq!(internal.children.len(), internal.keys.len() + 1);
        let mut buf = vec![0u8; self.node_size];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_u8(INTERNAL_TAG)?;
            cursor.write_u32::<LittleEndian>(internal.keys.len() as u32)?;
            for key in &internal.keys {
                cursor.write_all(&self.converter.key_to_bytes(key)?)?;
            }
            cursor.set_position((self.internal_children_start() - 4) as u64);
            cursor.write_u32::<LittleEndian>(internal.children.len() as u32)?;
            for child in &internal.children {
                cursor.write_i64::<LittleEndian>(*child)?;
            }
            cursor.set_position(self.internal_links_start() as u64);
            cursor.write_i64::<LittleEndian>(internal.left)?;
            cursor.write_i64::<LittleEndian>(internal.right)?;
        }
        Ok(buf)
    }

    fn decode_leaf(&self, buf: &[u8]) -> Result<LeafNode<K, V>, StorageError> {
        let key_length = self.converter.key_length();
        let record_length = self.converter.record_length();
        let mut cursor = Cursor::new(buf);
        cursor.set_position(1);
        let num_keys = cursor.read_u32::<LittleEndian>()? as usize;
        if num_keys > self.order - 1 {
            return Err(StorageError::CorruptedData(format!(
                "leaf key count {} exceeds capacity for order {}",
                num_keys, self.order
            )));
        }
        let mut keys = Vec::with_capacity(num_keys);
        let mut pos = NODE_PREFIX;
        for _ in 0..num_keys {
            keys.push(self.converter.bytes_to_key(&buf[pos..pos + key_length])?);
            pos += key_length;
        }
        let mut values = Vec::with_capacity(num_keys);
        let mut pos = self.leaf_values_start();
        for _ in 0..num_keys {
            values.push(
                self.converter
                    .bytes_to_record(&buf[pos..pos + record_length])?,
            );
            pos += record_length;
        }
        cursor.set_position(self.leaf_links_start() as u64);
        let left = cursor.read_i64::<LittleEndian>()?;
        let right = cursor.read_i64::<LittleEndian>()?;
        Ok(LeafNode {
            keys,
            values,
            left,
            right,
        })
    }

    fn decode_internal(&self, buf: &[u8]) -> Result<InternalNode<K>, StorageError> {
        let key_length = self.converter.key_length();
        let mut cursor = Cursor::new(buf);
        cursor.set_position(1);
        let num_keys = cursor.read_u32::<LittleEndian>()? as usize;
        if num_keys > self.order - 1 {
            return Err(StorageError::CorruptedData(format!(
                "internal key count {} exceeds capacity for order {}",
                num_keys, self.order
            )));
        }
        let mut keys = Vec::with_capacity(num_keys);
        let mut pos = NODE_PREFIX;
        for _ in 0..num_keys {
            keys.push(self.converter.bytes_to_key(&buf[pos..pos + key_length])?);
            pos += key_length;
        }
        cursor.set_position((self.internal_children_start() - 4) as u64);
        let num_children = cursor.read_u32::<LittleEndian>()? as usize;
        if num_children > self.order {
            return Err(StorageError::CorruptedData(format!(
                "internal child count {} exceeds order {}",
                num_children, self.order
            )));
        }
        let mut children = Vec::with_capacity(num_children);
        for _ in 0..num_children {
            children.push(cursor.read_i64::<LittleEndian>()?);
        }
        cursor.set_position(self.internal_links_start() as u64);
        let left = cursor.read_i64::<LittleEndian>()?;
        let right = cursor.read_i64::<LittleEndian>()?;
        Ok(InternalNode {
            keys,
            children,
            left,
            right,
        })
    }
}
