use std::mem;
use std::path::Path;

use log::{debug, info};
use shared_types::{StorageError, constant::NO_SIBLING};

use crate::{
    codec::Converter,
    node::{InternalNode, LeafNode, Node},
    node_file::TreeFile,
    remote::RemoteStore,
    search::separator_index,
};

/// Outcome of one recursive insert step. A `Split` carries the separator to
/// promote and the offsets of the two halves; `left_offset` differs from the
/// split node's old slot only when the root itself split, because both root
/// halves are appended as new nodes.
enum InsertResult<K> {
    Done,
    Split {
        sep: K,
        left_offset: i64,
        right_offset: i64,
    },
}

/// A B+ tree stored in a node file. The current root is kept in memory and
/// persisted to its slot after every mutation; every other node is read and
/// written per operation, with no cache in between.
///
/// Insert is an upsert: re-inserting an existing key replaces its record in
/// place and never creates a duplicate.
pub struct BPlusTree<K, V, C> {
    order: usize,
    file: TreeFile<K, V, C>,
    root: Node<K, V>,
    root_offset: i64,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Ord + Clone,
    V: Clone,
    C: Converter<K, V>,
{
    /// Opens the tree at `path`, creating it with an empty leaf root when the
    /// node file does not exist yet. An existing file must have been built
    /// with the same order and codec widths.
    pub fn open<P: AsRef<Path>>(path: P, order: usize, converter: C) -> Result<Self, StorageError> {
        let mut file = TreeFile::open(path, order, converter)?;
        let (recorded_offset, recorded_is_leaf) = file.read_root_slot()?;
        let (root, root_offset) = if recorded_offset == NO_SIBLING {
            let root = Node::Leaf(LeafNode::new());
            let offset = file.append(&root)?;
            file.write_root_slot(offset, true)?;
            (root, offset)
        } else {
            let root = file.read_node(recorded_offset)?;
            if root.is_leaf() != recorded_is_leaf {
                return Err(StorageError::CorruptedData(
                    "root slot kind does not match the node it points at".to_string(),
                ));
            }
            (root, recorded_offset)
        };
        Ok(Self {
            order,
            file,
            root,
            root_offset,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.root.num_keys() == 0 && self.root.is_leaf()
    }

    pub fn is_synced(&self) -> bool {
        self.file.is_sealed()
    }

    pub fn root(&self) -> &Node<K, V> {
        &self.root
    }

    pub fn root_offset(&self) -> i64 {
        self.root_offset
    }

    /// Reads the node stored at `offset`.
    pub fn read_node(&mut self, offset: i64) -> Result<Node<K, V>, StorageError> {
        self.file.read_node(offset)
    }

    /// Finds the record stored for `key`, descending one node per level.
    pub fn search(&mut self, key: &K) -> Result<Option<V>, StorageError> {
        let leaf = self.find_leaf(key)?;
        Ok(leaf.get(key).cloned())
    }

    /// Collects the records for all keys in `[lo, hi]` inclusive, in
    /// ascending key order, by walking the leaf chain from the leaf that
    /// would hold `lo`.
    pub fn range(&mut self, lo: &K, hi: &K) -> Result<Vec<V>, StorageError> {
        let mut results = Vec::new();
        let mut leaf = self.find_leaf(lo)?;
        loop {
            for (key, value) in leaf.keys.iter().zip(&leaf.values) {
                if key < lo {
                    // Only possible in the first visited leaf.
                    continue;
                }
                if key > hi {
                    return Ok(results);
                }
                results.push(value.clone());
            }
            if leaf.right == NO_SIBLING {
                return Ok(results);
            }
            leaf = self.read_leaf(leaf.right)?;
        }
    }

    /// Inserts the pair, splitting nodes bottom-up as needed. An existing key
    /// has its record replaced in place.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), StorageError> {
        self.file.ensure_writable()?;
        self.file.check_encodes(&key, &value)?;
        let mut root = mem::replace(&mut self.root, Node::Leaf(LeafNode::new()));
        match self.insert_into(&mut root, self.root_offset, true, key, value) {
            Ok(InsertResult::Done) => {
                self.root = root;
            }
            Ok(InsertResult::Split {
                sep,
                left_offset,
                right_offset,
            }) => {
                debug!("root split; children at {left_offset} and {right_offset}");
                self.root = Node::Internal(InternalNode {
                    keys: vec![sep],
                    children: vec![left_offset, right_offset],
                    left: NO_SIBLING,
                    right: NO_SIBLING,
                });
                self.root_offset = self.file.append(&self.root)?;
            }
            Err(err) => {
                self.root = root;
                return Err(err);
            }
        }
        self.persist_root()
    }

    /// Removes the key, rebalancing bottom-up as needed. Absent keys are a
    /// silent success.
    pub fn remove(&mut self, key: &K) -> Result<(), StorageError> {
        self.file.ensure_writable()?;
        let mut root = mem::replace(&mut self.root, Node::Leaf(LeafNode::new()));
        let removed = match &mut root {
            // A single-node tree deletes in place, with nothing to rebalance.
            Node::Leaf(leaf) => {
                leaf.remove(key);
                Ok(())
            }
            Node::Internal(internal) => {
                let offset = self.root_offset;
                self.remove_level(internal, offset, true, key)
            }
        };
        if let Err(err) = removed {
            self.root = root;
            return Err(err);
        }
        if let Node::Internal(internal) = &root {
            if internal.keys.is_empty() {
                // The root lost its last separator; its sole remaining child
                // becomes the new root. This is the only height-shrinking path.
                let child_offset = internal.children[0];
                debug!("collapsing root into child at {child_offset}");
                match self.file.read_node(child_offset) {
                    Ok(child) => {
                        root = child;
                        self.root_offset = child_offset;
                    }
                    Err(err) => {
                        self.root = root;
                        return Err(err);
                    }
                }
            }
        }
        self.root = root;
        self.persist_root()
    }

    /// Commits the finished local file to the remote store and seals this
    /// tree read-only. Syncing an already-sealed tree is a no-op success.
    pub fn sync(&mut self, remote: Box<dyn RemoteStore>) -> Result<(), StorageError> {
        if self.file.is_sealed() {
            return Ok(());
        }
        self.persist_root()?;
        info!("syncing node file to remote storage");
        self.file.seal(remote)
    }

    fn persist_root(&mut self) -> Result<(), StorageError> {
        self.file.write_node(&self.root, self.root_offset)?;
        self.file
            .write_root_slot(self.root_offset, self.root.is_leaf())
    }

    fn find_leaf(&mut self, key: &K) -> Result<LeafNode<K, V>, StorageError> {
        let mut node = self.root.clone();
        loop {
            match node {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(internal) => {
                    let child_offset = internal.children[internal.child_index(key)];
                    node = self.file.read_node(child_offset)?;
                }
            }
        }
    }

    fn read_leaf(&mut self, offset: i64) -> Result<LeafNode<K, V>, StorageError> {
        match self.file.read_node(offset)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(StorageError::CorruptedData(format!(
                "expected a leaf node at offset {}",
                offset
            ))),
        }
    }

    fn read_internal(&mut self, offset: i64) -> Result<InternalNode<K>, StorageError> {
        match self.file.read_node(offset)? {
            Node::Internal(internal) => Ok(internal),
            Node::Leaf(_) => Err(StorageError::CorruptedData(format!(
                "expected an internal node at offset {}",
                offset
            ))),
        }
    }

    fn insert_into(
        &mut self,
        node: &mut Node<K, V>,
        offset: i64,
        is_root: bool,
        key: K,
        value: V,
    ) -> Result<InsertResult<K>, StorageError> {
        match node {
            Node::Leaf(leaf) => self.insert_into_leaf(leaf, offset, is_root, key, value),
            Node::Internal(internal) => {
                self.insert_into_internal(internal, offset, is_root, key, value)
            }
        }
    }

    fn insert_into_leaf(
        &mut self,
        leaf: &mut LeafNode<K, V>,
        offset: i64,
        is_root: bool,
        key: K,
        value: V,
    ) -> Result<InsertResult<K>, StorageError> {
        // Upsert: an existing key is replaced in place, full leaf or not.
        if let Some(pos) = leaf.find(&key) {
            leaf.values[pos] = value;
            if !is_root {
                self.file.write_leaf(leaf, offset)?;
            }
            return Ok(InsertResult::Done);
        }
        if !leaf.is_full(self.order) {
            leaf.insert(self.order, key, value);
            // The live root is persisted once at the end of the insert call.
            if !is_root {
                self.file.write_leaf(leaf, offset)?;
            }
            return Ok(InsertResult::Done);
        }
        self.split_leaf(leaf, offset, is_root, key, value)
    }

    /// Splits a full leaf around `mid = order / 2` after merging the new pair
    /// in. The median key is promoted and also retained as the first entry of
    /// the right leaf.
    fn split_leaf(
        &mut self,
        leaf: &mut LeafNode<K, V>,
        offset: i64,
        is_root: bool,
        key: K,
        value: V,
    ) -> Result<InsertResult<K>, StorageError> {
        let pos = (separator_index(&leaf.keys, &key) + 1) as usize;
        leaf.keys.insert(pos, key);
        leaf.values.insert(pos, value);
        let mid = self.order / 2;

        // The split node keeps its slot, except when it is the root: then
        // both halves are appended, and the left half's future offset must be
        // computed up front because the right half links back to it.
        let right_offset = self.file.next_offset()?;
        let left_offset = if is_root {
            right_offset + self.file.node_size() as i64
        } else {
            offset
        };

        let right = LeafNode {
            keys: leaf.keys.split_off(mid),
            values: leaf.values.split_off(mid),
            left: left_offset,
            right: leaf.right,
        };
        let sep = right.keys[0].clone();
        let appended = self.file.append_leaf(&right)?;
        debug_assert_eq!(appended, right_offset);
        debug!("leaf split at {offset}; new right leaf at {right_offset}");

        if leaf.right != NO_SIBLING {
            self.relink_left(leaf.right, right_offset)?;
        }
        leaf.right = right_offset;
        if is_root {
            let appended_left = self.file.append_leaf(leaf)?;
            debug_assert_eq!(appended_left, left_offset);
        } else {
            self.file.write_leaf(leaf, offset)?;
        }
        Ok(InsertResult::Split {
            sep,
            left_offset,
            right_offset,
        })
    }

    fn insert_into_internal(
        &mut self,
        internal: &mut InternalNode<K>,
        offset: i64,
        is_root: bool,
        key: K,
        value: V,
    ) -> Result<InsertResult<K>, StorageError> {
        let child_offset = internal.children[internal.child_index(&key)];
        let mut child = self.file.read_node(child_offset)?;
        match self.insert_into(&mut child, child_offset, false, key, value)? {
            InsertResult::Done => Ok(InsertResult::Done),
            InsertResult::Split {
                sep, right_offset, ..
            } => {
                if !internal.is_full(self.order) {
                    internal.insert_separator(self.order, sep, right_offset);
                    if !is_root {
                        self.file.write_internal(internal, offset)?;
                    }
                    return Ok(InsertResult::Done);
                }
                self.split_internal(internal, offset, is_root, sep, right_offset)
            }
        }
    }

    /// Splits a full internal node around `mid = order / 2` after merging the
    /// promoted separator in. Unlike a leaf split, the median key leaves the
    /// node entirely: it becomes a pure separator one level up.
    fn split_internal(
        &mut self,
        internal: &mut InternalNode<K>,
        offset: i64,
        is_root: bool,
        key: K,
        right_child: i64,
    ) -> Result<InsertResult<K>, StorageError> {
        let pos = (separator_index(&internal.keys, &key) + 1) as usize;
        internal.keys.insert(pos, key);
        internal.children.insert(pos + 1, right_child);
        let mid = self.order / 2;

        let right_offset = self.file.next_offset()?;
        let left_offset = if is_root {
            right_offset + self.file.node_size() as i64
        } else {
            offset
        };

        let sep = internal.keys[mid].clone();
        let right = InternalNode {
            keys: internal.keys.split_off(mid + 1),
            children: internal.children.split_off(mid + 1),
            left: left_offset,
            right: internal.right,
        };
        internal.keys.truncate(mid);

        let appended = self.file.append_internal(&right)?;
        debug_assert_eq!(appended, right_offset);
        debug!("internal split at {offset}; new right node at {right_offset}");

        if internal.right != NO_SIBLING {
            self.relink_left(internal.right, right_offset)?;
        }
        internal.right = right_offset;
        if is_root {
            let appended_left = self.file.append_internal(internal)?;
            debug_assert_eq!(appended_left, left_offset);
        } else {
            self.file.write_internal(internal, offset)?;
        }
        Ok(InsertResult::Split {
            sep,
            left_offset,
            right_offset,
        })
    }

    /// One level of the recursive delete: `parent` is the internal node above
    /// the child that owns `key`. After the child has been handled, an
    /// underflowing child is rebalanced against its in-parent siblings, and
    /// the parent itself is written back unless it is the live root.
    fn remove_level(
        &mut self,
        parent: &mut InternalNode<K>,
        offset: i64,
        is_root: bool,
        key: &K,
    ) -> Result<(), StorageError> {
        let child_index = parent.child_index(key);
        let child_offset = parent.children[child_index];
        match self.file.read_node(child_offset)? {
            Node::Internal(mut child) => {
                self.remove_level(&mut child, child_offset, false, key)?;
                if child.underflow(self.order) {
                    self.rebalance_internal(parent, &mut child, child_offset, child_index)?;
                }
            }
            Node::Leaf(mut leaf) => {
                leaf.remove(key);
                if leaf.underflow(self.order) {
                    self.rebalance_leaf(parent, &mut leaf, child_offset, child_index)?;
                } else {
                    self.file.write_leaf(&leaf, child_offset)?;
                }
            }
        }
        if !is_root {
            self.file.write_internal(parent, offset)?;
        }
        Ok(())
    }

    /// Resolves a leaf underflow as exactly one of borrow-left, borrow-right,
    /// merge-left or merge-right. Only siblings that are children of the same
    /// parent are eligible; cross-parent rebalancing is unsupported.
    fn rebalance_leaf(
        &mut self,
        parent: &mut InternalNode<K>,
        leaf: &mut LeafNode<K, V>,
        offset: i64,
        child_index: usize,
    ) -> Result<(), StorageError> {
        let left_offset = leaf.left;
        let right_offset = leaf.right;
        let left = if left_offset != NO_SIBLING && parent.children.contains(&left_offset) {
            Some(self.read_leaf(left_offset)?)
        } else {
            None
        };
        let right = if right_offset != NO_SIBLING && parent.children.contains(&right_offset) {
            Some(self.read_leaf(right_offset)?)
        } else {
            None
        };

        match (left, right) {
            (Some(mut donor), _) if donor.can_lend(self.order) => {
                let Some((key, value)) = donor.pop_last() else {
                    return Err(StorageError::InvariantViolation(
                        "lending leaf sibling has no entries".to_string(),
                    ));
                };
                debug!("leaf at {offset} borrows from left sibling {left_offset}");
                parent.keys[child_index - 1] = key.clone();
                leaf.push_first(key, value);
                self.file.write_leaf(&donor, left_offset)?;
                self.file.write_leaf(leaf, offset)?;
                Ok(())
            }
            (_, Some(mut donor)) if donor.can_lend(self.order) => {
                let Some((key, value)) = donor.pop_first() else {
                    return Err(StorageError::InvariantViolation(
                        "lending leaf sibling has no entries".to_string(),
                    ));
                };
                let Some(new_first) = donor.keys.first() else {
                    return Err(StorageError::InvariantViolation(
                        "lending leaf sibling gave away its last entry".to_string(),
                    ));
                };
                debug!("leaf at {offset} borrows from right sibling {right_offset}");
                parent.keys[child_index] = new_first.clone();
                leaf.push_last(key, value);
                self.file.write_leaf(&donor, right_offset)?;
                self.file.write_leaf(leaf, offset)?;
                Ok(())
            }
            (Some(mut donor), _) => {
                debug!("leaf at {offset} merges into left sibling {left_offset}");
                donor.keys.append(&mut leaf.keys);
                donor.values.append(&mut leaf.values);
                donor.right = right_offset;
                if right_offset != NO_SIBLING {
                    self.relink_left(right_offset, left_offset)?;
                }
                self.file.write_leaf(&donor, left_offset)?;
                parent.remove_separator(child_index - 1, child_index);
                Ok(())
            }
            (_, Some(mut donor)) => {
                debug!("leaf at {offset} merges into right sibling {right_offset}");
                let mut keys = mem::take(&mut leaf.keys);
                keys.append(&mut donor.keys);
                donor.keys = keys;
                let mut values = mem::take(&mut leaf.values);
                values.append(&mut donor.values);
                donor.values = values;
                donor.left = left_offset;
                if left_offset != NO_SIBLING {
                    self.relink_right(left_offset, right_offset)?;
                }
                self.file.write_leaf(&donor, right_offset)?;
                parent.remove_separator(child_index, child_index);
                Ok(())
            }
            (None, None) => Err(StorageError::InvariantViolation(
                "underflowing leaf has no sibling to borrow from or merge with".to_string(),
            )),
        }
    }

    /// Resolves an internal-node underflow after a child merge. Same policy
    /// as the leaf level, but whole (key, child-offset) pairs move, and a
    /// borrow rotates through the parent: the separator comes down into the
    /// underflowing node while the donor's boundary key goes up to replace it.
    fn rebalance_internal(
        &mut self,
        parent: &mut InternalNode<K>,
        child: &mut InternalNode<K>,
        offset: i64,
        child_index: usize,
    ) -> Result<(), StorageError> {
        let left_offset = child.left;
        let right_offset = child.right;
        let left = if left_offset != NO_SIBLING && parent.children.contains(&left_offset) {
            Some(self.read_internal(left_offset)?)
        } else {
            None
        };
        let right = if right_offset != NO_SIBLING && parent.children.contains(&right_offset) {
            Some(self.read_internal(right_offset)?)
        } else {
            None
        };

        match (left, right) {
            (Some(mut donor), _) if donor.can_lend(self.order) => {
                let (Some(up), Some(moved_child)) = (donor.keys.pop(), donor.children.pop()) else {
                    return Err(StorageError::InvariantViolation(
                        "lending internal sibling has no entries".to_string(),
                    ));
                };
                debug!("internal node at {offset} borrows from left sibling {left_offset}");
                child.keys.insert(0, parent.keys[child_index - 1].clone());
                child.children.insert(0, moved_child);
                parent.keys[child_index - 1] = up;
                self.file.write_internal(&donor, left_offset)?;
                self.file.write_internal(child, offset)?;
                Ok(())
            }
            (_, Some(mut donor)) if donor.can_lend(self.order) => {
                debug!("internal node at {offset} borrows from right sibling {right_offset}");
                let up = donor.keys.remove(0);
                let moved_child = donor.children.remove(0);
                child.keys.push(parent.keys[child_index].clone());
                child.children.push(moved_child);
                parent.keys[child_index] = up;
                self.file.write_internal(&donor, right_offset)?;
                self.file.write_internal(child, offset)?;
                Ok(())
            }
            (Some(mut donor), _) => {
                debug!("internal node at {offset} merges into left sibling {left_offset}");
                donor.keys.push(parent.keys[child_index - 1].clone());
                donor.keys.append(&mut child.keys);
                donor.children.append(&mut child.children);
                donor.right = right_offset;
                if right_offset != NO_SIBLING {
                    self.relink_left(right_offset, left_offset)?;
                }
                self.file.write_internal(&donor, left_offset)?;
                parent.remove_separator(child_index - 1, child_index);
                Ok(())
            }
            (_, Some(mut donor)) => {
                debug!("internal node at {offset} merges into right sibling {right_offset}");
                let mut keys = mem::take(&mut child.keys);
                keys.push(parent.keys[child_index].clone());
                keys.append(&mut donor.keys);
                donor.keys = keys;
                let mut children = mem::take(&mut child.children);
                children.append(&mut donor.children);
                donor.children = children;
                donor.left = left_offset;
                if left_offset != NO_SIBLING {
                    self.relink_right(left_offset, right_offset)?;
                }
                self.file.write_internal(&donor, right_offset)?;
                parent.remove_separator(child_index, child_index);
                Ok(())
            }
            (None, None) => Err(StorageError::InvariantViolation(
                "underflowing internal node has no sibling to borrow from or merge with"
                    .to_string(),
            )),
        }
    }

    /// Rewrites the left-sibling pointer of the node stored at `offset`.
    fn relink_left(&mut self, offset: i64, new_left: i64) -> Result<(), StorageError> {
        let mut node = self.file.read_node(offset)?;
        node.set_left(new_left);
        self.file.write_node(&node, offset)
    }

    /// Rewrites the right-sibling pointer of the node stored at `offset`.
    fn relink_right(&mut self, offset: i64, new_right: i64) -> Result<(), StorageError> {
        let mut node = self.file.read_node(offset)?;
        node.set_right(new_right);
        self.file.write_node(&node, offset)
    }
}
