use crate::record::{RecordError, RowId, SchemaRef};
use crate::storage::{BufferPoolManagerRef, PageId, StorageError, PAGE_SIZE};
use itertools::Itertools;
use parking_lot::Mutex;
use thiserror::Error;

mod internal;
mod iterator;
mod key;
mod leaf;
mod roots;

pub use internal::InternalNode;
pub use iterator::IndexIterator;
pub use key::IndexKey;
pub use leaf::LeafNode;
pub use roots::IndexRootsPage;

pub type IndexId = u32;

pub(crate) mod layout {
    use std::ops::Range;

    pub const PAGE_TYPE: Range<usize> = 0..4;
    pub const SIZE: Range<usize> = 4..8;
    pub const MAX_SIZE: Range<usize> = 8..12;
    pub const KEY_SIZE: Range<usize> = 12..16;
    pub const PARENT_PAGE_ID: Range<usize> = 16..20;
    pub const PAGE_ID: Range<usize> = 20..24;
    pub const NEXT_PAGE_ID: Range<usize> = 24..28;

    pub const INTERNAL_HEADER_SIZE: usize = 24;
    pub const LEAF_HEADER_SIZE: usize = 28;

    pub const INTERNAL_PAGE_TYPE: u32 = 1;
    pub const LEAF_PAGE_TYPE: u32 = 2;

    pub const PAGE_ID_SIZE: usize = 4;
    pub const ROW_ID_SIZE: usize = 8;
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("page {0} is not a leaf node")]
    NotLeafPage(PageId),
    #[error("page {0} is not an internal node")]
    NotInternalPage(PageId),
    #[error("index key fields must not be NULL")]
    NullKeyField,
    #[error("index key does not match the key schema")]
    KeySchemaMismatch,
    #[error("index roots page is corrupted")]
    RootsPageCorrupted,
    #[error("index roots page is full")]
    RootsPageFull,
    #[error("tree structure is corrupted: {0}")]
    TreeCorrupted(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Ordered key to row-id map over buffer-pool pages. Unique keys only.
/// Structural changes must not be interleaved from multiple threads; reads
/// are serialized by the buffer pool's latch.
pub struct BPlusTree {
    index_id: IndexId,
    bpm: BufferPoolManagerRef,
    key_schema: SchemaRef,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: Mutex<Option<PageId>>,
}

impl BPlusTree {
    /// Attach to the tree for `index_id`, creating no pages; the current
    /// root is looked up in the index roots page. Node capacities derive
    /// from the key width unless overridden (tests use tiny fanouts).
    pub fn new(
        index_id: IndexId,
        bpm: BufferPoolManagerRef,
        key_schema: SchemaRef,
        leaf_max_size: Option<usize>,
        internal_max_size: Option<usize>,
    ) -> Result<Self, IndexError> {
        let key_size = key_schema.key_width();
        // one pair of slack in both defaults: nodes overflow to max + 1
        // entries before they split
        let leaf_max_size = leaf_max_size
            .unwrap_or(
                (PAGE_SIZE - layout::LEAF_HEADER_SIZE) / (key_size + layout::ROW_ID_SIZE) - 1,
            )
            .max(1);
        let internal_max_size = internal_max_size
            .unwrap_or(
                (PAGE_SIZE - layout::INTERNAL_HEADER_SIZE) / (key_size + layout::PAGE_ID_SIZE) - 1,
            )
            .max(2);
        let root_page_id = {
            let roots = IndexRootsPage::open(bpm.clone())?;
            roots.root_of(index_id)
        };
        Ok(Self {
            index_id,
            bpm,
            key_schema,
            key_size,
            leaf_max_size,
            internal_max_size,
            root_page_id: Mutex::new(root_page_id),
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn key_schema(&self) -> &SchemaRef {
        &self.key_schema
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.lock().is_none()
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        *self.root_page_id.lock()
    }

    fn set_root_page_id(&self, root: Option<PageId>) -> Result<(), IndexError> {
        *self.root_page_id.lock() = root;
        let roots = IndexRootsPage::open(self.bpm.clone())?;
        if !roots.set_root(self.index_id, root) {
            return Err(IndexError::RootsPageFull);
        }
        Ok(())
    }

    fn page_is_leaf(&self, page_id: PageId) -> Result<bool, IndexError> {
        let page = self.bpm.lock().fetch(page_id)?;
        let page_type =
            u32::from_le_bytes(page.read().buffer[layout::PAGE_TYPE].try_into().unwrap());
        self.bpm.lock().unpin(page_id, false)?;
        Ok(page_type == layout::LEAF_PAGE_TYPE)
    }

    /// Repoint a child page's parent header without caring about its kind;
    /// the field sits at the same offset in both node layouts.
    fn set_parent(&self, page_id: PageId, parent: Option<PageId>) -> Result<(), IndexError> {
        let page = self.bpm.lock().fetch(page_id)?;
        {
            let mut page = page.write();
            page.buffer[layout::PARENT_PAGE_ID]
                .copy_from_slice(&crate::storage::encode_page_id(parent));
            page.is_dirty = true;
        }
        self.bpm.lock().unpin(page_id, true)?;
        Ok(())
    }

    /// Descend to the leaf covering `key`, or the leftmost leaf when no key
    /// is given. `None` only for an empty tree.
    fn find_leaf(&self, key: Option<&IndexKey>) -> Result<Option<LeafNode>, IndexError> {
        let Some(mut page_id) = *self.root_page_id.lock() else {
            return Ok(None);
        };
        loop {
            if self.page_is_leaf(page_id)? {
                let leaf = LeafNode::open(self.bpm.clone(), self.key_schema.clone(), page_id)?;
                return Ok(Some(leaf));
            }
            let node = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), page_id)?;
            page_id = match key {
                Some(key) => node.lookup(key),
                None => node.value_at(0),
            };
        }
    }

    pub fn get_value(&self, key: &IndexKey) -> Result<Option<RowId>, IndexError> {
        match self.find_leaf(Some(key))? {
            None => Ok(None),
            Some(leaf) => Ok(leaf.lookup(key)),
        }
    }

    /// Insert a unique key. `Ok(false)` reports a duplicate.
    pub fn insert(&self, key: &IndexKey, row_id: RowId) -> Result<bool, IndexError> {
        if self.is_empty() {
            self.start_new_tree(key, row_id)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, row_id)
    }

    fn start_new_tree(&self, key: &IndexKey, row_id: RowId) -> Result<(), IndexError> {
        let leaf = LeafNode::new(
            self.bpm.clone(),
            self.key_schema.clone(),
            self.key_size,
            self.leaf_max_size,
            None,
        )?;
        self.set_root_page_id(Some(leaf.page_id()))?;
        leaf.insert(key, row_id);
        Ok(())
    }

    fn insert_into_leaf(&self, key: &IndexKey, row_id: RowId) -> Result<bool, IndexError> {
        let leaf = self
            .find_leaf(Some(key))?
            .ok_or(IndexError::TreeCorrupted("no leaf for key"))?;
        if !leaf.insert(key, row_id) {
            return Ok(false);
        }
        if leaf.size() > leaf.max_size() {
            let sibling = LeafNode::new(
                self.bpm.clone(),
                self.key_schema.clone(),
                self.key_size,
                self.leaf_max_size,
                leaf.parent_page_id(),
            )?;
            leaf.move_half_to(&sibling);
            sibling.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(Some(sibling.page_id()));
            let separator = sibling.key_at(0);
            self.insert_into_parent(
                leaf.page_id(),
                leaf.parent_page_id(),
                &separator,
                sibling.page_id(),
            )?;
        }
        Ok(true)
    }

    /// Record `new_page_id` as the right sibling of `old_page_id` under
    /// `key`, splitting ancestors as needed. Splitting the root grows the
    /// tree by one level.
    fn insert_into_parent(
        &self,
        old_page_id: PageId,
        parent: Option<PageId>,
        key: &IndexKey,
        new_page_id: PageId,
    ) -> Result<(), IndexError> {
        let Some(parent_id) = parent else {
            let new_root = InternalNode::new(
                self.bpm.clone(),
                self.key_schema.clone(),
                self.key_size,
                self.internal_max_size,
                None,
            )?;
            new_root.populate_new_root(old_page_id, key, new_page_id);
            self.set_root_page_id(Some(new_root.page_id()))?;
            self.set_parent(old_page_id, Some(new_root.page_id()))?;
            self.set_parent(new_page_id, Some(new_root.page_id()))?;
            return Ok(());
        };
        let node = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), parent_id)?;
        let size = node.insert_node_after(old_page_id, key, new_page_id);
        if size > node.max_size() {
            let sibling = InternalNode::new(
                self.bpm.clone(),
                self.key_schema.clone(),
                self.key_size,
                self.internal_max_size,
                node.parent_page_id(),
            )?;
            node.move_half_to(&sibling)?;
            let separator = sibling.key_at(0);
            self.insert_into_parent(
                node.page_id(),
                node.parent_page_id(),
                &separator,
                sibling.page_id(),
            )?;
        }
        Ok(())
    }

    /// Remove `key` if present, rebalancing underfull nodes by coalescing
    /// with or borrowing from a sibling.
    pub fn remove(&self, key: &IndexKey) -> Result<(), IndexError> {
        let Some(leaf) = self.find_leaf(Some(key))? else {
            return Ok(());
        };
        let Some(removed_idx) = leaf.remove(key) else {
            return Ok(());
        };
        let leaf_page_id = leaf.page_id();
        let is_root = *self.root_page_id.lock() == Some(leaf_page_id);
        if is_root {
            if leaf.size() == 0 {
                drop(leaf);
                self.set_root_page_id(None)?;
                self.bpm.lock().delete_page(leaf_page_id)?;
            }
            return Ok(());
        }
        if leaf.size() < leaf.min_size() {
            self.coalesce_or_redistribute_leaf(leaf)?;
        } else if removed_idx == 0 {
            // the smallest key changed; refresh the separator above
            let new_first = leaf.key_at(0);
            let parent = leaf.parent_page_id();
            drop(leaf);
            self.refresh_ancestor_separator(leaf_page_id, parent, &new_first)?;
        }
        Ok(())
    }

    /// Walk up while this subtree is its parent's first child, then rewrite
    /// the separator that covers it.
    fn refresh_ancestor_separator(
        &self,
        mut child_page_id: PageId,
        mut parent: Option<PageId>,
        new_key: &IndexKey,
    ) -> Result<(), IndexError> {
        while let Some(parent_id) = parent {
            let node = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), parent_id)?;
            match node.value_index(child_page_id) {
                Some(0) => {
                    child_page_id = parent_id;
                    parent = node.parent_page_id();
                }
                Some(idx) => {
                    if node.key_at(idx) != *new_key {
                        node.set_key_at(idx, new_key);
                    }
                    break;
                }
                None => return Err(IndexError::TreeCorrupted("child not under parent")),
            }
        }
        Ok(())
    }

    fn coalesce_or_redistribute_leaf(&self, node: LeafNode) -> Result<(), IndexError> {
        let parent_id = node
            .parent_page_id()
            .ok_or(IndexError::TreeCorrupted("underfull non-root without parent"))?;
        let parent = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), parent_id)?;
        let index = parent
            .value_index(node.page_id())
            .ok_or(IndexError::TreeCorrupted("child not under parent"))?;
        let neighbor_id = if index == 0 {
            parent.value_at(1)
        } else {
            parent.value_at(index - 1)
        };
        let neighbor = LeafNode::open(self.bpm.clone(), self.key_schema.clone(), neighbor_id)?;
        if neighbor.size() + node.size() <= neighbor.max_size() {
            // merge into the left page of the pair and drop the right one
            let (left, right, separator_idx) = if index == 0 {
                (node, neighbor, 1)
            } else {
                (neighbor, node, index)
            };
            right.move_all_to(&left);
            let right_page_id = right.page_id();
            drop(right);
            drop(left);
            parent.remove(separator_idx);
            self.bpm.lock().delete_page(right_page_id)?;
            self.rebalance_after_remove(parent, parent_id)?;
        } else if index == 0 {
            neighbor.move_first_to_end_of(&node);
            parent.set_key_at(1, &neighbor.key_at(0));
        } else {
            neighbor.move_last_to_front_of(&node);
            parent.set_key_at(index, &node.key_at(0));
        }
        Ok(())
    }

    fn coalesce_or_redistribute_internal(&self, node: InternalNode) -> Result<(), IndexError> {
        let parent_id = node
            .parent_page_id()
            .ok_or(IndexError::TreeCorrupted("underfull non-root without parent"))?;
        let parent = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), parent_id)?;
        let index = parent
            .value_index(node.page_id())
            .ok_or(IndexError::TreeCorrupted("child not under parent"))?;
        let neighbor_id = if index == 0 {
            parent.value_at(1)
        } else {
            parent.value_at(index - 1)
        };
        let neighbor = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), neighbor_id)?;
        if neighbor.size() + node.size() <= neighbor.max_size() {
            let (left, right, separator_idx) = if index == 0 {
                (node, neighbor, 1)
            } else {
                (neighbor, node, index)
            };
            let middle_key = parent.key_at(separator_idx);
            right.move_all_to(&left, &middle_key)?;
            let right_page_id = right.page_id();
            drop(right);
            drop(left);
            parent.remove(separator_idx);
            self.bpm.lock().delete_page(right_page_id)?;
            self.rebalance_after_remove(parent, parent_id)?;
        } else if index == 0 {
            let middle_key = parent.key_at(1);
            let new_separator = neighbor.key_at(1);
            neighbor.move_first_to_end_of(&node, &middle_key)?;
            parent.set_key_at(1, &new_separator);
        } else {
            let middle_key = parent.key_at(index);
            let new_separator = neighbor.key_at(neighbor.size() - 1);
            neighbor.move_last_to_front_of(&node, &middle_key)?;
            parent.set_key_at(index, &new_separator);
        }
        Ok(())
    }

    /// After a merge removed a child from `parent`, rebalance or shrink the
    /// tree height when the parent in turn became too small.
    fn rebalance_after_remove(
        &self,
        parent: InternalNode,
        parent_id: PageId,
    ) -> Result<(), IndexError> {
        let parent_is_root = *self.root_page_id.lock() == Some(parent_id);
        if parent_is_root {
            if parent.size() == 1 {
                self.adjust_root(parent)?;
            }
        } else if parent.size() < parent.min_size() {
            self.coalesce_or_redistribute_internal(parent)?;
        }
        Ok(())
    }

    /// The root lost all separators: promote its only child as the new root.
    fn adjust_root(&self, old_root: InternalNode) -> Result<(), IndexError> {
        let child = old_root.remove_and_return_only_child();
        let old_root_id = old_root.page_id();
        drop(old_root);
        self.set_root_page_id(Some(child))?;
        self.set_parent(child, None)?;
        self.bpm.lock().delete_page(old_root_id)?;
        Ok(())
    }

    /// Iterator over the whole tree in key order.
    pub fn iter(&self) -> Result<IndexIterator, IndexError> {
        let Some(leaf) = self.find_leaf(None)? else {
            return Ok(IndexIterator::new(
                self.bpm.clone(),
                self.key_schema.clone(),
                None,
            ));
        };
        let current = if leaf.size() > 0 {
            Some((leaf.page_id(), 0))
        } else {
            None
        };
        Ok(IndexIterator::new(
            self.bpm.clone(),
            self.key_schema.clone(),
            current,
        ))
    }

    /// Iterator starting at the first entry with key >= `key`.
    pub fn iter_from(&self, key: &IndexKey) -> Result<IndexIterator, IndexError> {
        let Some(leaf) = self.find_leaf(Some(key))? else {
            return Ok(IndexIterator::new(
                self.bpm.clone(),
                self.key_schema.clone(),
                None,
            ));
        };
        let idx = leaf.key_index(key);
        let current = if idx < leaf.size() {
            Some((leaf.page_id(), idx))
        } else {
            leaf.next_page_id().map(|next| (next, 0))
        };
        Ok(IndexIterator::new(
            self.bpm.clone(),
            self.key_schema.clone(),
            current,
        ))
    }

    /// Delete every page of the tree and drop its roots-page entry; used
    /// when the owning index is dropped.
    pub fn destroy(&self) -> Result<(), IndexError> {
        let root = self.root_page_id.lock().take();
        if let Some(root) = root {
            self.destroy_subtree(root)?;
        }
        let roots = IndexRootsPage::open(self.bpm.clone())?;
        roots.remove(self.index_id);
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<(), IndexError> {
        if !self.page_is_leaf(page_id)? {
            let node = InternalNode::open(self.bpm.clone(), self.key_schema.clone(), page_id)?;
            let children = (0..node.size()).map(|idx| node.value_at(idx)).collect_vec();
            drop(node);
            for child in children {
                self.destroy_subtree(child)?;
            }
        }
        self.bpm.lock().delete_page(page_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, DataType, Field, Schema};
    use crate::storage::BufferPoolManager;
    use std::fs::remove_file;
    use std::sync::Arc;

    fn int_key_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Column::new(
            "v1",
            DataType::Int,
            0,
            false,
            true,
        )]))
    }

    fn int_key(schema: &SchemaRef, value: i32) -> IndexKey {
        IndexKey::new(vec![Field::Int(Some(value))], schema.clone()).unwrap()
    }

    fn bootstrapped_bpm(pool_size: usize) -> (BufferPoolManagerRef, String) {
        let bpm = BufferPoolManager::new_random_shared(pool_size).unwrap();
        let filename = bpm.lock().filename();
        for _ in 0..2 {
            let page = bpm.lock().new_page().unwrap();
            let page_id = page.read().page_id.unwrap();
            bpm.lock().unpin(page_id, true).unwrap();
        }
        IndexRootsPage::init(bpm.clone()).unwrap();
        (bpm, filename)
    }

    fn check_leaf_chain(tree: &BPlusTree, expected: &[i32]) {
        let entries = tree.iter().unwrap().collect::<Vec<_>>();
        let keys = entries
            .iter()
            .map(|(key, _)| match key.fields()[0] {
                Field::Int(Some(value)) => value,
                _ => unreachable!(),
            })
            .collect::<Vec<_>>();
        assert_eq!(keys, expected);
    }

    #[test]
    fn insert_get_small_fanout() {
        let (bpm, filename) = bootstrapped_bpm(64);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(7, bpm, schema.clone(), Some(4), Some(4)).unwrap();
            for value in 1..=100 {
                let key = int_key(&schema, value);
                assert!(tree.insert(&key, RowId::new(0, value as u32)).unwrap());
            }
            // duplicates are refused
            assert!(!tree.insert(&int_key(&schema, 50), RowId::new(0, 1)).unwrap());
            for value in 1..=100 {
                let key = int_key(&schema, value);
                assert_eq!(
                    tree.get_value(&key).unwrap(),
                    Some(RowId::new(0, value as u32))
                );
            }
            assert_eq!(tree.get_value(&int_key(&schema, 101)).unwrap(), None);
            check_leaf_chain(&tree, &(1..=100).collect::<Vec<_>>());
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn remove_half_keeps_order_and_min_sizes() {
        let (bpm, filename) = bootstrapped_bpm(64);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(7, bpm.clone(), schema.clone(), Some(4), Some(4)).unwrap();
            for value in 1..=100 {
                tree.insert(&int_key(&schema, value), RowId::new(0, value as u32))
                    .unwrap();
            }
            for value in 1..=50 {
                tree.remove(&int_key(&schema, value)).unwrap();
            }
            for value in 1..=50 {
                assert_eq!(tree.get_value(&int_key(&schema, value)).unwrap(), None);
            }
            check_leaf_chain(&tree, &(51..=100).collect::<Vec<_>>());
            // every leaf respects the minimum except possibly the root
            let root = tree.root_page_id().unwrap();
            let mut page_id = tree.find_leaf(None).unwrap().map(|leaf| leaf.page_id());
            while let Some(current) = page_id {
                let node = LeafNode::open(bpm.clone(), schema.clone(), current).unwrap();
                if current != root {
                    assert!(node.size() >= node.min_size());
                }
                page_id = node.next_page_id();
            }
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn remove_everything_empties_the_tree() {
        let (bpm, filename) = bootstrapped_bpm(64);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(2, bpm, schema.clone(), Some(4), Some(4)).unwrap();
            for value in 1..=32 {
                tree.insert(&int_key(&schema, value), RowId::new(0, value as u32))
                    .unwrap();
            }
            // removing an absent key is a no-op
            tree.remove(&int_key(&schema, 1000)).unwrap();
            for value in (1..=32).rev() {
                tree.remove(&int_key(&schema, value)).unwrap();
            }
            assert!(tree.is_empty());
            assert_eq!(tree.iter().unwrap().count(), 0);
            // the tree is usable again after draining
            tree.insert(&int_key(&schema, 5), RowId::new(0, 5)).unwrap();
            assert_eq!(tree.get_value(&int_key(&schema, 5)).unwrap(), Some(RowId::new(0, 5)));
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn range_scan_from_key() {
        let (bpm, filename) = bootstrapped_bpm(64);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(3, bpm, schema.clone(), Some(4), Some(4)).unwrap();
            for value in (2..=40).step_by(2) {
                tree.insert(&int_key(&schema, value), RowId::new(0, value as u32))
                    .unwrap();
            }
            // 15 is absent, the scan starts at the next key
            let keys = tree
                .iter_from(&int_key(&schema, 15))
                .unwrap()
                .map(|(key, _)| match key.fields()[0] {
                    Field::Int(Some(value)) => value,
                    _ => unreachable!(),
                })
                .collect::<Vec<_>>();
            assert_eq!(keys, (16..=40).step_by(2).collect::<Vec<_>>());
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn destroy_frees_pages() {
        let (bpm, filename) = bootstrapped_bpm(64);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(9, bpm.clone(), schema.clone(), Some(4), Some(4)).unwrap();
            for value in 1..=64 {
                tree.insert(&int_key(&schema, value), RowId::new(0, value as u32))
                    .unwrap();
            }
            let allocated_before = bpm.lock().num_allocated_pages();
            assert!(allocated_before > 2);
            tree.destroy().unwrap();
            assert_eq!(bpm.lock().num_allocated_pages(), 2);
            let roots = IndexRootsPage::open(bpm.clone()).unwrap();
            assert_eq!(roots.count(), 0);
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn random_insert_remove_chaos() {
        use rand::Rng;
        let (bpm, filename) = bootstrapped_bpm(128);
        {
            let schema = int_key_schema();
            let tree = BPlusTree::new(1, bpm, schema.clone(), Some(5), Some(5)).unwrap();
            let mut alive = std::collections::BTreeSet::new();
            let mut rng = rand::thread_rng();
            for _ in 0..2000 {
                let value = rng.gen_range(0..300);
                if alive.contains(&value) {
                    tree.remove(&int_key(&schema, value)).unwrap();
                    alive.remove(&value);
                } else {
                    assert!(tree
                        .insert(&int_key(&schema, value), RowId::new(0, value as u32))
                        .unwrap());
                    alive.insert(value);
                }
            }
            let expected = alive.iter().copied().collect::<Vec<_>>();
            check_leaf_chain(&tree, &expected);
            for value in 0..300 {
                let found = tree.get_value(&int_key(&schema, value)).unwrap();
                assert_eq!(found.is_some(), alive.contains(&value));
            }
        }
        remove_file(filename).unwrap();
    }
}
