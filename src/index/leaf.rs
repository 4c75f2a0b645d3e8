use crate::index::{layout, IndexError, IndexKey};
use crate::record::{RowId, SchemaRef};
use crate::storage::{decode_page_id, encode_page_id, BufferPoolManagerRef, PageId, PageRef};

///
/// LeafNode Format:
///
/// ```text
///     | Meta | key[0] | rid[0] | key[1] | rid[1] | ... |
/// ```
///
/// Meta Format:
///
/// ```text
///     | page_type | size | max_size | key_size | parent_page_id | page_id | next_page_id |
/// ```
///
/// Keys are fixed width, so pair `idx` lives at a computed offset. Leaves of
/// one tree form a singly linked list in key order through `next_page_id`.
///
pub struct LeafNode {
    page: PageRef,
    bpm: BufferPoolManagerRef,
    key_schema: SchemaRef,
    key_size: usize,
}

impl Drop for LeafNode {
    fn drop(&mut self) {
        let page_id = self.page.read().page_id.unwrap();
        let _ = self.bpm.lock().unpin(page_id, false);
    }
}

impl LeafNode {
    /// Allocate and initialize a fresh leaf, returned pinned.
    pub fn new(
        bpm: BufferPoolManagerRef,
        key_schema: SchemaRef,
        key_size: usize,
        max_size: usize,
        parent_page_id: Option<PageId>,
    ) -> Result<Self, IndexError> {
        let page = bpm.lock().new_page()?;
        let page_id = page.read().page_id.unwrap();
        {
            let mut page = page.write();
            page.buffer[layout::PAGE_TYPE].copy_from_slice(&layout::LEAF_PAGE_TYPE.to_le_bytes());
            page.buffer[layout::SIZE].copy_from_slice(&0u32.to_le_bytes());
            page.buffer[layout::MAX_SIZE].copy_from_slice(&(max_size as u32).to_le_bytes());
            page.buffer[layout::KEY_SIZE].copy_from_slice(&(key_size as u32).to_le_bytes());
            page.buffer[layout::PARENT_PAGE_ID].copy_from_slice(&encode_page_id(parent_page_id));
            page.buffer[layout::PAGE_ID].copy_from_slice(&page_id.to_le_bytes());
            page.buffer[layout::NEXT_PAGE_ID].copy_from_slice(&encode_page_id(None));
            page.is_dirty = true;
        }
        Ok(Self {
            page,
            bpm,
            key_schema,
            key_size,
        })
    }

    pub fn open(
        bpm: BufferPoolManagerRef,
        key_schema: SchemaRef,
        page_id: PageId,
    ) -> Result<Self, IndexError> {
        let page = bpm.lock().fetch(page_id)?;
        let page_type =
            u32::from_le_bytes(page.read().buffer[layout::PAGE_TYPE].try_into().unwrap());
        if page_type != layout::LEAF_PAGE_TYPE {
            let _ = bpm.lock().unpin(page_id, false);
            return Err(IndexError::NotLeafPage(page_id));
        }
        let key_size =
            u32::from_le_bytes(page.read().buffer[layout::KEY_SIZE].try_into().unwrap()) as usize;
        Ok(Self {
            page,
            bpm,
            key_schema,
            key_size,
        })
    }

    pub fn page_id(&self) -> PageId {
        u32::from_le_bytes(self.page.read().buffer[layout::PAGE_ID].try_into().unwrap())
    }

    pub fn size(&self) -> usize {
        u32::from_le_bytes(self.page.read().buffer[layout::SIZE].try_into().unwrap()) as usize
    }

    fn set_size(&self, size: usize) {
        let mut page = self.page.write();
        page.buffer[layout::SIZE].copy_from_slice(&(size as u32).to_le_bytes());
        page.is_dirty = true;
    }

    pub fn max_size(&self) -> usize {
        u32::from_le_bytes(self.page.read().buffer[layout::MAX_SIZE].try_into().unwrap()) as usize
    }

    pub fn min_size(&self) -> usize {
        (self.max_size() + 1) / 2
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        decode_page_id(&self.page.read().buffer[layout::PARENT_PAGE_ID])
    }

    pub fn set_parent_page_id(&self, page_id: Option<PageId>) {
        let mut page = self.page.write();
        page.buffer[layout::PARENT_PAGE_ID].copy_from_slice(&encode_page_id(page_id));
        page.is_dirty = true;
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        decode_page_id(&self.page.read().buffer[layout::NEXT_PAGE_ID])
    }

    pub fn set_next_page_id(&self, page_id: Option<PageId>) {
        let mut page = self.page.write();
        page.buffer[layout::NEXT_PAGE_ID].copy_from_slice(&encode_page_id(page_id));
        page.is_dirty = true;
    }

    fn pair_size(&self) -> usize {
        self.key_size + layout::ROW_ID_SIZE
    }

    fn offset_of(&self, idx: usize) -> usize {
        layout::LEAF_HEADER_SIZE + idx * self.pair_size()
    }

    pub fn key_at(&self, idx: usize) -> IndexKey {
        let start = self.offset_of(idx);
        let page = self.page.read();
        IndexKey::from_bytes(
            &page.buffer[start..start + self.key_size],
            self.key_schema.clone(),
        )
    }

    pub fn row_id_at(&self, idx: usize) -> RowId {
        let start = self.offset_of(idx) + self.key_size;
        let page = self.page.read();
        RowId::from_le_bytes(&page.buffer[start..start + layout::ROW_ID_SIZE])
    }

    fn write_pair(&self, idx: usize, key: &IndexKey, row_id: RowId) {
        let start = self.offset_of(idx);
        let bytes = key.to_bytes();
        let mut page = self.page.write();
        page.buffer[start..start + self.key_size].copy_from_slice(&bytes);
        page.buffer[start + self.key_size..start + self.pair_size()]
            .copy_from_slice(&row_id.to_le_bytes());
        page.is_dirty = true;
    }

    /// Index of the first entry with key >= `key`; `size` when every entry
    /// is smaller.
    pub fn key_index(&self, key: &IndexKey) -> usize {
        let mut left = 0;
        let mut right = self.size();
        while left < right {
            let mid = (left + right) / 2;
            if self.key_at(mid) < *key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<RowId> {
        let idx = self.key_index(key);
        if idx < self.size() && self.key_at(idx) == *key {
            Some(self.row_id_at(idx))
        } else {
            None
        }
    }

    /// Sorted insert; duplicate keys are refused.
    pub fn insert(&self, key: &IndexKey, row_id: RowId) -> bool {
        let size = self.size();
        let idx = self.key_index(key);
        if idx < size && self.key_at(idx) == *key {
            return false;
        }
        let start = self.offset_of(idx);
        let end = self.offset_of(size);
        let pair_size = self.pair_size();
        {
            let mut page = self.page.write();
            page.buffer.copy_within(start..end, start + pair_size);
            page.is_dirty = true;
        }
        self.write_pair(idx, key, row_id);
        self.set_size(size + 1);
        true
    }

    pub fn remove_at(&self, idx: usize) {
        let size = self.size();
        let start = self.offset_of(idx + 1);
        let end = self.offset_of(size);
        let pair_size = self.pair_size();
        {
            let mut page = self.page.write();
            page.buffer.copy_within(start..end, start - pair_size);
            page.is_dirty = true;
        }
        self.set_size(size - 1);
    }

    /// Remove the entry for `key` and report the slot it occupied.
    pub fn remove(&self, key: &IndexKey) -> Option<usize> {
        let idx = self.key_index(key);
        if idx >= self.size() || self.key_at(idx) != *key {
            return None;
        }
        self.remove_at(idx);
        Some(idx)
    }

    /// Move the upper half of the entries to an empty right sibling. Called
    /// on an overflowed leaf; both halves end up at or above the minimum.
    pub fn move_half_to(&self, recipient: &LeafNode) {
        let size = self.size();
        let keep = (size + 1) / 2;
        let src_start = self.offset_of(keep);
        let src_end = self.offset_of(size);
        {
            let src = self.page.read();
            let mut dst = recipient.page.write();
            let dst_start = layout::LEAF_HEADER_SIZE;
            dst.buffer[dst_start..dst_start + (src_end - src_start)]
                .copy_from_slice(&src.buffer[src_start..src_end]);
            dst.is_dirty = true;
        }
        recipient.set_size(size - keep);
        self.set_size(keep);
    }

    /// Append every entry to the left sibling and hand over the leaf link.
    pub fn move_all_to(&self, recipient: &LeafNode) {
        let size = self.size();
        let recipient_size = recipient.size();
        let src_start = self.offset_of(0);
        let src_end = self.offset_of(size);
        {
            let src = self.page.read();
            let mut dst = recipient.page.write();
            let dst_start = recipient.offset_of(recipient_size);
            dst.buffer[dst_start..dst_start + (src_end - src_start)]
                .copy_from_slice(&src.buffer[src_start..src_end]);
            dst.is_dirty = true;
        }
        recipient.set_size(recipient_size + size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Redistribution helper: this node is the right neighbor and donates
    /// its first entry to the end of `recipient`.
    pub fn move_first_to_end_of(&self, recipient: &LeafNode) {
        let key = self.key_at(0);
        let row_id = self.row_id_at(0);
        recipient.insert(&key, row_id);
        self.remove_at(0);
    }

    /// Redistribution helper: this node is the left neighbor and donates
    /// its last entry to the front of `recipient`.
    pub fn move_last_to_front_of(&self, recipient: &LeafNode) {
        let last = self.size() - 1;
        let key = self.key_at(last);
        let row_id = self.row_id_at(last);
        recipient.insert(&key, row_id);
        self.remove_at(last);
    }
}
