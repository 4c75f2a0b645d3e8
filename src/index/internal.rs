use crate::index::{layout, IndexError, IndexKey};
use crate::record::SchemaRef;
use crate::storage::{decode_page_id, encode_page_id, BufferPoolManagerRef, PageId, PageRef};

///
/// InternalNode Format:
///
/// ```text
///     | Meta | key[0] | child[0] | key[1] | child[1] | ... |
/// ```
///
/// Meta Format:
///
/// ```text
///     | page_type | size | max_size | key_size | parent_page_id | page_id |
/// ```
///
/// `size` counts children; key[0] is a dummy and never compared. The child
/// at slot i covers keys in [key[i], key[i + 1]).
///
pub struct InternalNode {
    page: PageRef,
    bpm: BufferPoolManagerRef,
    key_schema: SchemaRef,
    key_size: usize,
}

impl Drop for InternalNode {
    fn drop(&mut self) {
        let page_id = self.page.read().page_id.unwrap();
        let _ = self.bpm.lock().unpin(page_id, false);
    }
}

impl InternalNode {
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
            page.buffer[layout::PAGE_TYPE]
                .copy_from_slice(&layout::INTERNAL_PAGE_TYPE.to_le_bytes());
            page.buffer[layout::SIZE].copy_from_slice(&0u32.to_le_bytes());
            page.buffer[layout::MAX_SIZE].copy_from_slice(&(max_size as u32).to_le_bytes());
            page.buffer[layout::KEY_SIZE].copy_from_slice(&(key_size as u32).to_le_bytes());
            page.buffer[layout::PARENT_PAGE_ID].copy_from_slice(&encode_page_id(parent_page_id));
            page.buffer[layout::PAGE_ID].copy_from_slice(&page_id.to_le_bytes());
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
        if page_type != layout::INTERNAL_PAGE_TYPE {
            let _ = bpm.lock().unpin(page_id, false);
            return Err(IndexError::NotInternalPage(page_id));
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

    fn pair_size(&self) -> usize {
        self.key_size + layout::PAGE_ID_SIZE
    }

    fn offset_of(&self, idx: usize) -> usize {
        layout::INTERNAL_HEADER_SIZE + idx * self.pair_size()
    }

    pub fn key_at(&self, idx: usize) -> IndexKey {
        let start = self.offset_of(idx);
        let page = self.page.read();
        IndexKey::from_bytes(
            &page.buffer[start..start + self.key_size],
            self.key_schema.clone(),
        )
    }

    pub fn set_key_at(&self, idx: usize, key: &IndexKey) {
        let start = self.offset_of(idx);
        let bytes = key.to_bytes();
        let mut page = self.page.write();
        page.buffer[start..start + self.key_size].copy_from_slice(&bytes);
        page.is_dirty = true;
    }

    pub fn value_at(&self, idx: usize) -> PageId {
        let start = self.offset_of(idx) + self.key_size;
        let page = self.page.read();
        u32::from_le_bytes(page.buffer[start..start + 4].try_into().unwrap())
    }

    pub fn set_value_at(&self, idx: usize, value: PageId) {
        let start = self.offset_of(idx) + self.key_size;
        let mut page = self.page.write();
        page.buffer[start..start + 4].copy_from_slice(&value.to_le_bytes());
        page.is_dirty = true;
    }

    pub fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&idx| self.value_at(idx) == value)
    }

    /// Child covering `key`: binary search from slot 1 for the rightmost
    /// separator <= key.
    pub fn lookup(&self, key: &IndexKey) -> PageId {
        let size = self.size();
        if size <= 1 {
            return self.value_at(0);
        }
        let mut low = 1;
        let mut high = size - 1;
        let mut answer = 0;
        while low <= high {
            let mid = (low + high) / 2;
            if *key >= self.key_at(mid) {
                answer = mid;
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        self.value_at(answer)
    }

    /// Only used right after the root splits.
    pub fn populate_new_root(&self, left: PageId, key: &IndexKey, right: PageId) {
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
        self.set_size(2);
    }

    /// Insert `(key, value)` right after the child `old_value`; returns the
    /// new size.
    pub fn insert_node_after(&self, old_value: PageId, key: &IndexKey, value: PageId) -> usize {
        let idx = self.value_index(old_value).unwrap() + 1;
        let size = self.size();
        let start = self.offset_of(idx);
        let end = self.offset_of(size);
        let pair_size = self.pair_size();
        {
            let mut page = self.page.write();
            page.buffer.copy_within(start..end, start + pair_size);
            page.is_dirty = true;
        }
        self.set_key_at(idx, key);
        self.set_value_at(idx, value);
        self.set_size(size + 1);
        size + 1
    }

    pub fn remove(&self, idx: usize) {
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

    /// Only valid while adjusting a root that shrank to a single child.
    pub fn remove_and_return_only_child(&self) -> PageId {
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Repoint a child page's parent header at this node.
    fn adopt(&self, child: PageId) -> Result<(), IndexError> {
        let page = self.bpm.lock().fetch(child)?;
        {
            let mut page = page.write();
            page.buffer[layout::PARENT_PAGE_ID].copy_from_slice(&self.page_id().to_le_bytes());
            page.is_dirty = true;
        }
        self.bpm.lock().unpin(child, true)?;
        Ok(())
    }

    /// Move the upper half of the pairs to an empty right sibling; the
    /// sibling's slot-0 key carries the separator for the parent.
    pub fn move_half_to(&self, recipient: &InternalNode) -> Result<(), IndexError> {
        let size = self.size();
        let keep = (size + 1) / 2;
        let moved = size - keep;
        let src_start = self.offset_of(keep);
        let src_end = self.offset_of(size);
        {
            let src = self.page.read();
            let mut dst = recipient.page.write();
            let dst_start = layout::INTERNAL_HEADER_SIZE;
            dst.buffer[dst_start..dst_start + (src_end - src_start)]
                .copy_from_slice(&src.buffer[src_start..src_end]);
            dst.is_dirty = true;
        }
        recipient.set_size(moved);
        self.set_size(keep);
        for idx in 0..moved {
            recipient.adopt(recipient.value_at(idx))?;
        }
        Ok(())
    }

    /// Merge every pair into the left sibling, pulling the separator key
    /// down from the parent as the glue between the two halves.
    pub fn move_all_to(
        &self,
        recipient: &InternalNode,
        middle_key: &IndexKey,
    ) -> Result<(), IndexError> {
        let size = self.size();
        let recipient_size = recipient.size();
        recipient.set_key_at(recipient_size, middle_key);
        recipient.set_value_at(recipient_size, self.value_at(0));
        if size > 1 {
            let src_start = self.offset_of(1);
            let src_end = self.offset_of(size);
            let src = self.page.read();
            let mut dst = recipient.page.write();
            let dst_start = recipient.offset_of(recipient_size + 1);
            dst.buffer[dst_start..dst_start + (src_end - src_start)]
                .copy_from_slice(&src.buffer[src_start..src_end]);
            dst.is_dirty = true;
        }
        recipient.set_size(recipient_size + size);
        self.set_size(0);
        for idx in recipient_size..recipient_size + size {
            recipient.adopt(recipient.value_at(idx))?;
        }
        Ok(())
    }

    /// Redistribution helper: this node is the right neighbor; its first
    /// child moves to the end of `recipient` under the parent's separator.
    pub fn move_first_to_end_of(
        &self,
        recipient: &InternalNode,
        middle_key: &IndexKey,
    ) -> Result<(), IndexError> {
        let recipient_size = recipient.size();
        let child = self.value_at(0);
        recipient.set_key_at(recipient_size, middle_key);
        recipient.set_value_at(recipient_size, child);
        recipient.set_size(recipient_size + 1);
        recipient.adopt(child)?;
        self.remove(0);
        Ok(())
    }

    /// Redistribution helper: this node is the left neighbor; its last
    /// child moves to the front of `recipient`, the parent's separator
    /// slides into the vacated key slot 1.
    pub fn move_last_to_front_of(
        &self,
        recipient: &InternalNode,
        middle_key: &IndexKey,
    ) -> Result<(), IndexError> {
        let last = self.size() - 1;
        let child = self.value_at(last);
        let recipient_size = recipient.size();
        let start = recipient.offset_of(0);
        let end = recipient.offset_of(recipient_size);
        let pair_size = recipient.pair_size();
        {
            let mut page = recipient.page.write();
            page.buffer.copy_within(start..end, start + pair_size);
            page.is_dirty = true;
        }
        recipient.set_value_at(0, child);
        recipient.set_key_at(1, middle_key);
        recipient.set_size(recipient_size + 1);
        recipient.adopt(child)?;
        self.remove(last);
        Ok(())
    }
}
