use crate::index::{IndexError, IndexId};
use crate::storage::{
    decode_page_id, encode_page_id, BufferPoolManagerRef, PageId, PageRef, INDEX_ROOTS_PAGE_ID,
    PAGE_SIZE,
};
use std::ops::Range;

///
/// IndexRootsPage Format:
///
/// ```text
///     | magic | count | index_id[0] | root_page_id[0] | index_id[1] | ... |
/// ```
///
/// One fixed logical page records the root of every B+ tree in the file; an
/// entry whose root is the invalid page id marks an empty tree.
///
pub struct IndexRootsPage {
    page: PageRef,
    bpm: BufferPoolManagerRef,
}

const INDEX_ROOTS_MAGIC: u32 = 0x4958_5254; // "IXRT"

impl Drop for IndexRootsPage {
    fn drop(&mut self) {
        let _ = self.bpm.lock().unpin(INDEX_ROOTS_PAGE_ID, false);
    }
}

impl IndexRootsPage {
    const MAGIC: Range<usize> = 0..4;
    const COUNT: Range<usize> = 4..8;
    const ENTRIES: usize = 8;
    const ENTRY_SIZE: usize = 8;

    pub const MAX_ENTRIES: usize = (PAGE_SIZE - Self::ENTRIES) / Self::ENTRY_SIZE;

    /// Stamp the fixed page as an empty roots directory. Called once when
    /// the database file is created.
    pub fn init(bpm: BufferPoolManagerRef) -> Result<Self, IndexError> {
        let page = bpm.lock().fetch(INDEX_ROOTS_PAGE_ID)?;
        {
            let mut page = page.write();
            page.buffer[Self::MAGIC].copy_from_slice(&INDEX_ROOTS_MAGIC.to_le_bytes());
            page.buffer[Self::COUNT].copy_from_slice(&0u32.to_le_bytes());
            page.is_dirty = true;
        }
        Ok(Self { page, bpm })
    }

    pub fn open(bpm: BufferPoolManagerRef) -> Result<Self, IndexError> {
        let page = bpm.lock().fetch(INDEX_ROOTS_PAGE_ID)?;
        let magic = u32::from_le_bytes(page.read().buffer[Self::MAGIC].try_into().unwrap());
        if magic != INDEX_ROOTS_MAGIC {
            let _ = bpm.lock().unpin(INDEX_ROOTS_PAGE_ID, false);
            return Err(IndexError::RootsPageCorrupted);
        }
        Ok(Self { page, bpm })
    }

    pub fn count(&self) -> usize {
        u32::from_le_bytes(self.page.read().buffer[Self::COUNT].try_into().unwrap()) as usize
    }

    fn set_count(&self, count: usize) {
        let mut page = self.page.write();
        page.buffer[Self::COUNT].copy_from_slice(&(count as u32).to_le_bytes());
        page.is_dirty = true;
    }

    fn entry_offset(idx: usize) -> usize {
        Self::ENTRIES + idx * Self::ENTRY_SIZE
    }

    fn index_id_at(&self, idx: usize) -> IndexId {
        let start = Self::entry_offset(idx);
        u32::from_le_bytes(self.page.read().buffer[start..start + 4].try_into().unwrap())
    }

    fn position_of(&self, index_id: IndexId) -> Option<usize> {
        (0..self.count()).find(|&idx| self.index_id_at(idx) == index_id)
    }

    pub fn root_of(&self, index_id: IndexId) -> Option<PageId> {
        let idx = self.position_of(index_id)?;
        let start = Self::entry_offset(idx) + 4;
        decode_page_id(&self.page.read().buffer[start..start + 4])
    }

    /// Insert or update the root entry for `index_id`. Fails only when the
    /// directory is full and the index is new.
    pub fn set_root(&self, index_id: IndexId, root: Option<PageId>) -> bool {
        let idx = match self.position_of(index_id) {
            Some(idx) => idx,
            None => {
                let count = self.count();
                if count >= Self::MAX_ENTRIES {
                    return false;
                }
                let start = Self::entry_offset(count);
                let mut page = self.page.write();
                page.buffer[start..start + 4].copy_from_slice(&index_id.to_le_bytes());
                page.is_dirty = true;
                drop(page);
                self.set_count(count + 1);
                count
            }
        };
        let start = Self::entry_offset(idx) + 4;
        let mut page = self.page.write();
        page.buffer[start..start + 4].copy_from_slice(&encode_page_id(root));
        page.is_dirty = true;
        true
    }

    /// Drop the entry for `index_id`, closing the gap.
    pub fn remove(&self, index_id: IndexId) -> bool {
        let Some(idx) = self.position_of(index_id) else {
            return false;
        };
        let count = self.count();
        let start = Self::entry_offset(idx + 1);
        let end = Self::entry_offset(count);
        {
            let mut page = self.page.write();
            page.buffer.copy_within(start..end, start - Self::ENTRY_SIZE);
            page.is_dirty = true;
        }
        self.set_count(count - 1);
        true
    }
}
