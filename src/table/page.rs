use crate::record::{Row, RowId, Schema, SlotId};
use crate::storage::{decode_page_id, encode_page_id, PageId, PageRef, PAGE_SIZE};
use crate::table::TableError;
use std::ops::Range;

///
/// TablePage Format:
///
/// ```text
///     | page_id | prev_page_id | next_page_id | free_space_ptr | tuple_count |
///     | slot[0] | slot[1] | ...
///                          ... | tuple[1] | tuple[0] |
/// ```
///
/// Slot Format:
///
/// ```text
///     | offset: u32 | size: u32 |
/// ```
///
/// The high bit of a slot's size marks the tuple logically deleted; a slot
/// with size 0 is a reclaimed hole and may be reused by a later insert.
///
pub struct TablePage {
    page: PageRef,
}

impl TablePage {
    const PAGE_ID: Range<usize> = 0..4;
    const PREV_PAGE_ID: Range<usize> = 4..8;
    const NEXT_PAGE_ID: Range<usize> = 8..12;
    const FREE_SPACE_PTR: Range<usize> = 12..16;
    const TUPLE_COUNT: Range<usize> = 16..20;
    const SIZE_OF_HEADER: usize = 20;
    const SIZE_OF_SLOT: usize = 8;
    const DELETE_MASK: u32 = 1 << 31;

    pub const SIZE_MAX_ROW: usize = PAGE_SIZE - Self::SIZE_OF_HEADER - Self::SIZE_OF_SLOT;

    pub fn new(page: PageRef) -> Self {
        Self { page }
    }

    pub fn init(&self, page_id: PageId, prev_page_id: Option<PageId>) {
        let mut page = self.page.write();
        page.buffer[Self::PAGE_ID].copy_from_slice(&page_id.to_le_bytes());
        page.buffer[Self::PREV_PAGE_ID].copy_from_slice(&encode_page_id(prev_page_id));
        page.buffer[Self::NEXT_PAGE_ID].copy_from_slice(&encode_page_id(None));
        page.buffer[Self::FREE_SPACE_PTR].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
        page.buffer[Self::TUPLE_COUNT].copy_from_slice(&0u32.to_le_bytes());
        page.is_dirty = true;
    }

    pub fn page_id(&self) -> PageId {
        u32::from_le_bytes(self.page.read().buffer[Self::PAGE_ID].try_into().unwrap())
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        decode_page_id(&self.page.read().buffer[Self::PREV_PAGE_ID])
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        decode_page_id(&self.page.read().buffer[Self::NEXT_PAGE_ID])
    }

    pub fn set_prev_page_id(&self, page_id: Option<PageId>) {
        let mut page = self.page.write();
        page.buffer[Self::PREV_PAGE_ID].copy_from_slice(&encode_page_id(page_id));
        page.is_dirty = true;
    }

    pub fn set_next_page_id(&self, page_id: Option<PageId>) {
        let mut page = self.page.write();
        page.buffer[Self::NEXT_PAGE_ID].copy_from_slice(&encode_page_id(page_id));
        page.is_dirty = true;
    }

    fn free_space_pointer(&self) -> usize {
        u32::from_le_bytes(
            self.page.read().buffer[Self::FREE_SPACE_PTR]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn set_free_space_pointer(&self, offset: usize) {
        let mut page = self.page.write();
        page.buffer[Self::FREE_SPACE_PTR].copy_from_slice(&(offset as u32).to_le_bytes());
        page.is_dirty = true;
    }

    pub fn tuple_count(&self) -> usize {
        u32::from_le_bytes(
            self.page.read().buffer[Self::TUPLE_COUNT]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn set_tuple_count(&self, count: usize) {
        let mut page = self.page.write();
        page.buffer[Self::TUPLE_COUNT].copy_from_slice(&(count as u32).to_le_bytes());
        page.is_dirty = true;
    }

    fn slot_range(slot: SlotId) -> Range<usize> {
        let start = Self::SIZE_OF_HEADER + slot as usize * Self::SIZE_OF_SLOT;
        start..start + Self::SIZE_OF_SLOT
    }

    fn slot_at(&self, slot: SlotId) -> (usize, u32) {
        let range = Self::slot_range(slot);
        let page = self.page.read();
        let offset = u32::from_le_bytes(page.buffer[range.start..range.start + 4].try_into().unwrap());
        let size = u32::from_le_bytes(page.buffer[range.start + 4..range.end].try_into().unwrap());
        (offset as usize, size)
    }

    fn set_slot(&self, slot: SlotId, offset: usize, size: u32) {
        let range = Self::slot_range(slot);
        let mut page = self.page.write();
        page.buffer[range.start..range.start + 4].copy_from_slice(&(offset as u32).to_le_bytes());
        page.buffer[range.start + 4..range.end].copy_from_slice(&size.to_le_bytes());
        page.is_dirty = true;
    }

    fn live_size(size: u32) -> Option<usize> {
        if size == 0 || size & Self::DELETE_MASK != 0 {
            None
        } else {
            Some(size as usize)
        }
    }

    fn free_space(&self) -> usize {
        self.free_space_pointer() - Self::SIZE_OF_HEADER - self.tuple_count() * Self::SIZE_OF_SLOT
    }

    /// Try to place the serialized row on this page. `None` means the page
    /// has no room; the caller moves on to the next page in the chain.
    pub fn insert_tuple(&self, row: &Row, schema: &Schema) -> Result<Option<RowId>, TableError> {
        let bytes = row.serialize(schema)?;
        let tuple_count = self.tuple_count();
        let reusable = (0..tuple_count as SlotId).find(|&slot| self.slot_at(slot).1 == 0);
        let needed = match reusable {
            Some(_) => bytes.len(),
            None => bytes.len() + Self::SIZE_OF_SLOT,
        };
        if needed > self.free_space() {
            return Ok(None);
        }
        let offset = self.free_space_pointer() - bytes.len();
        {
            let mut page = self.page.write();
            page.buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
            page.is_dirty = true;
        }
        self.set_free_space_pointer(offset);
        let slot = reusable.unwrap_or(tuple_count as SlotId);
        self.set_slot(slot, offset, bytes.len() as u32);
        if reusable.is_none() {
            self.set_tuple_count(tuple_count + 1);
        }
        Ok(Some(RowId::new(self.page_id(), slot)))
    }

    /// Materialize the tuple at `row_id`, or `None` when the slot is missing,
    /// reclaimed, or marked deleted.
    pub fn get_tuple(&self, row_id: RowId, schema: &Schema) -> Result<Option<Row>, TableError> {
        if row_id.slot as usize >= self.tuple_count() {
            return Ok(None);
        }
        let (offset, size) = self.slot_at(row_id.slot);
        let Some(size) = Self::live_size(size) else {
            return Ok(None);
        };
        let page = self.page.read();
        let mut row = Row::deserialize(schema, &page.buffer[offset..offset + size])?;
        row.row_id = Some(row_id);
        Ok(Some(row))
    }

    pub fn mark_delete(&self, row_id: RowId) -> bool {
        if row_id.slot as usize >= self.tuple_count() {
            return false;
        }
        let (offset, size) = self.slot_at(row_id.slot);
        if Self::live_size(size).is_none() {
            return false;
        }
        self.set_slot(row_id.slot, offset, size | Self::DELETE_MASK);
        true
    }

    pub fn rollback_delete(&self, row_id: RowId) -> bool {
        if row_id.slot as usize >= self.tuple_count() {
            return false;
        }
        let (offset, size) = self.slot_at(row_id.slot);
        if size == 0 || size & Self::DELETE_MASK == 0 {
            return false;
        }
        self.set_slot(row_id.slot, offset, size & !Self::DELETE_MASK);
        true
    }

    /// Physically reclaim the tuple's bytes: close the gap in the data area,
    /// shift the affected slot offsets and leave the slot as a reusable hole.
    pub fn apply_delete(&self, row_id: RowId) -> bool {
        if row_id.slot as usize >= self.tuple_count() {
            return false;
        }
        let (offset, raw_size) = self.slot_at(row_id.slot);
        if raw_size == 0 {
            return false;
        }
        let size = (raw_size & !Self::DELETE_MASK) as usize;
        let free_space_pointer = self.free_space_pointer();
        {
            let mut page = self.page.write();
            page.buffer
                .copy_within(free_space_pointer..offset, free_space_pointer + size);
            page.is_dirty = true;
        }
        self.set_free_space_pointer(free_space_pointer + size);
        self.set_slot(row_id.slot, 0, 0);
        for slot in 0..self.tuple_count() as SlotId {
            let (other_offset, other_size) = self.slot_at(slot);
            if other_size != 0 && other_offset < offset {
                self.set_slot(slot, other_offset + size, other_size);
            }
        }
        true
    }

    /// In-place update keeping the slot number. `Ok(false)` means the new
    /// tuple does not fit even after reclaiming the old payload.
    pub fn update_tuple(
        &self,
        new_row: &Row,
        row_id: RowId,
        schema: &Schema,
    ) -> Result<bool, TableError> {
        if row_id.slot as usize >= self.tuple_count() {
            return Err(TableError::TupleNotFound(row_id));
        }
        let (offset, size) = self.slot_at(row_id.slot);
        let Some(old_size) = Self::live_size(size) else {
            return Err(TableError::TupleNotFound(row_id));
        };
        let bytes = new_row.serialize(schema)?;
        if bytes.len() > old_size + self.free_space() {
            return Ok(false);
        }
        // close the old payload's gap, then push the new payload
        let free_space_pointer = self.free_space_pointer();
        {
            let mut page = self.page.write();
            page.buffer
                .copy_within(free_space_pointer..offset, free_space_pointer + old_size);
            page.is_dirty = true;
        }
        for slot in 0..self.tuple_count() as SlotId {
            let (other_offset, other_size) = self.slot_at(slot);
            if slot != row_id.slot && other_size != 0 && other_offset < offset {
                self.set_slot(slot, other_offset + old_size, other_size);
            }
        }
        let new_offset = free_space_pointer + old_size - bytes.len();
        {
            let mut page = self.page.write();
            page.buffer[new_offset..new_offset + bytes.len()].copy_from_slice(&bytes);
            page.is_dirty = true;
        }
        self.set_free_space_pointer(new_offset);
        self.set_slot(row_id.slot, new_offset, bytes.len() as u32);
        Ok(true)
    }

    pub fn first_tuple_rid(&self) -> Option<RowId> {
        (0..self.tuple_count() as SlotId)
            .find(|&slot| Self::live_size(self.slot_at(slot).1).is_some())
            .map(|slot| RowId::new(self.page_id(), slot))
    }

    pub fn next_tuple_rid(&self, current: RowId) -> Option<RowId> {
        (current.slot + 1..self.tuple_count() as SlotId)
            .find(|&slot| Self::live_size(self.slot_at(slot).1).is_some())
            .map(|slot| RowId::new(self.page_id(), slot))
    }
}
