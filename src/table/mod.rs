use crate::record::{RecordError, Row, RowId, SchemaRef};
use crate::storage::{BufferPoolManagerRef, PageId, StorageError};
use log::warn;
use thiserror::Error;

mod iterator;
mod page;

pub use iterator::TableIterator;
pub use page::TablePage;

/// Variable-length records over a singly linked chain of slotted pages.
/// The first page is created with the heap and its id is recorded in the
/// table's metadata, so the chain head never moves.
pub struct TableHeap {
    bpm: BufferPoolManagerRef,
    schema: SchemaRef,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create an empty heap with its first page.
    pub fn new(bpm: BufferPoolManagerRef, schema: SchemaRef) -> Result<Self, TableError> {
        let page = bpm.lock().new_page()?;
        let page_id = page.read().page_id.unwrap();
        let table_page = TablePage::new(page);
        table_page.init(page_id, None);
        bpm.lock().unpin(page_id, true)?;
        Ok(Self {
            bpm,
            schema,
            first_page_id: page_id,
        })
    }

    /// Re-attach to a persisted heap.
    pub fn open(bpm: BufferPoolManagerRef, first_page_id: PageId, schema: SchemaRef) -> Self {
        Self {
            bpm,
            schema,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Walk the chain looking for room; append a fresh page at the tail when
    /// every page is full. On success the row's id is filled in.
    pub fn insert_tuple(&self, row: &mut Row) -> Result<(), TableError> {
        let size = row.serialized_size(&self.schema);
        if size > TablePage::SIZE_MAX_ROW {
            warn!("tuple of {} bytes cannot fit in any page", size);
            return Err(TableError::TupleTooLarge(size));
        }
        let mut current = self.first_page_id;
        let last = loop {
            let page = self.bpm.lock().fetch(current)?;
            let table_page = TablePage::new(page);
            match table_page.insert_tuple(row, &self.schema) {
                Ok(Some(row_id)) => {
                    row.row_id = Some(row_id);
                    self.bpm.lock().unpin(current, true)?;
                    return Ok(());
                }
                Ok(None) => {}
                Err(error) => {
                    self.bpm.lock().unpin(current, false)?;
                    return Err(error);
                }
            }
            match table_page.next_page_id() {
                Some(next) => {
                    self.bpm.lock().unpin(current, false)?;
                    current = next;
                }
                None => break table_page,
            }
        };
        // every page is full: link a new page after the last one
        let page = self.bpm.lock().new_page()?;
        let new_page_id = page.read().page_id.unwrap();
        let new_page = TablePage::new(page);
        new_page.init(new_page_id, Some(current));
        last.set_next_page_id(Some(new_page_id));
        self.bpm.lock().unpin(current, true)?;
        let row_id = match new_page.insert_tuple(row, &self.schema) {
            Ok(Some(row_id)) => row_id,
            Ok(None) => {
                self.bpm.lock().unpin(new_page_id, true)?;
                return Err(TableError::TupleTooLarge(size));
            }
            Err(error) => {
                self.bpm.lock().unpin(new_page_id, true)?;
                return Err(error);
            }
        };
        row.row_id = Some(row_id);
        self.bpm.lock().unpin(new_page_id, true)?;
        Ok(())
    }

    pub fn get_tuple(&self, row_id: RowId) -> Result<Option<Row>, TableError> {
        let page = self.bpm.lock().fetch(row_id.page_id)?;
        let table_page = TablePage::new(page);
        let row = table_page.get_tuple(row_id, &self.schema);
        self.bpm.lock().unpin(row_id.page_id, false)?;
        row
    }

    pub fn mark_delete(&self, row_id: RowId) -> Result<bool, TableError> {
        let page = self.bpm.lock().fetch(row_id.page_id)?;
        let marked = TablePage::new(page).mark_delete(row_id);
        self.bpm.lock().unpin(row_id.page_id, marked)?;
        Ok(marked)
    }

    pub fn rollback_delete(&self, row_id: RowId) -> Result<bool, TableError> {
        let page = self.bpm.lock().fetch(row_id.page_id)?;
        let rolled_back = TablePage::new(page).rollback_delete(row_id);
        self.bpm.lock().unpin(row_id.page_id, rolled_back)?;
        Ok(rolled_back)
    }

    pub fn apply_delete(&self, row_id: RowId) -> Result<bool, TableError> {
        let page = self.bpm.lock().fetch(row_id.page_id)?;
        let applied = TablePage::new(page).apply_delete(row_id);
        self.bpm.lock().unpin(row_id.page_id, applied)?;
        Ok(applied)
    }

    /// Update in place when the new tuple still fits in the owning page;
    /// otherwise fall back to mark-delete plus re-insert, rolling the delete
    /// back when the insert fails.
    pub fn update_tuple(&self, new_row: &mut Row, row_id: RowId) -> Result<(), TableError> {
        let page = self.bpm.lock().fetch(row_id.page_id)?;
        let table_page = TablePage::new(page);
        let updated = table_page.update_tuple(new_row, row_id, &self.schema);
        match updated {
            Ok(true) => {
                new_row.row_id = Some(row_id);
                self.bpm.lock().unpin(row_id.page_id, true)?;
                Ok(())
            }
            Ok(false) => {
                self.bpm.lock().unpin(row_id.page_id, false)?;
                let size = new_row.serialized_size(&self.schema);
                if size > TablePage::SIZE_MAX_ROW {
                    warn!("updated tuple of {} bytes cannot fit in any page", size);
                    return Err(TableError::TupleTooLarge(size));
                }
                if !self.mark_delete(row_id)? {
                    return Err(TableError::TupleNotFound(row_id));
                }
                match self.insert_tuple(new_row) {
                    Ok(()) => Ok(()),
                    Err(error) => {
                        self.rollback_delete(row_id)?;
                        Err(error)
                    }
                }
            }
            Err(error) => {
                self.bpm.lock().unpin(row_id.page_id, false)?;
                Err(error)
            }
        }
    }

    /// Sequential scan over live tuples, in slot order within each page and
    /// chain order across pages.
    pub fn iter(&self) -> TableIterator {
        let mut current_page_id = Some(self.first_page_id);
        let mut first = None;
        while let Some(page_id) = current_page_id {
            let Ok(page) = self.bpm.lock().fetch(page_id) else {
                break;
            };
            let table_page = TablePage::new(page);
            first = table_page.first_tuple_rid();
            current_page_id = table_page.next_page_id();
            let _ = self.bpm.lock().unpin(page_id, false);
            if first.is_some() {
                break;
            }
        }
        TableIterator::new(self.bpm.clone(), self.schema.clone(), first)
    }

    /// Delete every page of the heap; used when the owning table is dropped.
    pub fn free_table_heap(&self) -> Result<(), TableError> {
        let mut page_ids = vec![];
        let mut current = Some(self.first_page_id);
        while let Some(page_id) = current {
            let page = self.bpm.lock().fetch(page_id)?;
            let table_page = TablePage::new(page);
            current = table_page.next_page_id();
            self.bpm.lock().unpin(page_id, false)?;
            page_ids.push(page_id);
        }
        for page_id in page_ids {
            self.bpm.lock().delete_page(page_id)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("tuple of {0} bytes is too large for any page")]
    TupleTooLarge(usize),
    #[error("tuple not found at {0:?}")]
    TupleNotFound(RowId),
    #[error("record error: {0}")]
    Record(#[from] RecordError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, DataType, Field, Schema};
    use crate::storage::BufferPoolManager;
    use itertools::Itertools;
    use std::fs::remove_file;
    use std::sync::Arc;

    // three rows of this schema fill a page, the fourth spills over
    fn wide_schema() -> SchemaRef {
        let mut columns = vec![Column::new("id", DataType::Int, 0, false, false)];
        for idx in 0..5 {
            columns.push(Column::new(
                &format!("pad{}", idx),
                DataType::new_char(255).unwrap(),
                idx + 1,
                true,
                false,
            ));
        }
        Arc::new(Schema::new(columns))
    }

    fn wide_row(id: i32) -> Row {
        let mut fields = vec![Field::Int(Some(id))];
        fields.extend((0..5).map(|_| Field::Char(Some("x".repeat(255)))));
        Row::new(fields)
    }

    fn slim_row(id: i32) -> Row {
        let mut fields = vec![Field::Int(Some(id))];
        fields.extend((0..5).map(|_| Field::Char(None)));
        Row::new(fields)
    }

    #[test]
    fn insert_spills_across_pages() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(16).unwrap();
            let filename = bpm.lock().filename();
            let heap = TableHeap::new(bpm.clone(), wide_schema()).unwrap();
            for id in 0..7 {
                let mut row = wide_row(id);
                heap.insert_tuple(&mut row).unwrap();
                assert!(row.row_id.is_some());
            }
            // 3 + 3 + 1 tuples
            let mut chain = vec![];
            let mut current = Some(heap.first_page_id());
            while let Some(page_id) = current {
                let page = bpm.lock().fetch(page_id).unwrap();
                let table_page = TablePage::new(page);
                chain.push(page_id);
                current = table_page.next_page_id();
                bpm.lock().unpin(page_id, false).unwrap();
            }
            assert_eq!(chain.len(), 3);
            let ids = heap
                .iter()
                .map(|row| match row.fields[0] {
                    Field::Int(Some(id)) => id,
                    _ => unreachable!(),
                })
                .collect_vec();
            assert_eq!(ids, (0..7).collect_vec());
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn delete_makes_tuples_invisible() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(16).unwrap();
            let filename = bpm.lock().filename();
            let heap = TableHeap::new(bpm, wide_schema()).unwrap();
            let mut row = wide_row(1);
            heap.insert_tuple(&mut row).unwrap();
            let row_id = row.row_id.unwrap();
            assert!(heap.get_tuple(row_id).unwrap().is_some());
            assert!(heap.mark_delete(row_id).unwrap());
            assert!(heap.get_tuple(row_id).unwrap().is_none());
            assert!(heap.rollback_delete(row_id).unwrap());
            assert!(heap.get_tuple(row_id).unwrap().is_some());
            assert!(heap.mark_delete(row_id).unwrap());
            assert!(heap.apply_delete(row_id).unwrap());
            assert!(heap.get_tuple(row_id).unwrap().is_none());
            assert_eq!(heap.iter().count(), 0);
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn slot_reuse_after_apply_delete() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(16).unwrap();
            let filename = bpm.lock().filename();
            let heap = TableHeap::new(bpm, wide_schema()).unwrap();
            let mut first = wide_row(1);
            let mut second = wide_row(2);
            heap.insert_tuple(&mut first).unwrap();
            heap.insert_tuple(&mut second).unwrap();
            let first_id = first.row_id.unwrap();
            heap.mark_delete(first_id).unwrap();
            heap.apply_delete(first_id).unwrap();
            let mut third = wide_row(3);
            heap.insert_tuple(&mut third).unwrap();
            // the reclaimed slot is handed out again
            assert_eq!(third.row_id.unwrap(), first_id);
            let fields = heap.get_tuple(second.row_id.unwrap()).unwrap().unwrap().fields;
            assert_eq!(fields[0], Field::Int(Some(2)));
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn update_in_place_and_fallback() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(16).unwrap();
            let filename = bpm.lock().filename();
            let heap = TableHeap::new(bpm, wide_schema()).unwrap();
            let mut row = slim_row(1);
            heap.insert_tuple(&mut row).unwrap();
            let row_id = row.row_id.unwrap();
            // same size, stays in place
            let mut updated = slim_row(2);
            heap.update_tuple(&mut updated, row_id).unwrap();
            assert_eq!(updated.row_id, Some(row_id));
            let fetched = heap.get_tuple(row_id).unwrap().unwrap();
            assert_eq!(fetched.fields[0], Field::Int(Some(2)));
            // updating a missing tuple fails
            heap.mark_delete(row_id).unwrap();
            heap.apply_delete(row_id).unwrap();
            let mut lost = slim_row(3);
            assert!(matches!(
                heap.update_tuple(&mut lost, row_id),
                Err(TableError::TupleNotFound(_))
            ));
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn update_spills_to_another_page() {
        let filename = {
            let bpm = BufferPoolManager::new_random_shared(16).unwrap();
            let filename = bpm.lock().filename();
            let heap = TableHeap::new(bpm, wide_schema()).unwrap();
            // pack the page so the small tuple has no room to grow in place
            let mut small = slim_row(0);
            for id in 1..3 {
                let mut row = wide_row(id);
                heap.insert_tuple(&mut row).unwrap();
            }
            heap.insert_tuple(&mut small).unwrap();
            let mut row = wide_row(3);
            heap.insert_tuple(&mut row).unwrap();
            let old_id = small.row_id.unwrap();
            let mut grown = wide_row(10);
            heap.update_tuple(&mut grown, old_id).unwrap();
            let new_id = grown.row_id.unwrap();
            assert_ne!(old_id.page_id, new_id.page_id);
            assert!(heap.get_tuple(old_id).unwrap().is_none());
            let fetched = heap.get_tuple(new_id).unwrap().unwrap();
            assert_eq!(fetched.fields[0], Field::Int(Some(10)));
            filename
        };
        remove_file(filename).unwrap();
    }
}
