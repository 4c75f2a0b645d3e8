use crate::catalog::{CatalogError, CatalogManager};
use crate::index::{IndexError, IndexRootsPage};
use crate::storage::{
    BufferPoolManager, BufferPoolManagerRef, StorageError, CATALOG_META_PAGE_ID,
    INDEX_ROOTS_PAGE_ID,
};
use log::info;
use thiserror::Error;

const DEFAULT_POOL_SIZE: usize = 4096;

/// One database file: a buffer pool over the disk manager plus the catalog
/// living inside it. Creating a fresh file allocates the two fixed logical
/// pages (catalog meta and index roots) before anything else, so they keep
/// their well-known ids.
pub struct Database {
    bpm: BufferPoolManagerRef,
    catalog: CatalogManager,
}

impl Database {
    pub fn open(filename: &str) -> Result<Self, DbError> {
        Self::open_with_pool_size(filename, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool_size(filename: &str, pool_size: usize) -> Result<Self, DbError> {
        let bpm = BufferPoolManager::open_shared(pool_size, filename)?;
        Self::bootstrap(bpm)
    }

    pub fn new_random() -> Result<Self, DbError> {
        let bpm = BufferPoolManager::new_random_shared(DEFAULT_POOL_SIZE)?;
        Self::bootstrap(bpm)
    }

    fn bootstrap(bpm: BufferPoolManagerRef) -> Result<Self, DbError> {
        let fresh = bpm.lock().num_allocated_pages() == 0;
        if fresh {
            for expected in [CATALOG_META_PAGE_ID, INDEX_ROOTS_PAGE_ID] {
                let page = bpm.lock().new_page()?;
                let page_id = page.read().page_id.unwrap();
                debug_assert_eq!(page_id, expected);
                bpm.lock().unpin(page_id, true)?;
            }
            IndexRootsPage::init(bpm.clone())?;
            info!("created database file {}", bpm.lock().filename());
        }
        let catalog = CatalogManager::new(bpm.clone(), fresh)?;
        Ok(Self { bpm, catalog })
    }

    pub fn filename(&self) -> String {
        self.bpm.lock().filename()
    }

    pub fn buffer_pool(&self) -> &BufferPoolManagerRef {
        &self.bpm
    }

    pub fn catalog(&self) -> &CatalogManager {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogManager {
        &mut self.catalog
    }

    /// Flush everything and persist the disk meta page.
    pub fn close(&mut self) -> Result<(), DbError> {
        self.bpm.lock().close()?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKey;
    use crate::record::{Column, DataType, Field, Row, RowId, Schema};
    use itertools::Itertools;
    use std::fs::remove_file;
    use std::sync::Arc;

    fn people_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Column::new("id", DataType::Int, 0, false, false),
            Column::new("name", DataType::new_char(16).unwrap(), 1, true, false),
        ]))
    }

    #[test]
    fn end_to_end_table_with_index() {
        let _ = env_logger::builder().is_test(true).try_init();
        let filename = {
            let mut db = Database::new_random().unwrap();
            let filename = db.filename();
            db.catalog_mut()
                .create_table_with_constraints("people", people_schema(), &["id"])
                .unwrap();
            {
                let catalog = db.catalog();
                let table = catalog.get_table("people").unwrap();
                let index = catalog.get_index("people", "pk_people").unwrap();
                for id in [4, 1, 3, 2] {
                    let mut row = Row::new(vec![
                        Field::Int(Some(id)),
                        Field::Char(Some(format!("name-{}", id))),
                    ]);
                    table.table_heap().insert_tuple(&mut row).unwrap();
                    let key =
                        IndexKey::from_row(&row, index.key_schema().clone()).unwrap();
                    assert!(index.index().insert(&key, row.row_id.unwrap()).unwrap());
                }
                // point lookup through the index finds the heap tuple
                let key = IndexKey::new(
                    vec![Field::Int(Some(3))],
                    index.key_schema().clone(),
                )
                .unwrap();
                let row_id = index.index().get_value(&key).unwrap().unwrap();
                let row = table.table_heap().get_tuple(row_id).unwrap().unwrap();
                assert_eq!(row.fields[1], Field::Char(Some("name-3".to_string())));
                // the index iterates in key order, the heap in insertion order
                let index_order = index
                    .index()
                    .iter()
                    .unwrap()
                    .map(|(key, _)| key.fields()[0].clone())
                    .collect_vec();
                assert_eq!(
                    index_order,
                    (1..=4).map(|id| Field::Int(Some(id))).collect_vec()
                );
            }
            db.close().unwrap();
            filename
        };
        let filename = {
            let db = Database::open(&filename).unwrap();
            let catalog = db.catalog();
            let table = catalog.get_table("people").unwrap();
            assert_eq!(table.table_heap().iter().count(), 4);
            let index = catalog.get_index("people", "pk_people").unwrap();
            // tree roots survive reopen through the index roots page
            let key = IndexKey::new(
                vec![Field::Int(Some(2))],
                index.key_schema().clone(),
            )
            .unwrap();
            assert!(index.index().get_value(&key).unwrap().is_some());
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn dropping_table_frees_its_pages() {
        let filename = {
            let mut db = Database::new_random().unwrap();
            let filename = db.filename();
            let baseline = db.buffer_pool().lock().num_allocated_pages();
            db.catalog_mut()
                .create_table_with_constraints("people", people_schema(), &["id"])
                .unwrap();
            {
                let catalog = db.catalog();
                let table = catalog.get_table("people").unwrap();
                let index = catalog.get_index("people", "pk_people").unwrap();
                for id in 0..64 {
                    let mut row = Row::new(vec![
                        Field::Int(Some(id)),
                        Field::Char(Some("filler".to_string())),
                    ]);
                    table.table_heap().insert_tuple(&mut row).unwrap();
                    let key =
                        IndexKey::from_row(&row, index.key_schema().clone()).unwrap();
                    index.index().insert(&key, row.row_id.unwrap()).unwrap();
                }
            }
            assert!(db.buffer_pool().lock().num_allocated_pages() > baseline);
            db.catalog_mut().drop_table("people").unwrap();
            assert_eq!(db.buffer_pool().lock().num_allocated_pages(), baseline);
            filename
        };
        remove_file(filename).unwrap();
    }

    #[test]
    fn index_and_heap_row_ids_round_trip() {
        let row_id = RowId::new(12, 7);
        assert_eq!(RowId::from_le_bytes(&row_id.to_le_bytes()), row_id);
    }
}
