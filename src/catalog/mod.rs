use crate::index::{BPlusTree, IndexError, IndexId};
use crate::record::{Column, RecordError, Schema, SchemaRef};
use crate::storage::{
    BufferPoolManagerRef, PageId, StorageError, CATALOG_META_PAGE_ID, PAGE_SIZE,
};
use crate::table::{TableError, TableHeap};
use itertools::Itertools;
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

mod meta;

pub use meta::{CatalogMeta, IndexInfo, IndexMetadata, TableInfo, TableMetadata};

pub type TableId = u32;

/// Owns every table and index of one database file: the persistent meta
/// pages, the in-memory name maps and the live `TableInfo`/`IndexInfo`
/// objects that executors borrow.
pub struct CatalogManager {
    bpm: BufferPoolManagerRef,
    meta: CatalogMeta,
    tables: HashMap<TableId, TableInfo>,
    table_names: HashMap<String, TableId>,
    indexes: HashMap<IndexId, IndexInfo>,
    index_names: HashMap<String, HashMap<String, IndexId>>,
    next_table_id: TableId,
    next_index_id: IndexId,
}

impl CatalogManager {
    /// `init` starts an empty catalog and persists it; otherwise the catalog
    /// meta page is deserialized and every table and index is reloaded.
    pub fn new(bpm: BufferPoolManagerRef, init: bool) -> Result<Self, CatalogError> {
        let mut manager = Self {
            bpm,
            meta: CatalogMeta::new(),
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_table_id: 0,
            next_index_id: 0,
        };
        if init {
            manager.flush_catalog_meta()?;
            return Ok(manager);
        }
        let meta = {
            let page = manager.bpm.lock().fetch(CATALOG_META_PAGE_ID)?;
            let meta = CatalogMeta::from_bytes(&page.read().buffer);
            manager.bpm.lock().unpin(CATALOG_META_PAGE_ID, false)?;
            meta?
        };
        manager.meta = meta;
        for (table_id, page_id) in manager.meta.table_meta_pages.clone() {
            manager.load_table(table_id, page_id)?;
        }
        for (index_id, page_id) in manager.meta.index_meta_pages.clone() {
            manager.load_index(index_id, page_id)?;
        }
        manager.next_table_id = manager.meta.next_table_id();
        manager.next_index_id = manager.meta.next_index_id();
        Ok(manager)
    }

    fn write_meta_page(&self, page_id: PageId, bytes: &[u8]) -> Result<(), CatalogError> {
        if bytes.len() > PAGE_SIZE {
            error!("serialized meta block of {} bytes overflows a page", bytes.len());
            return Err(CatalogError::Failed);
        }
        let page = self.bpm.lock().fetch(page_id)?;
        {
            let mut page = page.write();
            page.buffer[..bytes.len()].copy_from_slice(bytes);
            page.is_dirty = true;
        }
        self.bpm.lock().unpin(page_id, true)?;
        Ok(())
    }

    fn flush_catalog_meta(&self) -> Result<(), CatalogError> {
        self.write_meta_page(CATALOG_META_PAGE_ID, &self.meta.to_bytes())
    }

    pub fn create_table(
        &mut self,
        table_name: &str,
        schema: SchemaRef,
    ) -> Result<TableId, CatalogError> {
        if self.table_names.contains_key(table_name) {
            return Err(CatalogError::TableAlreadyExists(table_name.to_string()));
        }
        let heap = TableHeap::new(self.bpm.clone(), schema.clone())?;
        let meta_page = match self.bpm.lock().new_page() {
            Ok(page) => page,
            Err(error) => {
                let _ = heap.free_table_heap();
                return Err(error.into());
            }
        };
        let meta_page_id = meta_page.read().page_id.unwrap();
        let table_id = self.next_table_id;
        self.next_table_id += 1;
        let table_meta = TableMetadata::new(table_id, table_name, heap.first_page_id(), schema);
        let bytes = table_meta.to_bytes();
        if bytes.len() > PAGE_SIZE {
            error!("schema of table {} does not fit its meta page", table_name);
            heap.free_table_heap()?;
            self.bpm.lock().unpin(meta_page_id, false)?;
            self.bpm.lock().delete_page(meta_page_id)?;
            return Err(CatalogError::Failed);
        }
        {
            let mut page = meta_page.write();
            page.buffer[..bytes.len()].copy_from_slice(&bytes);
            page.is_dirty = true;
        }
        self.bpm.lock().unpin(meta_page_id, true)?;
        info!("create table {} as id {}", table_name, table_id);
        self.tables.insert(table_id, TableInfo::new(table_meta, heap));
        self.table_names.insert(table_name.to_string(), table_id);
        self.index_names.entry(table_name.to_string()).or_default();
        self.meta.table_meta_pages.insert(table_id, meta_page_id);
        self.flush_catalog_meta()?;
        Ok(table_id)
    }

    /// Create a table together with its constraint indexes: `pk_<table>`
    /// over the primary key columns and `uk_<table>_<col>` for UNIQUE
    /// columns outside the primary key. Primary key columns become NOT NULL
    /// UNIQUE. A failing index creation rolls the whole table back.
    pub fn create_table_with_constraints(
        &mut self,
        table_name: &str,
        schema: SchemaRef,
        primary_key: &[&str],
    ) -> Result<TableId, CatalogError> {
        for column_name in primary_key {
            if schema.column_index(column_name).is_none() {
                return Err(CatalogError::ColumnNameNotFound(column_name.to_string()));
            }
        }
        let columns = schema
            .iter()
            .map(|column| {
                let is_pk_member = primary_key.contains(&column.name.as_str());
                Column {
                    name: column.name.clone(),
                    data_type: column.data_type,
                    table_index: column.table_index,
                    nullable: !is_pk_member && column.nullable,
                    unique: is_pk_member || column.unique,
                }
            })
            .collect_vec();
        let schema: SchemaRef = Arc::new(Schema::new(columns));
        let table_id = self.create_table(table_name, schema.clone())?;
        if !primary_key.is_empty() {
            let index_name = format!("pk_{}", table_name);
            if let Err(err) = self.create_index(table_name, &index_name, primary_key) {
                let _ = self.drop_table(table_name);
                return Err(err);
            }
        }
        let unique_columns = schema
            .iter()
            .filter(|column| column.unique && !primary_key.contains(&column.name.as_str()))
            .map(|column| column.name.clone())
            .collect_vec();
        for column_name in unique_columns {
            let index_name = format!("uk_{}_{}", table_name, column_name);
            if let Err(err) = self.create_index(table_name, &index_name, &[column_name.as_str()]) {
                let _ = self.drop_table(table_name);
                return Err(err);
            }
        }
        Ok(table_id)
    }

    /// Drop a table, its indexes, its heap pages and its meta page.
    pub fn drop_table(&mut self, table_name: &str) -> Result<(), CatalogError> {
        let table_id = *self
            .table_names
            .get(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        let index_names = self
            .index_names
            .get(table_name)
            .map(|names| names.keys().cloned().collect_vec())
            .unwrap_or_default();
        for index_name in index_names {
            self.drop_index(table_name, &index_name)?;
        }
        let info = self.tables.remove(&table_id).ok_or(CatalogError::Failed)?;
        info.table_heap().free_table_heap()?;
        if let Some(meta_page_id) = self.meta.table_meta_pages.remove(&table_id) {
            self.bpm.lock().delete_page(meta_page_id)?;
        }
        self.table_names.remove(table_name);
        self.index_names.remove(table_name);
        info!("drop table {}", table_name);
        self.flush_catalog_meta()
    }

    /// Create a B+ tree index over the named key columns of a table.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        key_columns: &[&str],
    ) -> Result<IndexId, CatalogError> {
        let table_id = *self
            .table_names
            .get(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        if self
            .index_names
            .get(table_name)
            .map(|names| names.contains_key(index_name))
            .unwrap_or(false)
        {
            return Err(CatalogError::IndexAlreadyExists(index_name.to_string()));
        }
        let table_info = self.tables.get(&table_id).ok_or(CatalogError::Failed)?;
        let mut key_map = vec![];
        for column_name in key_columns {
            let column_index = table_info
                .schema()
                .column_index(column_name)
                .ok_or_else(|| CatalogError::ColumnNameNotFound(column_name.to_string()))?;
            key_map.push(column_index);
        }
        if key_map.is_empty() {
            return Err(CatalogError::Failed);
        }
        let meta_page = self.bpm.lock().new_page()?;
        let meta_page_id = meta_page.read().page_id.unwrap();
        let index_id = self.next_index_id;
        self.next_index_id += 1;
        let index_meta = IndexMetadata::new(index_id, index_name, table_id, key_map.clone());
        let bytes = index_meta.to_bytes();
        {
            let mut page = meta_page.write();
            page.buffer[..bytes.len()].copy_from_slice(&bytes);
            page.is_dirty = true;
        }
        self.bpm.lock().unpin(meta_page_id, true)?;
        let key_schema: SchemaRef = Arc::new(table_info.schema().key_schema(&key_map));
        let tree = BPlusTree::new(index_id, self.bpm.clone(), key_schema.clone(), None, None)?;
        info!("create index {} on {} as id {}", index_name, table_name, index_id);
        self.indexes
            .insert(index_id, IndexInfo::new(index_meta, key_schema, tree));
        self.index_names
            .entry(table_name.to_string())
            .or_default()
            .insert(index_name.to_string(), index_id);
        self.meta.index_meta_pages.insert(index_id, meta_page_id);
        self.flush_catalog_meta()?;
        Ok(index_id)
    }

    /// Drop an index: destroy its tree pages, delete its meta page and
    /// forget it.
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> Result<(), CatalogError> {
        let index_id = *self
            .index_names
            .get(table_name)
            .and_then(|names| names.get(index_name))
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))?;
        let info = self.indexes.remove(&index_id).ok_or(CatalogError::Failed)?;
        info.index().destroy()?;
        if let Some(meta_page_id) = self.meta.index_meta_pages.remove(&index_id) {
            self.bpm.lock().delete_page(meta_page_id)?;
        }
        if let Some(names) = self.index_names.get_mut(table_name) {
            names.remove(index_name);
        }
        info!("drop index {} on {}", index_name, table_name);
        self.flush_catalog_meta()
    }

    pub fn get_table(&self, table_name: &str) -> Result<&TableInfo, CatalogError> {
        let table_id = self
            .table_names
            .get(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        self.tables.get(table_id).ok_or(CatalogError::Failed)
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> Result<&TableInfo, CatalogError> {
        self.tables
            .get(&table_id)
            .ok_or_else(|| CatalogError::TableNotFound(format!("table id {}", table_id)))
    }

    pub fn get_tables(&self) -> Vec<&TableInfo> {
        self.tables.values().collect_vec()
    }

    pub fn get_index(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<&IndexInfo, CatalogError> {
        if !self.table_names.contains_key(table_name) {
            return Err(CatalogError::TableNotFound(table_name.to_string()));
        }
        let index_id = self
            .index_names
            .get(table_name)
            .and_then(|names| names.get(index_name))
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))?;
        self.indexes.get(index_id).ok_or(CatalogError::Failed)
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Result<Vec<&IndexInfo>, CatalogError> {
        let names = self
            .index_names
            .get(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        Ok(names
            .values()
            .filter_map(|index_id| self.indexes.get(index_id))
            .collect_vec())
    }

    fn load_table(&mut self, table_id: TableId, page_id: PageId) -> Result<(), CatalogError> {
        let table_meta = {
            let page = self.bpm.lock().fetch(page_id)?;
            let meta = TableMetadata::from_bytes(&page.read().buffer);
            self.bpm.lock().unpin(page_id, false)?;
            meta?
        };
        let heap = TableHeap::open(
            self.bpm.clone(),
            table_meta.first_page_id,
            table_meta.schema.clone(),
        );
        self.table_names
            .insert(table_meta.table_name.clone(), table_id);
        self.index_names
            .entry(table_meta.table_name.clone())
            .or_default();
        self.tables.insert(table_id, TableInfo::new(table_meta, heap));
        Ok(())
    }

    fn load_index(&mut self, index_id: IndexId, page_id: PageId) -> Result<(), CatalogError> {
        let index_meta = {
            let page = self.bpm.lock().fetch(page_id)?;
            let meta = IndexMetadata::from_bytes(&page.read().buffer);
            self.bpm.lock().unpin(page_id, false)?;
            meta?
        };
        let table_info = self
            .tables
            .get(&index_meta.table_id)
            .ok_or_else(|| CatalogError::TableNotFound(format!("table id {}", index_meta.table_id)))?;
        let key_schema: SchemaRef =
            Arc::new(table_info.schema().key_schema(&index_meta.key_map));
        let table_name = table_info.table_name().to_string();
        let tree = BPlusTree::new(index_id, self.bpm.clone(), key_schema.clone(), None, None)?;
        self.index_names
            .entry(table_name)
            .or_default()
            .insert(index_meta.index_name.clone(), index_id);
        self.indexes
            .insert(index_id, IndexInfo::new(index_meta, key_schema, tree));
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog operation failed")]
    Failed,
    #[error("table {0} already exists")]
    TableAlreadyExists(String),
    #[error("table {0} not found")]
    TableNotFound(String),
    #[error("index {0} already exists")]
    IndexAlreadyExists(String),
    #[error("index {0} not found")]
    IndexNotFound(String),
    #[error("column {0} not found")]
    ColumnNameNotFound(String),
    #[error("key not found")]
    KeyNotFound,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("record error: {0}")]
    Record(#[from] RecordError),
    #[error("table error: {0}")]
    Table(#[from] TableError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexKey, IndexRootsPage};
    use crate::record::{DataType, Field, Row};
    use crate::storage::BufferPoolManager;
    use std::fs::remove_file;

    fn sample_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Column::new("id", DataType::Int, 0, false, false),
            Column::new("email", DataType::new_char(32).unwrap(), 1, true, true),
            Column::new("score", DataType::Float, 2, true, false),
        ]))
    }

    fn bootstrap(pool_size: usize) -> (BufferPoolManagerRef, String) {
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

    #[test]
    fn create_find_drop_table() {
        let (bpm, filename) = bootstrap(64);
        {
            let mut catalog = CatalogManager::new(bpm, true).unwrap();
            let table_id = catalog.create_table("people", sample_schema()).unwrap();
            assert!(matches!(
                catalog.create_table("people", sample_schema()),
                Err(CatalogError::TableAlreadyExists(_))
            ));
            assert_eq!(catalog.get_table("people").unwrap().table_id(), table_id);
            assert_eq!(catalog.get_table_by_id(table_id).unwrap().table_name(), "people");
            assert!(matches!(
                catalog.get_table("nobody"),
                Err(CatalogError::TableNotFound(_))
            ));
            catalog.drop_table("people").unwrap();
            assert!(matches!(
                catalog.get_table("people"),
                Err(CatalogError::TableNotFound(_))
            ));
            assert!(matches!(
                catalog.drop_table("people"),
                Err(CatalogError::TableNotFound(_))
            ));
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn create_index_and_lookup() {
        let (bpm, filename) = bootstrap(64);
        {
            let mut catalog = CatalogManager::new(bpm, true).unwrap();
            catalog.create_table("people", sample_schema()).unwrap();
            catalog
                .create_index("people", "idx_id", &["id"])
                .unwrap();
            assert!(matches!(
                catalog.create_index("people", "idx_id", &["id"]),
                Err(CatalogError::IndexAlreadyExists(_))
            ));
            assert!(matches!(
                catalog.create_index("people", "idx_other", &["missing"]),
                Err(CatalogError::ColumnNameNotFound(_))
            ));
            let info = catalog.get_index("people", "idx_id").unwrap();
            assert_eq!(info.key_map(), &[0]);
            // the index is usable through the catalog
            let key = IndexKey::new(
                vec![Field::Int(Some(9))],
                info.key_schema().clone(),
            )
            .unwrap();
            info.index().insert(&key, crate::record::RowId::new(3, 0)).unwrap();
            assert_eq!(
                info.index().get_value(&key).unwrap(),
                Some(crate::record::RowId::new(3, 0))
            );
            assert_eq!(catalog.get_table_indexes("people").unwrap().len(), 1);
            catalog.drop_index("people", "idx_id").unwrap();
            assert!(matches!(
                catalog.get_index("people", "idx_id"),
                Err(CatalogError::IndexNotFound(_))
            ));
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn constraints_create_auto_indexes() {
        let (bpm, filename) = bootstrap(64);
        {
            let mut catalog = CatalogManager::new(bpm, true).unwrap();
            catalog
                .create_table_with_constraints("people", sample_schema(), &["id"])
                .unwrap();
            let pk = catalog.get_index("people", "pk_people").unwrap();
            assert_eq!(pk.key_map(), &[0]);
            let uk = catalog.get_index("people", "uk_people_email").unwrap();
            assert_eq!(uk.key_map(), &[1]);
            // pk columns were forced NOT NULL UNIQUE
            let schema = catalog.get_table("people").unwrap().schema().clone();
            assert!(!schema.column(0).nullable);
            assert!(schema.column(0).unique);
        }
        remove_file(filename).unwrap();
    }

    #[test]
    fn catalog_survives_reopen() {
        let (bpm, filename) = bootstrap(64);
        {
            let mut catalog = CatalogManager::new(bpm.clone(), true).unwrap();
            catalog.create_table("people", sample_schema()).unwrap();
            catalog.create_index("people", "idx_id", &["id"]).unwrap();
            let info = catalog.get_table("people").unwrap();
            let mut row = Row::new(vec![
                Field::Int(Some(1)),
                Field::Char(Some("a@b".to_string())),
                Field::Float(Some(3.5)),
            ]);
            info.table_heap().insert_tuple(&mut row).unwrap();
            bpm.lock().close().unwrap();
        }
        {
            let bpm = BufferPoolManager::open_shared(64, &filename).unwrap();
            let catalog = CatalogManager::new(bpm, false).unwrap();
            let info = catalog.get_table("people").unwrap();
            assert_eq!(info.schema().len(), 3);
            let rows = info.table_heap().iter().collect_vec();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].fields[0], Field::Int(Some(1)));
            let index = catalog.get_index("people", "idx_id").unwrap();
            assert_eq!(index.index_name(), "idx_id");
            assert!(index.index().is_empty());
        }
        remove_file(filename).unwrap();
    }
}
