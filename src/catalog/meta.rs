use crate::catalog::TableId;
use crate::index::{BPlusTree, IndexId};
use crate::record::{ByteReader, RecordError, Schema, SchemaRef};
use crate::storage::PageId;
use crate::table::TableHeap;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const CATALOG_META_MAGIC: u32 = 0x4341_5431; // "CAT1"
pub(crate) const TABLE_META_MAGIC: u32 = 0x5442_4d54; // "TBMT"
pub(crate) const INDEX_META_MAGIC: u32 = 0x4958_4d54; // "IXMT"

///
/// CatalogMeta Format:
///
/// ```text
///     | magic | table_count | index_count | (table_id, page_id)... | (index_id, page_id)... |
/// ```
///
/// Persisted at the fixed catalog meta page; it is the directory of every
/// other meta page in the file.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogMeta {
    pub(crate) table_meta_pages: BTreeMap<TableId, PageId>,
    pub(crate) index_meta_pages: BTreeMap<IndexId, PageId>,
}

impl CatalogMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = CATALOG_META_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(self.table_meta_pages.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.index_meta_pages.len() as u32).to_le_bytes());
        for (&table_id, &page_id) in &self.table_meta_pages {
            bytes.extend_from_slice(&table_id.to_le_bytes());
            bytes.extend_from_slice(&page_id.to_le_bytes());
        }
        for (&index_id, &page_id) in &self.index_meta_pages {
            bytes.extend_from_slice(&index_id.to_le_bytes());
            bytes.extend_from_slice(&page_id.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut reader = ByteReader::new(bytes);
        reader.expect_magic(CATALOG_META_MAGIC)?;
        let table_count = reader.read_u32()? as usize;
        let index_count = reader.read_u32()? as usize;
        let mut meta = Self::new();
        for _ in 0..table_count {
            let table_id = reader.read_u32()?;
            let page_id = reader.read_u32()?;
            meta.table_meta_pages.insert(table_id, page_id);
        }
        for _ in 0..index_count {
            let index_id = reader.read_u32()?;
            let page_id = reader.read_u32()?;
            meta.index_meta_pages.insert(index_id, page_id);
        }
        Ok(meta)
    }

    pub fn next_table_id(&self) -> TableId {
        self.table_meta_pages
            .keys()
            .next_back()
            .map(|&table_id| table_id + 1)
            .unwrap_or(0)
    }

    pub fn next_index_id(&self) -> IndexId {
        self.index_meta_pages
            .keys()
            .next_back()
            .map(|&index_id| index_id + 1)
            .unwrap_or(0)
    }
}

///
/// TableMetadata Format:
///
/// ```text
///     | magic | table_id | name_len | name | first_page_id | Schema |
/// ```
///
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub(crate) table_id: TableId,
    pub(crate) table_name: String,
    pub(crate) first_page_id: PageId,
    pub(crate) schema: SchemaRef,
}

impl TableMetadata {
    pub fn new(
        table_id: TableId,
        table_name: &str,
        first_page_id: PageId,
        schema: SchemaRef,
    ) -> Self {
        Self {
            table_id,
            table_name: table_name.to_string(),
            first_page_id,
            schema,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = TABLE_META_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&self.table_id.to_le_bytes());
        bytes.extend_from_slice(&(self.table_name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.table_name.as_bytes());
        bytes.extend_from_slice(&self.first_page_id.to_le_bytes());
        bytes.extend_from_slice(&self.schema.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut reader = ByteReader::new(bytes);
        reader.expect_magic(TABLE_META_MAGIC)?;
        let table_id = reader.read_u32()?;
        let name_len = reader.read_u32()? as usize;
        let table_name = String::from_utf8(reader.read_bytes(name_len)?.to_vec())?;
        let first_page_id = reader.read_u32()?;
        let schema = Schema::read_from(&mut reader)?;
        Ok(Self {
            table_id,
            table_name,
            first_page_id,
            schema: Arc::new(schema),
        })
    }
}

///
/// IndexMetadata Format:
///
/// ```text
///     | magic | index_id | name_len | name | table_id | key_count | key_map... |
/// ```
///
/// `key_map` lists column positions in the owning table's schema.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub(crate) index_id: IndexId,
    pub(crate) index_name: String,
    pub(crate) table_id: TableId,
    pub(crate) key_map: Vec<usize>,
}

impl IndexMetadata {
    pub fn new(index_id: IndexId, index_name: &str, table_id: TableId, key_map: Vec<usize>) -> Self {
        Self {
            index_id,
            index_name: index_name.to_string(),
            table_id,
            key_map,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = INDEX_META_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&self.index_id.to_le_bytes());
        bytes.extend_from_slice(&(self.index_name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.index_name.as_bytes());
        bytes.extend_from_slice(&self.table_id.to_le_bytes());
        bytes.extend_from_slice(&(self.key_map.len() as u32).to_le_bytes());
        for &column_index in &self.key_map {
            bytes.extend_from_slice(&(column_index as u32).to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut reader = ByteReader::new(bytes);
        reader.expect_magic(INDEX_META_MAGIC)?;
        let index_id = reader.read_u32()?;
        let name_len = reader.read_u32()? as usize;
        let index_name = String::from_utf8(reader.read_bytes(name_len)?.to_vec())?;
        let table_id = reader.read_u32()?;
        let key_count = reader.read_u32()? as usize;
        let mut key_map = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            key_map.push(reader.read_u32()? as usize);
        }
        Ok(Self {
            index_id,
            index_name,
            table_id,
            key_map,
        })
    }
}

/// A live table: its persisted metadata plus the heap over its pages.
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    pub(crate) fn new(meta: TableMetadata, heap: TableHeap) -> Self {
        Self { meta, heap }
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.meta.table_name
    }

    pub fn first_page_id(&self) -> PageId {
        self.meta.first_page_id
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.meta.schema
    }

    pub fn table_heap(&self) -> &TableHeap {
        &self.heap
    }
}

/// A live index: its persisted metadata, the projected key schema and the
/// B+ tree that stores the entries.
pub struct IndexInfo {
    meta: IndexMetadata,
    key_schema: SchemaRef,
    tree: BPlusTree,
}

impl IndexInfo {
    pub(crate) fn new(meta: IndexMetadata, key_schema: SchemaRef, tree: BPlusTree) -> Self {
        Self {
            meta,
            key_schema,
            tree,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.meta.index_id
    }

    pub fn index_name(&self) -> &str {
        &self.meta.index_name
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id
    }

    pub fn key_map(&self) -> &[usize] {
        &self.meta.key_map
    }

    pub fn key_schema(&self) -> &SchemaRef {
        &self.key_schema
    }

    pub fn index(&self) -> &BPlusTree {
        &self.tree
    }
}
