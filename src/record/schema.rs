use super::{ByteReader, Column, RecordError, SCHEMA_MAGIC};
use std::slice::Iter;
use std::sync::Arc;

///
/// Schema Format:
///
/// ```text
///     | magic | column_count | Column[0] | Column[1] | ... |
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

pub type SchemaRef = Arc<Schema>;

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> Iter<Column> {
        self.columns.iter()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Project the columns named by `key_map` into a key schema. Each
    /// projected column keeps its position in this schema as `table_index`
    /// so key extraction can find it again.
    pub fn key_schema(&self, key_map: &[usize]) -> Schema {
        let columns = key_map
            .iter()
            .map(|&idx| {
                let column = &self.columns[idx];
                Column {
                    name: column.name.clone(),
                    data_type: column.data_type,
                    table_index: idx,
                    nullable: column.nullable,
                    unique: column.unique,
                }
            })
            .collect();
        Schema::new(columns)
    }

    /// Total width of a fixed-size index key over these columns.
    pub fn key_width(&self) -> usize {
        self.columns.iter().map(|column| column.byte_length()).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = SCHEMA_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for column in &self.columns {
            bytes.extend_from_slice(&column.to_bytes());
        }
        bytes
    }

    pub(crate) fn read_from(reader: &mut ByteReader) -> Result<Self, RecordError> {
        reader.expect_magic(SCHEMA_MAGIC)?;
        let column_count = reader.read_u32()? as usize;
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            columns.push(Column::read_from(reader)?);
        }
        Ok(Self { columns })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        let mut reader = ByteReader::new(bytes);
        let schema = Self::read_from(&mut reader)?;
        Ok((schema, reader.consumed()))
    }
}
