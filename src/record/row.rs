use super::{ByteReader, Field, RecordError, Schema};
use crate::storage::PageId;

pub type SlotId = u32;

/// Locator of a tuple inside a table heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl RowId {
    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.slot.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self {
            page_id: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            slot: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

///
/// Row Format:
///
/// ```text
///     | field_count: u32 | null_bitmap | field payloads |
/// ```
///
/// The bitmap holds one bit per field, set for NULL; NULL fields contribute
/// no payload bytes.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub row_id: Option<RowId>,
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            row_id: None,
            fields,
        }
    }

    fn check_schema(&self, schema: &Schema) -> Result<(), RecordError> {
        if self.fields.len() != schema.len() {
            return Err(RecordError::FieldCountMismatch {
                fields: self.fields.len(),
                columns: schema.len(),
            });
        }
        for (field, column) in self.fields.iter().zip(schema.iter()) {
            if !field.matches_type(&column.data_type) {
                return Err(RecordError::FieldTypeMismatch);
            }
        }
        Ok(())
    }

    pub fn serialized_size(&self, schema: &Schema) -> usize {
        let bitmap_len = (schema.len() + 7) / 8;
        4 + bitmap_len
            + self
                .fields
                .iter()
                .map(|field| field.serialized_size())
                .sum::<usize>()
    }

    pub fn serialize(&self, schema: &Schema) -> Result<Vec<u8>, RecordError> {
        self.check_schema(schema)?;
        let mut bytes = (self.fields.len() as u32).to_le_bytes().to_vec();
        let mut bitmap = vec![0u8; (self.fields.len() + 7) / 8];
        for (idx, field) in self.fields.iter().enumerate() {
            if field.is_null() {
                bitmap[idx / 8] |= 1 << (idx % 8);
            }
        }
        bytes.extend_from_slice(&bitmap);
        for field in &self.fields {
            bytes.extend_from_slice(&field.to_bytes());
        }
        Ok(bytes)
    }

    pub fn deserialize(schema: &Schema, bytes: &[u8]) -> Result<Row, RecordError> {
        let mut reader = ByteReader::new(bytes);
        let field_count = reader.read_u32()? as usize;
        if field_count != schema.len() {
            return Err(RecordError::FieldCountMismatch {
                fields: field_count,
                columns: schema.len(),
            });
        }
        let bitmap = reader.read_bytes((field_count + 7) / 8)?.to_vec();
        let mut fields = Vec::with_capacity(field_count);
        for (idx, column) in schema.iter().enumerate() {
            let is_null = bitmap[idx / 8] >> (idx % 8) & 1 == 1;
            fields.push(Field::read_from(&mut reader, &column.data_type, is_null)?);
        }
        Ok(Row::new(fields))
    }

    /// Project this row onto a key schema; each key column's `table_index`
    /// names the source field.
    pub fn key_from_row(&self, key_schema: &Schema) -> Row {
        let fields = key_schema
            .iter()
            .map(|column| self.fields[column.table_index].clone())
            .collect();
        Row::new(fields)
    }
}
