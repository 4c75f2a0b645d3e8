use crate::index::IndexError;
use crate::record::{Field, Row, SchemaRef};
use std::cmp::Ordering;

///
/// IndexKey Format:
///
/// ```text
///     | field[0] | field[1] | ... |
/// ```
///
/// Every field is encoded at its column's declared width (ints and floats
/// 4 bytes, chars space-padded), so keys of one index are all `key_width`
/// bytes long and node pairs stay fixed size. Key fields are never NULL;
/// the constructor enforces it.
///
#[derive(Debug, Clone)]
pub struct IndexKey {
    fields: Vec<Field>,
    schema: SchemaRef,
}

impl IndexKey {
    pub fn new(fields: Vec<Field>, schema: SchemaRef) -> Result<Self, IndexError> {
        if fields.len() != schema.len() {
            return Err(IndexError::KeySchemaMismatch);
        }
        for (field, column) in fields.iter().zip(schema.iter()) {
            if field.is_null() {
                return Err(IndexError::NullKeyField);
            }
            if !field.matches_type(&column.data_type) {
                return Err(IndexError::KeySchemaMismatch);
            }
        }
        Ok(Self { fields, schema })
    }

    /// Build the key for a heap row; the key schema's `table_index` entries
    /// name the source fields.
    pub fn from_row(row: &Row, key_schema: SchemaRef) -> Result<Self, IndexError> {
        let projected = row.key_from_row(&key_schema);
        Self::new(projected.fields, key_schema)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        for (field, column) in self.fields.iter().zip(self.schema.iter()) {
            // non-null and type-checked at construction
            bytes.extend_from_slice(&field.to_key_bytes(&column.data_type).unwrap());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8], schema: SchemaRef) -> Self {
        let mut fields = vec![];
        let mut offset = 0;
        for column in schema.iter() {
            let width = column.byte_length();
            fields.push(Field::from_key_bytes(
                &column.data_type,
                &bytes[offset..offset + width],
            ));
            offset += width;
        }
        Self { fields, schema }
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &IndexKey) -> bool {
        self.fields == other.fields
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &IndexKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &IndexKey) -> Ordering {
        self.fields.cmp(&other.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, DataType, Schema};
    use std::sync::Arc;

    fn key_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Column::new("v1", DataType::Int, 0, false, false),
            Column::new("v2", DataType::new_char(8).unwrap(), 1, false, false),
        ]))
    }

    #[test]
    fn round_trip_and_order() {
        let schema = key_schema();
        let small = IndexKey::new(
            vec![Field::Int(Some(1)), Field::Char(Some("a".to_string()))],
            schema.clone(),
        )
        .unwrap();
        let large = IndexKey::new(
            vec![Field::Int(Some(1)), Field::Char(Some("b".to_string()))],
            schema.clone(),
        )
        .unwrap();
        assert!(small < large);
        let bytes = small.to_bytes();
        assert_eq!(bytes.len(), schema.key_width());
        let back = IndexKey::from_bytes(&bytes, schema);
        assert_eq!(small, back);
    }

    #[test]
    fn null_key_is_rejected() {
        let schema = key_schema();
        assert!(matches!(
            IndexKey::new(vec![Field::Int(None), Field::Char(None)], schema),
            Err(IndexError::NullKeyField)
        ));
    }
}
