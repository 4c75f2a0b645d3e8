use super::{ByteReader, DataType, RecordError, COLUMN_MAGIC};

///
/// Column Format:
///
/// ```text
///     | magic | name_len | name | type_id | len | table_index | nullable | unique |
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub table_index: usize,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(
        name: &str,
        data_type: DataType,
        table_index: usize,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn byte_length(&self) -> usize {
        self.data_type.byte_length()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = COLUMN_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.name.as_bytes());
        bytes.extend_from_slice(&self.data_type.type_id().to_le_bytes());
        bytes.extend_from_slice(&(self.byte_length() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.table_index as u32).to_le_bytes());
        bytes.push(self.nullable as u8);
        bytes.push(self.unique as u8);
        bytes
    }

    pub(crate) fn read_from(reader: &mut ByteReader) -> Result<Self, RecordError> {
        reader.expect_magic(COLUMN_MAGIC)?;
        let name_len = reader.read_u32()? as usize;
        let name = String::from_utf8(reader.read_bytes(name_len)?.to_vec())?;
        let type_id = reader.read_u32()?;
        let len = reader.read_u32()? as usize;
        let table_index = reader.read_u32()? as usize;
        let nullable = reader.read_u8()? != 0;
        let unique = reader.read_u8()? != 0;
        Ok(Self {
            name,
            data_type: DataType::from_type_id(type_id, len)?,
            table_index,
            nullable,
            unique,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let column = Column::new("score", DataType::Float, 2, true, false);
        let bytes = column.to_bytes();
        let mut reader = ByteReader::new(&bytes);
        let back = Column::read_from(&mut reader).unwrap();
        assert_eq!(column, back);
        assert_eq!(reader.consumed(), bytes.len());
    }

    #[test]
    fn corrupted_magic_is_rejected() {
        let column = Column::new("id", DataType::Int, 0, false, true);
        let mut bytes = column.to_bytes();
        bytes[0] ^= 0xff;
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            Column::read_from(&mut reader),
            Err(RecordError::MagicMismatch { .. })
        ));
    }
}
