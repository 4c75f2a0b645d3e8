use thiserror::Error;

mod column;
mod field;
mod row;
mod schema;
mod types;

pub use column::Column;
pub use field::Field;
pub use row::{Row, RowId, SlotId};
pub use schema::{Schema, SchemaRef};
pub use types::{DataType, CHAR_MAX_WIDTH};

pub(crate) const COLUMN_MAGIC: u32 = 0x434f_4c4d; // "COLM"
pub(crate) const SCHEMA_MAGIC: u32 = 0x5343_4d41; // "SCMA"

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("buffer too short while deserializing")]
    BufferTooShort,
    #[error("magic mismatch: expected {expected:#x}, found {found:#x}")]
    MagicMismatch { expected: u32, found: u32 },
    #[error("unknown type id {0}")]
    UnknownTypeId(u32),
    #[error("char column wider than {CHAR_MAX_WIDTH}: {0}")]
    CharTooWide(usize),
    #[error("field does not match column type")]
    FieldTypeMismatch,
    #[error("row has {fields} fields but schema has {columns} columns")]
    FieldCountMismatch { fields: usize, columns: usize },
    #[error("column {0} not found")]
    ColumnNotFound(String),
    #[error("invalid utf-8 in char payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Cursor over a byte slice for the length-explicit on-disk encodings; every
/// read is bounds-checked so corrupted blocks surface as errors instead of
/// panics.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read_u8(&mut self) -> Result<u8, RecordError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, RecordError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, RecordError> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, RecordError> {
        let bytes = self.read_bytes(4)?;
        Ok(f32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], RecordError> {
        if self.pos + len > self.buf.len() {
            return Err(RecordError::BufferTooShort);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn expect_magic(&mut self, expected: u32) -> Result<(), RecordError> {
        let found = self.read_u32()?;
        if found != expected {
            return Err(RecordError::MagicMismatch { expected, found });
        }
        Ok(())
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }
}
