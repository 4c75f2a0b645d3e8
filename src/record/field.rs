use super::{ByteReader, DataType, RecordError};
use pad::PadStr;
use std::cmp::Ordering;
use std::fmt;

/// A typed value with a null slot. Nullness is recorded in the owning row's
/// bitmap, so a NULL field serializes to zero payload bytes.
#[derive(Debug, Clone)]
pub enum Field {
    Int(Option<i32>),
    Float(Option<f32>),
    Char(Option<String>),
}

impl Field {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Int(value) => value.is_none(),
            Self::Float(value) => value.is_none(),
            Self::Char(value) => value.is_none(),
        }
    }

    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Self::Int(_), DataType::Int)
                | (Self::Float(_), DataType::Float)
                | (Self::Char(_), DataType::Char { .. })
        )
    }

    /// Payload bytes: fixed 4-byte prefix for the numeric types, a
    /// length-prefixed byte string for chars, nothing for NULL.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int(None) | Self::Float(None) | Self::Char(None) => vec![],
            Self::Int(Some(value)) => value.to_le_bytes().to_vec(),
            Self::Float(Some(value)) => value.to_le_bytes().to_vec(),
            Self::Char(Some(value)) => {
                let mut bytes = (value.len() as u32).to_le_bytes().to_vec();
                bytes.extend_from_slice(value.as_bytes());
                bytes
            }
        }
    }

    pub fn serialized_size(&self) -> usize {
        match self {
            Self::Int(None) | Self::Float(None) | Self::Char(None) => 0,
            Self::Int(Some(_)) | Self::Float(Some(_)) => 4,
            Self::Char(Some(value)) => 4 + value.len(),
        }
    }

    pub(crate) fn read_from(
        reader: &mut ByteReader,
        data_type: &DataType,
        is_null: bool,
    ) -> Result<Self, RecordError> {
        if is_null {
            return Ok(match data_type {
                DataType::Int => Self::Int(None),
                DataType::Float => Self::Float(None),
                DataType::Char { .. } => Self::Char(None),
            });
        }
        match data_type {
            DataType::Int => Ok(Self::Int(Some(reader.read_i32()?))),
            DataType::Float => Ok(Self::Float(Some(reader.read_f32()?))),
            DataType::Char { .. } => {
                let len = reader.read_u32()? as usize;
                let bytes = reader.read_bytes(len)?;
                Ok(Self::Char(Some(String::from_utf8(bytes.to_vec())?)))
            }
        }
    }

    /// Fixed-width key encoding for the index: ints and floats keep their
    /// 4 bytes, chars are padded out to the declared width. NULL keys are
    /// rejected by the index layer before it gets here.
    pub fn to_key_bytes(&self, data_type: &DataType) -> Result<Vec<u8>, RecordError> {
        match (self, data_type) {
            (Self::Int(Some(value)), DataType::Int) => Ok(value.to_le_bytes().to_vec()),
            (Self::Float(Some(value)), DataType::Float) => Ok(value.to_le_bytes().to_vec()),
            (Self::Char(Some(value)), DataType::Char { width }) => {
                Ok(value.with_exact_width(*width).into_bytes())
            }
            _ => Err(RecordError::FieldTypeMismatch),
        }
    }

    pub fn from_key_bytes(data_type: &DataType, bytes: &[u8]) -> Self {
        match data_type {
            DataType::Int => Self::Int(Some(i32::from_le_bytes(bytes[0..4].try_into().unwrap()))),
            DataType::Float => {
                Self::Float(Some(f32::from_le_bytes(bytes[0..4].try_into().unwrap())))
            }
            DataType::Char { width } => {
                let value = String::from_utf8_lossy(&bytes[..*width]);
                Self::Char(Some(value.trim_end().to_string()))
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            Self::Float(_) => 1,
            Self::Char(_) => 2,
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Field {}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(lhs), Self::Int(rhs)) => lhs.cmp(rhs),
            (Self::Char(lhs), Self::Char(rhs)) => lhs.cmp(rhs),
            (Self::Float(lhs), Self::Float(rhs)) => match (lhs, rhs) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(lhs), Some(rhs)) => lhs.total_cmp(rhs),
            },
            (lhs, rhs) => lhs.rank().cmp(&rhs.rank()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(Some(value)) => write!(f, "{}", value),
            Self::Float(Some(value)) => write!(f, "{}", value),
            Self::Char(Some(value)) => write!(f, "{}", value),
            _ => write!(f, "NULL"),
        }
    }
}
