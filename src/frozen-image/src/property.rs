//! Property type table and typed values
//!
//! The frozen schema only knows a closed set of scalar kinds. Each schema
//! field is either a single scalar or, when its name ends with
//! [`ARRAY_SUFFIX`], an out-of-line array of that scalar kind.

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::reader::FrozenReader;
use crate::writer::{FrozenWriter, Pending};
use crate::{Error, Result};

/// Field name suffix marking "array of this scalar kind"
pub const ARRAY_SUFFIX: &str = "_Array";

/// Scalar kinds understood by the frozen schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ScalarKind {
    Bool = 1,
    Byte = 2,
    Int8 = 3,
    UInt16 = 4,
    Int16 = 5,
    UInt32 = 6,
    Int32 = 7,
    Int64 = 8,
    Float = 9,
    Str = 10,
    Name = 11,
}

impl ScalarKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Int8,
            4 => Self::UInt16,
            5 => Self::Int16,
            6 => Self::UInt32,
            7 => Self::Int32,
            8 => Self::Int64,
            9 => Self::Float,
            10 => Self::Str,
            11 => Self::Name,
            _ => return None,
        })
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Natural alignment of the kind inside a struct or array
    pub fn alignment(self) -> usize {
        match self {
            Self::Bool | Self::Byte | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::Str => 8,
            Self::UInt32 | Self::Int32 | Self::Int64 | Self::Float | Self::Name => 4,
        }
    }

    /// Alignment applied before the value is read or written
    pub(crate) fn leading_alignment(self) -> usize {
        match self {
            Self::Str => 8,
            Self::Name => 4,
            _ => 1,
        }
    }

    /// Alignment applied after the value is read or written
    pub(crate) fn trailing_alignment(self) -> usize {
        match self {
            Self::Int64 => 8,
            Self::Float => 4,
            _ => 1,
        }
    }

    /// Alignment of an out-of-line array payload of this kind
    ///
    /// Trailing alignment is relative to the frozen region, so the payload
    /// must start on that boundary for contiguous elements to decode.
    pub(crate) fn payload_alignment(self) -> usize {
        self.alignment().max(self.trailing_alignment())
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Bool => "BoolProperty",
            Self::Byte => "ByteProperty",
            Self::Int8 => "Int8Property",
            Self::UInt16 => "UInt16Property",
            Self::Int16 => "Int16Property",
            Self::UInt32 => "UIntProperty",
            Self::Int32 => "IntProperty",
            Self::Int64 => "Int64Property",
            Self::Float => "FloatProperty",
            Self::Str => "StrProperty",
            Self::Name => "NameProperty",
        }
    }
}

/// One schema field: a name and its raw underlying kind
///
/// The kind is kept raw so that unknown kinds survive until a row actually
/// needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: Name,
    pub underlying_type: i32,
}

impl PropertyDescriptor {
    pub fn new(name: Name, kind: ScalarKind) -> Self {
        Self {
            name,
            underlying_type: kind.raw(),
        }
    }

    pub fn kind(&self) -> Option<ScalarKind> {
        ScalarKind::from_raw(self.underlying_type)
    }

    pub fn is_array(&self) -> bool {
        self.name.value.ends_with(ARRAY_SUFFIX)
    }

    /// Alignment a row starting with this field needs
    pub(crate) fn row_alignment(&self, offset: u64) -> Result<usize> {
        self.kind()
            .map(ScalarKind::alignment)
            .ok_or(Error::UnknownPropertyKind {
                offset,
                kind: self.underlying_type,
            })
    }

    pub(crate) fn read(reader: &mut FrozenReader<'_>) -> Result<Self> {
        let offset = reader.offset();
        let name = reader.read_name().ok_or(Error::MissingName { offset })?;
        let underlying_type = reader.read_i32()?;
        Ok(Self {
            name,
            underlying_type,
        })
    }
}

/// A decoded property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int8(i8),
    UInt16(u16),
    Int16(i16),
    UInt32(u32),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Str(Option<String>),
    Name(Option<Name>),
    Array { kind: ScalarKind, items: Vec<Value> },
}

impl Value {
    /// Scalar kind of the value; arrays report their element kind
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Byte(_) => ScalarKind::Byte,
            Self::Int8(_) => ScalarKind::Int8,
            Self::UInt16(_) => ScalarKind::UInt16,
            Self::Int16(_) => ScalarKind::Int16,
            Self::UInt32(_) => ScalarKind::UInt32,
            Self::Int32(_) => ScalarKind::Int32,
            Self::Int64(_) => ScalarKind::Int64,
            Self::Float(_) => ScalarKind::Float,
            Self::Str(_) => ScalarKind::Str,
            Self::Name(_) => ScalarKind::Name,
            Self::Array { kind, .. } => *kind,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// First array element that is nested or not of the declared kind
    pub fn mismatched_element(&self) -> Option<&Value> {
        match self {
            Self::Array { kind, items } => items
                .iter()
                .find(|item| item.is_array() || item.kind() != *kind),
            _ => None,
        }
    }

    /// Decode one scalar of `kind` at the reader's current position
    pub(crate) fn decode(reader: &mut FrozenReader<'_>, kind: ScalarKind) -> Result<Self> {
        reader.align(kind.leading_alignment());
        let value = match kind {
            ScalarKind::Bool => Self::Bool(reader.read_bool()?),
            ScalarKind::Byte => Self::Byte(reader.read_u8()?),
            ScalarKind::Int8 => Self::Int8(reader.read_i8()?),
            ScalarKind::UInt16 => Self::UInt16(reader.read_u16()?),
            ScalarKind::Int16 => Self::Int16(reader.read_i16()?),
            ScalarKind::UInt32 => Self::UInt32(reader.read_u32()?),
            ScalarKind::Int32 => Self::Int32(reader.read_i32()?),
            ScalarKind::Int64 => Self::Int64(reader.read_i64()?),
            ScalarKind::Float => Self::Float(reader.read_f32()?),
            ScalarKind::Str => Self::Str(reader.read_string()?),
            ScalarKind::Name => Self::Name(reader.read_name()),
        };
        reader.align(kind.trailing_alignment());
        Ok(value)
    }

    /// Emit the inline part of the value; out-of-line payloads are deferred
    /// to the writer's indirect queue
    pub(crate) fn encode<'g>(&'g self, writer: &mut FrozenWriter<'g>) -> Result<()> {
        writer.align(self.kind().leading_alignment());
        match self {
            Self::Bool(v) => writer.write_u8(u8::from(*v)),
            Self::Byte(v) => writer.write_u8(*v),
            Self::Int8(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::UInt16(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::Int16(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::UInt32(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::Int32(v) => writer.write_i32(*v),
            Self::Int64(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::Float(v) => writer.write_bytes(&v.to_le_bytes()),
            Self::Str(None) => {
                writer.write_placeholder_pointer(0, None)?;
            }
            Self::Str(Some(text)) => {
                let len = text.encode_utf16().count() + 1;
                let site = writer.write_placeholder_pointer(len, None)?;
                writer.enqueue_indirect(Pending::Str { site, text });
            }
            Self::Name(name) => writer.write_name(name.as_ref())?,
            Self::Array { items, .. } if items.is_empty() => {
                writer.write_placeholder_pointer(0, None)?;
            }
            Self::Array { kind, items } => {
                let site = writer.write_placeholder_pointer(items.len(), None)?;
                writer.enqueue_indirect(Pending::Array {
                    site,
                    kind: *kind,
                    items,
                });
            }
        }
        writer.align(self.kind().trailing_alignment());
        Ok(())
    }
}

/// A named field value within a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: Name,
    /// Absolute source offset, for diagnostics only
    #[serde(default)]
    pub offset: u64,
    pub value: Value,
    /// Absolute source offset of each array element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_offsets: Vec<u64>,
}

impl Property {
    pub fn new(name: Name, value: Value) -> Self {
        Self {
            name,
            offset: 0,
            value,
            item_offsets: Vec::new(),
        }
    }
}

/// Decode one schema field: an out-of-line array or a single scalar
pub(crate) fn dispatch(
    reader: &mut FrozenReader<'_>,
    descriptor: &PropertyDescriptor,
) -> Result<Property> {
    let offset = reader.offset();
    let kind = descriptor.kind().ok_or(Error::UnknownPropertyKind {
        offset,
        kind: descriptor.underlying_type,
    })?;

    if descriptor.is_array() {
        reader.align(8);
        let offset = reader.offset();
        let (item_offsets, items): (Vec<u64>, Vec<Value>) = reader
            .read_aligned_array(kind.alignment(), |r| {
                let at = r.offset();
                Value::decode(r, kind).map(|value| (at, value))
            })?
            .into_iter()
            .unzip();
        return Ok(Property {
            name: descriptor.name.clone(),
            offset,
            value: Value::Array { kind, items },
            item_offsets,
        });
    }

    let value = Value::decode(reader, kind)?;
    Ok(Property {
        name: descriptor.name.clone(),
        offset,
        value,
        item_offsets: Vec::new(),
    })
}
