//! Value model for data exchanged with the server
//!
//! A `Variant` is the decoded form of one server-side value as delivered by
//! the transport driver. Scalars map one-to-one; structured and union
//! values carry their type id so the binding tree can resolve the matching
//! structure definition from the driver's type dictionary and route members
//! to child elements.

use crate::node_id::NodeId;
use crate::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container holding one decoded server value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    /// Null / no value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Signed 8-bit integer
    SByte(i8),
    /// Unsigned 8-bit integer
    Byte(u8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw byte string
    ByteString(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Timestamp as milliseconds since the Unix epoch
    DateTime(u64),
    /// Array of variants
    Array(Vec<Variant>),
    /// Structured value; `None` marks an absent optional member
    Structure {
        type_id: NodeId,
        fields: Vec<Option<Variant>>,
    },
    /// Union value; selector 0 means no arm is taken, otherwise the
    /// 1-based index of the selected member
    Union {
        type_id: NodeId,
        selector: u32,
        value: Option<Box<Variant>>,
    },
    /// Text with locale, statically mapped by field names `locale`/`text`
    LocalizedText { locale: String, text: String },
    /// Namespace-qualified name, statically mapped by field names
    /// `namespaceIndex`/`name`
    QualifiedName { namespace_index: u16, name: String },
}

/// Type enumeration for Variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Null,
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    ByteString,
    DateTime,
    Array,
    Structure,
    Union,
    LocalizedText,
    QualifiedName,
}

impl VariantKind {
    /// Check if this kind decomposes into child elements
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            VariantKind::Structure
                | VariantKind::Union
                | VariantKind::LocalizedText
                | VariantKind::QualifiedName
        )
    }

    /// Get human-readable kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Null => "Null",
            VariantKind::Boolean => "Boolean",
            VariantKind::SByte => "SByte",
            VariantKind::Byte => "Byte",
            VariantKind::Int16 => "Int16",
            VariantKind::UInt16 => "UInt16",
            VariantKind::Int32 => "Int32",
            VariantKind::UInt32 => "UInt32",
            VariantKind::Int64 => "Int64",
            VariantKind::UInt64 => "UInt64",
            VariantKind::Float => "Float",
            VariantKind::Double => "Double",
            VariantKind::String => "String",
            VariantKind::ByteString => "ByteString",
            VariantKind::DateTime => "DateTime",
            VariantKind::Array => "Array",
            VariantKind::Structure => "Structure",
            VariantKind::Union => "Union",
            VariantKind::LocalizedText => "LocalizedText",
            VariantKind::QualifiedName => "QualifiedName",
        }
    }
}

impl Variant {
    /// Get the kind of this variant
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Null => VariantKind::Null,
            Variant::Boolean(_) => VariantKind::Boolean,
            Variant::SByte(_) => VariantKind::SByte,
            Variant::Byte(_) => VariantKind::Byte,
            Variant::Int16(_) => VariantKind::Int16,
            Variant::UInt16(_) => VariantKind::UInt16,
            Variant::Int32(_) => VariantKind::Int32,
            Variant::UInt32(_) => VariantKind::UInt32,
            Variant::Int64(_) => VariantKind::Int64,
            Variant::UInt64(_) => VariantKind::UInt64,
            Variant::Float(_) => VariantKind::Float,
            Variant::Double(_) => VariantKind::Double,
            Variant::String(_) => VariantKind::String,
            Variant::ByteString(_) => VariantKind::ByteString,
            Variant::DateTime(_) => VariantKind::DateTime,
            Variant::Array(_) => VariantKind::Array,
            Variant::Structure { .. } => VariantKind::Structure,
            Variant::Union { .. } => VariantKind::Union,
            Variant::LocalizedText { .. } => VariantKind::LocalizedText,
            Variant::QualifiedName { .. } => VariantKind::QualifiedName,
        }
    }

    /// Check if this variant decomposes into child elements
    pub fn is_composite(&self) -> bool {
        self.kind().is_composite()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "<null>"),
            Variant::Boolean(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{}", v),
            Variant::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Variant::DateTime(v) => write!(f, "@{}", v),
            Variant::Array(v) => write!(f, "<array[{}]>", v.len()),
            Variant::Structure { type_id, fields } => {
                write!(f, "<structure {} [{}]>", type_id, fields.len())
            }
            Variant::Union { type_id, selector, .. } => {
                write!(f, "<union {} sel={}>", type_id, selector)
            }
            Variant::LocalizedText { locale, text } => write!(f, "({}) {}", locale, text),
            Variant::QualifiedName {
                namespace_index,
                name,
            } => write!(f, "{}:{}", namespace_index, name),
        }
    }
}

/// One member of a structure definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureMember {
    pub name: String,
    pub optional: bool,
}

/// Structure definition resolved from the server's type dictionary
///
/// Member matching in the binding tree is by name, not position, so a
/// server-side field reordering between reconnects only requires the map
/// invalidation done on connection loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDefinition {
    pub type_id: NodeId,
    pub name: String,
    pub is_union: bool,
    pub members: Vec<StructureMember>,
}

impl StructureDefinition {
    /// Index of the member with the given name
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Value with quality and timestamps, the payload of every completion or
/// change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    /// Server timestamp, milliseconds since the Unix epoch
    pub server_timestamp: u64,
    /// Source timestamp, milliseconds since the Unix epoch
    pub source_timestamp: u64,
}

impl DataValue {
    /// Create a good-quality data value with identical timestamps
    pub fn new(value: Variant, timestamp: u64) -> Self {
        Self {
            value,
            status: StatusCode::GOOD,
            server_timestamp: timestamp,
            source_timestamp: timestamp,
        }
    }

    /// Create a data value carrying only a (bad) status
    pub fn from_status(status: StatusCode, timestamp: u64) -> Self {
        Self {
            value: Variant::Null,
            status,
            server_timestamp: timestamp,
            source_timestamp: timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(Variant::Int32(5).kind(), VariantKind::Int32);
        assert!(!Variant::Int32(5).is_composite());
        let s = Variant::Structure {
            type_id: NodeId::numeric(2, 100),
            fields: vec![Some(Variant::Boolean(true)), None],
        };
        assert!(s.is_composite());
    }

    #[test]
    fn test_member_index() {
        let def = StructureDefinition {
            type_id: NodeId::numeric(2, 100),
            name: "Pump".into(),
            is_union: false,
            members: vec![
                StructureMember {
                    name: "speed".into(),
                    optional: false,
                },
                StructureMember {
                    name: "enabled".into(),
                    optional: true,
                },
            ],
        };
        assert_eq!(def.member_index("enabled"), Some(1));
        assert_eq!(def.member_index("missing"), None);
    }
}
