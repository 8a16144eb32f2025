//! PackStream value model.

use std::collections::HashMap;

/// A value as it travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<PackStreamValue>),
    /// Keys are always strings on the wire.
    Map(HashMap<String, PackStreamValue>),
    Structure(PackStreamStructure),
}

/// A tagged record of fields; messages and graph/temporal values are both structures.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    pub tag: u8,
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PackStreamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, PackStreamValue>> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PackStreamValue::Null => "Null",
            PackStreamValue::Boolean(_) => "Boolean",
            PackStreamValue::Integer(_) => "Integer",
            PackStreamValue::Float(_) => "Float",
            PackStreamValue::Bytes(_) => "Bytes",
            PackStreamValue::String(_) => "String",
            PackStreamValue::List(_) => "List",
            PackStreamValue::Map(_) => "Map",
            PackStreamValue::Structure(_) => "Structure",
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for PackStreamValue {
                fn from(v: $source) -> Self {
                    PackStreamValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Boolean,
    i64 => Integer,
    i32 => Integer,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Vec<PackStreamValue> => List,
    HashMap<String, PackStreamValue> => Map,
    PackStreamStructure => Structure,
}
