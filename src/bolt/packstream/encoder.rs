//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Writes PackStream values into a growable byte buffer.
///
/// Every value is written in its smallest legal representation.
#[derive(Debug)]
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Encode any value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => self.encode_bytes(b)?,
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(items) => self.encode_list(items)?,
            PackStreamValue::Map(map) => self.encode_map(map)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    pub fn encode_int(&mut self, value: i64) {
        if TINY_INT_RANGE.contains(&value) {
            self.buffer.put_u8(value as u8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        self.write_header("bytes", value.len(), None, &[BYTES_8, BYTES_16, BYTES_32])?;
        self.buffer.put_slice(value);
        Ok(())
    }

    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.write_header(
            "string",
            value.len(),
            Some(TINY_STRING),
            &[STRING_8, STRING_16, STRING_32],
        )?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn encode_list(&mut self, items: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_header("list", items.len(), Some(TINY_LIST), &[LIST_8, LIST_16, LIST_32])?;
        items.iter().try_for_each(|item| self.encode(item))
    }

    pub fn encode_map(
        &mut self,
        map: &HashMap<String, PackStreamValue>,
    ) -> Result<(), PackStreamError> {
        self.write_header("map", map.len(), Some(TINY_MAP), &[MAP_8, MAP_16, MAP_32])?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        self.write_header(
            "structure",
            s.fields.len(),
            Some(TINY_STRUCT),
            &[STRUCT_8, STRUCT_16],
        )?;
        self.buffer.put_u8(s.tag);
        s.fields.iter().try_for_each(|field| self.encode(field))
    }

    /// Write a size header, using the tiny nibble form when one exists and
    /// the size fits, otherwise the narrowest of the 8/16/32-bit `wide` markers.
    fn write_header(
        &mut self,
        kind: &'static str,
        len: usize,
        tiny: Option<u8>,
        wide: &[u8],
    ) -> Result<(), PackStreamError> {
        if let Some(base) = tiny {
            if len <= TINY_MAX_LEN {
                self.buffer.put_u8(base | len as u8);
                return Ok(());
            }
        }
        match wide {
            [m8, ..] if len <= u8::MAX as usize => {
                self.buffer.put_u8(*m8);
                self.buffer.put_u8(len as u8);
            }
            [_, m16, ..] if len <= u16::MAX as usize => {
                self.buffer.put_u8(*m16);
                self.buffer.put_u16(len as u16);
            }
            [_, _, m32] if len <= u32::MAX as usize => {
                self.buffer.put_u8(*m32);
                self.buffer.put_u32(len as u32);
            }
            _ => return Err(PackStreamError::ValueTooLarge(kind, len)),
        }
        Ok(())
    }
}

impl Default for PackStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}
