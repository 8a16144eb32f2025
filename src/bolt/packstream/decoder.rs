//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Deepest container nesting accepted from the wire.
pub const MAX_DEPTH: usize = 256;

/// Reads PackStream values from a borrowed byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    /// Containers currently open
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, depth: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.take::<1>()?[0];

        if let Some(i) = tiny_int(marker) {
            return Ok(PackStreamValue::Integer(i));
        }
        if let Some((kind, len)) = tiny_container(marker) {
            return match kind {
                TinyKind::String => self.string(len),
                TinyKind::List => self.list(len),
                TinyKind::Map => self.map(len),
                TinyKind::Struct => self.structure(len),
            };
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(f64::from_be_bytes(self.take()?))),

            INT_8 => Ok(PackStreamValue::Integer(i8::from_be_bytes(self.take()?) as i64)),
            INT_16 => Ok(PackStreamValue::Integer(i16::from_be_bytes(self.take()?) as i64)),
            INT_32 => Ok(PackStreamValue::Integer(i32::from_be_bytes(self.take()?) as i64)),
            INT_64 => Ok(PackStreamValue::Integer(i64::from_be_bytes(self.take()?))),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.slice(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.size(marker - STRING_8)?;
                self.string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.size(marker - LIST_8)?;
                self.list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.size(marker - MAP_8)?;
                self.map(len)
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.size(marker - STRUCT_8)?;
                self.structure(len)
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    /// Read a size field: `width` 0, 1 and 2 select 8, 16 and 32 bits.
    fn size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        Ok(match width {
            0 => self.take::<1>()?[0] as usize,
            1 => u16::from_be_bytes(self.take()?) as usize,
            _ => u32::from_be_bytes(self.take()?) as usize,
        })
    }

    fn string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.slice(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_owned()))
    }

    /// Decode the contents of a container one level deeper.
    fn nested<F>(&mut self, read: F) -> Result<PackStreamValue, PackStreamError>
    where
        F: FnOnce(&mut Self) -> Result<PackStreamValue, PackStreamError>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(PackStreamError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|d| d.list_items(len))
    }

    fn list_items(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        // Every item takes at least one byte, so the remaining input bounds the allocation.
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(PackStreamValue::List(items))
    }

    fn map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|d| d.map_entries(len))
    }

    fn map_entries(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut map = HashMap::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            map.insert(key, value);
        }
        Ok(PackStreamValue::Map(map))
    }

    fn structure(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|d| d.structure_fields(field_count))
    }

    fn structure_fields(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.take::<1>()?[0];
        let mut fields = Vec::with_capacity(field_count.min(self.remaining()));
        for _ in 0..field_count {
            fields.push(self.decode()?);
        }
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], PackStreamError> {
        if self.data.remaining() < N {
            return Err(PackStreamError::UnexpectedEof);
        }
        let mut out = [0u8; N];
        self.data.copy_to_slice(&mut out);
        Ok(out)
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.data.len() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(PackStreamError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::encode;

    #[test]
    fn test_decodes_scalars() {
        assert_eq!(decode(&[0xC0]).unwrap(), PackStreamValue::Null);
        assert_eq!(decode(&[0xC3]).unwrap(), PackStreamValue::Boolean(true));
        assert_eq!(decode(&[0xFF]).unwrap(), PackStreamValue::Integer(-1));
        assert_eq!(decode(&[0xC8, 0x80]).unwrap(), PackStreamValue::Integer(-128));
        assert_eq!(decode(&[0xC9, 0x03, 0xE8]).unwrap(), PackStreamValue::Integer(1000));
        assert_eq!(
            decode(&[0xC1, 0x3F, 0xF8, 0, 0, 0, 0, 0, 0]).unwrap(),
            PackStreamValue::Float(1.5)
        );
    }

    #[test]
    fn test_decodes_nested_containers() {
        // {"k": [1, "a"]}
        let data = [0xA1, 0x81, b'k', 0x92, 0x01, 0x81, b'a'];
        let value = decode(&data).unwrap();
        let list = value.as_map().unwrap()["k"].as_list().unwrap().to_vec();
        assert_eq!(
            list,
            vec![PackStreamValue::Integer(1), PackStreamValue::from("a")]
        );
    }

    #[test]
    fn test_sized_string_and_structure() {
        let text = "b".repeat(40);
        let mut data = vec![STRING_8, 40];
        data.extend_from_slice(text.as_bytes());
        assert_eq!(decode(&data).unwrap(), PackStreamValue::String(text));

        let value = decode(&[0xB2, 0x44, 0x01, 0xC0]).unwrap();
        let s = value.as_structure().unwrap();
        assert_eq!(s.tag, 0x44);
        assert_eq!(s.fields, vec![PackStreamValue::Integer(1), PackStreamValue::Null]);
    }

    #[test]
    fn test_encoder_output_decodes_to_the_same_value() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackStreamValue::from("Ada"));
        props.insert("bytes".to_string(), PackStreamValue::Bytes(vec![0; 300]));
        props.insert("big".to_string(), PackStreamValue::Integer(i64::MAX));
        let value = PackStreamValue::List(vec![
            PackStreamValue::Map(props),
            PackStreamValue::Float(-0.25),
            PackStreamValue::List((0..20).map(PackStreamValue::Integer).collect()),
        ]);
        assert_eq!(decode(&encode(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn test_malformed_input_errors() {
        assert!(matches!(decode(&[]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x85, b'a']), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0xC4]), Err(PackStreamError::UnknownMarker(0xC4))));
        assert!(matches!(decode(&[0xA1, 0x01, 0x01]), Err(PackStreamError::InvalidMapKey)));
        assert!(matches!(decode(&[0x82, 0xC3, 0x28]), Err(PackStreamError::InvalidUtf8(_))));
        assert!(matches!(decode(&[0x01, 0x02]), Err(PackStreamError::TrailingBytes(1))));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut deep = vec![0x91; 1_000_000];
        deep.push(0xC0);
        assert!(matches!(decode(&deep), Err(PackStreamError::TooDeep(MAX_DEPTH))));

        let mut fits = vec![0x91; MAX_DEPTH];
        fits.push(0xC0);
        let mut value = decode(&fits).unwrap();
        let mut levels = 0;
        while let PackStreamValue::List(mut items) = value {
            levels += 1;
            value = items.remove(0);
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(value, PackStreamValue::Null);

        // a structure counts as a level too
        let mut with_struct = vec![0x91; MAX_DEPTH - 1];
        with_struct.extend_from_slice(&[0xB1, 0x4E, 0x91, 0xC0]);
        assert!(matches!(decode(&with_struct), Err(PackStreamError::TooDeep(_))));
    }
}
