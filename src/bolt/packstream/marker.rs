//! PackStream marker bytes and structure tags.
//!
//! Every PackStream value starts with a marker byte. Small strings, lists,
//! maps and structures pack their size into the low nibble of the marker.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const TINY_STRING: u8 = 0x80;
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const TINY_LIST: u8 = 0x90;
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const TINY_MAP: u8 = 0xA0;
pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const TINY_STRUCT: u8 = 0xB0;
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// Largest size that fits in a tiny marker's low nibble.
pub const TINY_MAX_LEN: usize = 0x0F;

/// Integers in this range are written as the marker byte itself.
pub const TINY_INT_RANGE: std::ops::RangeInclusive<i64> = -16..=127;

/// Structure tags for the value types carried inside records and parameters.
pub mod tag {
    pub const NODE: u8 = 0x4E;
    pub const RELATIONSHIP: u8 = 0x52;
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
    pub const PATH: u8 = 0x50;

    pub const DATE: u8 = 0x44;
    pub const TIME: u8 = 0x54;
    pub const LOCAL_TIME: u8 = 0x74;
    pub const DATE_TIME: u8 = 0x46;
    pub const DATE_TIME_ZONE_ID: u8 = 0x66;
    pub const LOCAL_DATE_TIME: u8 = 0x64;
    pub const DURATION: u8 = 0x45;

    pub const POINT_2D: u8 = 0x58;
    pub const POINT_3D: u8 = 0x59;
}

/// The container kind a tiny marker (`0x80..=0xBF`) announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TinyKind {
    String,
    List,
    Map,
    Struct,
}

/// Split a tiny container marker into its kind and packed size.
#[inline]
pub fn tiny_container(marker: u8) -> Option<(TinyKind, usize)> {
    let len = (marker & 0x0F) as usize;
    let kind = match marker & 0xF0 {
        TINY_STRING => TinyKind::String,
        TINY_LIST => TinyKind::List,
        TINY_MAP => TinyKind::Map,
        TINY_STRUCT => TinyKind::Struct,
        _ => return None,
    };
    Some((kind, len))
}

/// Tiny integers occupy `0x00..=0x7F` (0 to 127) and `0xF0..=0xFF` (-16 to -1).
#[inline]
pub fn tiny_int(marker: u8) -> Option<i64> {
    match marker {
        0x00..=0x7F | 0xF0..=0xFF => Some(marker as i8 as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_ints_cover_both_ends() {
        assert_eq!(tiny_int(0x00), Some(0));
        assert_eq!(tiny_int(0x7F), Some(127));
        assert_eq!(tiny_int(0xF0), Some(-16));
        assert_eq!(tiny_int(0xFF), Some(-1));
        assert_eq!(tiny_int(NULL), None);
        assert_eq!(tiny_int(0x80), None);
    }

    #[test]
    fn test_tiny_containers_split_kind_and_size() {
        assert_eq!(tiny_container(0x85), Some((TinyKind::String, 5)));
        assert_eq!(tiny_container(0x90), Some((TinyKind::List, 0)));
        assert_eq!(tiny_container(0xAF), Some((TinyKind::Map, 15)));
        assert_eq!(tiny_container(0xB3), Some((TinyKind::Struct, 3)));
        assert_eq!(tiny_container(STRING_8), None);
        assert_eq!(tiny_container(0x10), None);
    }
}
