//! Descriptor-driven cartridge header decoding.
//!
//! A [`HeaderDescriptor`] lists the named fields of a console's header as
//! absolute ROM offsets. [`decode`] slices each field out of a raw header
//! buffer and renders it according to its [`DecodeKind`].

use crate::CartridgeError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// How a field's bytes are turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecodeKind {
    /// UTF-8, invalid sequences become U+FFFD
    Text,
    IntLittle,
    IntBig,
    /// Integer rendered as `0x`-prefixed lowercase hex, any width
    HexLittle,
    HexBig,
    /// `0xHH` per byte, space separated
    ByteDump,
    /// `0bBBBBBBBB` per byte, space separated
    BitDump,
    Raw,
}

impl DecodeKind {
    /// Kinds decoded into a `u64`
    fn is_numeric(self) -> bool {
        matches!(self, DecodeKind::IntLittle | DecodeKind::IntBig)
    }
}

/// One named field of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Absolute offset in the ROM image
    pub offset: u32,
    pub length: u16,
    pub kind: DecodeKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: u32, length: u16, kind: DecodeKind) -> Self {
        Self {
            name,
            offset,
            length,
            kind,
        }
    }

    fn end(&self) -> u64 {
        self.offset as u64 + self.length as u64
    }
}

/// Ordered, immutable field table for one console family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDescriptor {
    fields: &'static [FieldSpec],
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("field '{field}' starts at 0x{offset:X}, before the header base 0x{base:X}")]
    BelowBase {
        field: &'static str,
        offset: u32,
        base: u32,
    },
    #[error("field '{field}' ends past the header region end 0x{end:X}")]
    BeyondRegion { field: &'static str, end: u64 },
    #[error("field '{field}' overlaps '{previous}'")]
    Overlap {
        field: &'static str,
        previous: &'static str,
    },
    #[error("integer field '{field}' is {length} bytes wide")]
    TooWide { field: &'static str, length: u16 },
}

impl HeaderDescriptor {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the table against the header region `[base, base + length)`.
    ///
    /// Fields must lie inside the region, must not overlap one another, and
    /// `Int*` kinds must fit in a `u64`.
    pub fn validate(&self, base: u32, length: u32) -> Result<(), DescriptorError> {
        let region_end = base as u64 + length as u64;
        let mut sorted: Vec<&FieldSpec> = self.fields.iter().collect();
        sorted.sort_by_key(|f| f.offset);

        let mut previous: Option<&FieldSpec> = None;
        for field in sorted {
            if field.offset < base {
                return Err(DescriptorError::BelowBase {
                    field: field.name,
                    offset: field.offset,
                    base,
                });
            }
            if field.end() > region_end {
                return Err(DescriptorError::BeyondRegion {
                    field: field.name,
                    end: region_end,
                });
            }
            if field.kind.is_numeric() && field.length > 8 {
                return Err(DescriptorError::TooWide {
                    field: field.name,
                    length: field.length,
                });
            }
            if let Some(prev) = previous {
                if (field.offset as u64) < prev.end() {
                    return Err(DescriptorError::Overlap {
                        field: field.name,
                        previous: prev.name,
                    });
                }
            }
            previous = Some(field);
        }
        Ok(())
    }
}

/// A decoded field value, typed by the field's [`DecodeKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Text(String),
    Int(u64),
    /// Hex, byte and bit renderings
    Formatted(String),
    Raw(Vec<u8>),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Text(s) | DecodedValue::Formatted(s) => f.write_str(s),
            DecodedValue::Int(v) => write!(f, "{}", v),
            DecodedValue::Raw(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Field values in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedHeader {
    fields: Vec<(&'static str, DecodedValue)>,
}

impl DecodedHeader {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DecodedValue)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(n, _)| *n).collect()
    }

    /// `(name, rendered value)` pairs ready for display.
    pub fn display_pairs(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    /// JSON array of `{"field": .., "value": ..}` objects, keeping field order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.fields
                .iter()
                .map(|(n, v)| serde_json::json!({ "field": n, "value": v }))
                .collect(),
        )
    }
}

/// Decode every field of `descriptor` out of `raw_header`.
///
/// `header_base` is the ROM offset `raw_header[0]` was read from.
pub fn decode(
    raw_header: &[u8],
    descriptor: &HeaderDescriptor,
    header_base: u32,
) -> Result<DecodedHeader, CartridgeError> {
    let mut fields = Vec::with_capacity(descriptor.len());
    for spec in descriptor.fields() {
        let chunk = field_slice(raw_header, spec, header_base)?;
        fields.push((spec.name, decode_field(spec, chunk)?));
    }
    Ok(DecodedHeader { fields })
}

fn field_slice<'a>(
    raw_header: &'a [u8],
    spec: &FieldSpec,
    header_base: u32,
) -> Result<&'a [u8], CartridgeError> {
    let out_of_range = || CartridgeError::Range {
        field: spec.name,
        offset: spec.offset,
        length: spec.length,
        available: raw_header.len(),
    };
    let start = spec
        .offset
        .checked_sub(header_base)
        .ok_or_else(out_of_range)? as usize;
    let end = start + spec.length as usize;
    raw_header.get(start..end).ok_or_else(out_of_range)
}

fn decode_field(spec: &FieldSpec, chunk: &[u8]) -> Result<DecodedValue, CartridgeError> {
    if spec.kind.is_numeric() && chunk.len() > 8 {
        return Err(CartridgeError::FieldWidth {
            field: spec.name,
            length: spec.length,
        });
    }
    let value = match spec.kind {
        DecodeKind::Text => DecodedValue::Text(String::from_utf8_lossy(chunk).into_owned()),
        DecodeKind::IntLittle => DecodedValue::Int(int_le(chunk)),
        DecodeKind::IntBig => DecodedValue::Int(int_be(chunk)),
        DecodeKind::HexLittle => DecodedValue::Formatted(hex_of(chunk.iter().rev())),
        DecodeKind::HexBig => DecodedValue::Formatted(hex_of(chunk.iter())),
        DecodeKind::ByteDump => DecodedValue::Formatted(join_bytes(chunk, |b| format!("{:#04x}", b))),
        DecodeKind::BitDump => DecodedValue::Formatted(join_bytes(chunk, |b| format!("{:#010b}", b))),
        DecodeKind::Raw => DecodedValue::Raw(chunk.to_vec()),
    };
    Ok(value)
}

fn int_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn int_le(bytes: &[u8]) -> u64 {
    bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// `0x` hex of a most-significant-first byte sequence, leading zeros trimmed.
fn hex_of<'a>(msb_first: impl Iterator<Item = &'a u8>) -> String {
    let mut digits = String::from("0x");
    let mut significant = msb_first.skip_while(|&&b| b == 0);
    match significant.next() {
        Some(first) => digits.push_str(&format!("{:x}", first)),
        None => digits.push('0'),
    }
    for b in significant {
        digits.push_str(&format!("{:02x}", b));
    }
    digits
}

fn join_bytes(bytes: &[u8], render: impl Fn(u8) -> String) -> String {
    bytes.iter().map(|&b| render(b)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVERY_KIND: &[FieldSpec] = &[
        FieldSpec::new("text", 0x10, 4, DecodeKind::Text),
        FieldSpec::new("le", 0x14, 2, DecodeKind::IntLittle),
        FieldSpec::new("be", 0x16, 2, DecodeKind::IntBig),
        FieldSpec::new("hex le", 0x18, 2, DecodeKind::HexLittle),
        FieldSpec::new("hex be", 0x1A, 2, DecodeKind::HexBig),
        FieldSpec::new("bytes", 0x1C, 2, DecodeKind::ByteDump),
        FieldSpec::new("bits", 0x1E, 1, DecodeKind::BitDump),
        FieldSpec::new("raw", 0x1F, 1, DecodeKind::Raw),
    ];

    fn sample() -> Vec<u8> {
        vec![
            b'S', b'E', b'G', b'A', // text
            0x34, 0x12, // le
            0x12, 0x34, // be
            0x1A, 0x00, // hex le
            0x00, 0x0F, // hex be
            0x00, 0xAB, // bytes
            0x05, // bits
            0xFE, // raw
        ]
    }

    #[test]
    fn test_decode_every_kind() {
        let header = decode(&sample(), &HeaderDescriptor::new(EVERY_KIND), 0x10).unwrap();

        assert_eq!(header.get("text"), Some(&DecodedValue::Text("SEGA".to_string())));
        assert_eq!(header.get("le"), Some(&DecodedValue::Int(0x1234)));
        assert_eq!(header.get("be"), Some(&DecodedValue::Int(0x1234)));
        assert_eq!(header.get("hex le"), Some(&DecodedValue::Formatted("0x1a".to_string())));
        assert_eq!(header.get("hex be"), Some(&DecodedValue::Formatted("0xf".to_string())));
        assert_eq!(header.get("bytes"), Some(&DecodedValue::Formatted("0x00 0xab".to_string())));
        assert_eq!(header.get("bits"), Some(&DecodedValue::Formatted("0b00000101".to_string())));
        assert_eq!(header.get("raw"), Some(&DecodedValue::Raw(vec![0xFE])));
    }

    #[test]
    fn test_field_order_follows_descriptor() {
        const REVERSED: &[FieldSpec] = &[
            FieldSpec::new("second", 2, 2, DecodeKind::IntBig),
            FieldSpec::new("first", 0, 2, DecodeKind::IntBig),
        ];
        let header = decode(&[0, 1, 0, 2], &HeaderDescriptor::new(REVERSED), 0).unwrap();
        assert_eq!(header.names(), vec!["second", "first"]);
        assert_eq!(header.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_dropped() {
        const TEXT: &[FieldSpec] = &[FieldSpec::new("name", 0, 4, DecodeKind::Text)];
        let header = decode(&[b'A', 0xFF, b'B', 0xC3], &HeaderDescriptor::new(TEXT), 0).unwrap();
        assert_eq!(
            header.get("name"),
            Some(&DecodedValue::Text("A\u{FFFD}B\u{FFFD}".to_string()))
        );
    }

    #[test]
    fn test_short_buffer_is_range_error() {
        let short = &sample()[..10];
        let err = decode(short, &HeaderDescriptor::new(EVERY_KIND), 0x10).unwrap_err();
        match err {
            CartridgeError::Range { field, available, .. } => {
                assert_eq!(field, "hex be");
                assert_eq!(available, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_offset_below_base_is_range_error() {
        const LOW: &[FieldSpec] = &[FieldSpec::new("low", 0x0F, 1, DecodeKind::Raw)];
        assert!(matches!(
            decode(&sample(), &HeaderDescriptor::new(LOW), 0x10),
            Err(CartridgeError::Range { .. })
        ));
    }

    #[test]
    fn test_wide_integer_is_rejected() {
        const WIDE: &[FieldSpec] = &[FieldSpec::new("wide", 0, 9, DecodeKind::IntBig)];
        assert!(matches!(
            decode(&[0u8; 9], &HeaderDescriptor::new(WIDE), 0),
            Err(CartridgeError::FieldWidth { length: 9, .. })
        ));
        assert_eq!(
            HeaderDescriptor::new(WIDE).validate(0, 9),
            Err(DescriptorError::TooWide {
                field: "wide",
                length: 9
            })
        );
    }

    #[test]
    fn test_wide_hex_is_rendered_in_full() {
        const WIDE: &[FieldSpec] = &[
            FieldSpec::new("be", 0, 10, DecodeKind::HexBig),
            FieldSpec::new("le", 10, 10, DecodeKind::HexLittle),
            FieldSpec::new("zero", 20, 12, DecodeKind::HexBig),
        ];
        let mut raw = vec![0u8; 32];
        raw[1] = 0x0A;
        raw[9] = 0x01;
        raw[10] = 0xFF;
        raw[19] = 0x01;

        let descriptor = HeaderDescriptor::new(WIDE);
        assert!(descriptor.validate(0, 32).is_ok());
        let header = decode(&raw, &descriptor, 0).unwrap();
        assert_eq!(
            header.get("be"),
            Some(&DecodedValue::Formatted("0xa0000000000000001".to_string()))
        );
        assert_eq!(
            header.get("le"),
            Some(&DecodedValue::Formatted("0x10000000000000000ff".to_string()))
        );
        assert_eq!(header.get("zero"), Some(&DecodedValue::Formatted("0x0".to_string())));
    }

    #[test]
    fn test_eight_byte_integer_fits() {
        const FULL: &[FieldSpec] = &[FieldSpec::new("full", 0, 8, DecodeKind::IntLittle)];
        let header = decode(&[0xFF; 8], &HeaderDescriptor::new(FULL), 0).unwrap();
        assert_eq!(header.get("full"), Some(&DecodedValue::Int(u64::MAX)));
    }

    #[test]
    fn test_validate_catches_overlap_and_bounds() {
        const OVERLAP: &[FieldSpec] = &[
            FieldSpec::new("a", 0x10, 4, DecodeKind::Raw),
            FieldSpec::new("b", 0x12, 2, DecodeKind::Raw),
        ];
        assert_eq!(
            HeaderDescriptor::new(OVERLAP).validate(0x10, 0x10),
            Err(DescriptorError::Overlap {
                field: "b",
                previous: "a"
            })
        );

        assert!(matches!(
            HeaderDescriptor::new(EVERY_KIND).validate(0x11, 0x0F),
            Err(DescriptorError::BelowBase { field: "text", .. })
        ));
        assert!(matches!(
            HeaderDescriptor::new(EVERY_KIND).validate(0x10, 0x0F),
            Err(DescriptorError::BeyondRegion { field: "raw", .. })
        ));
        assert!(HeaderDescriptor::new(EVERY_KIND).validate(0x10, 0x10).is_ok());
    }

    #[test]
    fn test_display_pairs_and_json() {
        let header = decode(&sample(), &HeaderDescriptor::new(EVERY_KIND), 0x10).unwrap();
        let pairs = header.display_pairs();
        assert_eq!(pairs[0], ("text".to_string(), "SEGA".to_string()));
        assert_eq!(pairs[7], ("raw".to_string(), "fe".to_string()));

        let json = header.to_json();
        assert_eq!(json[1]["field"], "le");
        assert_eq!(json[1]["value"], 0x1234);
        assert_eq!(json[3]["value"], "0x1a");
    }
}
