//! Conversion between `exif` field values and [`RawValue`]s.

use ::exif::{Field, Rational, Value};

use super::block::Endian;
use super::tags::{self, IfdKind};
use crate::raw::RawValue;

/// Decode a field according to its type and where it lives.
///
/// XP fields are always UTF-16LE whatever their declared type, and GPS
/// coordinate tags become a rational triple when they hold exactly three
/// rationals. ASCII strings are re-joined with their NUL separators.
pub fn decode(kind: IfdKind, field: &Field) -> RawValue {
    let tag = field.tag.number();
    match &field.value {
        Value::Byte(bytes) | Value::Undefined(bytes, _)
            if matches!(kind, IfdKind::Image(_)) && tags::is_xp(tag) =>
        {
            RawValue::Utf16(bytes.clone())
        }
        Value::Ascii(parts) => RawValue::Ascii(
            parts
                .iter()
                .flat_map(|p| p.iter().copied().chain([0]))
                .collect(),
        ),
        Value::Byte(v) => RawValue::Integer(v.iter().map(|&b| i64::from(b)).collect()),
        Value::SByte(v) => RawValue::Integer(v.iter().map(|&b| i64::from(b)).collect()),
        Value::Short(v) => RawValue::Integer(v.iter().map(|&n| i64::from(n)).collect()),
        Value::SShort(v) => RawValue::Integer(v.iter().map(|&n| i64::from(n)).collect()),
        Value::Long(v) => RawValue::Integer(v.iter().map(|&n| i64::from(n)).collect()),
        Value::SLong(v) => RawValue::Integer(v.iter().map(|&n| i64::from(n)).collect()),
        Value::Rational(v) => {
            let pairs: Vec<(u32, u32)> = v.iter().map(|r| (r.num, r.denom)).collect();
            match pairs.as_slice() {
                [d, m, s] if kind == IfdKind::Gps && tags::is_gps_dms(tag) => {
                    RawValue::RationalTriple([*d, *m, *s])
                }
                _ => RawValue::Rational(pairs),
            }
        }
        Value::SRational(v) => RawValue::SRational(v.iter().map(|r| (r.num, r.denom)).collect()),
        Value::Float(v) => RawValue::Float(v.iter().map(|&f| f64::from(f)).collect()),
        Value::Double(v) => RawValue::Float(v.clone()),
        Value::Undefined(bytes, _) => RawValue::Bytes(bytes.clone()),
        // Unknown types carry no payload; the block refuses to serialize them.
        _ => RawValue::Bytes(Vec::new()),
    }
}

/// A single ASCII string.
pub fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

pub fn rationals(values: &[(u32, u32)]) -> Value {
    Value::Rational(
        values
            .iter()
            .map(|&(num, denom)| Rational { num, denom })
            .collect(),
    )
}

/// Raw bytes of a field used as an opaque carrier (the TIFF XMP and
/// IPTC-NAA tags). Writers disagree on the declared type, so LONG arrays are
/// turned back into the bytes they were stored as.
pub fn payload_bytes(value: &Value, endian: Endian) -> Option<Vec<u8>> {
    match value {
        Value::Byte(bytes) | Value::Undefined(bytes, _) => Some(bytes.clone()),
        Value::Ascii(parts) => Some(parts.concat()),
        Value::Long(words) => Some(
            words
                .iter()
                .flat_map(|w| match endian {
                    Endian::Big => w.to_be_bytes(),
                    Endian::Little => w.to_le_bytes(),
                })
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::exif::{Context, In, Tag};

    fn field(context: Context, tag: u16, value: Value) -> Field {
        Field {
            tag: Tag(context, tag),
            ifd_num: In::PRIMARY,
            value,
        }
    }

    #[test]
    fn gps_latitude_is_a_triple() {
        let f = field(
            Context::Gps,
            tags::GPS_LATITUDE,
            rationals(&[(38, 1), (15, 1), (153, 10)]),
        );
        assert_eq!(
            decode(IfdKind::Gps, &f),
            RawValue::RationalTriple([(38, 1), (15, 1), (153, 10)])
        );
        // Outside the GPS directory the same tag number is a plain list.
        assert_eq!(
            decode(IfdKind::Exif, &f),
            RawValue::Rational(vec![(38, 1), (15, 1), (153, 10)])
        );
    }

    #[test]
    fn xp_fields_are_utf16() {
        let f = field(Context::Tiff, tags::XP_TITLE, Value::Byte(vec![b'A', 0, 0, 0]));
        assert_eq!(
            decode(IfdKind::Image(0), &f),
            RawValue::Utf16(vec![b'A', 0, 0, 0])
        );
    }

    #[test]
    fn ascii_keeps_its_separators() {
        let f = field(
            Context::Tiff,
            tags::ARTIST,
            Value::Ascii(vec![b"Ann".to_vec(), b"Bob".to_vec()]),
        );
        assert_eq!(
            decode(IfdKind::Image(0), &f),
            RawValue::Ascii(b"Ann\0Bob\0".to_vec())
        );
    }

    #[test]
    fn signed_and_float_values() {
        let f = field(Context::Exif, 0x9204, Value::SShort(vec![-3]));
        assert_eq!(decode(IfdKind::Exif, &f), RawValue::Integer(vec![-3]));
        let f = field(Context::Exif, 0x1234, Value::Double(vec![2.5]));
        assert_eq!(decode(IfdKind::Exif, &f), RawValue::Float(vec![2.5]));
    }

    #[test]
    fn long_payload_follows_byte_order() {
        let value = Value::Long(vec![0x1C02_0500]);
        assert_eq!(
            payload_bytes(&value, Endian::Big),
            Some(vec![0x1C, 0x02, 0x05, 0x00])
        );
        assert_eq!(
            payload_bytes(&value, Endian::Little),
            Some(vec![0x00, 0x05, 0x02, 0x1C])
        );
        assert_eq!(payload_bytes(&Value::Short(vec![1]), Endian::Big), None);
    }
}
