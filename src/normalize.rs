//! Raw → normalized conversion, and the inverse encoders the writer uses.

use crate::exif::{tags, value, ExifBlock, IfdKind, Value};
use crate::iptc::{self, IptcData};
use crate::metadata::{format_number, split_list, strip_control, GpsCoordinate, MetaValue, NormalizedMetadata};
use crate::raw::{RawTagSet, RawValue};
use crate::xmp::{XmpPacket, XmpValue};

/// Scale used for float → rational conversion. Values with more than six
/// decimal places lose precision.
pub const RATIONAL_SCALE: f64 = 1_000_000.0;

const GPS_DECIMALS: f64 = 1_000_000.0;

/// Output of [`normalize`].
#[derive(Debug, Default)]
pub struct Normalized {
    pub metadata: NormalizedMetadata,
    /// Fields whose bytes were not valid UTF-8 and were decoded as Latin-1.
    pub fallbacks: Vec<String>,
}

/// Build the normalized view of a raw tag set.
pub fn normalize(raw: &RawTagSet) -> Normalized {
    let mut out = Normalized::default();
    if let Some(block) = &raw.exif {
        normalize_exif(block, &mut out);
    }
    if let Some(xmp) = &raw.xmp {
        normalize_xmp(xmp, &mut out.metadata);
    }
    if let Some(iptc) = &raw.iptc {
        normalize_iptc(iptc, &mut out);
    }
    for (key, value) in &raw.text {
        let value = strip_control(value);
        if value.trim().is_empty() {
            continue;
        }
        let joined = match out.metadata.text(key) {
            Some(existing) => format!("{existing}\n{value}"),
            None => value,
        };
        out.metadata.set(key.clone(), joined);
    }
    out
}

// ── EXIF ──

fn normalize_exif(block: &ExifBlock, out: &mut Normalized) {
    for (kind, field) in block.entries() {
        let tag = field.tag.number();
        if tags::is_hidden(kind, tag) {
            continue;
        }
        if kind == IfdKind::Gps
            && matches!(
                tag,
                tags::GPS_LATITUDE_REF | tags::GPS_LONGITUDE_REF | tags::GPS_ALTITUDE_REF
            )
        {
            continue;
        }
        let key = tags::field_key(kind, tag);
        let raw = value::decode(kind, field);
        let value = match (kind, tag) {
            (IfdKind::Gps, tags::GPS_LATITUDE | tags::GPS_LONGITUDE) => {
                let reference = block.get(IfdKind::Gps, tag - 1).and_then(|f| match &f.value {
                    Value::Ascii(parts) => parts
                        .first()
                        .map(|p| String::from_utf8_lossy(p).trim().to_string()),
                    _ => None,
                });
                gps_value(&raw, reference.as_deref())
            }
            (IfdKind::Gps, tags::GPS_ALTITUDE) => {
                let below = block
                    .get(IfdKind::Gps, tags::GPS_ALTITUDE_REF)
                    .and_then(|f| f.value.get_uint(0))
                    == Some(1);
                altitude_value(&raw, below)
            }
            (IfdKind::Image(_), tag) if tags::is_xp(tag) => xp_value(&raw, tags::is_xp_list(tag)),
            (IfdKind::Exif, tags::USER_COMMENT) => match &raw {
                RawValue::Bytes(bytes) => {
                    let (text, fallback) = decode_user_comment(bytes);
                    if fallback {
                        log::warn!("{key}: not valid UTF-8, decoded as Latin-1");
                        out.fallbacks.push(key.clone());
                    }
                    Some(MetaValue::Text(text))
                }
                other => generic_value(kind, tag, other, &key, &mut out.fallbacks),
            },
            _ => generic_value(kind, tag, &raw, &key, &mut out.fallbacks),
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            out.metadata.set(key, value);
        }
    }
}

fn gps_value(raw: &RawValue, reference: Option<&str>) -> Option<MetaValue> {
    let decimal = match raw {
        RawValue::RationalTriple(dms) => dms_to_decimal(*dms),
        RawValue::Rational(r) if !r.is_empty() => rational_to_f64(r[0].0, r[0].1),
        _ => return None,
    };
    let negative = matches!(reference, Some(r) if r.starts_with(['S', 's', 'W', 'w']));
    let signed = if negative { -decimal } else { decimal };
    Some(MetaValue::Gps(GpsCoordinate::new(round_gps(signed))))
}

fn altitude_value(raw: &RawValue, below_sea_level: bool) -> Option<MetaValue> {
    let RawValue::Rational(r) = raw else {
        return None;
    };
    let &(n, d) = r.first()?;
    let meters = rational_to_f64(n, d);
    Some(MetaValue::Number(if below_sea_level { -meters } else { meters }))
}

fn xp_value(raw: &RawValue, is_list: bool) -> Option<MetaValue> {
    let bytes = match raw {
        RawValue::Utf16(b) | RawValue::Bytes(b) => b,
        _ => return None,
    };
    let text = decode_utf16le(bytes);
    Some(if is_list {
        MetaValue::List(
            split_list(&text)
                .iter()
                .map(|item| strip_control(item))
                .filter(|item| !item.is_empty())
                .collect(),
        )
    } else {
        MetaValue::Text(strip_control(&text).trim().to_string())
    })
}

fn generic_value(
    kind: IfdKind,
    tag: u16,
    raw: &RawValue,
    key: &str,
    fallbacks: &mut Vec<String>,
) -> Option<MetaValue> {
    match raw {
        RawValue::Ascii(bytes) => {
            let (text, fallback) = decode_text(bytes);
            if fallback {
                log::warn!("{key}: not valid UTF-8, decoded as Latin-1");
                fallbacks.push(key.to_string());
            }
            Some(MetaValue::Text(text.trim_end().to_string()))
        }
        RawValue::Bytes(bytes) => {
            let printable = !bytes.is_empty()
                && bytes
                    .iter()
                    .all(|&b| b == 0 || b.is_ascii_graphic() || b == b' ');
            if tags::is_textual_undefined(kind, tag) || printable {
                let (text, _) = decode_text(bytes);
                Some(MetaValue::Text(text.trim().to_string()))
            } else {
                Some(MetaValue::Text(format!("<{} bytes>", bytes.len())))
            }
        }
        RawValue::Integer(values) => numbers(values.iter().map(|&v| v as f64)),
        RawValue::Rational(values) => numbers(values.iter().map(|&(n, d)| rational_to_f64(n, d))),
        RawValue::SRational(values) => numbers(values.iter().map(|&(n, d)| srational_to_f64(n, d))),
        RawValue::RationalTriple(dms) => Some(MetaValue::Number(round_gps(dms_to_decimal(*dms)))),
        RawValue::Float(values) => numbers(values.iter().copied()),
        RawValue::Utf16(bytes) => Some(MetaValue::Text(strip_control(&decode_utf16le(bytes)))),
        RawValue::Text(s) => Some(MetaValue::Text(s.clone())),
        RawValue::TextList(items) => Some(MetaValue::List(items.clone())),
    }
}

/// One number stays a number; several become a list of formatted numbers.
fn numbers(values: impl Iterator<Item = f64>) -> Option<MetaValue> {
    let values: Vec<f64> = values.collect();
    match values.as_slice() {
        [] => None,
        [single] => Some(MetaValue::Number(*single)),
        many => Some(MetaValue::List(many.iter().map(|v| format_number(*v)).collect())),
    }
}

// ── XMP / IPTC ──

fn normalize_xmp(xmp: &XmpPacket, meta: &mut NormalizedMetadata) {
    for prop in &xmp.properties {
        let value = match &prop.value {
            XmpValue::Text(s) => MetaValue::Text(s.trim().to_string()),
            XmpValue::List(items) => MetaValue::List(items.clone()),
        };
        if !value.is_empty() {
            meta.set(prop.key(), value);
        }
    }
}

fn normalize_iptc(data: &IptcData, out: &mut Normalized) {
    for ds in &data.datasets {
        // Envelope record and the record version are bookkeeping
        if ds.record == 1 || (ds.record == 2 && ds.dataset == 0) {
            continue;
        }
        let key = iptc::dataset_key(ds.record, ds.dataset);
        let (text, fallback) = decode_text(&ds.data);
        if fallback {
            log::warn!("{key}: not valid UTF-8, decoded as Latin-1");
            out.fallbacks.push(key.clone());
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }
        if iptc::is_repeatable(ds.record, ds.dataset) {
            let mut items = out.metadata.list(&key).unwrap_or_default();
            items.push(text);
            out.metadata.set(key, items);
        } else if !out.metadata.contains(&key) {
            out.metadata.set(key, text);
        }
    }
}

// ── decoding primitives ──

/// Rational to float; a zero denominator yields `0.0`.
pub fn rational_to_f64(n: u32, d: u32) -> f64 {
    if d == 0 {
        0.0
    } else {
        f64::from(n) / f64::from(d)
    }
}

pub fn srational_to_f64(n: i32, d: i32) -> f64 {
    if d == 0 {
        0.0
    } else {
        f64::from(n) / f64::from(d)
    }
}

/// `deg + min/60 + sec/3600`, unsigned.
pub fn dms_to_decimal(dms: [(u32, u32); 3]) -> f64 {
    let [d, m, s] = dms.map(|(n, d)| rational_to_f64(n, d));
    d + m / 60.0 + s / 3600.0
}

fn round_gps(v: f64) -> f64 {
    (v * GPS_DECIMALS).round() / GPS_DECIMALS
}

/// UTF-8 first, Latin-1 when that fails. Trailing NULs are dropped and
/// control characters stripped. The flag is `true` when Latin-1 was used.
pub fn decode_text(bytes: &[u8]) -> (String, bool) {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let bytes = &bytes[..end];
    let (text, fallback) = match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), false),
        Err(_) => (bytes.iter().map(|&b| char::from(b)).collect(), true),
    };
    (strip_control(&text), fallback)
}

/// Decode UTF-16LE, dropping the trailing NUL terminator. Embedded NULs are
/// kept: some writers separate XP list items with them.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

/// Decode a UserComment: 8-byte character code, then the text.
pub fn decode_user_comment(bytes: &[u8]) -> (String, bool) {
    if bytes.len() < 8 {
        return decode_text(bytes);
    }
    let (code, body) = bytes.split_at(8);
    match code {
        b"UNICODE\0" => {
            // Byte order isn't specified; a leading BOM or zero byte tells us
            let big_endian = match body {
                [0xFE, 0xFF, ..] => true,
                [0xFF, 0xFE, ..] => false,
                [0, b, ..] if *b != 0 => true,
                _ => false,
            };
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|c| {
                    if big_endian {
                        u16::from_be_bytes([c[0], c[1]])
                    } else {
                        u16::from_le_bytes([c[0], c[1]])
                    }
                })
                .filter(|&u| u != 0xFEFF)
                .take_while(|&u| u != 0)
                .collect();
            let text = strip_control(&String::from_utf16_lossy(&units));
            (text.trim_end().to_string(), false)
        }
        _ => {
            // ASCII, JIS and the all-zero "undefined" code share the byte path
            let (text, fallback) = decode_text(body);
            (text.trim_end().to_string(), fallback)
        }
    }
}

// ── encoding primitives ──

/// UTF-16LE bytes with a two-byte NUL terminator, for XP fields.
pub fn encode_xp(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// UserComment bytes: ASCII when possible, little-endian UNICODE otherwise.
pub fn encode_user_comment(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        let mut bytes = b"ASCII\0\0\0".to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes
    } else {
        let mut bytes = b"UNICODE\0".to_vec();
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }
}

/// Decompose absolute decimal degrees into whole degrees, whole minutes and
/// seconds with a 1/1,000,000 denominator.
pub fn decimal_to_dms(decimal: f64) -> [(u32, u32); 3] {
    let total = (decimal.abs() * 3_600_000_000.0).round() as u64;
    let degrees = total / 3_600_000_000;
    let minutes = (total % 3_600_000_000) / 60_000_000;
    let micro_seconds = total % 60_000_000;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        (micro_seconds as u32, 1_000_000),
    ]
}

/// Float to an unsigned rational with denominator [`RATIONAL_SCALE`],
/// shrinking the scale for values too large to fit.
pub fn f64_to_rational(v: f64) -> (u32, u32) {
    let v = v.abs();
    let mut scale = RATIONAL_SCALE;
    while scale > 1.0 && (v * scale).round() > f64::from(u32::MAX) {
        scale /= 10.0;
    }
    let n = (v * scale).round().min(f64::from(u32::MAX));
    (n as u32, scale as u32)
}
