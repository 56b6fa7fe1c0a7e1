//! An EXIF/TIFF block held as decoded `exif` fields plus the pixel chunks
//! its image directories reference.
//!
//! Parsing goes through [`exif::Reader`](::exif::Reader) and serializing
//! through the crate's IFD writer, which lays out fresh offsets for the
//! sub-directories, strips, tiles and thumbnail. A block whose content
//! cannot be written back unchanged (unknown field types, SubIFD trees,
//! strip tables that do not fit the block) still reads, but refuses
//! [`ExifBlock::to_bytes`].

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use ::exif::experimental::Writer;
use ::exif::{Context, Field, In, Reader, Tag, Value};

use super::tags::{self, IfdKind};
use crate::error::CodecError;

/// JPEG APP1 EXIF identifier. Stripped on parse when present.
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Pixel payload referenced by an image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageData {
    Strips(Vec<Vec<u8>>),
    Tiles(Vec<Vec<u8>>),
    /// JPEG interchange stream, usually the EXIF thumbnail.
    Jpeg(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ExifBlock {
    pub endian: Endian,
    fields: Vec<Field>,
    /// Keyed by image directory number.
    images: BTreeMap<u16, ImageData>,
    unwritable: Option<String>,
}

/// A parsed block plus the damage found along the way. Reasons the block
/// cannot be written back are kept on the block itself.
#[derive(Debug)]
pub struct ParsedExif {
    pub block: ExifBlock,
    pub issues: Vec<String>,
}

fn address(kind: IfdKind, number: u16) -> (Tag, In) {
    match kind {
        IfdKind::Image(n) => (Tag(Context::Tiff, number), In(n)),
        IfdKind::Exif => (Tag(Context::Exif, number), In::PRIMARY),
        IfdKind::Gps => (Tag(Context::Gps, number), In::PRIMARY),
        IfdKind::Interop => (Tag(Context::Interop, number), In::PRIMARY),
    }
}

/// Directory of a field. EXIF, GPS and Interop directories hanging off a
/// later image directory have no [`IfdKind`]; they are carried through
/// untouched.
fn kind_of(field: &Field) -> Option<IfdKind> {
    match (field.tag.context(), field.ifd_num.index()) {
        (Context::Tiff, n) => Some(IfdKind::Image(n)),
        (Context::Exif, 0) => Some(IfdKind::Exif),
        (Context::Gps, 0) => Some(IfdKind::Gps),
        (Context::Interop, 0) => Some(IfdKind::Interop),
        _ => None,
    }
}

impl ExifBlock {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            fields: Vec::new(),
            images: BTreeMap::new(),
            unwritable: None,
        }
    }

    /// Parse a TIFF header and its IFD chain. An `Exif\0\0` prefix is
    /// accepted. Fails only when nothing usable is found; damage past that
    /// point is reported in [`ParsedExif::issues`].
    pub fn parse(data: &[u8]) -> Result<ParsedExif, CodecError> {
        let data = data.strip_prefix(EXIF_PREFIX).unwrap_or(data);
        let mut issues = Vec::new();
        let exif = Reader::new()
            .continue_on_error(true)
            .read_raw(data.to_vec())
            .or_else(|e| {
                e.distill_partial_result(|errors| {
                    issues.extend(errors.iter().map(ToString::to_string));
                })
            })
            .map_err(|e| CodecError::corrupt("EXIF", e.to_string()))?;

        let endian = if exif.little_endian() {
            Endian::Little
        } else {
            Endian::Big
        };
        let mut block = ExifBlock {
            endian,
            fields: exif.fields().cloned().collect(),
            images: BTreeMap::new(),
            unwritable: None,
        };
        block.collect_images(exif.buf());
        block.check_writable();
        Ok(ParsedExif { block, issues })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.images.is_empty()
    }

    /// Why this block cannot be serialized, if it cannot.
    pub fn unwritable(&self) -> Option<&str> {
        self.unwritable.as_deref()
    }

    pub fn get(&self, kind: IfdKind, tag: u16) -> Option<&Field> {
        let (tag, ifd_num) = address(kind, tag);
        self.fields
            .iter()
            .find(|f| f.tag == tag && f.ifd_num == ifd_num)
    }

    /// Insert or replace a field.
    pub fn set(&mut self, kind: IfdKind, tag: u16, value: Value) {
        let (tag, ifd_num) = address(kind, tag);
        let field = Field {
            tag,
            ifd_num,
            value,
        };
        match self
            .fields
            .iter_mut()
            .find(|f| f.tag == tag && f.ifd_num == ifd_num)
        {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn remove(&mut self, kind: IfdKind, tag: u16) -> bool {
        let (tag, ifd_num) = address(kind, tag);
        let before = self.fields.len();
        self.fields
            .retain(|f| !(f.tag == tag && f.ifd_num == ifd_num));
        self.fields.len() != before
    }

    /// Drop every field of one directory.
    pub fn clear_directory(&mut self, kind: IfdKind) {
        self.fields.retain(|f| kind_of(f) != Some(kind));
    }

    /// All addressable fields, in parse order.
    pub fn entries(&self) -> impl Iterator<Item = (IfdKind, &Field)> {
        self.fields
            .iter()
            .filter_map(|f| Some((kind_of(f)?, f)))
    }

    pub fn image_data(&self, ifd: u16) -> Option<&ImageData> {
        self.images.get(&ifd)
    }

    pub fn set_image_data(&mut self, ifd: u16, data: ImageData) {
        self.images.insert(ifd, data);
    }

    /// Keep only what a TIFF needs to decode its pixels: every EXIF, GPS and
    /// Interop field goes, and image directories keep their structural tags.
    pub fn strip_to_structure(&mut self) {
        self.fields.retain(|f| {
            f.tag.context() == Context::Tiff && tags::is_structural(f.tag.number())
        });
    }

    /// Serialize to a bare TIFF stream (no `Exif\0\0` prefix).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        if let Some(reason) = &self.unwritable {
            return Err(CodecError::corrupt("EXIF", reason.clone()));
        }
        let chunks: BTreeMap<u16, Vec<&[u8]>> = self
            .images
            .iter()
            .filter_map(|(&n, data)| match data {
                ImageData::Strips(parts) | ImageData::Tiles(parts) => {
                    Some((n, parts.iter().map(Vec::as_slice).collect()))
                }
                ImageData::Jpeg(_) => None,
            })
            .collect();

        let mut writer = Writer::new();
        for field in &self.fields {
            writer.push_field(field);
        }
        for (n, data) in &self.images {
            match (data, chunks.get(n)) {
                (ImageData::Strips(_), Some(parts)) => writer.set_strips(parts, In(*n)),
                (ImageData::Tiles(_), Some(parts)) => writer.set_tiles(parts, In(*n)),
                (ImageData::Jpeg(jpeg), _) => writer.set_jpeg(jpeg, In(*n)),
                _ => {}
            }
        }

        let mut out = Cursor::new(Vec::new());
        writer
            .write(&mut out, self.endian == Endian::Little)
            .map_err(|e| CodecError::corrupt("EXIF", e.to_string()))?;
        Ok(out.into_inner())
    }

    fn uints(&self, ifd: u16, tag: u16) -> Option<Vec<u32>> {
        self.get(IfdKind::Image(ifd), tag)
            .map(|f| f.value.iter_uint().map(Iterator::collect).unwrap_or_default())
    }

    /// Copy out the strips, tiles and thumbnail each image directory points
    /// at. Offset tables that disagree with their lengths or leave the block
    /// make it unwritable rather than silently losing pixels.
    fn collect_images(&mut self, buf: &[u8]) {
        let dirs: BTreeSet<u16> = self
            .fields
            .iter()
            .filter(|f| f.tag.context() == Context::Tiff)
            .map(|f| f.ifd_num.index())
            .collect();

        for n in dirs {
            let tables = [
                ("strip", tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS),
                ("tile", tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS),
                ("thumbnail", tags::JPEG_OFFSET, tags::JPEG_LENGTH),
            ];
            for (what, offset_tag, length_tag) in tables {
                let (offsets, lengths) = match (self.uints(n, offset_tag), self.uints(n, length_tag)) {
                    (None, None) => continue,
                    (Some(o), Some(l)) if o.len() == l.len() && !o.is_empty() => (o, l),
                    _ => {
                        self.refuse(format!("IFD{n} {what} offsets and lengths disagree"));
                        continue;
                    }
                };
                let parts: Option<Vec<Vec<u8>>> = offsets
                    .iter()
                    .zip(&lengths)
                    .map(|(&start, &len)| {
                        let start = start as usize;
                        buf.get(start..start.checked_add(len as usize)?).map(<[u8]>::to_vec)
                    })
                    .collect();
                let Some(mut parts) = parts else {
                    self.refuse(format!("IFD{n} {what} data lies outside the block"));
                    continue;
                };
                let data = match what {
                    "strip" => ImageData::Strips(parts),
                    "tile" => ImageData::Tiles(parts),
                    _ => ImageData::Jpeg(parts.remove(0)),
                };
                if self.images.insert(n, data).is_some() {
                    self.refuse(format!("IFD{n} holds more than one kind of image data"));
                }
            }
        }
    }

    fn check_writable(&mut self) {
        let mut reasons = Vec::new();
        for field in &self.fields {
            let number = field.tag.number();
            if let Value::Unknown(ty, ..) = field.value {
                reasons.push(format!(
                    "tag 0x{number:04X} in IFD{} has unknown field type {ty}",
                    field.ifd_num.index()
                ));
            }
            if field.tag.context() == Context::Tiff && number == tags::SUB_IFDS {
                reasons.push(format!(
                    "IFD{} has SubIFDs, which are not relocated",
                    field.ifd_num.index()
                ));
            }
        }
        for reason in reasons {
            self.refuse(reason);
        }
    }

    /// Keep the first reason; later ones are only logged.
    fn refuse(&mut self, reason: String) {
        log::debug!("EXIF unwritable: {reason}");
        self.unwritable.get_or_insert(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::tags::{IFD0, IMAGE_DESCRIPTION, MAKE};
    use crate::exif::value::{ascii, decode};
    use crate::raw::RawValue;

    fn text_of(block: &ExifBlock, kind: IfdKind, tag: u16) -> Option<RawValue> {
        block.get(kind, tag).map(|f| decode(kind, f))
    }

    /// A little-endian TIFF with one IFD built from raw
    /// `(tag, type, count, value slot)` entries, followed by `tail`.
    fn raw_tiff(entries: &[(u16, u16, u32, [u8; 4])], tail: &[u8]) -> Vec<u8> {
        let mut b = b"II\x2A\x00\x08\x00\x00\x00".to_vec();
        b.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, ty, count, slot) in entries {
            b.extend_from_slice(&tag.to_le_bytes());
            b.extend_from_slice(&ty.to_le_bytes());
            b.extend_from_slice(&count.to_le_bytes());
            b.extend_from_slice(slot);
        }
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(tail);
        b
    }

    fn tail_offset(entries: usize) -> u32 {
        (8 + 2 + entries * 12 + 4) as u32
    }

    fn one_strip(offset: u32, len: u32) -> Vec<u8> {
        let entries = [
            (0x0100, 3, 1, [1, 0, 0, 0]),
            (0x0101, 3, 1, [1, 0, 0, 0]),
            (tags::STRIP_OFFSETS, 4, 1, offset.to_le_bytes()),
            (tags::STRIP_BYTE_COUNTS, 4, 1, len.to_le_bytes()),
        ];
        raw_tiff(&entries, &[0xAB, 0xCD])
    }

    // ── round trip ──

    #[test]
    fn set_fields_survive_serialization() {
        let mut block = ExifBlock::new(Endian::Big);
        block.set(IFD0, MAKE, ascii("Canon"));
        block.set(IfdKind::Exif, 0x9003, ascii("2024:01:02 03:04:05"));
        block.set(IfdKind::Gps, tags::GPS_LATITUDE_REF, ascii("N"));

        let bytes = block.to_bytes().unwrap();
        assert_eq!(&bytes[..2], b"MM");
        let back = ExifBlock::parse(&bytes).unwrap();
        assert!(back.issues.is_empty());
        assert_eq!(back.block.endian, Endian::Big);
        assert_eq!(
            text_of(&back.block, IFD0, MAKE),
            Some(RawValue::Ascii(b"Canon\0".to_vec()))
        );
        assert!(back.block.get(IfdKind::Gps, tags::GPS_LATITUDE_REF).is_some());
        assert!(back.block.get(IfdKind::Exif, 0x9003).is_some());
    }

    #[test]
    fn exif_prefix_is_accepted() {
        let mut block = ExifBlock::new(Endian::Little);
        block.set(IFD0, IMAGE_DESCRIPTION, ascii("Pier"));
        let mut bytes = EXIF_PREFIX.to_vec();
        bytes.extend(block.to_bytes().unwrap());
        let back = ExifBlock::parse(&bytes).unwrap().block;
        assert!(back.get(IFD0, IMAGE_DESCRIPTION).is_some());
    }

    #[test]
    fn strips_are_relocated() {
        let data = one_strip(tail_offset(4), 2);
        let parsed = ExifBlock::parse(&data).unwrap();
        assert!(parsed.issues.is_empty());
        let mut block = parsed.block;
        assert_eq!(block.image_data(0), Some(&ImageData::Strips(vec![vec![0xAB, 0xCD]])));

        block.set(IFD0, IMAGE_DESCRIPTION, ascii("a longer description"));
        let back = ExifBlock::parse(&block.to_bytes().unwrap()).unwrap().block;
        assert_eq!(back.image_data(0), Some(&ImageData::Strips(vec![vec![0xAB, 0xCD]])));
    }

    #[test]
    fn thumbnail_moves_with_its_directory() {
        let mut block = ExifBlock::new(Endian::Little);
        block.set(IFD0, MAKE, ascii("Canon"));
        block.set(IfdKind::Image(1), 0x0103, Value::Short(vec![6]));
        block.set_image_data(1, ImageData::Jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]));

        let back = ExifBlock::parse(&block.to_bytes().unwrap()).unwrap().block;
        assert_eq!(back.image_data(1), Some(&ImageData::Jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9])));
    }

    // ── edit ──

    #[test]
    fn set_replaces_and_remove_deletes() {
        let mut block = ExifBlock::new(Endian::Little);
        block.set(IFD0, MAKE, ascii("Canon"));
        block.set(IFD0, MAKE, ascii("Nikon"));
        assert_eq!(block.entries().count(), 1);
        assert_eq!(
            text_of(&block, IFD0, MAKE),
            Some(RawValue::Ascii(b"Nikon\0".to_vec()))
        );
        assert!(block.remove(IFD0, MAKE));
        assert!(!block.remove(IFD0, MAKE));
        assert!(block.is_empty());
    }

    #[test]
    fn strip_to_structure_keeps_pixel_layout() {
        let mut block = ExifBlock::parse(&one_strip(tail_offset(4), 2)).unwrap().block;
        block.set(IFD0, MAKE, ascii("Canon"));
        block.set(IfdKind::Gps, tags::GPS_LATITUDE_REF, ascii("N"));
        block.strip_to_structure();

        assert!(block.get(IFD0, MAKE).is_none());
        assert!(block.get(IfdKind::Gps, tags::GPS_LATITUDE_REF).is_none());
        assert!(block.get(IFD0, 0x0100).is_some());
        let back = ExifBlock::parse(&block.to_bytes().unwrap()).unwrap().block;
        assert!(back.image_data(0).is_some());
    }

    // ── refusal ──

    #[test]
    fn mismatched_strip_table_is_unwritable() {
        let entries = [
            (0x0100, 3, 1, [1, 0, 0, 0]),
            (tags::STRIP_OFFSETS, 4, 1, tail_offset(3).to_le_bytes()),
            (tags::STRIP_BYTE_COUNTS, 3, 2, [1, 0, 1, 0]),
        ];
        let parsed = ExifBlock::parse(&raw_tiff(&entries, &[0xAB, 0xCD])).unwrap();
        assert!(parsed.block.unwritable().unwrap().contains("disagree"));
        // The offending tags are kept for display.
        assert!(parsed.block.get(IFD0, tags::STRIP_BYTE_COUNTS).is_some());
        assert!(matches!(
            parsed.block.to_bytes(),
            Err(CodecError::CorruptMetadata { segment: "EXIF", .. })
        ));
    }

    #[test]
    fn strip_past_the_end_is_unwritable() {
        let parsed = ExifBlock::parse(&one_strip(tail_offset(4), 500)).unwrap();
        assert!(parsed.block.unwritable().unwrap().contains("outside"));
        assert!(parsed.block.to_bytes().is_err());
    }

    #[test]
    fn unknown_field_type_is_unwritable() {
        let entries = [(0x0100, 3, 1, [1, 0, 0, 0]), (0xC000, 99, 1, [0; 4])];
        let parsed = ExifBlock::parse(&raw_tiff(&entries, &[])).unwrap();
        assert!(parsed.block.unwritable().unwrap().contains("unknown field type"));
        assert!(parsed.block.to_bytes().is_err());
    }

    #[test]
    fn sub_ifds_are_unwritable() {
        let entries = [(0x0100, 3, 1, [1, 0, 0, 0]), (tags::SUB_IFDS, 4, 1, [0; 4])];
        let parsed = ExifBlock::parse(&raw_tiff(&entries, &[])).unwrap();
        assert!(parsed.block.unwritable().unwrap().contains("SubIFD"));
    }

    #[test]
    fn missing_header_is_an_error() {
        assert!(ExifBlock::parse(b"not a tiff").is_err());
    }
}
