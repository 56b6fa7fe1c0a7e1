use img_parts::png::{Png, PngChunk};
use img_parts::{Bytes, ImageEXIF};

use super::{Capabilities, Container, ImageFormat, MetadataSegments};
use crate::error::CodecError;

const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

const CHUNK_EXIF: [u8; 4] = *b"eXIf";
const CHUNK_ITXT: [u8; 4] = *b"iTXt";
const CHUNK_TEXT: [u8; 4] = *b"tEXt";
const CHUNK_ZTXT: [u8; 4] = *b"zTXt";
const CHUNK_IDAT: [u8; 4] = *b"IDAT";

pub struct PngContainer;

fn parse(data: &[u8]) -> Result<Png, CodecError> {
    Png::from_bytes(Bytes::copy_from_slice(data))
        .map_err(|e| CodecError::corrupt("PNG", e.to_string()))
}

/// An international text chunk, split into its fields.
struct ITxt<'a> {
    keyword: &'a [u8],
    compressed: bool,
    text: &'a [u8],
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let at = data.iter().position(|&b| b == 0)?;
    Some((&data[..at], &data[at + 1..]))
}

fn parse_itxt(data: &[u8]) -> Option<ITxt<'_>> {
    let (keyword, rest) = split_nul(data)?;
    let (&flag, rest) = rest.split_first()?;
    let (_method, rest) = rest.split_first()?;
    let (_language, rest) = split_nul(rest)?;
    let (_translated, text) = split_nul(rest)?;
    Some(ITxt {
        keyword,
        compressed: flag != 0,
        text,
    })
}

fn is_xmp_chunk(chunk: &PngChunk) -> bool {
    chunk.kind() == CHUNK_ITXT && chunk.contents().starts_with(XMP_KEYWORD)
        && chunk.contents().get(XMP_KEYWORD.len()) == Some(&0)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn xmp_chunk(xmp: &str) -> PngChunk {
    let mut contents = Vec::with_capacity(XMP_KEYWORD.len() + 5 + xmp.len());
    contents.extend_from_slice(XMP_KEYWORD);
    // NUL, uncompressed, method 0, empty language, empty translated keyword
    contents.extend_from_slice(&[0, 0, 0, 0, 0]);
    contents.extend_from_slice(xmp.as_bytes());
    PngChunk::new(CHUNK_ITXT, Bytes::from(contents))
}

impl Container for PngContainer {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exif: true,
            xmp: true,
            iptc: false,
        }
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError> {
        let png = parse(data)?;
        let mut out = MetadataSegments {
            exif: png.exif().map(|b| b.to_vec()),
            ..Default::default()
        };

        for chunk in png.chunks() {
            let contents = chunk.contents();
            match chunk.kind() {
                CHUNK_ITXT => {
                    let Some(itxt) = parse_itxt(contents) else {
                        out.notices.push("Malformed iTXt chunk skipped".into());
                        continue;
                    };
                    let keyword = latin1(itxt.keyword);
                    if itxt.compressed {
                        out.notices
                            .push(format!("Compressed iTXt chunk '{keyword}' not decoded"));
                    } else if itxt.keyword == XMP_KEYWORD {
                        if out.xmp.is_none() {
                            out.xmp = Some(String::from_utf8_lossy(itxt.text).into_owned());
                        }
                    } else {
                        let text = String::from_utf8_lossy(itxt.text).into_owned();
                        out.text.push((format!("PNG:{keyword}"), text));
                    }
                }
                CHUNK_TEXT => match split_nul(contents) {
                    Some((keyword, text)) => {
                        out.text.push((format!("PNG:{}", latin1(keyword)), latin1(text)));
                    }
                    None => out.notices.push("Malformed tEXt chunk skipped".into()),
                },
                CHUNK_ZTXT => {
                    let keyword = split_nul(contents).map(|(k, _)| latin1(k)).unwrap_or_default();
                    out.notices
                        .push(format!("Compressed zTXt chunk '{keyword}' not decoded"));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn write_segments(&self, data: &[u8], segments: &MetadataSegments) -> Result<Vec<u8>, CodecError> {
        let mut png = parse(data)?;
        png.set_exif(segments.exif.as_deref().map(Bytes::copy_from_slice));

        let chunks = png.chunks_mut();
        let pos = chunks.iter().position(is_xmp_chunk);
        chunks.retain(|c| !is_xmp_chunk(c));
        if let Some(xmp) = &segments.xmp {
            let at = pos
                .or_else(|| chunks.iter().position(|c| c.kind() == CHUNK_IDAT))
                .unwrap_or(chunks.len())
                .min(chunks.len());
            chunks.insert(at, xmp_chunk(xmp));
        }
        Ok(png.encoder().bytes().to_vec())
    }

    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut png = parse(data)?;
        png.chunks_mut().retain(|c| {
            !matches!(c.kind(), CHUNK_EXIF | CHUNK_ITXT | CHUNK_TEXT | CHUNK_ZTXT)
        });
        Ok(png.encoder().bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 200, 30, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn with_chunk(data: &[u8], kind: [u8; 4], contents: &[u8]) -> Vec<u8> {
        let mut png = parse(data).unwrap();
        let chunks = png.chunks_mut();
        let at = chunks.len() - 1;
        chunks.insert(at, PngChunk::new(kind, Bytes::copy_from_slice(contents)));
        png.encoder().bytes().to_vec()
    }

    // ── read ──

    #[test]
    fn text_chunks_become_read_only_fields() {
        let data = with_chunk(&tiny_png(), CHUNK_TEXT, b"Comment\0hello \xe9");
        let data = with_chunk(&data, CHUNK_ITXT, b"Title\0\0\0en\0\0Sunset");
        let segments = PngContainer.read_segments(&data).unwrap();
        assert_eq!(
            segments.text,
            vec![
                ("PNG:Comment".to_string(), "hello é".to_string()),
                ("PNG:Title".to_string(), "Sunset".to_string()),
            ]
        );
    }

    #[test]
    fn compressed_text_is_a_notice() {
        let data = with_chunk(&tiny_png(), CHUNK_ZTXT, b"Comment\0\0x\x9c");
        let segments = PngContainer.read_segments(&data).unwrap();
        assert!(segments.text.is_empty());
        assert_eq!(segments.notices.len(), 1);
    }

    // ── write ──

    #[test]
    fn xmp_and_exif_round_trip_and_pixels_survive() {
        let data = tiny_png();
        let segments = MetadataSegments {
            exif: Some(b"MM\x00\x2A\x00\x00\x00\x08\x00\x00\x00\x00\x00\x00".to_vec()),
            xmp: Some("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>".into()),
            ..Default::default()
        };
        let written = PngContainer.write_segments(&data, &segments).unwrap();
        let back = PngContainer.read_segments(&written).unwrap();
        assert_eq!(back.exif, segments.exif);
        assert_eq!(back.xmp, segments.xmp);

        let before = image::load_from_memory(&data).unwrap().to_rgba8();
        let after = image::load_from_memory(&written).unwrap().to_rgba8();
        assert_eq!(before, after);
    }

    #[test]
    fn replacing_xmp_keeps_a_single_packet() {
        let data = tiny_png();
        let first = MetadataSegments {
            xmp: Some("<a/>".into()),
            ..Default::default()
        };
        let second = MetadataSegments {
            xmp: Some("<b/>".into()),
            ..Default::default()
        };
        let written = PngContainer.write_segments(&data, &first).unwrap();
        let written = PngContainer.write_segments(&written, &second).unwrap();
        let png = parse(&written).unwrap();
        assert_eq!(png.chunks().iter().filter(|c| is_xmp_chunk(c)).count(), 1);
        assert_eq!(PngContainer.read_segments(&written).unwrap().xmp.as_deref(), Some("<b/>"));
    }

    #[test]
    fn strip_removes_text_and_exif() {
        let data = with_chunk(&tiny_png(), CHUNK_TEXT, b"Comment\0hi");
        let segments = MetadataSegments {
            xmp: Some("<a/>".into()),
            ..Default::default()
        };
        let written = PngContainer.write_segments(&data, &segments).unwrap();
        let stripped = PngContainer.strip_metadata_segments(&written).unwrap();
        assert_eq!(PngContainer.read_segments(&stripped).unwrap(), MetadataSegments::default());
    }
}
