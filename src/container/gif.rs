use std::ops::Range;

use super::{Capabilities, Container, ImageFormat, MetadataSegments};
use crate::error::CodecError;

const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const LABEL_APPLICATION: u8 = 0xFF;
const LABEL_COMMENT: u8 = 0xFE;

const XMP_APP_ID: &[u8; 11] = b"XMP DataXMP";

/// Length of the "magic trailer" that follows raw XMP data so a sub-block
/// walk from any byte lands on the terminator.
const XMP_TRAILER_LEN: usize = 258;

pub struct GifContainer;

#[derive(Debug, Clone, PartialEq)]
enum BlockKind {
    Xmp,
    Comment,
    Image,
    Other,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    /// The whole block, introducer to terminator.
    span: Range<usize>,
    /// Payload region (XMP bytes or concatenated comment sub-blocks).
    payload: Vec<u8>,
}

struct Layout {
    /// Header, logical screen descriptor and global color table.
    head: Range<usize>,
    blocks: Vec<Block>,
    /// Where the trailer (or the unparsed tail) begins.
    tail: usize,
}

fn corrupt(reason: impl Into<String>) -> CodecError {
    CodecError::corrupt("GIF", reason)
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        0
    } else {
        3 * (1 << ((packed & 0x07) + 1))
    }
}

/// Walk data sub-blocks starting at `pos`. Returns the position after the
/// zero-length terminator and the concatenated payload.
fn sub_blocks(data: &[u8], mut pos: usize) -> Result<(usize, Vec<u8>), CodecError> {
    let mut payload = Vec::new();
    loop {
        let len = usize::from(*data.get(pos).ok_or_else(|| corrupt("truncated sub-block"))?);
        pos += 1;
        if len == 0 {
            return Ok((pos, payload));
        }
        let chunk = data
            .get(pos..pos + len)
            .ok_or_else(|| corrupt("truncated sub-block"))?;
        payload.extend_from_slice(chunk);
        pos += len;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Raw XMP starting at `start`: returns the end of the block and the packet.
fn xmp_block(data: &[u8], start: usize) -> Result<(usize, Vec<u8>), CodecError> {
    let magic = [0x01, 0xFF, 0xFE, 0xFD];
    if let Some(at) = find(&data[start..], &magic) {
        let end = start + at + XMP_TRAILER_LEN;
        if end <= data.len() {
            return Ok((end, data[start..start + at].to_vec()));
        }
    }
    // Writers that skip the trailer leave ordinary sub-blocks
    sub_blocks(data, start)
}

fn layout(data: &[u8]) -> Result<Layout, CodecError> {
    let packed = *data.get(10).ok_or_else(|| corrupt("truncated screen descriptor"))?;
    let head_end = 13 + color_table_len(packed);
    if head_end > data.len() {
        return Err(corrupt("truncated global color table"));
    }

    let mut blocks = Vec::new();
    let mut pos = head_end;
    loop {
        let start = pos;
        match data.get(pos) {
            None | Some(&TRAILER) => break,
            Some(&EXTENSION) => {
                let label = *data.get(pos + 1).ok_or_else(|| corrupt("truncated extension"))?;
                pos += 2;
                let (end, kind, payload) = match label {
                    LABEL_APPLICATION => {
                        let size = usize::from(*data.get(pos).ok_or_else(|| corrupt("truncated extension"))?);
                        let id = data
                            .get(pos + 1..pos + 1 + size)
                            .ok_or_else(|| corrupt("truncated application extension"))?;
                        let body = pos + 1 + size;
                        if id == XMP_APP_ID {
                            let (end, payload) = xmp_block(data, body)?;
                            (end, BlockKind::Xmp, payload)
                        } else {
                            let (end, _) = sub_blocks(data, body)?;
                            (end, BlockKind::Other, Vec::new())
                        }
                    }
                    LABEL_COMMENT => {
                        let (end, payload) = sub_blocks(data, pos)?;
                        (end, BlockKind::Comment, payload)
                    }
                    _ => {
                        let (end, _) = sub_blocks(data, pos)?;
                        (end, BlockKind::Other, Vec::new())
                    }
                };
                pos = end;
                blocks.push(Block {
                    kind,
                    span: start..end,
                    payload,
                });
            }
            Some(&IMAGE) => {
                let packed = *data.get(pos + 9).ok_or_else(|| corrupt("truncated image descriptor"))?;
                // Descriptor, local color table, LZW minimum code size
                pos += 10 + color_table_len(packed) + 1;
                let (end, _) = sub_blocks(data, pos)?;
                pos = end;
                blocks.push(Block {
                    kind: BlockKind::Image,
                    span: start..end,
                    payload: Vec::new(),
                });
            }
            Some(other) => return Err(corrupt(format!("unknown block 0x{other:02X} at {pos}"))),
        }
    }

    Ok(Layout {
        head: 0..head_end,
        blocks,
        tail: pos,
    })
}

fn xmp_extension(xmp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(xmp.len() + 14 + XMP_TRAILER_LEN);
    out.extend_from_slice(&[EXTENSION, LABEL_APPLICATION, 11]);
    out.extend_from_slice(XMP_APP_ID);
    out.extend_from_slice(xmp.as_bytes());
    out.push(0x01);
    out.extend((0..=0xFFu8).rev());
    out.push(0x00);
    out
}

/// Copy `data`, dropping blocks for which `keep` is false and inserting
/// `insert` before the first image.
fn rebuild(data: &[u8], layout: &Layout, keep: impl Fn(&BlockKind) -> bool, insert: Option<Vec<u8>>) -> Vec<u8> {
    let mut out = data[layout.head.clone()].to_vec();
    if insert.is_some() {
        // Application extensions need GIF89a
        out[4] = b'9';
    }
    let mut insert = insert;
    for block in &layout.blocks {
        if block.kind == BlockKind::Image {
            if let Some(ext) = insert.take() {
                out.extend_from_slice(&ext);
            }
        }
        if keep(&block.kind) {
            out.extend_from_slice(&data[block.span.clone()]);
        }
    }
    if let Some(ext) = insert {
        out.extend_from_slice(&ext);
    }
    out.extend_from_slice(&data[layout.tail..]);
    out
}

impl Container for GifContainer {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exif: false,
            xmp: true,
            iptc: false,
        }
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError> {
        let layout = layout(data)?;
        let mut out = MetadataSegments::default();
        let mut comments = Vec::new();
        for block in &layout.blocks {
            match block.kind {
                BlockKind::Xmp if out.xmp.is_none() => {
                    out.xmp = Some(String::from_utf8_lossy(&block.payload).into_owned());
                }
                BlockKind::Comment => comments.push(match String::from_utf8(block.payload.clone()) {
                    Ok(s) => s,
                    Err(_) => block.payload.iter().map(|&b| char::from(b)).collect(),
                }),
                _ => {}
            }
        }
        if !comments.is_empty() {
            out.text.push(("GIF:Comment".into(), comments.join("\n")));
        }
        Ok(out)
    }

    fn write_segments(&self, data: &[u8], segments: &MetadataSegments) -> Result<Vec<u8>, CodecError> {
        let layout = layout(data)?;
        Ok(rebuild(
            data,
            &layout,
            |kind| *kind != BlockKind::Xmp,
            segments.xmp.as_deref().map(xmp_extension),
        ))
    }

    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let layout = layout(data)?;
        Ok(rebuild(
            data,
            &layout,
            |kind| !matches!(kind, BlockKind::Xmp | BlockKind::Comment),
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_gif() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(4, 4, |x, _| {
            if x % 2 == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Gif).unwrap();
        out.into_inner()
    }

    fn with_comment(data: &[u8], text: &[u8]) -> Vec<u8> {
        let layout = layout(data).unwrap();
        let mut ext = vec![EXTENSION, LABEL_COMMENT, text.len() as u8];
        ext.extend_from_slice(text);
        ext.push(0);
        rebuild(data, &layout, |_| true, Some(ext))
    }

    // ── read ──

    #[test]
    fn comment_extension_is_read_only_text() {
        let data = with_comment(&tiny_gif(), b"made by hand");
        let segments = GifContainer.read_segments(&data).unwrap();
        assert_eq!(segments.text, vec![("GIF:Comment".to_string(), "made by hand".to_string())]);
        assert!(segments.xmp.is_none());
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let data = tiny_gif();
        assert!(matches!(
            GifContainer.read_segments(&data[..12]),
            Err(CodecError::CorruptMetadata { .. })
        ));
    }

    // ── write ──

    #[test]
    fn xmp_round_trip_and_frames_survive() {
        let data = tiny_gif();
        let xmp = "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"><rdf:RDF/></x:xmpmeta>";
        let segments = MetadataSegments {
            xmp: Some(xmp.into()),
            ..Default::default()
        };
        let written = GifContainer.write_segments(&data, &segments).unwrap();
        assert_eq!(GifContainer.read_segments(&written).unwrap().xmp.as_deref(), Some(xmp));

        let replaced = GifContainer
            .write_segments(&written, &MetadataSegments {
                xmp: Some("<b/>".into()),
                ..Default::default()
            })
            .unwrap();
        let layout = layout(&replaced).unwrap();
        assert_eq!(layout.blocks.iter().filter(|b| b.kind == BlockKind::Xmp).count(), 1);

        let before = image::load_from_memory(&data).unwrap().to_rgba8();
        let after = image::load_from_memory(&replaced).unwrap().to_rgba8();
        assert_eq!(before, after);
    }

    #[test]
    fn strip_removes_xmp_and_comments() {
        let data = with_comment(&tiny_gif(), b"note");
        let segments = MetadataSegments {
            xmp: Some("<a/>".into()),
            ..Default::default()
        };
        let written = GifContainer.write_segments(&data, &segments).unwrap();
        let stripped = GifContainer.strip_metadata_segments(&written).unwrap();
        assert_eq!(GifContainer.read_segments(&stripped).unwrap(), MetadataSegments::default());
    }
}
