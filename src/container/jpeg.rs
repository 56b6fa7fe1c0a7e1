use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};

use super::{Capabilities, Container, ImageFormat, MetadataSegments};
use crate::error::CodecError;
use crate::fields::Namespace;
use crate::iptc::{self, APP13_HEADER};

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP13: u8 = 0xED;
const COM: u8 = 0xFE;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENSION_HEADER: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";

/// Largest body a marker segment can carry (the length field counts itself).
pub(crate) const MAX_SEGMENT: usize = 65533;

pub struct JpegContainer;

fn parse(data: &[u8]) -> Result<Jpeg, CodecError> {
    Jpeg::from_bytes(Bytes::copy_from_slice(data))
        .map_err(|e| CodecError::corrupt("JPEG", e.to_string()))
}

fn is_exif(s: &JpegSegment) -> bool {
    s.marker() == APP1 && s.contents().starts_with(EXIF_PREFIX)
}

fn is_xmp(s: &JpegSegment) -> bool {
    s.marker() == APP1 && s.contents().starts_with(XMP_HEADER)
}

fn is_xmp_extension(s: &JpegSegment) -> bool {
    s.marker() == APP1 && s.contents().starts_with(XMP_EXTENSION_HEADER)
}

fn is_photoshop(s: &JpegSegment) -> bool {
    s.marker() == APP13 && s.contents().starts_with(APP13_HEADER)
}

fn photoshop_contents(jpeg: &Jpeg) -> Option<Bytes> {
    jpeg.segments()
        .iter()
        .find(|s| is_photoshop(s))
        .map(|s| s.contents().clone())
}

fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    jpeg.segments().iter().position(is_exif)
}

/// Where new APP segments go: after the last of APP0/EXIF, never past SOF.
fn insertion_point(jpeg: &Jpeg) -> usize {
    let segments = jpeg.segments();
    segments
        .iter()
        .rposition(|s| s.marker() == APP0 || is_exif(s) || is_xmp(s))
        .map(|p| p + 1)
        .unwrap_or(0)
        .min(segments.len())
}

impl JpegContainer {
    fn set_exif(jpeg: &mut Jpeg, tiff: Option<&[u8]>) {
        let orig_exif_pos = find_exif_segment_pos(jpeg);
        jpeg.set_exif(tiff.map(Bytes::copy_from_slice));

        // set_exif() appends the segment after the first few APPn; EXIF must
        // stay ahead of XMP for most readers.
        if let Some(new_pos) = find_exif_segment_pos(jpeg) {
            let first_app = jpeg
                .segments()
                .iter()
                .position(|s| s.marker() == APP0)
                .map(|p| p + 1)
                .unwrap_or(0);
            let target_pos = orig_exif_pos.unwrap_or(first_app);
            if target_pos < new_pos {
                let segments = jpeg.segments_mut();
                let seg = segments.remove(new_pos);
                segments.insert(target_pos, seg);
            }
        }
    }

    fn set_xmp(jpeg: &mut Jpeg, xmp: Option<&str>) {
        let pos = jpeg.segments().iter().position(is_xmp);
        let Some(xmp) = xmp else {
            jpeg.segments_mut().retain(|s| !is_xmp(s) && !is_xmp_extension(s));
            return;
        };
        let mut contents = Vec::with_capacity(XMP_HEADER.len() + xmp.len());
        contents.extend_from_slice(XMP_HEADER);
        contents.extend_from_slice(xmp.as_bytes());
        let segment = JpegSegment::new_with_contents(APP1, Bytes::from(contents));
        match pos {
            Some(pos) => jpeg.segments_mut()[pos] = segment,
            None => {
                let at = insertion_point(jpeg);
                jpeg.segments_mut().insert(at, segment);
            }
        }
    }

    fn set_iptc(jpeg: &mut Jpeg, iim: Option<&[u8]>) -> Result<(), CodecError> {
        let pos = jpeg.segments().iter().position(is_photoshop);
        let body = iptc::build_app13(photoshop_contents(jpeg).as_deref(), iim);

        match (pos, body) {
            (Some(pos), None) => {
                jpeg.segments_mut().remove(pos);
            }
            (_, Some(body)) if body.len() > MAX_SEGMENT => {
                return Err(CodecError::EncodingOverflow {
                    field: "IPTC".into(),
                    len: body.len(),
                    limit: MAX_SEGMENT,
                });
            }
            (Some(pos), Some(body)) => {
                jpeg.segments_mut()[pos] =
                    JpegSegment::new_with_contents(APP13, Bytes::from(body));
            }
            (None, Some(body)) => {
                let at = insertion_point(jpeg);
                jpeg.segments_mut()
                    .insert(at, JpegSegment::new_with_contents(APP13, Bytes::from(body)));
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl Container for JpegContainer {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exif: true,
            xmp: true,
            iptc: true,
        }
    }

    /// IPTC shares its APP13 segment with the other Photoshop resources, so
    /// its size is that of the rebuilt segment.
    fn segment_size(&self, data: &[u8], ns: Namespace, payload: &[u8]) -> Option<(usize, usize)> {
        let len = match ns {
            Namespace::Exif => EXIF_PREFIX.len() + payload.len(),
            Namespace::Xmp => XMP_HEADER.len() + payload.len(),
            Namespace::Iptc => {
                let existing = parse(data).ok().and_then(|jpeg| photoshop_contents(&jpeg));
                iptc::build_app13(existing.as_deref(), Some(payload)).map_or(0, |body| body.len())
            }
        };
        Some((len, MAX_SEGMENT))
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError> {
        let jpeg = parse(data)?;
        let mut out = MetadataSegments {
            exif: jpeg.exif().map(|b| b.to_vec()),
            ..Default::default()
        };

        for segment in jpeg.segments() {
            if is_xmp(segment) && out.xmp.is_none() {
                let body = &segment.contents()[XMP_HEADER.len()..];
                out.xmp = Some(String::from_utf8_lossy(body).into_owned());
            } else if is_xmp_extension(segment) {
                if !out.notices.iter().any(|n| n.starts_with("Extended XMP")) {
                    out.notices
                        .push("Extended XMP segments present; only the main packet is read".into());
                }
            } else if is_photoshop(segment) && out.iptc.is_none() {
                out.iptc = iptc::iim_from_app13(segment.contents()).map(<[u8]>::to_vec);
            }
        }
        Ok(out)
    }

    fn write_segments(&self, data: &[u8], segments: &MetadataSegments) -> Result<Vec<u8>, CodecError> {
        let mut jpeg = parse(data)?;
        Self::set_exif(&mut jpeg, segments.exif.as_deref());
        Self::set_xmp(&mut jpeg, segments.xmp.as_deref());
        Self::set_iptc(&mut jpeg, segments.iptc.as_deref())?;
        Ok(jpeg.encoder().bytes().to_vec())
    }

    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut jpeg = parse(data)?;
        jpeg.segments_mut().retain(|s| {
            !(is_exif(s) || is_xmp(s) || is_xmp_extension(s) || is_photoshop(s) || s.marker() == COM)
        });
        Ok(jpeg.encoder().bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A baseline 8x8 grey JPEG encoded by `image`.
    fn tiny_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([128, 128, 128]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn tiff_stub() -> Vec<u8> {
        // Little-endian header and an empty IFD0
        vec![b'I', b'I', 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    }

    // ── read / write ──

    #[test]
    fn writes_all_three_segments_and_reads_them_back() {
        let data = tiny_jpeg();
        let segments = MetadataSegments {
            exif: Some(tiff_stub()),
            xmp: Some("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>".into()),
            iptc: Some(vec![0x1C, 2, 5, 0, 2, b'h', b'i']),
            ..Default::default()
        };
        let written = JpegContainer.write_segments(&data, &segments).unwrap();
        let back = JpegContainer.read_segments(&written).unwrap();
        assert_eq!(back.exif, segments.exif);
        assert_eq!(back.xmp, segments.xmp);
        assert_eq!(back.iptc, segments.iptc);

        let jpeg = parse(&written).unwrap();
        let exif_pos = find_exif_segment_pos(&jpeg).unwrap();
        let xmp_pos = jpeg.segments().iter().position(is_xmp).unwrap();
        assert!(exif_pos < xmp_pos);
    }

    #[test]
    fn none_removes_segments() {
        let data = tiny_jpeg();
        let full = MetadataSegments {
            exif: Some(tiff_stub()),
            xmp: Some("<x/>".into()),
            iptc: Some(vec![0x1C, 2, 5, 0, 1, b'a']),
            ..Default::default()
        };
        let written = JpegContainer.write_segments(&data, &full).unwrap();
        let emptied = JpegContainer
            .write_segments(&written, &MetadataSegments::default())
            .unwrap();
        assert_eq!(JpegContainer.read_segments(&emptied).unwrap(), MetadataSegments::default());
    }

    #[test]
    fn oversized_app13_is_rejected() {
        let data = tiny_jpeg();
        let segments = MetadataSegments {
            iptc: Some(vec![b'x'; MAX_SEGMENT]),
            ..Default::default()
        };
        assert!(matches!(
            JpegContainer.write_segments(&data, &segments),
            Err(CodecError::EncodingOverflow { .. })
        ));
    }

    /// An APP13 holding a single non-IPTC resource of `len` bytes.
    fn photoshop_resource(len: usize) -> Vec<u8> {
        let mut body = APP13_HEADER.to_vec();
        body.extend_from_slice(b"8BIM");
        body.extend_from_slice(&0x0409u16.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&(len as u32).to_be_bytes());
        body.extend(std::iter::repeat_n(0xAA, len));
        body
    }

    #[test]
    fn iptc_size_counts_other_resources() {
        let mut jpeg = parse(&tiny_jpeg()).unwrap();
        let at = insertion_point(&jpeg);
        jpeg.segments_mut().insert(
            at,
            JpegSegment::new_with_contents(APP13, Bytes::from(photoshop_resource(63_500))),
        );
        let data = jpeg.encoder().bytes().to_vec();

        let iim = vec![b'x'; 2_000];
        let (len, limit) = JpegContainer.segment_size(&data, Namespace::Iptc, &iim).unwrap();
        assert_eq!(limit, MAX_SEGMENT);
        assert!(len > limit, "{len} should include the 63,500-byte resource");

        let (small, _) = JpegContainer
            .segment_size(&tiny_jpeg(), Namespace::Iptc, &iim)
            .unwrap();
        assert!(small < limit);
    }

    // ── strip ──

    #[test]
    fn strip_keeps_scan_data() {
        let data = tiny_jpeg();
        let segments = MetadataSegments {
            exif: Some(tiff_stub()),
            xmp: Some("<x/>".into()),
            ..Default::default()
        };
        let written = JpegContainer.write_segments(&data, &segments).unwrap();
        let stripped = JpegContainer.strip_metadata_segments(&written).unwrap();
        assert_eq!(JpegContainer.read_segments(&stripped).unwrap(), MetadataSegments::default());

        let before = image::load_from_memory(&data).unwrap().to_rgb8();
        let after = image::load_from_memory(&stripped).unwrap().to_rgb8();
        assert_eq!(before, after);
    }
}
