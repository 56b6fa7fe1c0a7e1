use super::{Capabilities, Container, ImageFormat, MetadataSegments};
use crate::error::CodecError;
use crate::exif::tags::{IFD0, IPTC_NAA, XMP_PACKET};
use crate::exif::value::payload_bytes;
use crate::exif::{ExifBlock, Value};

/// TIFF files are their own EXIF block: IFD0 carries the pixels and the XMP
/// and IPTC payloads live in tags 700 and 33723. Files whose directories
/// cannot be rebuilt without loss are refused on write.
pub struct TiffContainer;

fn parse(data: &[u8]) -> Result<ExifBlock, CodecError> {
    ExifBlock::parse(data)
        .map(|parsed| parsed.block)
        .map_err(|e| match e {
            CodecError::CorruptMetadata { reason, .. } => CodecError::corrupt("TIFF", reason),
            other => other,
        })
}

impl Container for TiffContainer {
    fn format(&self) -> ImageFormat {
        ImageFormat::Tiff
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exif: true,
            xmp: true,
            iptc: true,
        }
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError> {
        let block = parse(data)?;
        let payload = |tag| {
            block
                .get(IFD0, tag)
                .and_then(|f| payload_bytes(&f.value, block.endian))
        };
        Ok(MetadataSegments {
            exif: Some(data.to_vec()),
            xmp: payload(XMP_PACKET)
                .map(|b| String::from_utf8_lossy(&b).trim_end_matches('\0').to_string()),
            iptc: payload(IPTC_NAA),
            ..Default::default()
        })
    }

    fn write_segments(&self, data: &[u8], segments: &MetadataSegments) -> Result<Vec<u8>, CodecError> {
        let mut block = match &segments.exif {
            Some(exif) => parse(exif)?,
            None => {
                let mut block = parse(data)?;
                block.strip_to_structure();
                block
            }
        };

        match &segments.xmp {
            Some(xmp) => block.set(IFD0, XMP_PACKET, Value::Byte(xmp.as_bytes().to_vec())),
            None => {
                block.remove(IFD0, XMP_PACKET);
            }
        }
        match &segments.iptc {
            Some(iim) => block.set(IFD0, IPTC_NAA, Value::Undefined(iim.clone(), 0)),
            None => {
                block.remove(IFD0, IPTC_NAA);
            }
        }
        block.to_bytes()
    }

    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut block = parse(data)?;
        block.strip_to_structure();
        block.to_bytes()
    }
}
