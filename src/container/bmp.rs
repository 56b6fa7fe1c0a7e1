use super::{Capabilities, Container, ImageFormat, MetadataSegments};
use crate::error::CodecError;

/// BMP has nowhere to put metadata: reads are empty and writes copy through.
pub struct BmpContainer;

fn check(data: &[u8]) -> Result<(), CodecError> {
    if data.starts_with(b"BM") && data.len() >= 14 {
        Ok(())
    } else {
        Err(CodecError::corrupt("BMP", "truncated file header"))
    }
}

impl Container for BmpContainer {
    fn format(&self) -> ImageFormat {
        ImageFormat::Bmp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            exif: false,
            xmp: false,
            iptc: false,
        }
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError> {
        check(data)?;
        Ok(MetadataSegments::default())
    }

    fn write_segments(&self, data: &[u8], _segments: &MetadataSegments) -> Result<Vec<u8>, CodecError> {
        check(data)?;
        Ok(data.to_vec())
    }

    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        check(data)?;
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nothing_and_writes_through() {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Bmp).unwrap();
        let data = out.into_inner();

        assert_eq!(BmpContainer.read_segments(&data).unwrap(), MetadataSegments::default());
        let segments = MetadataSegments {
            xmp: Some("<x/>".into()),
            ..Default::default()
        };
        assert_eq!(BmpContainer.write_segments(&data, &segments).unwrap(), data);
        assert_eq!(BmpContainer.strip_metadata_segments(&data).unwrap(), data);
    }
}
