#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use photo_meta::container::{container_for, Container, MetadataSegments};
use photo_meta::exif::tags::IFD0;
use photo_meta::exif::value::ascii;
use photo_meta::exif::{Endian, ExifBlock, IfdKind};
use photo_meta::raw::{RawValue, TagKey};
use photo_meta::ImageFormat;

pub const MAKE: u16 = 0x010F;
pub const MODEL: u16 = 0x0110;
pub const DATE_TIME_ORIGINAL: u16 = 0x9003;

/// Every supported container, with a file name and the encoder for it.
pub const FORMATS: [(&str, image::ImageFormat); 5] = [
    ("photo.jpg", image::ImageFormat::Jpeg),
    ("photo.png", image::ImageFormat::Png),
    ("photo.tif", image::ImageFormat::Tiff),
    ("photo.gif", image::ImageFormat::Gif),
    ("photo.bmp", image::ImageFormat::Bmp),
];

/// A small gradient image encoded as `format`.
pub fn fixture(dir: &Path, name: &str, format: image::ImageFormat) -> PathBuf {
    let img = image::RgbImage::from_fn(16, 12, |x, y| image::Rgb([x as u8 * 15, y as u8 * 20, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    let path = dir.join(name);
    fs::write(&path, out.into_inner()).unwrap();
    path
}

/// Decoded RGBA pixels, for comparing image data across writes.
pub fn pixels(path: &Path) -> Vec<u8> {
    image::open(path).unwrap().to_rgba8().into_raw()
}

/// Add camera tags the way a camera would: Make and Model in IFD0,
/// DateTimeOriginal in the Exif IFD.
pub fn add_camera_tags(path: &Path) {
    let data = fs::read(path).unwrap();
    let format = ImageFormat::sniff(&data).unwrap();
    let tag = |block: &mut ExifBlock| {
        block.set(IFD0, MAKE, ascii("Canon"));
        block.set(IFD0, MODEL, ascii("Canon EOS R5"));
        block.set(IfdKind::Exif, DATE_TIME_ORIGINAL, ascii("2024:05:18 09:41:07"));
    };

    let out = match format {
        // The whole file is the EXIF structure
        ImageFormat::Tiff => {
            let mut block = ExifBlock::parse(&data).unwrap().block;
            tag(&mut block);
            block.to_bytes().unwrap()
        }
        _ => {
            let mut block = ExifBlock::new(Endian::Little);
            tag(&mut block);
            let segments = MetadataSegments {
                exif: Some(block.to_bytes().unwrap()),
                ..Default::default()
            };
            container_for(format).write_segments(&data, &segments).unwrap()
        }
    };
    fs::write(path, out).unwrap();
}

/// The raw value of `tag`, as stored.
pub fn exif_entry(path: &Path, kind: IfdKind, tag: u16) -> Option<RawValue> {
    let out = photo_meta::read_metadata(path).unwrap();
    out.raw.get(&TagKey::Exif { ifd: kind, tag })
}
