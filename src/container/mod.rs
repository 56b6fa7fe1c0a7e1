//! Container formats.
//!
//! Each supported format implements [`Container`]: pull the metadata
//! segments out of a file, put edited ones back, or strip them all. The
//! codec never branches on format itself; it asks [`container_for`].

mod bmp;
mod gif;
mod jpeg;
mod png;
mod tiff;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::fields::Namespace;

pub use bmp::BmpContainer;
pub use gif::GifContainer;
pub use jpeg::JpegContainer;
pub use png::PngContainer;
pub use tiff::TiffContainer;

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Gif,
    Bmp,
}

/// File extensions accepted by batch operations.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "gif", "bmp"];

/// RAW formats. Several are TIFF-shaped, so they are rejected by extension
/// before sniffing.
const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "crw", "nef", "nrw", "arw", "srf", "sr2", "dng", "raf", "orf", "rw2", "rwl",
    "pef", "srw", "3fr", "erf", "kdc", "mrw", "x3f", "iiq",
];

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
        }
    }

    /// Identify a container from its leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(ImageFormat::Tiff),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
            [b'B', b'M', ..] => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// Whether `path` has one of the supported extensions.
    pub fn is_supported_path(path: &Path) -> bool {
        extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn extension(path: &Path) -> Option<String> {
    Some(path.extension()?.to_str()?.to_ascii_lowercase())
}

/// Determine the container of `data`, read from `path`.
pub fn detect(path: &Path, data: &[u8]) -> Result<ImageFormat, CodecError> {
    if let Some(ext) = extension(path).filter(|e| RAW_EXTENSIONS.contains(&e.as_str())) {
        return Err(CodecError::UnsupportedFormat(format!(
            "RAW .{ext} files are not supported"
        )));
    }
    ImageFormat::sniff(data).ok_or_else(|| {
        CodecError::UnsupportedFormat(match extension(path) {
            Some(ext) => format!(".{ext} ({})", path.display()),
            None => path.display().to_string(),
        })
    })
}

/// Which metadata namespaces a container can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub exif: bool,
    pub xmp: bool,
    pub iptc: bool,
}

impl Capabilities {
    pub fn supports(&self, ns: Namespace) -> bool {
        match ns {
            Namespace::Exif => self.exif,
            Namespace::Xmp => self.xmp,
            Namespace::Iptc => self.iptc,
        }
    }
}

/// Metadata payloads of one file, container framing removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataSegments {
    /// TIFF-structured EXIF (for TIFF files, the whole file).
    pub exif: Option<Vec<u8>>,
    pub xmp: Option<String>,
    /// IPTC-IIM stream.
    pub iptc: Option<Vec<u8>>,
    /// Read-only container text as `(field key, value)`.
    pub text: Vec<(String, String)>,
    /// Things that were present but could not be decoded.
    pub notices: Vec<String>,
}

pub trait Container: Send + Sync {
    fn format(&self) -> ImageFormat;

    fn capabilities(&self) -> Capabilities;

    /// Size of the segment that would carry `payload` for `ns` in `data`,
    /// and the most such a segment can hold. `None` when unbounded.
    fn segment_size(&self, _data: &[u8], _ns: Namespace, _payload: &[u8]) -> Option<(usize, usize)> {
        None
    }

    fn read_segments(&self, data: &[u8]) -> Result<MetadataSegments, CodecError>;

    /// Rewrite `data` so its EXIF/XMP/IPTC are exactly `segments`; a `None`
    /// payload removes that segment. Pixel data and unrelated segments are
    /// copied through.
    fn write_segments(&self, data: &[u8], segments: &MetadataSegments) -> Result<Vec<u8>, CodecError>;

    /// Remove every metadata segment, leaving pixel data untouched.
    fn strip_metadata_segments(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub fn container_for(format: ImageFormat) -> Box<dyn Container> {
    match format {
        ImageFormat::Jpeg => Box::new(JpegContainer),
        ImageFormat::Png => Box::new(PngContainer),
        ImageFormat::Tiff => Box::new(TiffContainer),
        ImageFormat::Gif => Box::new(GifContainer),
        ImageFormat::Bmp => Box::new(BmpContainer),
    }
}
