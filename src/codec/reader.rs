use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde::Serialize;

use crate::container::{self, ImageFormat};
use crate::error::CodecError;
use crate::exif::ExifBlock;
use crate::iptc::IptcData;
use crate::metadata::NormalizedMetadata;
use crate::normalize::normalize;
use crate::raw::RawTagSet;
use crate::xmp::{parse_packet, XmpPacket};

/// File-level facts shown next to the metadata. Never part of
/// [`NormalizedMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralInfo {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size: u64,
}

/// Something the reader had to work around. None of these stop a read.
#[derive(Debug)]
pub enum ReadNotice {
    /// A string field was not valid UTF-8 and was decoded as Latin-1.
    DecodeFallback { field: String },
    /// A segment stopped parsing part-way; earlier tags were kept.
    Partial(CodecError),
    /// Data was present but is not decoded (compressed text, extended XMP),
    /// or was decoded but cannot be written back.
    Skipped(String),
}

impl std::fmt::Display for ReadNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadNotice::DecodeFallback { field } => write!(f, "{field}: decoded as Latin-1"),
            ReadNotice::Partial(e) => write!(f, "partial metadata: {e}"),
            ReadNotice::Skipped(what) => f.write_str(what),
        }
    }
}

/// Everything a read produces for one file.
#[derive(Debug)]
pub struct ReadOutput {
    pub metadata: NormalizedMetadata,
    /// Keep this for [`write_metadata`](super::write_metadata).
    pub raw: RawTagSet,
    pub general: GeneralInfo,
    pub notices: Vec<ReadNotice>,
}

/// Read and normalize the metadata of the file at `path`.
///
/// Fails only when the file cannot be read or is not a supported container.
/// Damaged segments yield whatever parsed, with a [`ReadNotice::Partial`].
///
/// # Example
///
/// ```rust,no_run
/// use photo_meta::codec::read_metadata;
///
/// let out = read_metadata("photo.jpg".as_ref()).unwrap();
/// for (key, value) in &out.metadata {
///     println!("{key}: {value}");
/// }
/// ```
pub fn read_metadata(path: &Path) -> Result<ReadOutput, CodecError> {
    let data = fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = container::detect(path, &data)?;
    let out = read_bytes(&data, format)?;
    log::debug!(
        "{}: {} fields ({}), {} notices",
        path.display(),
        out.metadata.len(),
        format,
        out.notices.len()
    );
    Ok(out)
}

/// Read metadata from an in-memory file of a known format.
pub fn read_bytes(data: &[u8], format: ImageFormat) -> Result<ReadOutput, CodecError> {
    let container = container::container_for(format);
    let mut notices = Vec::new();

    let segments = match container.read_segments(data) {
        Ok(segments) => segments,
        Err(e @ CodecError::CorruptMetadata { .. }) => {
            log::warn!("{format} structure unreadable: {e}");
            notices.push(ReadNotice::Partial(e));
            Default::default()
        }
        Err(e) => return Err(e),
    };

    let mut raw = RawTagSet::empty(format);

    if let Some(bytes) = &segments.exif {
        match ExifBlock::parse(bytes) {
            Ok(parsed) => {
                for issue in parsed.issues {
                    log::warn!("EXIF: {issue}");
                    notices.push(ReadNotice::Partial(CodecError::corrupt("EXIF", issue)));
                }
                if let Some(reason) = parsed.block.unwritable() {
                    log::warn!("EXIF is read-only: {reason}");
                    notices.push(ReadNotice::Skipped(format!("EXIF cannot be rewritten: {reason}")));
                }
                raw.exif = Some(parsed.block);
            }
            Err(e) => {
                log::warn!("{e}");
                notices.push(ReadNotice::Partial(e));
            }
        }
    }

    if let Some(text) = &segments.xmp {
        let parsed = parse_packet(text);
        if let Some(issue) = parsed.issue {
            log::warn!("XMP: {issue}");
            notices.push(ReadNotice::Partial(CodecError::corrupt("XMP", issue)));
        }
        raw.xmp = Some(XmpPacket {
            text: text.clone(),
            properties: parsed.properties,
        });
    }

    if let Some(bytes) = &segments.iptc {
        let (iptc, issue) = IptcData::parse(bytes);
        if let Some(e) = issue {
            log::warn!("{e}");
            notices.push(ReadNotice::Partial(e));
        }
        raw.iptc = Some(iptc);
    }

    raw.text = segments.text;
    notices.extend(segments.notices.into_iter().map(ReadNotice::Skipped));

    let normalized = normalize(&raw);
    notices.extend(
        normalized
            .fallbacks
            .into_iter()
            .map(|field| ReadNotice::DecodeFallback { field }),
    );

    let (width, height) = dimensions(data).unzip();
    Ok(ReadOutput {
        metadata: normalized.metadata,
        raw,
        general: GeneralInfo {
            format,
            width,
            height,
            file_size: data.len() as u64,
        },
        notices,
    })
}

fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
