use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the metadata codec.
///
/// Only conditions that leave nothing usable for a file surface as an `Err`
/// from [`read_metadata`](crate::codec::read_metadata) or
/// [`write_metadata`](crate::codec::write_metadata). Partial parses and
/// per-field problems are carried inside the read/write results instead.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The container is not JPEG, PNG, TIFF, GIF or BMP.
    #[error("unsupported container format: {0}")]
    UnsupportedFormat(String),

    /// A metadata segment stopped parsing part-way through.
    #[error("corrupt {segment} metadata: {reason}")]
    CorruptMetadata {
        segment: &'static str,
        reason: String,
    },

    /// The target file or its directory cannot be written.
    #[error("cannot write {}: permission denied", path.display())]
    WritePermission { path: PathBuf },

    /// A value does not fit the fixed-size slot it is destined for.
    #[error("{field} is {len} bytes, the slot holds at most {limit}")]
    EncodingOverflow {
        field: String,
        len: usize,
        limit: usize,
    },

    /// A value cannot be converted to the type its slot stores.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CodecError {
    pub(crate) fn corrupt(segment: &'static str, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            segment,
            reason: reason.into(),
        }
    }

    /// Map an I/O error on `path`, turning permission failures into
    /// [`CodecError::WritePermission`].
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::WritePermission {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Short machine-readable name, used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::CorruptMetadata { .. } => "corrupt_metadata",
            Self::WritePermission { .. } => "write_permission",
            Self::EncodingOverflow { .. } => "encoding_overflow",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_maps_to_write_permission() {
        let err = CodecError::from_io(
            Path::new("/tmp/x.jpg"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, CodecError::WritePermission { .. }));
        assert_eq!(err.kind(), "write_permission");
    }

    #[test]
    fn other_io_errors_stay_io() {
        let err = CodecError::from_io(
            Path::new("/tmp/x.jpg"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, CodecError::Io { .. }));
    }

    #[test]
    fn overflow_message_names_field_and_limit() {
        let err = CodecError::EncodingOverflow {
            field: "IPTC:ObjectName".into(),
            len: 80,
            limit: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("IPTC:ObjectName"));
        assert!(msg.contains("64"));
    }
}
