//! Read, write and clear metadata on image files.
//!
//! [`read_metadata`] produces a [`NormalizedMetadata`](crate::NormalizedMetadata)
//! plus the [`RawTagSet`](crate::RawTagSet) it came from. Hand both back to
//! [`write_metadata`] after editing: the writer re-encodes only the editable
//! slots whose value changed and copies every other tag through untouched.

mod reader;
mod writer;

pub use reader::{read_bytes, read_metadata, GeneralInfo, ReadNotice, ReadOutput};
pub use writer::{clear_metadata, write_metadata, WriteMode, WriteOptions, WriteResult};
