//! EXIF/TIFF directories on top of the `exif` crate.
//!
//! - [`block`] holds a parsed IFD chain with its pixel data and serializes it
//!   back with fresh offsets, relocating strips, tiles and the thumbnail
//! - [`tags`] names tags and knows which ones are structural
//! - [`value`] converts field values to typed [`RawValue`](crate::raw::RawValue)s

pub mod block;
pub mod tags;
pub mod value;

pub use ::exif::Value;
pub use block::{Endian, ExifBlock, ImageData, ParsedExif};
pub use tags::IfdKind;
