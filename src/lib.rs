//! # photo-meta
//!
//! Read, normalize, edit and write photo metadata (EXIF, XMP and IPTC) in
//! JPEG, PNG, TIFF, GIF and BMP files, without disturbing the camera tags
//! you didn't touch.
//!
//! ## Quick Start
//!
//! Read a file, change a field, write it back:
//!
//! ```rust,no_run
//! use photo_meta::codec::{read_metadata, write_metadata, WriteMode, WriteOptions};
//! use std::path::Path;
//!
//! fn main() -> Result<(), photo_meta::CodecError> {
//!     let path = Path::new("photo.jpg");
//!     let mut out = read_metadata(path)?;
//!     println!("Camera: {:?}", out.metadata.text("Model"));
//!
//!     // XPSubject is mirrored to dc:subject automatically
//!     out.metadata.set("XPSubject", "Training Event");
//!     let result = write_metadata(path, &out.metadata, &out.raw, &WriteMode::Overwrite, WriteOptions::default())?;
//!     println!("Wrote: {}", result.fields_written.join(", "));
//!     Ok(())
//! }
//! ```
//!
//! ## Batch Usage
//!
//! Templates and the batch runner build on the codec:
//!
//! ```rust,no_run
//! use photo_meta::batch::{collect_images, Batch, BatchOp, BatchOptions};
//! use photo_meta::config::Config;
//! use photo_meta::template::{FsTemplateStore, TemplateStore};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let store = FsTemplateStore::new(config.template_dir()?);
//!     let template = store.get("wing-conference")?.expect("template exists");
//!
//!     let files = collect_images(&[PathBuf::from("./photos")]);
//!     let report = Batch::new(BatchOp::Apply(template.to_overlay(config.fields.profile)))
//!         .options(BatchOptions {
//!             write: config.write_options(),
//!             backup_originals: config.output.backup_originals,
//!             ..Default::default()
//!         })
//!         .run(&files);
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | EXIF | XMP | IPTC |
//! |--------|------|-----|------|
//! | JPEG (`.jpg`, `.jpeg`) | APP1 | APP1 | APP13 |
//! | PNG (`.png`) | eXIf | iTXt | — |
//! | TIFF (`.tif`, `.tiff`) | IFD0 | tag 700 | tag 33723 |
//! | GIF (`.gif`) | — | application extension | — |
//! | BMP (`.bmp`) | — | — | — |
//!
//! Fields a container has no place for are reported in
//! [`WriteResult::skipped_fields`](codec::WriteResult::skipped_fields).
//!
//! ## Modules
//!
//! - [`codec`]: read, write and clear
//! - [`metadata`]: the normalized field map
//! - [`fields`]: editable fields and how they map to storage
//! - [`batch`]: apply, clear and rename across many files
//! - [`template`]: named field presets and their storage
//! - [`export`]: JSON and text reports
//! - [`rename`]: file name rules
//! - [`config`]: configuration types and loading/saving
//! - [`container`], [`exif`], [`xmp`], [`iptc`]: the format layers

pub mod batch;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod exif;
pub mod export;
pub mod fields;
pub mod iptc;
pub mod metadata;
pub mod normalize;
pub mod raw;
pub mod rename;
pub mod template;
pub mod xmp;

pub use codec::{read_metadata, write_metadata};
pub use container::ImageFormat;
pub use error::CodecError;
pub use metadata::{GpsCoordinate, MetaValue, NormalizedMetadata};
pub use raw::{RawTagSet, RawValue, TagKey};
