use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::container::{self, Capabilities, Container, MetadataSegments};
use crate::error::CodecError;
use crate::exif::tags::{self, IFD0};
use crate::exif::value::{ascii, rationals};
use crate::exif::{Endian, ExifBlock, IfdKind, Value};
use crate::fields::{self, FieldGroup, Namespace, Slot, Target};
use crate::iptc::IptcData;
use crate::metadata::{MetaValue, NormalizedMetadata};
use crate::normalize::{self, normalize};
use crate::raw::RawTagSet;
use crate::xmp::{self, EnginePreference, XmpEdit, XmpValue};

use super::reader::read_bytes;

/// GPS tag format version written alongside new coordinates.
const GPS_VERSION: [u8; 4] = [2, 3, 0, 0];

/// Where the result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the source file.
    Overwrite,
    /// Leave the source alone and write to this path.
    SaveAs(PathBuf),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Compute everything, touch nothing.
    pub dry_run: bool,
    pub xmp_engine: EnginePreference,
}

/// Outcome of one write or clear.
#[derive(Debug, Default)]
pub struct WriteResult {
    /// The file that was (or would have been) written.
    pub path: PathBuf,
    pub fields_written: Vec<String>,
    pub fields_removed: Vec<String>,
    /// Fields this container has no place for.
    pub skipped_fields: Vec<String>,
    /// Per-field problems; the other fields were still written.
    pub field_errors: Vec<CodecError>,
    /// XMP engine used, when an XMP packet was produced.
    pub xmp_engine: Option<&'static str>,
    pub dry_run: bool,
}

impl WriteResult {
    /// `true` when the file content did not need to change.
    pub fn is_unchanged(&self) -> bool {
        self.fields_written.is_empty() && self.fields_removed.is_empty()
    }
}

/// An editable slot and the value it should end up with (`None` removes it).
struct Change {
    slot: &'static Slot,
    value: Option<MetaValue>,
}

/// Write the edited `normalized` metadata to the file at `path`.
///
/// `original_raw` is the tag set captured when the file was read. Only the
/// editable slots whose value differs from what `original_raw` normalizes to
/// are re-encoded; a changed slot is also mirrored to the unchanged slots of
/// its group. An editable key missing from `normalized` removes that slot.
///
/// # Example
///
/// ```rust,no_run
/// use photo_meta::codec::{read_metadata, write_metadata, WriteMode, WriteOptions};
///
/// let path = std::path::Path::new("photo.jpg");
/// let mut out = read_metadata(path).unwrap();
/// out.metadata.set("XPSubject", "Training Event");
/// let result = write_metadata(path, &out.metadata, &out.raw, &WriteMode::Overwrite, WriteOptions::default()).unwrap();
/// println!("written: {:?}", result.fields_written);
/// ```
pub fn write_metadata(
    path: &Path,
    normalized: &NormalizedMetadata,
    original_raw: &RawTagSet,
    mode: &WriteMode,
    options: WriteOptions,
) -> Result<WriteResult, CodecError> {
    let data = read_file(path)?;
    let format = container::detect(path, &data)?;
    if format != original_raw.format {
        return Err(CodecError::UnsupportedFormat(format!(
            "{} was read as {} but is now {}",
            path.display(),
            original_raw.format,
            format
        )));
    }
    let container = container::container_for(format);
    let target = target_path(path, mode);

    let mut result = WriteResult {
        path: target.clone(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    let changes = plan_changes(normalized, original_raw, container.capabilities(), &mut result);
    let mut segments = container.read_segments(&data)?;
    let mut any_applied = false;

    let exif: Vec<&Change> = changes.iter().filter(|c| c.slot.namespace() == Namespace::Exif).collect();
    if !exif.is_empty() {
        any_applied |= encode_exif(&exif, original_raw, container.as_ref(), &data, &mut segments, &mut result);
    }
    let xmp: Vec<&Change> = changes.iter().filter(|c| c.slot.namespace() == Namespace::Xmp).collect();
    if !xmp.is_empty() {
        any_applied |= encode_xmp(&xmp, original_raw, container.as_ref(), &data, options, &mut segments, &mut result);
    }
    let iptc: Vec<&Change> = changes.iter().filter(|c| c.slot.namespace() == Namespace::Iptc).collect();
    if !iptc.is_empty() {
        any_applied |= encode_iptc(&iptc, original_raw, container.as_ref(), &data, &mut segments, &mut result);
    }

    let output = if any_applied {
        container.write_segments(&data, &segments)?
    } else {
        log::debug!("{}: no editable field changed", path.display());
        data
    };

    if options.dry_run {
        log::info!("[dry-run] would write {}", target.display());
        return Ok(result);
    }
    if !any_applied && target == path {
        return Ok(result);
    }
    commit(&target, path, &output)?;
    log::info!(
        "Wrote {} ({} set, {} removed)",
        target.display(),
        result.fields_written.len(),
        result.fields_removed.len()
    );
    Ok(result)
}

/// Remove every EXIF, XMP and IPTC segment (and container text) from the
/// file, leaving pixel data untouched.
pub fn clear_metadata(path: &Path, mode: &WriteMode, options: WriteOptions) -> Result<WriteResult, CodecError> {
    let data = read_file(path)?;
    let format = container::detect(path, &data)?;
    let container = container::container_for(format);
    let target = target_path(path, mode);

    let before = read_bytes(&data, format)?;
    let mut result = WriteResult {
        path: target.clone(),
        fields_removed: before.metadata.keys().map(str::to_string).collect(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    let stripped = container.strip_metadata_segments(&data)?;
    let changed = stripped != data;
    if !changed {
        result.fields_removed.clear();
    }

    if options.dry_run {
        log::info!("[dry-run] would clear {}", target.display());
        return Ok(result);
    }
    if !changed && target == path {
        return Ok(result);
    }
    commit(&target, path, &stripped)?;
    log::info!("Cleared {} ({} fields)", target.display(), result.fields_removed.len());
    Ok(result)
}

fn read_file(path: &Path) -> Result<Vec<u8>, CodecError> {
    fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn target_path(path: &Path, mode: &WriteMode) -> PathBuf {
    match mode {
        WriteMode::Overwrite => path.to_path_buf(),
        WriteMode::SaveAs(target) => target.clone(),
    }
}

// ── planning ──

fn effective<'a>(meta: &'a NormalizedMetadata, key: &str) -> Option<&'a MetaValue> {
    meta.get(key).filter(|v| !v.is_empty())
}

/// Work out which slots change, mirror group edits, and drop what the
/// container cannot hold or the slot cannot store.
fn plan_changes(
    normalized: &NormalizedMetadata,
    original_raw: &RawTagSet,
    caps: Capabilities,
    result: &mut WriteResult,
) -> Vec<Change> {
    let baseline = normalize(original_raw).metadata;

    let mut wanted: Vec<(&'static Slot, Option<MetaValue>)> = fields::SLOTS
        .iter()
        .filter_map(|slot| {
            let old = effective(&baseline, slot.key);
            let new = effective(normalized, slot.key);
            let same = match (old, new) {
                (Some(old), Some(new)) => slot.coerce(old).ok() == slot.coerce(new).ok(),
                (None, None) => true,
                _ => false,
            };
            (!same).then(|| (slot, new.cloned()))
        })
        .collect();

    // A group edit reaches every slot of the group
    for group in FieldGroup::ALL {
        let Some(source) = wanted
            .iter()
            .find(|(slot, _)| FieldGroup::of_slot(slot.key) == Some(group))
            .map(|(_, value)| value.clone())
        else {
            continue;
        };
        for key in group.slots() {
            if wanted.iter().any(|(slot, _)| slot.key == *key) {
                continue;
            }
            if let Some(slot) = fields::slot(key) {
                log::debug!("mirroring {} to {key}", group.label(Default::default()));
                wanted.push((slot, source.clone()));
            }
        }
    }

    let mut changes = Vec::new();
    for (slot, value) in wanted {
        if !caps.supports(slot.namespace()) {
            if value.is_some() {
                log::debug!("{}: not supported by this container", slot.key);
                result.skipped_fields.push(slot.key.to_string());
            }
            continue;
        }
        let value = match value.map(|v| slot.coerce(&v)).transpose() {
            Ok(value) => value,
            Err(reason) => {
                log::warn!("{}: {reason}", slot.key);
                result.field_errors.push(CodecError::InvalidValue {
                    field: slot.key.to_string(),
                    reason,
                });
                continue;
            }
        };
        changes.push(Change { slot, value });
    }
    changes
}

fn record(result: &mut WriteResult, change: &Change) {
    let key = change.slot.key.to_string();
    if change.value.is_some() {
        result.fields_written.push(key);
    } else {
        result.fields_removed.push(key);
    }
}

/// Record an overflow when the segment carrying `payload` would exceed what
/// the container allows. The caller then keeps the original segment.
fn overflow(
    result: &mut WriteResult,
    container: &dyn Container,
    data: &[u8],
    ns: Namespace,
    field: &str,
    payload: &[u8],
) -> bool {
    match container.segment_size(data, ns, payload) {
        Some((len, limit)) if len > limit => {
            log::warn!("{field} segment is {len} bytes, limit is {limit}; keeping the original");
            result.field_errors.push(CodecError::EncodingOverflow {
                field: field.to_string(),
                len,
                limit,
            });
            true
        }
        _ => false,
    }
}

// ── EXIF ──

/// Apply the EXIF changes to a copy of the original block. A block that
/// cannot be serialized leaves the EXIF segment as it was and records why.
fn encode_exif(
    changes: &[&Change],
    original_raw: &RawTagSet,
    container: &dyn Container,
    data: &[u8],
    segments: &mut MetadataSegments,
    result: &mut WriteResult,
) -> bool {
    let mut block = original_raw
        .exif
        .clone()
        .unwrap_or_else(|| ExifBlock::new(Endian::Little));

    for change in changes {
        apply_exif(&mut block, change);
    }
    // A GPS directory left with only its version tag carries nothing
    let gps_tags: Vec<u16> = block
        .entries()
        .filter(|(kind, _)| *kind == IfdKind::Gps)
        .map(|(_, f)| f.tag.number())
        .collect();
    if gps_tags.iter().all(|&tag| tag == tags::GPS_VERSION_ID) {
        block.clear_directory(IfdKind::Gps);
    }

    let bytes = if block.is_empty() && container.format() != container::ImageFormat::Tiff {
        None
    } else {
        match block.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("EXIF not rewritten, keeping the original: {e}");
                result.field_errors.push(e);
                return false;
            }
        }
    };
    if overflow(
        result,
        container,
        data,
        Namespace::Exif,
        "EXIF",
        bytes.as_deref().unwrap_or_default(),
    ) {
        return false;
    }

    segments.exif = bytes;
    for change in changes {
        record(result, change);
    }
    true
}

fn apply_exif(block: &mut ExifBlock, change: &Change) {
    let Some(value) = &change.value else {
        match change.slot.target {
            Target::ExifAscii(tag) | Target::ExifXp(tag) => {
                block.remove(IFD0, tag);
            }
            Target::UserComment => {
                block.remove(IfdKind::Exif, tags::USER_COMMENT);
            }
            Target::GpsCoordinate { tag, ref_tag, .. } => {
                block.remove(IfdKind::Gps, tag);
                block.remove(IfdKind::Gps, ref_tag);
            }
            Target::GpsAltitude => {
                block.remove(IfdKind::Gps, tags::GPS_ALTITUDE);
                block.remove(IfdKind::Gps, tags::GPS_ALTITUDE_REF);
            }
            Target::Xmp { .. } | Target::Iptc { .. } => {}
        }
        return;
    };

    match change.slot.target {
        Target::ExifAscii(tag) => block.set(IFD0, tag, ascii(&value.as_text())),
        Target::ExifXp(tag) => block.set(
            IFD0,
            tag,
            Value::Byte(normalize::encode_xp(&value.as_text())),
        ),
        Target::UserComment => block.set(
            IfdKind::Exif,
            tags::USER_COMMENT,
            Value::Undefined(normalize::encode_user_comment(&value.as_text()), 0),
        ),
        Target::GpsCoordinate {
            tag,
            ref_tag,
            positive,
            negative,
            ..
        } => {
            let MetaValue::Gps(coord) = value else {
                return;
            };
            let degrees = coord.decimal_degrees;
            let reference = if degrees < 0.0 { negative } else { positive };
            ensure_gps_version(block);
            block.set(IfdKind::Gps, ref_tag, ascii(&reference.to_string()));
            block.set(IfdKind::Gps, tag, rationals(&normalize::decimal_to_dms(degrees)));
        }
        Target::GpsAltitude => {
            let MetaValue::Number(meters) = value else {
                return;
            };
            ensure_gps_version(block);
            block.set(
                IfdKind::Gps,
                tags::GPS_ALTITUDE_REF,
                Value::Byte(vec![u8::from(*meters < 0.0)]),
            );
            block.set(
                IfdKind::Gps,
                tags::GPS_ALTITUDE,
                rationals(&[normalize::f64_to_rational(*meters)]),
            );
        }
        Target::Xmp { .. } | Target::Iptc { .. } => {}
    }
}

fn ensure_gps_version(block: &mut ExifBlock) {
    if block.get(IfdKind::Gps, tags::GPS_VERSION_ID).is_none() {
        block.set(IfdKind::Gps, tags::GPS_VERSION_ID, Value::Byte(GPS_VERSION.to_vec()));
    }
}

// ── XMP ──

fn encode_xmp(
    changes: &[&Change],
    original_raw: &RawTagSet,
    container: &dyn Container,
    data: &[u8],
    options: WriteOptions,
    segments: &mut MetadataSegments,
    result: &mut WriteResult,
) -> bool {
    let edits: Vec<XmpEdit> = changes
        .iter()
        .filter_map(|change| {
            let Target::Xmp {
                namespace,
                prefix,
                name,
                form,
            } = change.slot.target
            else {
                return None;
            };
            Some(XmpEdit {
                namespace: namespace.to_string(),
                prefix: prefix.to_string(),
                name: name.to_string(),
                form,
                value: change.value.as_ref().map(|v| match v {
                    MetaValue::List(items) => XmpValue::List(items.clone()),
                    other => XmpValue::Text(other.as_text()),
                }),
            })
        })
        .collect();

    let engine = xmp::select_engine(options.xmp_engine);
    let packet = xmp::apply_edits(engine.as_ref(), original_raw.xmp.as_ref(), &edits);
    if overflow(result, container, data, Namespace::Xmp, "XMP", packet.as_bytes()) {
        return false;
    }

    segments.xmp = Some(packet);
    result.xmp_engine = Some(engine.name());
    for change in changes {
        record(result, change);
    }
    true
}

// ── IPTC ──

fn encode_iptc(
    changes: &[&Change],
    original_raw: &RawTagSet,
    container: &dyn Container,
    data: &[u8],
    segments: &mut MetadataSegments,
    result: &mut WriteResult,
) -> bool {
    let mut iptc = original_raw.iptc.clone().unwrap_or_else(IptcData::default);
    let mut applied = Vec::new();

    for change in changes {
        let Target::Iptc { dataset, limit } = change.slot.target else {
            continue;
        };
        let values: Vec<Vec<u8>> = match &change.value {
            None => Vec::new(),
            Some(MetaValue::List(items)) => items.iter().map(|s| s.as_bytes().to_vec()).collect(),
            Some(other) => vec![other.as_text().into_bytes()],
        };
        if let Some(too_long) = values.iter().find(|v| v.len() > limit) {
            log::warn!("{}: {} bytes exceeds the {limit}-byte limit", change.slot.key, too_long.len());
            result.field_errors.push(CodecError::EncodingOverflow {
                field: change.slot.key.to_string(),
                len: too_long.len(),
                limit,
            });
            continue;
        }
        iptc.set_values(dataset, values);
        applied.push(*change);
    }
    if applied.is_empty() {
        return false;
    }

    let bytes = if iptc.is_empty() {
        None
    } else {
        let utf8 = iptc
            .datasets
            .iter()
            .any(|d| d.record == 2 && !d.data.is_ascii());
        iptc.ensure_envelope(utf8);
        Some(iptc.to_bytes())
    };
    if overflow(
        result,
        container,
        data,
        Namespace::Iptc,
        "IPTC",
        bytes.as_deref().unwrap_or_default(),
    ) {
        return false;
    }

    segments.iptc = bytes;
    for change in applied {
        record(result, change);
    }
    true
}

// ── commit ──

/// Replace `target` with `bytes` atomically: write a temp file next to it,
/// then rename over it. On any error the target is left as it was.
fn commit(target: &Path, source: &Path, bytes: &[u8]) -> Result<(), CodecError> {
    let existing = fs::metadata(target).ok();
    if existing.as_ref().is_some_and(|m| m.permissions().readonly()) {
        return Err(CodecError::WritePermission {
            path: target.to_path_buf(),
        });
    }
    let permissions = existing
        .or_else(|| fs::metadata(source).ok())
        .map(|m| m.permissions());

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CodecError::from_io(target, e))?;
    tmp.write_all(bytes).map_err(|e| CodecError::from_io(target, e))?;
    tmp.as_file().sync_all().map_err(|e| CodecError::from_io(target, e))?;
    if let Some(permissions) = permissions {
        fs::set_permissions(tmp.path(), permissions).map_err(|e| CodecError::from_io(target, e))?;
    }
    tmp.persist(target)
        .map_err(|e| CodecError::from_io(target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_metadata;
    use crate::metadata::GpsCoordinate;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, name: &str, format: image::ImageFormat) -> PathBuf {
        let img = image::RgbImage::from_fn(8, 6, |x, y| image::Rgb([x as u8 * 30, y as u8 * 40, 99]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        let path = dir.path().join(name);
        fs::write(&path, out.into_inner()).unwrap();
        path
    }

    fn edit(path: &Path, f: impl FnOnce(&mut NormalizedMetadata)) -> WriteResult {
        let mut out = read_metadata(path).unwrap();
        f(&mut out.metadata);
        write_metadata(path, &out.metadata, &out.raw, &WriteMode::Overwrite, WriteOptions::default()).unwrap()
    }

    // ── write ──

    #[test]
    fn subject_is_mirrored_to_xmp() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "a.jpg", image::ImageFormat::Jpeg);
        let result = edit(&path, |m| m.set("XPSubject", "Training Event"));
        assert!(result.fields_written.contains(&"dc:subject".to_string()));

        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.text("XPSubject").as_deref(), Some("Training Event"));
        assert_eq!(back.list("dc:subject"), Some(vec!["Training Event".to_string()]));
    }

    #[test]
    fn keywords_keep_their_order() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "k.jpg", image::ImageFormat::Jpeg);
        let keywords = vec!["Civil Air Patrol".to_string(), "Kentucky Wing".to_string()];
        edit(&path, |m| m.set("XPKeywords", keywords.clone()));
        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.list("XPKeywords"), Some(keywords.clone()));
        assert_eq!(back.list("IPTC:Keywords"), Some(keywords));
    }

    #[test]
    fn gps_is_written_as_dms_with_reference() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "g.jpg", image::ImageFormat::Jpeg);
        edit(&path, |m| {
            m.set("GPSLatitude", GpsCoordinate::new(38.254250));
            m.set("GPSLongitude", GpsCoordinate::new(-85.759407));
            m.set("GPSAltitude", -12.5);
        });
        let back = read_metadata(&path).unwrap().metadata;
        let Some(MetaValue::Gps(lat)) = back.get("GPSLatitude") else {
            panic!("latitude missing");
        };
        let Some(MetaValue::Gps(lon)) = back.get("GPSLongitude") else {
            panic!("longitude missing");
        };
        assert!((lat.decimal_degrees - 38.254250).abs() < 1e-5);
        assert!((lon.decimal_degrees + 85.759407).abs() < 1e-5);
        assert_eq!(back.get("GPSAltitude"), Some(&MetaValue::Number(-12.5)));
    }

    #[test]
    fn invalid_gps_is_a_field_error() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "bad.jpg", image::ImageFormat::Jpeg);
        let result = edit(&path, |m| {
            m.set("GPSLatitude", "north-ish");
            m.set("Copyright", "© 2024");
        });
        assert!(matches!(
            result.field_errors.as_slice(),
            [CodecError::InvalidValue { field, .. }] if field == "GPSLatitude"
        ));
        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.text("Copyright").as_deref(), Some("© 2024"));
    }

    #[test]
    fn empty_value_removes_the_group() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "r.jpg", image::ImageFormat::Jpeg);
        edit(&path, |m| m.set("XPTitle", "Harbour"));
        assert_eq!(read_metadata(&path).unwrap().metadata.text("dc:title").as_deref(), Some("Harbour"));

        let result = edit(&path, |m| m.set("XPTitle", ""));
        assert!(result.fields_removed.contains(&"XPTitle".to_string()));
        let back = read_metadata(&path).unwrap().metadata;
        assert!(back.get("XPTitle").is_none());
        assert!(back.get("dc:title").is_none());
        assert!(back.get("IPTC:ObjectName").is_none());
    }

    #[test]
    fn iptc_limit_is_reported_per_field() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "o.jpg", image::ImageFormat::Jpeg);
        let long = "x".repeat(100);
        let result = edit(&path, |m| m.set("XPTitle", long.as_str()));
        assert!(result.field_errors.iter().any(|e| matches!(
            e,
            CodecError::EncodingOverflow { field, len: 100, limit: 64 } if field == "IPTC:ObjectName"
        )));
        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.text("XPTitle").as_deref(), Some(long.as_str()));
        assert_eq!(back.text("IPTC:Headline").as_deref(), Some(long.as_str()));
    }

    #[test]
    fn oversized_xmp_keeps_the_original_segment() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "big.jpg", image::ImageFormat::Jpeg);
        // Fits an EXIF segment on its own but not once wrapped in a packet
        let huge = "y".repeat(65_400);
        let result = edit(&path, |m| m.set("dc:rights", huge.as_str()));
        assert!(result
            .field_errors
            .iter()
            .any(|e| matches!(e, CodecError::EncodingOverflow { field, .. } if field == "XMP")));
        let back = read_metadata(&path).unwrap().metadata;
        assert!(back.get("dc:rights").is_none());
        assert_eq!(back.text("Copyright").as_deref(), Some(huge.as_str()));
    }

    /// Insert an APP13 holding one `len`-byte Photoshop resource (0x0409)
    /// right after the first segment.
    fn add_photoshop_resource(path: &Path, len: usize) {
        use img_parts::jpeg::{Jpeg, JpegSegment};
        use img_parts::Bytes;

        let mut body = crate::iptc::APP13_HEADER.to_vec();
        body.extend_from_slice(b"8BIM");
        body.extend_from_slice(&0x0409u16.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&(len as u32).to_be_bytes());
        body.extend(vec![0x55; len]);

        let mut jpeg = Jpeg::from_bytes(Bytes::from(fs::read(path).unwrap())).unwrap();
        jpeg.segments_mut()
            .insert(1, JpegSegment::new_with_contents(0xED, Bytes::from(body)));
        fs::write(path, jpeg.encoder().bytes()).unwrap();
    }

    #[test]
    fn full_app13_keeps_iptc_and_writes_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "ps.jpg", image::ImageFormat::Jpeg);
        add_photoshop_resource(&path, 65_480);

        let result = edit(&path, |m| m.set("XPTitle", "Harbour at dusk"));
        assert!(result
            .field_errors
            .iter()
            .any(|e| matches!(e, CodecError::EncodingOverflow { field, .. } if field == "IPTC")));
        assert!(result.fields_written.contains(&"XPTitle".to_string()));
        assert!(!result.fields_written.contains(&"IPTC:ObjectName".to_string()));

        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.text("XPTitle").as_deref(), Some("Harbour at dusk"));
        assert_eq!(back.text("dc:title").as_deref(), Some("Harbour at dusk"));
        assert!(back.get("IPTC:ObjectName").is_none());
    }

    #[test]
    fn read_only_exif_is_kept_while_xmp_is_written() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "ro-exif.jpg", image::ImageFormat::Jpeg);
        // IFD0 with ImageDescription "Pier" and tag 0xC000 of unknown type 99
        let mut tiff = b"II\x2A\x00\x08\x00\x00\x00\x02\x00".to_vec();
        tiff.extend_from_slice(&[0x0E, 0x01, 2, 0, 4, 0, 0, 0, b'P', b'i', b'e', b'r']);
        tiff.extend_from_slice(&[0x00, 0xC0, 99, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        let data = container::JpegContainer
            .write_segments(
                &fs::read(&path).unwrap(),
                &MetadataSegments {
                    exif: Some(tiff.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        fs::write(&path, data).unwrap();

        let result = edit(&path, |m| m.set("XPTitle", "Harbour"));
        assert!(result
            .field_errors
            .iter()
            .any(|e| matches!(e, CodecError::CorruptMetadata { segment: "EXIF", .. })));
        assert!(!result.fields_written.contains(&"XPTitle".to_string()));

        let written = fs::read(&path).unwrap();
        let segments = container::JpegContainer.read_segments(&written).unwrap();
        assert_eq!(segments.exif, Some(tiff));
        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.text("dc:title").as_deref(), Some("Harbour"));
        assert_eq!(back.text("ImageDescription").as_deref(), Some("Pier"));
    }

    #[test]
    fn format_change_since_read_is_refused() {
        let dir = TempDir::new().unwrap();
        let jpeg = fixture(&dir, "was.jpg", image::ImageFormat::Jpeg);
        let png = fixture(&dir, "now.png", image::ImageFormat::Png);
        let before = fs::read(&png).unwrap();

        let mut out = read_metadata(&jpeg).unwrap();
        out.metadata.set("Artist", "Ana");
        let err = write_metadata(&png, &out.metadata, &out.raw, &WriteMode::Overwrite, WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));
        assert_eq!(fs::read(&png).unwrap(), before);
    }

    #[test]
    fn png_skips_iptc() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "p.png", image::ImageFormat::Png);
        let result = edit(&path, |m| m.set("XPKeywords", vec!["sky".to_string()]));
        assert_eq!(result.skipped_fields, vec!["IPTC:Keywords".to_string()]);
        let back = read_metadata(&path).unwrap().metadata;
        assert_eq!(back.list("XPKeywords"), Some(vec!["sky".to_string()]));
    }

    #[test]
    fn unchanged_write_leaves_bytes_alone() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "u.jpg", image::ImageFormat::Jpeg);
        edit(&path, |m| m.set("Artist", "Ana"));
        let before = fs::read(&path).unwrap();

        let result = edit(&path, |_| {});
        assert!(result.is_unchanged());
        assert_eq!(fs::read(&path).unwrap(), before);

        let copy = dir.path().join("copy.jpg");
        let out = read_metadata(&path).unwrap();
        write_metadata(&path, &out.metadata, &out.raw, &WriteMode::SaveAs(copy.clone()), WriteOptions::default())
            .unwrap();
        assert_eq!(fs::read(&copy).unwrap(), before);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "d.jpg", image::ImageFormat::Jpeg);
        let before = fs::read(&path).unwrap();
        let mut out = read_metadata(&path).unwrap();
        out.metadata.set("Artist", "Ana");
        let options = WriteOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = write_metadata(&path, &out.metadata, &out.raw, &WriteMode::Overwrite, options).unwrap();
        assert!(result.dry_run);
        assert!(result.fields_written.contains(&"Artist".to_string()));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn read_only_target_is_a_permission_error() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "ro.jpg", image::ImageFormat::Jpeg);
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let mut out = read_metadata(&path).unwrap();
        out.metadata.set("Artist", "Ana");
        let err = write_metadata(&path, &out.metadata, &out.raw, &WriteMode::Overwrite, WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::WritePermission { .. }));
    }

    // ── clear ──

    #[test]
    fn clear_empties_metadata_and_keeps_pixels() {
        let dir = TempDir::new().unwrap();
        for (name, format) in [
            ("c.jpg", image::ImageFormat::Jpeg),
            ("c.png", image::ImageFormat::Png),
            ("c.tif", image::ImageFormat::Tiff),
            ("c.gif", image::ImageFormat::Gif),
        ] {
            let path = fixture(&dir, name, format);
            edit(&path, |m| m.set("XPTitle", "Harbour"));
            assert!(!read_metadata(&path).unwrap().metadata.is_empty(), "{name}");
            let pixels = image::open(&path).unwrap().to_rgba8();

            let result = clear_metadata(&path, &WriteMode::Overwrite, WriteOptions::default()).unwrap();
            assert!(!result.fields_removed.is_empty(), "{name}");
            assert!(read_metadata(&path).unwrap().metadata.is_empty(), "{name}");
            assert_eq!(image::open(&path).unwrap().to_rgba8(), pixels, "{name}");
        }
    }
}
