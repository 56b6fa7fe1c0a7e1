//! The as-read, container-native tag set.
//!
//! A [`RawTagSet`] is captured by every read and handed back to the writer,
//! which patches only the slots that changed and copies everything else
//! through untouched.

use crate::container::ImageFormat;
use crate::exif::{value, ExifBlock, IfdKind};
use crate::iptc::IptcData;
use crate::xmp::{XmpPacket, XmpValue};

/// Namespace-qualified tag identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKey {
    Exif { ifd: IfdKind, tag: u16 },
    /// `namespace` is the property's namespace URI.
    Xmp { namespace: String, name: String },
    Iptc { record: u8, dataset: u8 },
}

/// An untyped value as stored in the container.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Integer(Vec<i64>),
    Rational(Vec<(u32, u32)>),
    SRational(Vec<(i32, i32)>),
    /// Degrees, minutes, seconds.
    RationalTriple([(u32, u32); 3]),
    Float(Vec<f64>),
    /// ASCII field bytes, terminator included.
    Ascii(Vec<u8>),
    /// UTF-16LE bytes of an XP field.
    Utf16(Vec<u8>),
    Bytes(Vec<u8>),
    Text(String),
    TextList(Vec<String>),
}

/// Everything a read found in one file, keyed by namespace.
#[derive(Debug, Clone)]
pub struct RawTagSet {
    pub format: ImageFormat,
    pub exif: Option<ExifBlock>,
    pub xmp: Option<XmpPacket>,
    pub iptc: Option<IptcData>,
    /// Container-level text (PNG text chunks, GIF comments) as
    /// `(field key, value)`.
    pub text: Vec<(String, String)>,
}

impl RawTagSet {
    pub fn empty(format: ImageFormat) -> Self {
        Self {
            format,
            exif: None,
            xmp: None,
            iptc: None,
            text: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exif.as_ref().is_none_or(ExifBlock::is_empty)
            && self.xmp.as_ref().is_none_or(|x| x.properties.is_empty())
            && self.iptc.as_ref().is_none_or(IptcData::is_empty)
            && self.text.is_empty()
    }

    /// Flatten every namespace into `(key, value)` pairs.
    pub fn tags(&self) -> Vec<(TagKey, RawValue)> {
        let mut out = Vec::new();
        if let Some(block) = &self.exif {
            for (ifd, entry) in block.entries() {
                out.push((
                    TagKey::Exif {
                        ifd,
                        tag: entry.tag.number(),
                    },
                    value::decode(ifd, entry),
                ));
            }
        }
        if let Some(xmp) = &self.xmp {
            for prop in &xmp.properties {
                let value = match &prop.value {
                    XmpValue::Text(s) => RawValue::Text(s.clone()),
                    XmpValue::List(items) => RawValue::TextList(items.clone()),
                };
                out.push((
                    TagKey::Xmp {
                        namespace: prop.namespace.clone(),
                        name: prop.name.clone(),
                    },
                    value,
                ));
            }
        }
        if let Some(iptc) = &self.iptc {
            for ds in &iptc.datasets {
                out.push((
                    TagKey::Iptc {
                        record: ds.record,
                        dataset: ds.dataset,
                    },
                    RawValue::Bytes(ds.data.clone()),
                ));
            }
        }
        out
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &TagKey) -> Option<RawValue> {
        match key {
            TagKey::Exif { ifd, tag } => {
                let block = self.exif.as_ref()?;
                block.get(*ifd, *tag).map(|field| value::decode(*ifd, field))
            }
            _ => self
                .tags()
                .into_iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::value::ascii;
    use crate::exif::Endian;
    use crate::iptc::IptcDataset;

    #[test]
    fn empty_set_is_empty() {
        let raw = RawTagSet::empty(ImageFormat::Png);
        assert!(raw.is_empty());
        assert!(raw.tags().is_empty());
    }

    #[test]
    fn tags_span_every_namespace() {
        let mut block = ExifBlock::new(Endian::Little);
        block.set(IfdKind::Image(0), 0x010F, ascii("Canon"));
        let mut raw = RawTagSet::empty(ImageFormat::Jpeg);
        raw.exif = Some(block);
        raw.iptc = Some(IptcData {
            datasets: vec![IptcDataset::new(2, 25, b"sky".to_vec())],
        });

        let tags = raw.tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(
            raw.get(&TagKey::Exif {
                ifd: IfdKind::Image(0),
                tag: 0x010F
            }),
            Some(RawValue::Ascii(b"Canon\0".to_vec()))
        );
        assert_eq!(
            raw.get(&TagKey::Iptc {
                record: 2,
                dataset: 25
            }),
            Some(RawValue::Bytes(b"sky".to_vec()))
        );
        assert!(!raw.is_empty());
    }
}
