//! IPTC-IIM datasets and the Photoshop `8BIM` resource block that carries
//! them in JPEG APP13.

use crate::error::CodecError;

pub const APP13_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;

/// `ESC % G` in 1:90 (CodedCharacterSet) marks UTF-8 values.
const UTF8_MARKER: &[u8] = b"\x1B%G";
const RECORD_VERSION: [u8; 2] = [0x00, 0x04];

/// One `1C rr dd len data` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptcDataset {
    pub record: u8,
    pub dataset: u8,
    pub data: Vec<u8>,
}

impl IptcDataset {
    pub fn new(record: u8, dataset: u8, data: Vec<u8>) -> Self {
        Self {
            record,
            dataset,
            data,
        }
    }
}

/// An IIM stream, datasets kept in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcData {
    pub datasets: Vec<IptcDataset>,
}

impl IptcData {
    /// Parse an IIM stream. Stops at the first malformed record and
    /// reports it alongside everything read before it.
    pub fn parse(data: &[u8]) -> (Self, Option<CodecError>) {
        let mut datasets = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            if data[pos] != TAG_MARKER {
                // Trailing padding is common; anything else is damage
                if data[pos..].iter().any(|&b| b != 0) {
                    return (
                        Self { datasets },
                        Some(CodecError::corrupt(
                            "IPTC",
                            format!("expected record marker at byte {pos}"),
                        )),
                    );
                }
                break;
            }
            let Some(&[_, record, dataset, hi, lo]) = data.get(pos..pos + 5) else {
                return (
                    Self { datasets },
                    Some(CodecError::corrupt("IPTC", "truncated record header")),
                );
            };
            let mut header = 5;
            let len = if hi & 0x80 != 0 {
                // Extended dataset: the low 15 bits give the size of the length field
                let width = usize::from(u16::from_be_bytes([hi & 0x7F, lo]));
                let Some(field) = data.get(pos + 5..pos + 5 + width).filter(|_| width <= 4) else {
                    return (
                        Self { datasets },
                        Some(CodecError::corrupt("IPTC", "bad extended length")),
                    );
                };
                header += width;
                field.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
            } else {
                usize::from(u16::from_be_bytes([hi, lo]))
            };
            let start = pos + header;
            let Some(value) = data.get(start..start + len) else {
                return (
                    Self { datasets },
                    Some(CodecError::corrupt(
                        "IPTC",
                        format!("record {record}:{dataset} runs past the end"),
                    )),
                );
            };
            datasets.push(IptcDataset::new(record, dataset, value.to_vec()));
            pos = start + len;
        }
        (Self { datasets }, None)
    }

    pub fn is_empty(&self) -> bool {
        self.datasets
            .iter()
            .all(|d| d.record == 1 || (d.record == 2 && d.dataset == 0))
    }

    /// `true` when 1:90 declares UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.datasets
            .iter()
            .any(|d| d.record == 1 && d.dataset == 90 && d.data == UTF8_MARKER)
    }

    pub fn values(&self, record: u8, dataset: u8) -> impl Iterator<Item = &[u8]> {
        self.datasets
            .iter()
            .filter(move |d| d.record == record && d.dataset == dataset)
            .map(|d| d.data.as_slice())
    }

    /// Replace every 2:`dataset` record with `values`, placed where the
    /// first one used to be (or at the end). An empty `values` removes it.
    pub fn set_values(&mut self, dataset: u8, values: Vec<Vec<u8>>) {
        let at = self
            .datasets
            .iter()
            .position(|d| d.record == 2 && d.dataset == dataset);
        self.datasets
            .retain(|d| !(d.record == 2 && d.dataset == dataset));
        let at = at.unwrap_or(self.datasets.len()).min(self.datasets.len());
        let new = values
            .into_iter()
            .map(|v| IptcDataset::new(2, dataset, v));
        self.datasets.splice(at..at, new);
    }

    /// Add the 2:0 record version and, for non-ASCII values, the UTF-8
    /// marker, when missing.
    pub fn ensure_envelope(&mut self, utf8: bool) {
        if utf8 && !self.is_utf8() {
            self.datasets
                .retain(|d| !(d.record == 1 && d.dataset == 90));
            let at = self
                .datasets
                .iter()
                .position(|d| d.record > 1)
                .unwrap_or(self.datasets.len());
            self.datasets
                .insert(at, IptcDataset::new(1, 90, UTF8_MARKER.to_vec()));
        }
        if !self.datasets.iter().any(|d| d.record == 2 && d.dataset == 0) {
            let at = self
                .datasets
                .iter()
                .position(|d| d.record >= 2)
                .unwrap_or(self.datasets.len());
            self.datasets
                .insert(at, IptcDataset::new(2, 0, RECORD_VERSION.to_vec()));
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for d in &self.datasets {
            out.extend_from_slice(&[TAG_MARKER, d.record, d.dataset]);
            if d.data.len() < 0x8000 {
                out.extend_from_slice(&(d.data.len() as u16).to_be_bytes());
            } else {
                out.extend_from_slice(&[0x80, 0x04]);
                out.extend_from_slice(&(d.data.len() as u32).to_be_bytes());
            }
            out.extend_from_slice(&d.data);
        }
        out
    }
}

/// Normalized name for an IPTC dataset.
pub fn dataset_key(record: u8, dataset: u8) -> String {
    match dataset_name(record, dataset) {
        Some(name) => format!("IPTC:{name}"),
        None => format!("IPTC:{record}:{dataset}"),
    }
}

pub fn dataset_name(record: u8, dataset: u8) -> Option<&'static str> {
    if record != 2 {
        return None;
    }
    Some(match dataset {
        5 => "ObjectName",
        7 => "EditStatus",
        10 => "Urgency",
        15 => "Category",
        20 => "SupplementalCategories",
        25 => "Keywords",
        26 => "ContentLocationCode",
        27 => "ContentLocationName",
        40 => "SpecialInstructions",
        55 => "DateCreated",
        60 => "TimeCreated",
        62 => "DigitalCreationDate",
        63 => "DigitalCreationTime",
        65 => "OriginatingProgram",
        70 => "ProgramVersion",
        80 => "By-line",
        85 => "By-lineTitle",
        90 => "City",
        92 => "Sub-location",
        95 => "Province-State",
        100 => "Country-PrimaryLocationCode",
        101 => "Country-PrimaryLocationName",
        103 => "OriginalTransmissionReference",
        105 => "Headline",
        110 => "Credit",
        115 => "Source",
        116 => "CopyrightNotice",
        118 => "Contact",
        120 => "Caption-Abstract",
        122 => "Writer-Editor",
        _ => return None,
    })
}

/// Datasets that may occur more than once and always normalize to a list.
pub fn is_repeatable(record: u8, dataset: u8) -> bool {
    record == 2 && matches!(dataset, 20 | 25 | 80 | 118)
}

/// Pull the IIM stream out of an APP13 body.
pub fn iim_from_app13(contents: &[u8]) -> Option<&[u8]> {
    resources(contents)
        .find(|r| r.id == IPTC_RESOURCE)
        .map(|r| r.data)
}

struct Resource<'a> {
    id: u16,
    /// The whole resource, padding included.
    raw: &'a [u8],
    data: &'a [u8],
}

fn resources(contents: &[u8]) -> impl Iterator<Item = Resource<'_>> {
    let mut pos = if contents.starts_with(APP13_HEADER) {
        APP13_HEADER.len()
    } else {
        contents.len()
    };
    std::iter::from_fn(move || {
        let data = contents;
        if data.get(pos..pos + 4)? != RESOURCE_SIGNATURE {
            return None;
        }
        let id = u16::from_be_bytes([*data.get(pos + 4)?, *data.get(pos + 5)?]);
        // Pascal name: length byte + name, padded to even
        let name_len = usize::from(*data.get(pos + 6)?);
        let name_padded = if (name_len + 1) % 2 == 0 {
            name_len + 1
        } else {
            name_len + 2
        };
        let size_at = pos + 6 + name_padded;
        let size = data.get(size_at..size_at + 4)?;
        let size = u32::from_be_bytes([size[0], size[1], size[2], size[3]]) as usize;
        let start = size_at + 4;
        let body = data.get(start..start + size)?;
        let end = (start + size + size % 2).min(data.len());
        let resource = Resource {
            id,
            raw: &data[pos..end],
            data: body,
        };
        pos = end;
        Some(resource)
    })
}

/// Build an APP13 body: every resource of `existing` except the IPTC one,
/// then `iim` as resource 0x0404. `None` when nothing is left to store.
pub fn build_app13(existing: Option<&[u8]>, iim: Option<&[u8]>) -> Option<Vec<u8>> {
    let mut out = APP13_HEADER.to_vec();
    if let Some(contents) = existing {
        for r in resources(contents).filter(|r| r.id != IPTC_RESOURCE) {
            out.extend_from_slice(r.raw);
        }
    }
    if let Some(iim) = iim.filter(|d| !d.is_empty()) {
        out.extend_from_slice(RESOURCE_SIGNATURE);
        out.extend_from_slice(&IPTC_RESOURCE.to_be_bytes());
        // Empty pascal name, padded
        out.extend_from_slice(&[0x00, 0x00]);
        out.extend_from_slice(&(iim.len() as u32).to_be_bytes());
        out.extend_from_slice(iim);
        if iim.len() % 2 != 0 {
            out.push(0x00);
        }
    }
    (out.len() > APP13_HEADER.len()).then_some(out)
}
