//! The editable field set: storage slots the writer may change, the logical
//! groups they belong to, and the two naming profiles for those groups.

use serde::{Deserialize, Serialize};

use crate::exif::tags;
use crate::metadata::{GpsCoordinate, MetaValue};
use crate::xmp::{XmpForm, NS_DC, NS_PHOTOSHOP};

/// Value shape a slot stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    List,
    Number,
    Gps,
}

/// Where a slot lives in the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// ASCII tag in IFD0.
    ExifAscii(u16),
    /// UTF-16LE XP tag in IFD0.
    ExifXp(u16),
    /// UserComment in the Exif IFD.
    UserComment,
    /// GPS latitude/longitude with its reference tag and letters.
    GpsCoordinate {
        tag: u16,
        ref_tag: u16,
        positive: char,
        negative: char,
        max: f64,
    },
    GpsAltitude,
    Xmp {
        namespace: &'static str,
        prefix: &'static str,
        name: &'static str,
        form: XmpForm,
    },
    /// Record 2 dataset with its per-value byte limit.
    Iptc { dataset: u8, limit: usize },
}

/// Which container namespace a slot is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Exif,
    Xmp,
    Iptc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub key: &'static str,
    pub shape: Shape,
    pub target: Target,
}

impl Slot {
    pub fn namespace(&self) -> Namespace {
        match self.target {
            Target::Xmp { .. } => Namespace::Xmp,
            Target::Iptc { .. } => Namespace::Iptc,
            _ => Namespace::Exif,
        }
    }

    /// Convert `value` to this slot's shape.
    pub fn coerce(&self, value: &MetaValue) -> Result<MetaValue, String> {
        match self.shape {
            Shape::Text => Ok(MetaValue::Text(value.as_text())),
            Shape::List => Ok(MetaValue::List(value.as_list())),
            Shape::Number => match value {
                MetaValue::Number(n) => Ok(MetaValue::Number(*n)),
                MetaValue::Gps(g) => Ok(MetaValue::Number(g.decimal_degrees)),
                other => parse_number(&other.as_text()).map(MetaValue::Number),
            },
            Shape::Gps => {
                let degrees = match value {
                    MetaValue::Gps(g) => g.decimal_degrees,
                    MetaValue::Number(n) => *n,
                    other => parse_number(&other.as_text())?,
                };
                if let Target::GpsCoordinate { max, .. } = self.target {
                    if !degrees.is_finite() || degrees.abs() > max {
                        return Err(format!("{degrees} is outside ±{max}"));
                    }
                }
                Ok(MetaValue::Gps(GpsCoordinate::new(degrees)))
            }
        }
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{s:?} is not a number"))
}

const fn xmp(
    key: &'static str,
    shape: Shape,
    namespace: &'static str,
    prefix: &'static str,
    name: &'static str,
    form: XmpForm,
) -> Slot {
    Slot {
        key,
        shape,
        target: Target::Xmp {
            namespace,
            prefix,
            name,
            form,
        },
    }
}

const fn iptc(key: &'static str, shape: Shape, dataset: u8, limit: usize) -> Slot {
    Slot {
        key,
        shape,
        target: Target::Iptc { dataset, limit },
    }
}

pub const SLOTS: &[Slot] = &[
    Slot { key: "ImageDescription", shape: Shape::Text, target: Target::ExifAscii(tags::IMAGE_DESCRIPTION) },
    Slot { key: "Artist", shape: Shape::Text, target: Target::ExifAscii(tags::ARTIST) },
    Slot { key: "Copyright", shape: Shape::Text, target: Target::ExifAscii(tags::COPYRIGHT) },
    Slot { key: "XPTitle", shape: Shape::Text, target: Target::ExifXp(tags::XP_TITLE) },
    Slot { key: "XPComment", shape: Shape::Text, target: Target::ExifXp(tags::XP_COMMENT) },
    Slot { key: "XPSubject", shape: Shape::Text, target: Target::ExifXp(tags::XP_SUBJECT) },
    Slot { key: "XPAuthor", shape: Shape::List, target: Target::ExifXp(tags::XP_AUTHOR) },
    Slot { key: "XPKeywords", shape: Shape::List, target: Target::ExifXp(tags::XP_KEYWORDS) },
    Slot { key: "UserComment", shape: Shape::Text, target: Target::UserComment },
    Slot {
        key: "GPSLatitude",
        shape: Shape::Gps,
        target: Target::GpsCoordinate {
            tag: tags::GPS_LATITUDE,
            ref_tag: tags::GPS_LATITUDE_REF,
            positive: 'N',
            negative: 'S',
            max: 90.0,
        },
    },
    Slot {
        key: "GPSLongitude",
        shape: Shape::Gps,
        target: Target::GpsCoordinate {
            tag: tags::GPS_LONGITUDE,
            ref_tag: tags::GPS_LONGITUDE_REF,
            positive: 'E',
            negative: 'W',
            max: 180.0,
        },
    },
    Slot { key: "GPSAltitude", shape: Shape::Number, target: Target::GpsAltitude },
    xmp("dc:title", Shape::Text, NS_DC, "dc", "title", XmpForm::Alt),
    xmp("dc:description", Shape::Text, NS_DC, "dc", "description", XmpForm::Alt),
    xmp("dc:rights", Shape::Text, NS_DC, "dc", "rights", XmpForm::Alt),
    xmp("dc:creator", Shape::List, NS_DC, "dc", "creator", XmpForm::Seq),
    xmp("dc:subject", Shape::List, NS_DC, "dc", "subject", XmpForm::Bag),
    xmp("photoshop:Headline", Shape::Text, NS_PHOTOSHOP, "photoshop", "Headline", XmpForm::Simple),
    iptc("IPTC:ObjectName", Shape::Text, 5, 64),
    iptc("IPTC:Keywords", Shape::List, 25, 64),
    iptc("IPTC:By-line", Shape::List, 80, 32),
    iptc("IPTC:Headline", Shape::Text, 105, 256),
    iptc("IPTC:CopyrightNotice", Shape::Text, 116, 128),
    iptc("IPTC:Caption-Abstract", Shape::Text, 120, 2000),
];

pub fn slot(key: &str) -> Option<&'static Slot> {
    SLOTS.iter().find(|s| s.key == key)
}

pub fn is_editable(key: &str) -> bool {
    slot(key).is_some()
}

/// Labels shown and accepted first for the logical groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldProfile {
    /// Title, Subject, Tags, Comments, Authors, Copyright.
    #[default]
    Classic,
    /// Headline, Description, Creator, Subject, Rights.
    IptcCore,
}

impl FieldProfile {
    /// Groups this profile exposes, in display order.
    pub fn groups(self) -> &'static [FieldGroup] {
        match self {
            FieldProfile::Classic => &FieldGroup::ALL,
            FieldProfile::IptcCore => &[
                FieldGroup::Title,
                FieldGroup::Comments,
                FieldGroup::Authors,
                FieldGroup::Subject,
                FieldGroup::Copyright,
            ],
        }
    }
}

/// A logical field backed by several storage slots that are kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Title,
    Subject,
    Tags,
    Comments,
    Authors,
    Copyright,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 6] = [
        FieldGroup::Title,
        FieldGroup::Subject,
        FieldGroup::Tags,
        FieldGroup::Comments,
        FieldGroup::Authors,
        FieldGroup::Copyright,
    ];

    pub fn slots(self) -> &'static [&'static str] {
        match self {
            FieldGroup::Title => &[
                "XPTitle",
                "ImageDescription",
                "dc:title",
                "photoshop:Headline",
                "IPTC:ObjectName",
                "IPTC:Headline",
            ],
            FieldGroup::Subject => &["XPSubject", "dc:subject"],
            FieldGroup::Tags => &["XPKeywords", "IPTC:Keywords"],
            FieldGroup::Comments => &[
                "XPComment",
                "UserComment",
                "dc:description",
                "IPTC:Caption-Abstract",
            ],
            FieldGroup::Authors => &["XPAuthor", "Artist", "dc:creator", "IPTC:By-line"],
            FieldGroup::Copyright => &["Copyright", "dc:rights", "IPTC:CopyrightNotice"],
        }
    }

    pub fn label(self, profile: FieldProfile) -> &'static str {
        match (profile, self) {
            (FieldProfile::IptcCore, FieldGroup::Title) => "Headline",
            (FieldProfile::IptcCore, FieldGroup::Comments) => "Description",
            (FieldProfile::IptcCore, FieldGroup::Authors) => "Creator",
            (FieldProfile::IptcCore, FieldGroup::Copyright) => "Rights",
            (_, FieldGroup::Title) => "Title",
            (_, FieldGroup::Subject) => "Subject",
            (_, FieldGroup::Tags) => "Tags",
            (_, FieldGroup::Comments) => "Comments",
            (_, FieldGroup::Authors) => "Authors",
            (_, FieldGroup::Copyright) => "Copyright",
        }
    }

    /// Look a group up by label, case-insensitively. `profile`'s labels are
    /// tried first, then the other profile's.
    pub fn from_label(label: &str, profile: FieldProfile) -> Option<FieldGroup> {
        let other = match profile {
            FieldProfile::Classic => FieldProfile::IptcCore,
            FieldProfile::IptcCore => FieldProfile::Classic,
        };
        [profile, other].into_iter().find_map(|p| {
            FieldGroup::ALL
                .into_iter()
                .find(|g| g.label(p).eq_ignore_ascii_case(label))
        })
    }

    /// The group a storage slot belongs to.
    pub fn of_slot(key: &str) -> Option<FieldGroup> {
        FieldGroup::ALL
            .into_iter()
            .find(|g| g.slots().contains(&key))
    }

    /// First populated slot of this group in `meta`, for display.
    pub fn display_value(self, meta: &crate::metadata::NormalizedMetadata) -> Option<&MetaValue> {
        self.slots().iter().find_map(|k| meta.get(k))
    }
}
