//! XMP packets: parsing, in-place editing, and fresh packet construction.
//!
//! Freshly built packets come from an [`XmpEngine`] chosen once by
//! [`select_engine`]: the toolkit engine when the `xmp-toolkit` feature is
//! compiled in, otherwise the built-in RDF/XML serializer. Editing an
//! existing packet always goes through the built-in surgery so that
//! properties we don't touch survive verbatim.

pub mod builtin;
mod parse;
#[cfg(feature = "xmp-toolkit")]
pub mod toolkit;

use serde::{Deserialize, Serialize};

pub use parse::{parse_packet, ParsedXmp};

pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_PHOTOSHOP: &str = "http://ns.adobe.com/photoshop/1.0/";

/// Well-known namespaces and the prefix their keys are reported under,
/// whatever prefix the packet itself used.
pub const KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("dc", NS_DC),
    ("xmp", "http://ns.adobe.com/xap/1.0/"),
    ("photoshop", NS_PHOTOSHOP),
    ("xmpRights", "http://ns.adobe.com/xap/1.0/rights/"),
    ("exif", "http://ns.adobe.com/exif/1.0/"),
    ("tiff", "http://ns.adobe.com/tiff/1.0/"),
    ("Iptc4xmpCore", "http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/"),
    ("xmpMM", "http://ns.adobe.com/xap/1.0/mm/"),
    ("lr", "http://ns.adobe.com/lightroom/1.0/"),
];

pub fn canonical_prefix(namespace: &str) -> Option<&'static str> {
    KNOWN_NAMESPACES
        .iter()
        .find(|(_, uri)| *uri == namespace)
        .map(|(prefix, _)| *prefix)
}

/// A property value: simple and lang-alt properties are text, Bag/Seq are
/// lists.
#[derive(Debug, Clone, PartialEq)]
pub enum XmpValue {
    Text(String),
    List(Vec<String>),
}

impl XmpValue {
    pub fn items(&self) -> Vec<String> {
        match self {
            XmpValue::Text(s) => vec![s.clone()],
            XmpValue::List(items) => items.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmpProperty {
    pub namespace: String,
    /// Prefix the key is reported under.
    pub prefix: String,
    pub name: String,
    pub value: XmpValue,
}

impl XmpProperty {
    pub fn key(&self) -> String {
        format!("{}:{}", self.prefix, self.name)
    }
}

/// The packet text as found in the file plus what could be parsed out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct XmpPacket {
    pub text: String,
    pub properties: Vec<XmpProperty>,
}

/// How a property is laid out in RDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmpForm {
    Simple,
    /// Language alternative, written as the `x-default` item.
    Alt,
    Bag,
    Seq,
}

/// One property to set (`value: Some`) or remove (`value: None`).
#[derive(Debug, Clone, PartialEq)]
pub struct XmpEdit {
    pub namespace: String,
    pub prefix: String,
    pub name: String,
    pub form: XmpForm,
    pub value: Option<XmpValue>,
}

impl XmpEdit {
    /// Re-emit an already parsed property unchanged.
    pub fn keep(prop: &XmpProperty) -> Self {
        let form = match prop.value {
            XmpValue::Text(_) => XmpForm::Simple,
            XmpValue::List(_) => XmpForm::Bag,
        };
        Self {
            namespace: prop.namespace.clone(),
            prefix: prop.prefix.clone(),
            name: prop.name.clone(),
            form,
            value: Some(prop.value.clone()),
        }
    }
}

/// Something that can serialize a complete packet from scratch.
pub trait XmpEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a packet holding `props` (removals are ignored).
    fn build_packet(&self, props: &[XmpEdit]) -> String;
}

/// Engine preference from the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePreference {
    #[default]
    Auto,
    Builtin,
}

/// Capability check: the toolkit engine when it was compiled in and not
/// overridden, the built-in serializer otherwise.
pub fn select_engine(pref: EnginePreference) -> Box<dyn XmpEngine> {
    #[cfg(feature = "xmp-toolkit")]
    if pref == EnginePreference::Auto {
        log::debug!("XMP engine: toolkit");
        return Box::new(toolkit::ToolkitEngine);
    }
    let _ = pref;
    log::debug!("XMP engine: built-in");
    Box::new(builtin::BuiltinEngine)
}

/// Produce the packet to embed after applying `edits`.
///
/// An existing packet is edited in place. When its structure isn't one we
/// can edit safely, the packet is rebuilt from its parsed properties plus
/// the edits.
pub fn apply_edits(engine: &dyn XmpEngine, existing: Option<&XmpPacket>, edits: &[XmpEdit]) -> String {
    if let Some(packet) = existing {
        if let Some(updated) = builtin::update_packet(&packet.text, edits) {
            return updated;
        }
        log::debug!("existing XMP packet not editable in place, rebuilding");
    }
    let mut props: Vec<XmpEdit> = existing
        .map(|p| {
            p.properties
                .iter()
                .filter(|prop| {
                    !edits
                        .iter()
                        .any(|e| e.namespace == prop.namespace && e.name == prop.name)
                })
                .map(XmpEdit::keep)
                .collect()
        })
        .unwrap_or_default();
    props.extend(edits.iter().filter(|e| e.value.is_some()).cloned());
    engine.build_packet(&props)
}
