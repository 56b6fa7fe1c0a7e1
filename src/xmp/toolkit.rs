//! XMP engine backed by the `xmp-writer` crate.
//!
//! `xmp-writer` covers the Dublin Core properties; anything else is added to
//! its output with the built-in packet surgery.

use xmp_writer::XmpWriter;

use super::{builtin, XmpEdit, XmpEngine, XmpValue, NS_DC};

pub struct ToolkitEngine;

impl XmpEngine for ToolkitEngine {
    fn name(&self) -> &'static str {
        "xmp-writer"
    }

    fn build_packet(&self, props: &[XmpEdit]) -> String {
        let mut writer = XmpWriter::new();
        let mut rest = Vec::new();

        for prop in props {
            let Some(value) = &prop.value else {
                continue;
            };
            let text = value.items().join("; ");
            let items: Vec<String> = match value {
                XmpValue::List(items) => items.clone(),
                XmpValue::Text(s) => vec![s.clone()],
            };
            match (prop.namespace.as_str(), prop.name.as_str()) {
                (NS_DC, "title") => {
                    writer.title([(None, text.as_str())]);
                }
                (NS_DC, "description") => {
                    writer.description([(None, text.as_str())]);
                }
                (NS_DC, "rights") => {
                    writer.rights([(None, text.as_str())]);
                }
                (NS_DC, "creator") => {
                    writer.creator(items.iter().map(String::as_str));
                }
                (NS_DC, "subject") => {
                    writer.subject(items.iter().map(String::as_str));
                }
                _ => rest.push(prop.clone()),
            }
        }

        let packet = writer.finish(None);
        if rest.is_empty() {
            return packet;
        }
        builtin::update_packet(&packet, &rest).unwrap_or_else(|| {
            log::debug!("xmp-writer output not editable, using built-in packet");
            builtin::build_packet(props)
        })
    }
}
