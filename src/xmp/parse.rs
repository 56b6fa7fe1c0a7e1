//! RDF/XML packet reader.
//!
//! Walks the packet with `quick-xml`, resolving namespace prefixes against
//! the declarations in scope. Properties come from `rdf:Description`
//! attributes and child elements; containers (`rdf:Alt`/`Bag`/`Seq`) are
//! flattened and structured values are skipped.

use std::collections::HashMap;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{canonical_prefix, XmpProperty, XmpValue, NS_RDF};
use crate::metadata::strip_control;

const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// What could be read from a packet, plus the reason parsing stopped early.
#[derive(Debug, Default)]
pub struct ParsedXmp {
    pub properties: Vec<XmpProperty>,
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    None,
    Alt,
    List,
}

struct PropertyState {
    namespace: String,
    prefix: String,
    name: String,
    depth: usize,
    container: Container,
    text: String,
    items: Vec<(Option<String>, String)>,
    in_item: Option<Option<String>>,
    item_text: String,
    structured: bool,
}

struct Walker {
    scopes: Vec<HashMap<String, String>>,
    depth: usize,
    description_depth: Option<usize>,
    property: Option<PropertyState>,
    out: Vec<XmpProperty>,
}

pub fn parse_packet(text: &str) -> ParsedXmp {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut walker = Walker {
        scopes: Vec::new(),
        depth: 0,
        description_depth: None,
        property: None,
        out: Vec::new(),
    };

    let issue = loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => walker.start(e, false),
            Ok(Event::Empty(ref e)) => walker.start(e, true),
            Ok(Event::End(_)) => walker.end(),
            Ok(Event::Text(ref t)) => {
                if let Ok(raw) = std::str::from_utf8(&t[..]) {
                    let text = unescape(raw)
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| raw.to_string());
                    walker.text(&text);
                }
            }
            Ok(Event::CData(ref c)) => {
                walker.text(&String::from_utf8_lossy(&c[..]));
            }
            Ok(Event::Eof) => break None,
            Ok(_) => {}
            Err(e) => {
                break Some(format!(
                    "XML error at byte {}: {e}",
                    reader.error_position()
                ))
            }
        }
    };

    ParsedXmp {
        properties: walker.out,
        issue,
    }
}

/// Split `prefix:local` into its parts.
fn split_qname(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", qname),
    }
}

impl Walker {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(NS_XML);
        }
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .map(String::as_str)
    }

    /// Resolve a qualified name to `(namespace, reported prefix, local)`.
    fn qualify(&self, qname: &str) -> Option<(String, String, String)> {
        let (prefix, local) = split_qname(qname);
        let ns = self.resolve(prefix)?.to_string();
        let reported = canonical_prefix(&ns).unwrap_or(prefix).to_string();
        Some((ns, reported, local.to_string()))
    }

    fn attributes(e: &BytesStart) -> Vec<(String, String)> {
        e.attributes()
            .filter_map(Result::ok)
            .map(|a| {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                let value = a
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
                (key, value)
            })
            .collect()
    }

    fn start(&mut self, e: &BytesStart, empty: bool) {
        let attrs = Self::attributes(e);
        let scope: HashMap<String, String> = attrs
            .iter()
            .filter_map(|(k, v)| {
                if k == "xmlns" {
                    Some((String::new(), v.clone()))
                } else {
                    k.strip_prefix("xmlns:").map(|p| (p.to_string(), v.clone()))
                }
            })
            .collect();
        self.scopes.push(scope);
        self.depth += 1;

        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let resolved = self.qualify(&qname);
        let is_rdf = |local: &str| {
            resolved
                .as_ref()
                .is_some_and(|(ns, _, l)| ns == NS_RDF && l == local)
        };

        if let Some(prop) = self.property.as_mut() {
            if is_rdf("Alt") && prop.depth + 1 == self.depth {
                prop.container = Container::Alt;
            } else if (is_rdf("Bag") || is_rdf("Seq")) && prop.depth + 1 == self.depth {
                prop.container = Container::List;
            } else if is_rdf("li") && prop.depth + 2 == self.depth && prop.container != Container::None {
                let lang = attrs
                    .iter()
                    .find(|(k, _)| k == "xml:lang")
                    .map(|(_, v)| v.clone());
                prop.in_item = Some(lang);
                prop.item_text.clear();
                if attrs.iter().any(|(k, _)| !k.starts_with("xml")) {
                    prop.structured = true;
                }
            } else {
                prop.structured = true;
            }
        } else if is_rdf("Description") {
            if self.description_depth.is_none() {
                self.description_depth = Some(self.depth);
            }
            self.description_attributes(&attrs);
        } else if self.description_depth.is_some_and(|d| self.depth == d + 1) {
            self.start_property(resolved, &attrs);
        }

        if empty {
            self.end();
        }
    }

    fn description_attributes(&mut self, attrs: &[(String, String)]) {
        for (key, value) in attrs {
            if key == "xmlns" || key.starts_with("xmlns:") || key.starts_with("xml:") {
                continue;
            }
            let Some((ns, prefix, name)) = self.qualify(key) else {
                continue;
            };
            if ns == NS_RDF {
                continue;
            }
            self.push(ns, prefix, name, XmpValue::Text(value.clone()));
        }
    }

    fn start_property(&mut self, resolved: Option<(String, String, String)>, attrs: &[(String, String)]) {
        let Some((namespace, prefix, name)) = resolved else {
            return;
        };
        let mut text = String::new();
        let mut structured = false;
        for (k, v) in attrs {
            if k == "rdf:resource" {
                text = v.clone();
            } else if k == "rdf:parseType" {
                structured = true;
            } else if !(k.starts_with("xmlns") || k.starts_with("xml:")) {
                structured = true;
            }
        }
        self.property = Some(PropertyState {
            namespace,
            prefix,
            name,
            depth: self.depth,
            container: Container::None,
            text,
            items: Vec::new(),
            in_item: None,
            item_text: String::new(),
            structured,
        });
    }

    fn text(&mut self, text: &str) {
        let Some(prop) = self.property.as_mut() else {
            return;
        };
        if prop.in_item.is_some() {
            prop.item_text.push_str(text);
        } else if prop.container == Container::None && prop.depth == self.depth {
            prop.text.push_str(text);
        }
    }

    fn end(&mut self) {
        let mut finished = None;
        if let Some(prop) = self.property.as_mut() {
            if prop.in_item.is_some() && prop.depth + 2 == self.depth {
                let lang = prop.in_item.take().flatten();
                let item = std::mem::take(&mut prop.item_text);
                prop.items.push((lang, item));
            } else if prop.depth == self.depth {
                finished = self.property.take();
            }
        }
        if let Some(prop) = finished {
            self.finish(prop);
        }
        if self.description_depth == Some(self.depth) {
            self.description_depth = None;
        }
        self.scopes.pop();
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(&mut self, prop: PropertyState) {
        if prop.structured {
            log::debug!("XMP: skipping structured property {}:{}", prop.prefix, prop.name);
            return;
        }
        let value = match prop.container {
            Container::None => XmpValue::Text(prop.text),
            Container::Alt => {
                let chosen = prop
                    .items
                    .iter()
                    .find(|(lang, _)| lang.as_deref() == Some("x-default"))
                    .or_else(|| prop.items.first())
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                XmpValue::Text(chosen)
            }
            Container::List => XmpValue::List(prop.items.into_iter().map(|(_, v)| v).collect()),
        };
        self.push(prop.namespace, prop.prefix, prop.name, value);
    }

    fn push(&mut self, namespace: String, prefix: String, name: String, value: XmpValue) {
        let value = match value {
            XmpValue::Text(s) => XmpValue::Text(strip_control(&s)),
            XmpValue::List(items) => XmpValue::List(items.iter().map(|i| strip_control(i)).collect()),
        };
        self.out.push(XmpProperty {
            namespace,
            prefix,
            name,
            value,
        });
    }
}
