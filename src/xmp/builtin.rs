//! Built-in XMP serializer and in-place packet editing.

use std::fmt::Write as _;

use super::{XmpEdit, XmpEngine, XmpForm, XmpValue};

const PACKET_BEGIN: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n";
const PACKET_END: &str = "<?xpacket end=\"w\"?>";
const DESCRIPTION_OPEN: &str = "<rdf:Description";
const DESCRIPTION_CLOSE: &str = "</rdf:Description>";

/// Minimal RDF/XML serializer with no dependencies.
pub struct BuiltinEngine;

impl XmpEngine for BuiltinEngine {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn build_packet(&self, props: &[XmpEdit]) -> String {
        build_packet(props)
    }
}

/// Build a complete packet holding `props`.
pub fn build_packet(props: &[XmpEdit]) -> String {
    let props: Vec<&XmpEdit> = props.iter().filter(|p| p.value.is_some()).collect();

    let mut namespaces: Vec<(&str, &str)> = Vec::new();
    for p in &props {
        if !namespaces.iter().any(|(prefix, _)| *prefix == p.prefix) {
            namespaces.push((p.prefix.as_str(), p.namespace.as_str()));
        }
    }

    let mut xmp = String::new();
    xmp.push_str(PACKET_BEGIN);
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    xmp.push_str("<rdf:Description rdf:about=\"\"");
    for (prefix, uri) in &namespaces {
        let _ = write!(xmp, "\n  xmlns:{prefix}=\"{}\"", xml_escape(uri));
    }
    xmp.push_str(">\n");
    for p in props {
        xmp.push_str(&property_xml(p, &p.prefix));
    }
    xmp.push_str("</rdf:Description>\n");
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.push_str(PACKET_END);
    xmp
}

/// Serialize one property element, newline-terminated.
fn property_xml(edit: &XmpEdit, prefix: &str) -> String {
    let qname = format!("{prefix}:{}", edit.name);
    let Some(value) = &edit.value else {
        return String::new();
    };
    match (edit.form, value) {
        (XmpForm::Simple, v) => {
            format!("  <{qname}>{}</{qname}>\n", xml_escape(&v.items().join("; ")))
        }
        (XmpForm::Alt, v) => format!(
            "  <{qname}><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></{qname}>\n",
            xml_escape(&v.items().join("; "))
        ),
        (XmpForm::Bag | XmpForm::Seq, v) => {
            let container = if edit.form == XmpForm::Bag { "rdf:Bag" } else { "rdf:Seq" };
            let mut out = format!("  <{qname}><{container}>\n");
            for item in v.items() {
                let _ = writeln!(out, "    <rdf:li>{}</rdf:li>", xml_escape(&item));
            }
            let _ = writeln!(out, "  </{container}></{qname}>");
            out
        }
    }
}

/// Apply `edits` to an existing packet, leaving everything else in it
/// untouched. Returns `None` when the packet has no editable
/// `rdf:Description`, in which case the caller builds a fresh one.
pub fn update_packet(existing: &str, edits: &[XmpEdit]) -> Option<String> {
    let mut xml = existing.to_string();
    find_tag(&xml, "<rdf:RDF", 0)?;
    find_tag(&xml, DESCRIPTION_OPEN, 0)?;

    // Resolve each edit to the prefix the packet already uses for its namespace
    let prefixes: Vec<String> = edits
        .iter()
        .map(|e| declared_prefix(&xml, &e.namespace).unwrap_or_else(|| e.prefix.clone()))
        .collect();

    for (edit, prefix) in edits.iter().zip(&prefixes) {
        let qname = format!("{prefix}:{}", edit.name);
        remove_element(&mut xml, &qname);
        remove_attribute(&mut xml, &qname);
    }

    let additions: Vec<(&XmpEdit, &String)> = edits
        .iter()
        .zip(&prefixes)
        .filter(|(e, _)| e.value.is_some())
        .collect();
    if additions.is_empty() {
        return Some(xml);
    }

    let start = find_tag(&xml, DESCRIPTION_OPEN, 0)?;
    let mut end = tag_end(&xml, start)?;
    if xml[..end].ends_with('/') {
        // Self-closing: open it up
        xml.replace_range(end - 1..=end, &format!(">{DESCRIPTION_CLOSE}"));
        end -= 1;
    }

    let mut declarations = String::new();
    for (edit, prefix) in &additions {
        let decl = format!("xmlns:{prefix}=");
        if !xml[start..end].contains(&decl) && !declarations.contains(&decl) {
            let _ = write!(declarations, "\n  {decl}\"{}\"", xml_escape(&edit.namespace));
        }
    }
    xml.insert_str(end, &declarations);
    end += declarations.len();

    let close = matching_close(&xml, end + 1)?;
    let mut elements = String::from("\n");
    for (edit, prefix) in &additions {
        elements.push_str(&property_xml(edit, prefix));
    }
    xml.insert_str(close, &elements);
    Some(xml)
}

/// Find `open` as a whole tag name at or after `from`.
fn find_tag(xml: &str, open: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(found) = xml.get(pos..)?.find(open) {
        let at = pos + found;
        match xml.as_bytes().get(at + open.len()) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(at),
            _ => pos = at + open.len(),
        }
    }
    None
}

/// Position of the `>` closing the tag that starts at `start`.
fn tag_end(xml: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, b) in xml.bytes().enumerate().skip(start) {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Position of the `</rdf:Description>` matching the description whose
/// content starts at `from`.
fn matching_close(xml: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = from;
    loop {
        let open = find_tag(xml, DESCRIPTION_OPEN, pos);
        let close = xml.get(pos..)?.find(DESCRIPTION_CLOSE).map(|c| pos + c)?;
        match open {
            Some(o) if o < close => {
                let end = tag_end(xml, o)?;
                if !xml[..end].ends_with('/') {
                    depth += 1;
                }
                pos = end + 1;
            }
            _ if depth == 0 => return Some(close),
            _ => {
                depth -= 1;
                pos = close + DESCRIPTION_CLOSE.len();
            }
        }
    }
}

/// Prefix bound to `namespace` anywhere in the packet.
fn declared_prefix(xml: &str, namespace: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let needle = format!("={quote}{namespace}{quote}");
        let mut pos = 0;
        while let Some(found) = xml[pos..].find(&needle) {
            let at = pos + found;
            let head = &xml[..at];
            let attr_start = head.rfind(|c: char| c.is_ascii_whitespace()).map_or(0, |i| i + 1);
            if let Some(prefix) = head[attr_start..].strip_prefix("xmlns:") {
                return Some(prefix.to_string());
            }
            pos = at + needle.len();
        }
    }
    None
}

/// Remove every `<qname ...>...</qname>` or `<qname .../>` element.
fn remove_element(xml: &mut String, qname: &str) {
    let open = format!("<{qname}");
    let close = format!("</{qname}>");
    let mut from = 0;
    while let Some(start) = find_tag(xml, &open, from) {
        let Some(head_end) = tag_end(xml, start) else {
            return;
        };
        let end = if xml[..head_end].ends_with('/') {
            head_end + 1
        } else {
            match xml[head_end..].find(&close) {
                Some(c) => head_end + c + close.len(),
                None => return,
            }
        };
        // Take the line's leading indentation and trailing newline with it
        let line_start = xml[..start].rfind('\n').map_or(0, |i| i + 1);
        let start = if xml[line_start..start].trim().is_empty() {
            line_start
        } else {
            start
        };
        let end = if xml.as_bytes().get(end) == Some(&b'\n') {
            end + 1
        } else {
            end
        };
        xml.replace_range(start..end, "");
        from = start;
    }
}

/// Remove every ` qname="..."` attribute.
fn remove_attribute(xml: &mut String, qname: &str) {
    for quote in ['"', '\''] {
        let needle = format!("{qname}={quote}");
        let mut from = 0;
        while let Some(found) = xml[from..].find(&needle) {
            let at = from + found;
            let preceded_by_space = xml[..at].ends_with(|c: char| c.is_ascii_whitespace());
            let value_start = at + needle.len();
            let Some(value_len) = xml[value_start..].find(quote) else {
                return;
            };
            if !preceded_by_space {
                from = value_start + value_len + 1;
                continue;
            }
            let ws_start = xml[..at]
                .rfind(|c: char| !c.is_ascii_whitespace())
                .map_or(0, |i| i + 1);
            xml.replace_range(ws_start..value_start + value_len + 1, "");
            from = ws_start;
        }
    }
}

pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
