//! The portable, normalized metadata model.
//!
//! [`NormalizedMetadata`] is what the reader produces, what templates and
//! edits mutate, and what the writer consumes. Values never carry null bytes
//! or source byte order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used when a list is shown or stored as a single string.
pub const LIST_SEPARATOR: &str = "; ";

/// A GPS coordinate in signed decimal degrees (south and west are negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub decimal_degrees: f64,
}

impl GpsCoordinate {
    pub fn new(decimal_degrees: f64) -> Self {
        Self { decimal_degrees }
    }
}

impl fmt::Display for GpsCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.decimal_degrees)
    }
}

/// A single normalized value.
///
/// Serialized untagged so JSON exports stay readable: strings, numbers,
/// arrays of strings, and `{"decimal_degrees": ..}` objects map back to the
/// same variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Gps(GpsCoordinate),
}

impl MetaValue {
    /// Render the value as one line of text.
    pub fn as_text(&self) -> String {
        match self {
            MetaValue::Text(s) => s.clone(),
            MetaValue::Number(n) => format_number(*n),
            MetaValue::List(items) => items.join(LIST_SEPARATOR),
            MetaValue::Gps(g) => g.to_string(),
        }
    }

    /// Render the value as a list, splitting text on `;`.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            MetaValue::List(items) => items.clone(),
            MetaValue::Text(s) => split_list(s),
            other => vec![other.as_text()],
        }
    }

    /// `true` for empty text and empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            MetaValue::Text(s) => s.trim().is_empty(),
            MetaValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
            _ => false,
        }
    }

    fn sanitized(self) -> Self {
        match self {
            MetaValue::Text(s) => MetaValue::Text(strip_control(&s)),
            MetaValue::List(items) => MetaValue::List(
                items
                    .iter()
                    .map(|i| strip_control(i))
                    .filter(|i| !i.is_empty())
                    .collect(),
            ),
            other => other,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        MetaValue::Number(n)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(items: Vec<String>) -> Self {
        MetaValue::List(items)
    }
}

impl From<GpsCoordinate> for MetaValue {
    fn from(g: GpsCoordinate) -> Self {
        MetaValue::Gps(g)
    }
}

/// Field name → normalized value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedMetadata {
    fields: BTreeMap<String, MetaValue>,
}

impl NormalizedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.fields.get(key)
    }

    /// Convenience accessor returning the value as text.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(MetaValue::as_text)
    }

    /// Convenience accessor returning the value as a list.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.fields.get(key).map(MetaValue::as_list)
    }

    /// Insert or replace a field. Text is stripped of null and control
    /// characters on the way in.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.fields.insert(key.into(), value.into().sanitized());
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Overlay every field of `other` onto `self`. Empty values in `other`
    /// remove the field.
    pub fn merge(&mut self, other: &NormalizedMetadata) {
        for (key, value) in &other.fields {
            if value.is_empty() {
                self.fields.remove(key);
            } else {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let parsed: NormalizedMetadata = serde_json::from_str(json)?;
        Ok(parsed
            .fields
            .into_iter()
            .map(|(k, v)| (k, v.sanitized()))
            .collect())
    }

    /// Flat `key: value` lines, one per field. Backslashes and line breaks
    /// inside a value are escaped (`\\`, `\n`, `\r`) so every field stays on
    /// its own line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&escape_line(&value.as_text()));
            out.push('\n');
        }
        out
    }
}

fn escape_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl FromIterator<(String, MetaValue)> for NormalizedMetadata {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NormalizedMetadata {
    type Item = (&'a String, &'a MetaValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, MetaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Remove null bytes and C0/DEL control characters, keeping tab and newline.
pub fn strip_control(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || c == '\n' || !(c.is_control() && (c as u32) < 0xA0))
        .collect()
}

/// Split a list on `;` or NUL, trimming items and dropping empty ones.
pub fn split_list(s: &str) -> Vec<String> {
    s.split([';', '\0'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Format a float without a trailing `.0` for whole numbers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
