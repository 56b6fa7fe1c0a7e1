//! Export a file's metadata as JSON or as a plain-text report.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::codec::GeneralInfo;
use crate::metadata::NormalizedMetadata;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(format!("unknown export format '{other}' (expected json or txt)")),
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    file: String,
    exported: String,
    general: &'a GeneralInfo,
    metadata: &'a NormalizedMetadata,
}

/// Pretty JSON document `{"file", "exported", "general", "metadata"}`.
pub fn to_json(
    file: &Path,
    general: &GeneralInfo,
    metadata: &NormalizedMetadata,
    exported: DateTime<Local>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonExport {
        file: file.display().to_string(),
        exported: exported.to_rfc3339(),
        general,
        metadata,
    })
}

/// Human-readable report with `[GENERAL]` and `[METADATA]` sections.
pub fn to_text(
    file: &Path,
    general: &GeneralInfo,
    metadata: &NormalizedMetadata,
    exported: DateTime<Local>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Metadata for: {}\n", file.display()));
    out.push_str(&format!("Exported: {}\n", exported.to_rfc3339()));
    out.push_str(&"=".repeat(60));
    out.push_str("\n\n[GENERAL]\n");
    out.push_str(&format!("  format: {}\n", general.format));
    if let (Some(w), Some(h)) = (general.width, general.height) {
        out.push_str(&format!("  dimensions: {w}x{h}\n"));
    }
    out.push_str(&format!("  file_size: {} bytes\n", general.file_size));

    out.push_str("\n[METADATA]\n");
    if metadata.is_empty() {
        out.push_str("  (none)\n");
    }
    for line in metadata.to_text().lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Write the export of `file` to `dest` in `format`.
pub fn export_to_file(
    file: &Path,
    general: &GeneralInfo,
    metadata: &NormalizedMetadata,
    format: ExportFormat,
    dest: &Path,
) -> Result<()> {
    let now = Local::now();
    let contents = match format {
        ExportFormat::Json => to_json(file, general, metadata, now).context("Failed to serialize metadata")?,
        ExportFormat::Txt => to_text(file, general, metadata, now),
    };
    std::fs::write(dest, contents)
        .with_context(|| format!("Failed to write export {}", dest.display()))?;
    log::info!("Exported {} to {}", file.display(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageFormat;
    use crate::metadata::{GpsCoordinate, MetaValue};

    fn sample() -> (GeneralInfo, NormalizedMetadata) {
        let general = GeneralInfo {
            format: ImageFormat::Jpeg,
            width: Some(640),
            height: Some(480),
            file_size: 1234,
        };
        let mut meta = NormalizedMetadata::new();
        meta.set("Make", "Canon");
        meta.set("XPKeywords", vec!["sky".to_string(), "sea".to_string()]);
        meta.set("GPSLatitude", GpsCoordinate::new(38.25425));
        meta.set("FNumber", 2.8);
        (general, meta)
    }

    #[test]
    fn json_export_round_trips_metadata() {
        let (general, meta) = sample();
        let json = to_json(Path::new("a.jpg"), &general, &meta, Local::now()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["file"], "a.jpg");
        assert_eq!(doc["general"]["format"], "jpeg");
        assert_eq!(doc["general"]["width"], 640);

        let back = NormalizedMetadata::from_json(&doc["metadata"].to_string()).unwrap();
        assert_eq!(back, meta);
        assert!(matches!(back.get("GPSLatitude"), Some(MetaValue::Gps(_))));
    }

    #[test]
    fn text_export_layout() {
        let (general, meta) = sample();
        let text = to_text(Path::new("a.jpg"), &general, &meta, Local::now());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Metadata for: a.jpg");
        assert!(lines[1].starts_with("Exported: "));
        assert_eq!(lines[2], "=".repeat(60));
        assert!(text.contains("[GENERAL]\n  format: JPEG\n  dimensions: 640x480\n"));
        assert!(text.contains("  XPKeywords: sky; sea\n"));
        assert!(text.contains("  GPSLatitude: 38.254250\n"));
        assert!(text.contains("  FNumber: 2.8\n"));
    }

    #[test]
    fn format_names() {
        assert_eq!("TXT".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
