//! Batch rename: compute new file names from a rule, then move files
//! without ever replacing an existing one.
//!
//! Only the stem changes; the extension is always kept.
//!
//! ```rust
//! use photo_meta::rename::{CaseTransform, RenameMode, RenameRule};
//! use std::path::{Path, PathBuf};
//!
//! let rule = RenameRule::new(RenameMode::Pattern { pattern: "event_{index}".into() })
//!     .padding(3)
//!     .case(CaseTransform::Upper);
//! let plan = rule.preview(&[PathBuf::from("photos/IMG_0042.jpg")]);
//! assert_eq!(plan[0].1, Path::new("photos/EVENT_001.jpg"));
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenameMode {
    /// Replace the stem. `{index}`, `{name}` (old stem) and `{ext}` are
    /// substituted.
    Pattern { pattern: String },
    Prefix { prefix: String },
    Suffix { suffix: String },
    /// Replace every occurrence of `find` in the stem.
    FindReplace { find: String, replace: String },
    /// Append `_<index>` to the stem.
    Increment,
}

/// Case applied to the new stem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseTransform {
    #[default]
    Keep,
    Lower,
    Upper,
    /// First letter of every word upper case, the rest lower case.
    Title,
}

impl std::str::FromStr for CaseTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(CaseTransform::Keep),
            "lower" => Ok(CaseTransform::Lower),
            "upper" => Ok(CaseTransform::Upper),
            "title" => Ok(CaseTransform::Title),
            other => Err(format!("unknown case '{other}' (expected keep, lower, upper or title)")),
        }
    }
}

impl CaseTransform {
    pub fn apply(self, s: &str) -> String {
        match self {
            CaseTransform::Keep => s.to_string(),
            CaseTransform::Lower => s.to_lowercase(),
            CaseTransform::Upper => s.to_uppercase(),
            CaseTransform::Title => title_case(s),
        }
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    #[serde(flatten)]
    pub mode: RenameMode,
    /// Index given to the first file.
    pub start: u32,
    /// Minimum digits of `{index}`, zero-padded.
    pub padding: usize,
    pub case: CaseTransform,
}

impl RenameRule {
    pub fn new(mode: RenameMode) -> Self {
        Self {
            mode,
            start: 1,
            padding: 0,
            case: CaseTransform::Keep,
        }
    }

    pub fn start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn case(mut self, case: CaseTransform) -> Self {
        self.case = case;
        self
    }

    /// New stem for the file at `position` in the batch.
    pub fn stem_for(&self, stem: &str, ext: &str, position: usize) -> String {
        let index = format!("{:0width$}", self.start as usize + position, width = self.padding);
        let stem = match &self.mode {
            RenameMode::Pattern { pattern } => pattern
                .replace("{index}", &index)
                .replace("{name}", stem)
                .replace("{ext}", ext),
            RenameMode::Prefix { prefix } => format!("{prefix}{stem}"),
            RenameMode::Suffix { suffix } => format!("{stem}{suffix}"),
            RenameMode::FindReplace { find, replace } if !find.is_empty() => stem.replace(find.as_str(), replace),
            RenameMode::FindReplace { .. } => stem.to_string(),
            RenameMode::Increment => format!("{stem}_{index}"),
        };
        self.case.apply(&stem)
    }

    /// Where the file at `position` would move to.
    pub fn target(&self, path: &Path, position: usize) -> PathBuf {
        let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let ext = path.extension().map(|s| s.to_string_lossy());
        let new_stem = self.stem_for(&stem, ext.as_deref().unwrap_or(""), position);
        match ext {
            Some(ext) => path.with_file_name(format!("{new_stem}.{ext}")),
            None => path.with_file_name(new_stem),
        }
    }

    /// Planned `(from, to)` pairs, in batch order.
    pub fn preview(&self, paths: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
        paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), self.target(p, i)))
            .collect()
    }
}

/// Move `from` to `to`. Refuses to replace an existing file or to leave the
/// source directory. Renaming a file to its own name is a no-op.
pub fn rename_file(from: &Path, to: &Path) -> Result<(), CodecError> {
    if from == to {
        return Ok(());
    }
    let name_ok = to
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.') && !n.trim().is_empty());
    if !name_ok || to.parent() != from.parent() {
        return Err(CodecError::InvalidValue {
            field: "file name".into(),
            reason: format!("'{}' is not a plain file name", to.display()),
        });
    }
    if to.exists() {
        return Err(CodecError::Io {
            path: to.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "target already exists"),
        });
    }
    fs::rename(from, to).map_err(|e| CodecError::from_io(from, e))?;
    log::info!("Renamed {} -> {}", from.display(), to.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── naming ──

    #[test]
    fn pattern_placeholders() {
        let rule = RenameRule::new(RenameMode::Pattern {
            pattern: "{name}-{index}-{ext}".into(),
        })
        .start(7)
        .padding(2);
        assert_eq!(rule.target(Path::new("a/pic.png"), 0), Path::new("a/pic-07-png.png"));
        assert_eq!(rule.target(Path::new("a/pic.png"), 5), Path::new("a/pic-12-png.png"));
    }

    #[test]
    fn every_mode() {
        let p = Path::new("IMG_001.JPG");
        let target = |mode| RenameRule::new(mode).target(p, 1);
        assert_eq!(target(RenameMode::Prefix { prefix: "cap_".into() }), Path::new("cap_IMG_001.JPG"));
        assert_eq!(target(RenameMode::Suffix { suffix: "_x".into() }), Path::new("IMG_001_x.JPG"));
        assert_eq!(
            target(RenameMode::FindReplace { find: "IMG".into(), replace: "Photo".into() }),
            Path::new("Photo_001.JPG")
        );
        assert_eq!(target(RenameMode::Increment), Path::new("IMG_001_2.JPG"));
    }

    #[test]
    fn case_applies_to_stem_only() {
        let rule = RenameRule::new(RenameMode::Prefix { prefix: "wing ".into() }).case(CaseTransform::Title);
        assert_eq!(rule.target(Path::new("CONFERENCE day.JPG"), 0), Path::new("Wing Conference Day.JPG"));
        let rule = RenameRule::new(RenameMode::Increment).case(CaseTransform::Lower);
        assert_eq!(rule.target(Path::new("Pier.PNG"), 0), Path::new("pier_1.PNG"));
    }

    #[test]
    fn rule_serializes_flat() {
        let rule = RenameRule::new(RenameMode::Prefix { prefix: "x".into() });
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["mode"], "prefix");
        assert_eq!(json["prefix"], "x");
        assert_eq!(serde_json::from_value::<RenameRule>(json).unwrap(), rule);
    }

    // ── moving ──

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        assert!(rename_file(&a, &b).is_err());
        assert_eq!(fs::read(&b).unwrap(), b"b");

        let c = dir.path().join("c.jpg");
        rename_file(&a, &c).unwrap();
        assert!(!a.exists());
        assert_eq!(fs::read(&c).unwrap(), b"a");
    }

    #[test]
    fn rejects_names_leaving_the_directory() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        fs::write(&a, b"a").unwrap();
        let rule = RenameRule::new(RenameMode::Pattern { pattern: "sub/{name}".into() });
        let to = rule.target(&a, 0);
        assert!(matches!(rename_file(&a, &to), Err(CodecError::InvalidValue { .. })));
        let rule = RenameRule::new(RenameMode::Pattern { pattern: String::new() });
        assert!(rename_file(&a, &rule.target(&a, 0)).is_err());
        assert!(a.exists());
    }
}
