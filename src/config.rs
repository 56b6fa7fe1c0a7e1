use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::WriteOptions;
use crate::export::ExportFormat;
use crate::fields::FieldProfile;
use crate::xmp::EnginePreference;

/// Top-level configuration for photo-meta.
///
/// Controls which field labels are used, how XMP packets are produced,
/// output behavior (dry run, backups, export format) and where templates
/// live.
///
/// # Loading
///
/// ```rust,no_run
/// use photo_meta::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.output.dry_run = true;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which labels name the editable field groups.
    pub fields: FieldsConfig,
    /// XMP engine selection.
    pub xmp: XmpConfig,
    /// Output behavior (dry run, backups, export format).
    pub output: OutputConfig,
    /// Template storage.
    pub templates: TemplatesConfig,
}

/// Field naming.
///
/// # Example
///
/// ```rust
/// use photo_meta::config::FieldsConfig;
/// use photo_meta::fields::FieldProfile;
///
/// let fields = FieldsConfig { profile: FieldProfile::IptcCore };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// `classic` (Title, Subject, Tags, Comments, Authors, Copyright) or
    /// `iptc_core` (Headline, Description, Creator, Subject, Rights).
    pub profile: FieldProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XmpConfig {
    /// `auto` uses the toolkit engine when compiled in; `builtin` always
    /// uses the built-in serializer.
    pub engine: EnginePreference,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, preview what would be written without modifying any files.
    pub dry_run: bool,
    /// If `true`, create a `.bak` backup before modifying an image.
    pub backup_originals: bool,
    /// Default format for `export`.
    pub export_format: ExportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_originals: true,
            export_format: ExportFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Template directory; the per-user config directory when unset.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Resolve the config file path, in the same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Codec options implied by this configuration.
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            dry_run: self.output.dry_run,
            xmp_engine: self.xmp.engine,
        }
    }

    /// The template directory: the configured one, else
    /// `<user config dir>/photo-meta/templates`.
    pub fn template_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.templates.dir {
            return Ok(dir.clone());
        }
        let base = dirs::config_dir().context("No per-user config directory on this platform")?;
        Ok(base.join("photo-meta").join("templates"))
    }
}
