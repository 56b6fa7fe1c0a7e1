//! Metadata templates and where they are kept.
//!
//! A [`Template`] is a named set of field values. Keys are either logical
//! group labels (`Title`, `Headline`, `Tags`, ...) or storage keys
//! (`XPSubject`, `dc:rights`, ...). [`Template::to_overlay`] expands them into
//! the storage slots the writer understands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::{self, FieldGroup, FieldProfile};
use crate::metadata::NormalizedMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    pub metadata: NormalizedMetadata,
}

impl Template {
    pub fn new(name: impl Into<String>, description: impl Into<String>, metadata: NormalizedMetadata) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            created: Utc::now(),
            metadata,
        }
    }

    /// Capture the group values of `meta` under `profile`'s labels.
    pub fn from_metadata(
        name: impl Into<String>,
        description: impl Into<String>,
        meta: &NormalizedMetadata,
        profile: FieldProfile,
    ) -> Self {
        let metadata = profile
            .groups()
            .iter()
            .filter_map(|g| Some((g.label(profile).to_string(), g.display_value(meta)?.clone())))
            .collect();
        Self::new(name, description, metadata)
    }

    /// Expand the template into storage slots.
    ///
    /// Group labels (either profile, any case) fan out to every slot of the
    /// group; storage keys are applied afterwards and win. Anything else is
    /// ignored.
    pub fn to_overlay(&self, profile: FieldProfile) -> NormalizedMetadata {
        let mut overlay = NormalizedMetadata::new();
        let mut direct = Vec::new();

        for (key, value) in &self.metadata {
            if fields::is_editable(key) {
                direct.push((key, value));
            } else if let Some(group) = FieldGroup::from_label(key, profile) {
                for slot in group.slots() {
                    overlay.set(*slot, value.clone());
                }
            } else {
                log::warn!("Template '{}': '{key}' is not an editable field, ignored", self.name);
            }
        }
        for (key, value) in direct {
            overlay.set(key.clone(), value.clone());
        }
        overlay
    }
}

/// Somewhere templates are kept.
pub trait TemplateStore {
    /// Template names, sorted.
    fn list(&self) -> Result<Vec<String>>;

    fn get(&self, name: &str) -> Result<Option<Template>>;

    /// Create or replace.
    fn put(&mut self, template: &Template) -> Result<()>;

    /// Returns `false` when there was nothing to delete.
    fn delete(&mut self, name: &str) -> Result<bool>;
}

/// Template names become file stems, so they must be safe as one.
pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Template name is empty");
    }
    if trimmed != name || name.starts_with('.') {
        bail!("Template name '{name}' has leading dots or surrounding spaces");
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        bail!("Template name '{name}' contains {c:?}");
    }
    Ok(())
}

/// One `<name>.json` per template in a directory.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    dir: PathBuf,
}

impl FsTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl TemplateStore for FsTemplateStore {
    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str) -> Result<Option<Template>> {
        let path = self.path_of(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let template = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse template {}", path.display()))?;
        Ok(Some(template))
    }

    fn put(&mut self, template: &Template) -> Result<()> {
        let path = self.path_of(&template.name)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let contents = serde_json::to_string_pretty(template).context("Failed to serialize template")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write template {}", path.display()))?;
        log::info!("Template '{}' saved to {}", template.name, path.display());
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<bool> {
        let path = self.path_of(name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete template {}", path.display()))?;
        log::info!("Template '{name}' deleted");
        Ok(true)
    }
}

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: BTreeMap<String, Template>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.templates.keys().cloned().collect())
    }

    fn get(&self, name: &str) -> Result<Option<Template>> {
        Ok(self.templates.get(name).cloned())
    }

    fn put(&mut self, template: &Template) -> Result<()> {
        validate_name(&template.name)?;
        self.templates.insert(template.name.clone(), template.clone());
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<bool> {
        Ok(self.templates.remove(name).is_some())
    }
}

#[derive(Serialize, Deserialize)]
struct Bundle {
    templates: Vec<Template>,
}

/// Write every template in `store` to one JSON file. Returns how many.
pub fn export_templates(store: &dyn TemplateStore, file: &Path) -> Result<usize> {
    let mut templates = Vec::new();
    for name in store.list()? {
        if let Some(t) = store.get(&name)? {
            templates.push(t);
        }
    }
    let count = templates.len();
    let contents = serde_json::to_string_pretty(&Bundle { templates }).context("Failed to serialize templates")?;
    std::fs::write(file, contents).with_context(|| format!("Failed to write {}", file.display()))?;
    log::info!("Exported {count} templates to {}", file.display());
    Ok(count)
}

/// Load every template from a file written by [`export_templates`],
/// replacing templates of the same name. Returns how many were imported.
pub fn import_templates(store: &mut dyn TemplateStore, file: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let bundle: Bundle = serde_json::from_str(&contents).context("Failed to parse template bundle")?;
    for template in &bundle.templates {
        store.put(template)?;
    }
    log::info!("Imported {} templates from {}", bundle.templates.len(), file.display());
    Ok(bundle.templates.len())
}
