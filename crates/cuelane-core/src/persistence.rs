use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::template::TemplateRecord;

pub const DEFAULT_SETTING_KEY: &str = "splash";

/// The preset list, stored under one key of a JSON settings document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetStore {
    pub path: PathBuf,
    pub setting_key: String,
}

impl PresetStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, setting_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            setting_key: setting_key.into(),
        }
    }

    pub fn load(&self) -> Result<Vec<TemplateRecord>> {
        load_presets(&self.path, &self.setting_key)
    }

    /// Appends `record` and returns its index.
    pub fn append(&self, record: TemplateRecord) -> Result<usize> {
        save_preset(&self.path, &self.setting_key, record)
    }

    pub fn delete(&self, index: usize) -> Result<TemplateRecord> {
        delete_preset(&self.path, &self.setting_key, index)
    }
}

/// Reads the preset list. A missing file or key is an empty list.
#[instrument(fields(path = %path.display(), setting_key))]
pub fn load_presets(path: &Path, setting_key: &str) -> Result<Vec<TemplateRecord>> {
    let document = read_document(path)?;
    let Some(raw) = document.get(setting_key) else {
        debug!("preset key absent");
        return Ok(Vec::new());
    };
    let presets: Vec<TemplateRecord> = serde_json::from_value(raw.clone())
        .with_context(|| format!("invalid preset list under '{setting_key}'"))?;
    debug!(count = presets.len(), "presets loaded");
    Ok(presets)
}

#[instrument(skip(record), fields(path = %path.display(), setting_key, name = %record.name))]
pub fn save_preset(path: &Path, setting_key: &str, record: TemplateRecord) -> Result<usize> {
    let mut document = read_document(path)?;
    let mut presets = match document.remove(setting_key) {
        Some(raw) => serde_json::from_value::<Vec<TemplateRecord>>(raw)
            .with_context(|| format!("invalid preset list under '{setting_key}'"))?,
        None => Vec::new(),
    };
    presets.push(record);
    let index = presets.len() - 1;

    document.insert(
        setting_key.to_string(),
        serde_json::to_value(&presets).context("failed to serialize presets")?,
    );
    write_document(path, &document)?;
    info!(index, "preset saved");
    Ok(index)
}

#[instrument(fields(path = %path.display(), setting_key, index))]
pub fn delete_preset(path: &Path, setting_key: &str, index: usize) -> Result<TemplateRecord> {
    let mut document = read_document(path)?;
    let mut presets = match document.remove(setting_key) {
        Some(raw) => serde_json::from_value::<Vec<TemplateRecord>>(raw)
            .with_context(|| format!("invalid preset list under '{setting_key}'"))?,
        None => Vec::new(),
    };
    if index >= presets.len() {
        warn!(count = presets.len(), "preset index out of range");
        return Err(anyhow::anyhow!(
            "preset index {index} out of range ({} saved)",
            presets.len()
        ));
    }
    let removed = presets.remove(index);

    document.insert(
        setting_key.to_string(),
        serde_json::to_value(&presets).context("failed to serialize presets")?,
    );
    write_document(path, &document)?;
    info!(name = %removed.name, "preset deleted");
    Ok(removed)
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content =
        fs::read(path).with_context(|| format!("failed to read presets: {}", path.display()))?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(&content).context("invalid preset json")? {
        Value::Object(document) => Ok(document),
        other => Err(anyhow::anyhow!(
            "preset document must be a JSON object, found {}",
            json_kind(&other)
        )),
    }
}

fn write_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(document).context("failed to serialize presets")?;
    let mut temp_file = tempfile::NamedTempFile::new_in(
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf),
    )
    .context("failed to create temp preset file")?;

    temp_file
        .write_all(&json)
        .context("failed to write temp preset file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist presets: {}", path.display()))?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
