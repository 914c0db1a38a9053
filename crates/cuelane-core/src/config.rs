use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    assets::{AUDIO_EXTENSIONS, IMAGE_EXTENSIONS},
    model::DEFAULT_SLOT_COUNT,
    persistence::{DEFAULT_SETTING_KEY, PresetStore},
    session::SessionSettings,
    timeline::{
        DEFAULT_FALLBACK_SOUND_DURATION_MS, DEFAULT_MIN_WIDTH_PX, DEFAULT_ROW_HEIGHT_PX,
        DEFAULT_SCALE, DEFAULT_SNAP_MS, TimelineMetrics,
    },
};

pub const CONFIG_FILE_NAME: &str = "cuelane.config.toml";
pub const CONFIG_PATH_ENV: &str = "CUELANE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub timeline: TimelineConfig,
    pub assets: AssetsConfig,
    pub presets: PresetsConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Slots per channel. Takes effect for sessions opened after a change.
    pub slot_count: usize,
    pub default_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub fallback_sound_duration_ms: u64,
    pub snap_ms: u64,
    pub min_width_px: f64,
    pub row_height_px: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub storage_root: PathBuf,
    pub namespace: String,
    pub audio_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetsConfig {
    pub path: PathBuf,
    pub setting_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub logs_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            default_scale: DEFAULT_SCALE,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fallback_sound_duration_ms: DEFAULT_FALLBACK_SOUND_DURATION_MS,
            snap_ms: DEFAULT_SNAP_MS,
            min_width_px: DEFAULT_MIN_WIDTH_PX,
            row_height_px: DEFAULT_ROW_HEIGHT_PX,
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data/assets"),
            namespace: "cuelane".to_string(),
            audio_extensions: AUDIO_EXTENSIONS.iter().map(ToString::to_string).collect(),
            image_extensions: IMAGE_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for PresetsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/settings.json"),
            setting_key: DEFAULT_SETTING_KEY.to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: "info,cuelane_core=trace".to_string(),
            trace_file_prefix: "cuelane".to_string(),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!("failed to parse config TOML from {}", config_path.display())
        })?;

        info!(path = %config_path.display(), "config loaded");
        Ok(config)
    }

    #[must_use]
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "using default config");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            slot_count: self.session.slot_count,
            default_scale: self.session.default_scale,
            metrics: TimelineMetrics {
                snap_ms: self.timeline.snap_ms.max(1),
                fallback_sound_duration_ms: self.timeline.fallback_sound_duration_ms,
                min_width_px: self.timeline.min_width_px,
                row_height_px: self.timeline.row_height_px,
            },
            asset_namespace: self.assets.namespace.clone(),
            image_extensions: self.assets.image_extensions.clone(),
            audio_extensions: self.assets.audio_extensions.clone(),
        }
    }

    #[must_use]
    pub fn preset_store(&self) -> PresetStore {
        PresetStore::new(&self.presets.path, &self.presets.setting_key)
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
