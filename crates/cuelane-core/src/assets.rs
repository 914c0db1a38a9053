use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    codecs::DecoderOptions, errors::Error as SymphoniaError, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::model::Channel;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "svg", "webm", "mp4", "m4v", "ogv",
];
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "ogg", "oga", "mp3", "flac", "m4a", "aac"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetEntry {
    pub path: String,
    pub channel: Channel,
    pub extension: String,
    pub size_bytes: u64,
}

/// Resolves how long a sound file plays.
pub trait DurationProbe {
    fn probe_duration_ms(&self, file: &str) -> Result<u64>;
}

/// Destination for files dropped onto the timeline.
pub trait AssetStore {
    /// Stores `bytes` and returns the path slots should reference.
    fn upload(&mut self, namespace: &str, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Maps a file name to the channel that can play it.
#[must_use]
pub fn classify_asset(name: &str) -> Option<Channel> {
    classify_asset_with(name, IMAGE_EXTENSIONS, AUDIO_EXTENSIONS)
}

/// Same as [`classify_asset`] with caller-supplied extension lists.
#[must_use]
pub fn classify_asset_with(
    name: &str,
    images: &[impl AsRef<str>],
    audio: &[impl AsRef<str>],
) -> Option<Channel> {
    let extension = Path::new(name)
        .extension()
        .and_then(|value| value.to_str())?
        .to_ascii_lowercase();
    if images.iter().any(|known| known.as_ref() == extension) {
        Some(Channel::Image)
    } else if audio.iter().any(|known| known.as_ref() == extension) {
        Some(Channel::Sound)
    } else {
        None
    }
}

/// Reads a sound file's length in milliseconds. WAV headers are read
/// directly; other containers go through the decoder probe.
#[instrument(fields(path = %path.display()))]
pub fn probe_audio_duration_ms(path: &Path) -> Result<u64> {
    let is_wav = path
        .extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case("wav"));

    if is_wav {
        match hound::WavReader::open(path) {
            Ok(reader) => {
                let spec = reader.spec();
                let duration = frames_to_ms(u64::from(reader.duration()), spec.sample_rate)?;
                debug!(duration_ms = duration, "wav header probed");
                return Ok(duration);
            }
            Err(error) => {
                warn!(?error, "wav header unreadable, falling back to decoder");
            }
        }
    }

    symphonia_duration_ms(path)
}

fn symphonia_duration_ms(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found in {}", path.display()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);

    if let Some(frames) = track.codec_params.n_frames {
        let duration = frames_to_ms(frames, sample_rate)?;
        debug!(duration_ms = duration, "duration read from container");
        return Ok(duration);
    }

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
    let mut frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!(
                    "audio stream reset required for {}",
                    path.display()
                ));
            }
            Err(error) => return Err(error.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(error) => return Err(error.into()),
        };
        sample_rate = decoded.spec().rate;
        frames += decoded.frames() as u64;
    }

    if frames == 0 {
        return Err(anyhow::anyhow!(
            "decoded zero frames from {}",
            path.display()
        ));
    }
    let duration = frames_to_ms(frames, sample_rate)?;
    debug!(duration_ms = duration, frames, "duration measured by decoding");
    Ok(duration)
}

fn frames_to_ms(frames: u64, sample_rate: u32) -> Result<u64> {
    if sample_rate == 0 {
        return Err(anyhow::anyhow!("sample rate is zero"));
    }
    Ok(frames.saturating_mul(1_000) / u64::from(sample_rate))
}

/// Probes files relative to an asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDurationProbe {
    pub root: PathBuf,
}

impl FileDurationProbe {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DurationProbe for FileDurationProbe {
    fn probe_duration_ms(&self, file: &str) -> Result<u64> {
        probe_audio_duration_ms(&self.root.join(file))
    }
}

/// Writes uploads under `<root>/<namespace>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAssetStore {
    pub root: PathBuf,
}

impl LocalAssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetStore for LocalAssetStore {
    #[instrument(skip(self, bytes), fields(root = %self.root.display(), size = bytes.len()))]
    fn upload(&mut self, namespace: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("invalid upload name: {name:?}"))?;
        if namespace.contains(['/', '\\']) || namespace == ".." {
            return Err(anyhow::anyhow!("invalid upload namespace: {namespace:?}"));
        }

        let directory = self.root.join(namespace);
        fs::create_dir_all(&directory).with_context(|| {
            format!("failed to create upload directory: {}", directory.display())
        })?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&directory)
            .context("failed to create temp upload file")?;
        temp_file
            .write_all(bytes)
            .context("failed to write temp upload file")?;
        let destination = directory.join(file_name);
        temp_file
            .persist(&destination)
            .map_err(|error| anyhow::anyhow!(error.error))
            .with_context(|| format!("failed to persist upload: {}", destination.display()))?;

        let stored = format!("{namespace}/{file_name}");
        info!(path = %stored, "asset uploaded");
        Ok(stored)
    }
}

/// Lists every image and audio file under `directory`, sorted by path.
pub fn scan_assets(directory: &Path) -> Result<Vec<AssetEntry>> {
    scan_assets_with(directory, IMAGE_EXTENSIONS, AUDIO_EXTENSIONS)
}

#[instrument(skip(images, audio), fields(directory = %directory.display()))]
pub fn scan_assets_with(
    directory: &Path,
    images: &[impl AsRef<str>],
    audio: &[impl AsRef<str>],
) -> Result<Vec<AssetEntry>> {
    if !directory.exists() {
        fs::create_dir_all(directory).with_context(|| {
            format!("failed to create asset directory: {}", directory.display())
        })?;
        debug!("asset directory missing, created empty directory");
        return Ok(Vec::new());
    }

    if !directory.is_dir() {
        return Err(anyhow::anyhow!(
            "asset path is not a directory: {}",
            directory.display()
        ));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning assets");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.path().to_str() else {
            continue;
        };
        let Some(channel) = classify_asset_with(name, images, audio) else {
            continue;
        };
        let extension = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        assets.push(AssetEntry {
            path: entry.path().display().to_string(),
            channel,
            extension,
            size_bytes,
        });
    }

    assets.sort_by(|left, right| left.path.cmp(&right.path));
    debug!(count = assets.len(), "asset scan complete");
    Ok(assets)
}
