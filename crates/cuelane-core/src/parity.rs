use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};

use crate::{
    compiler::{self, CompileOptions, Origin, RecordingSequencer, Scene},
    model::Channel,
    session::Session,
};

const PARITY_SCHEMA_VERSION: u32 = 1;

/// Fingerprint of what the literal and live paths produce for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParityReport {
    pub schema_version: u32,
    pub session_id: String,
    pub slot_count: usize,
    pub active_texts: usize,
    pub active_images: usize,
    pub active_sounds: usize,
    pub operation_count: usize,
    pub call_count: usize,
    pub macro_hash: String,
    pub chain_hash: String,
    pub live_transcript_hash: String,
    /// Live playback issued the same calls as the literal chain, minus the
    /// literal-only audio bed.
    pub modes_agree: bool,
}

#[instrument(skip(session, scene), fields(session_id = %session.id()))]
pub fn generate_parity_report(session: &mut Session, scene: &dyn Scene) -> Result<ParityReport> {
    let literal = session.compile_chain(scene, CompileOptions::literal());
    let live = session.compile_chain(scene, CompileOptions::live());
    let script = compiler::render_literal(&literal);

    let mut recorder = RecordingSequencer::default();
    compiler::invoke_live(&live, scene, &mut recorder)
        .map_err(|error| anyhow::anyhow!(error))
        .context("live replay failed")?;

    let mut literal_without_bed = literal.clone();
    literal_without_bed
        .operations
        .retain(|operation| operation.origin != Origin::AudioBed);
    let modes_agree = literal_without_bed.transcript() == recorder.verbs()
        && live.transcript() == recorder.verbs();
    if !modes_agree {
        warn!("literal and live transcripts diverge");
    }

    let chain_bytes = serde_json::to_vec(&literal).context("failed to serialize chain")?;
    let live_bytes =
        serde_json::to_vec(&recorder.calls).context("failed to serialize live transcript")?;
    let tables = session.tables();

    Ok(ParityReport {
        schema_version: PARITY_SCHEMA_VERSION,
        session_id: session.id().to_string(),
        slot_count: session.settings().slot_count,
        active_texts: tables.active_count(Channel::Text),
        active_images: tables.active_count(Channel::Image),
        active_sounds: tables.active_count(Channel::Sound),
        operation_count: literal.operations.len(),
        call_count: literal.call_count(),
        macro_hash: hash_hex(script.as_bytes()),
        chain_hash: hash_hex(&chain_bytes),
        live_transcript_hash: hash_hex(&live_bytes),
        modes_agree,
    })
}

pub fn read_parity_report(path: &Path) -> Result<ParityReport> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read parity report: {}", path.display()))?;
    let report: ParityReport =
        serde_json::from_slice(&bytes).context("failed to parse parity report json")?;
    Ok(report)
}

pub fn write_parity_report(path: &Path, report: &ParityReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parity directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(report).context("failed to encode parity report json")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write parity report: {}", path.display()))?;
    Ok(())
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
