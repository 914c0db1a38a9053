use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets::{AUDIO_EXTENSIONS, AssetStore, DurationProbe, IMAGE_EXTENSIONS, classify_asset_with},
    compiler::{self, CompileOptions, OperationChain, Scene, SequencerApi},
    curves::{CurveKind, CurveStep},
    guard,
    model::{
        AudioBed, Channel, ChannelTables, Composition, DEFAULT_SLOT_COUNT, GlobalStyle, ImageSlot,
        MIN_Z_INDEX, RectBackground, SoundSlot, StretchToTarget, TextSlot, to_signed,
    },
    persistence::PresetStore,
    template::{self, TemplateRecord},
    timeline::{
        self, BarRef, DEFAULT_SCALE, Rect, TimelineLayout, TimelineMetrics, ZoomOutcome,
    },
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no token is selected")]
    MissingToken,
    #[error("no target is selected")]
    MissingTarget,
    #[error("no free {0} slot")]
    NoFreeSlot(Channel),
    #[error("{channel} slot {index} is out of range")]
    SlotOutOfRange { channel: Channel, index: usize },
    #[error("{channel} slot {index} is empty")]
    EmptySlot { channel: Channel, index: usize },
    #[error("{action} is not available for {channel} slots")]
    UnsupportedAction {
        action: &'static str,
        channel: Channel,
    },
    #[error("unsupported asset type: {0}")]
    UnsupportedAsset(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("preset not found: {0}")]
    PresetNotFound(usize),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for SessionError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl SessionError {
    /// How the host should surface the failure.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingToken
            | Self::MissingTarget
            | Self::NoFreeSlot(_)
            | Self::SlotOutOfRange { .. }
            | Self::EmptySlot { .. }
            | Self::UnsupportedAction { .. }
            | Self::UnsupportedAsset(_)
            | Self::PresetNotFound(_) => Severity::Warning,
            Self::Upload(_) | Self::Io(_) => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub slot_count: usize,
    pub default_scale: f64,
    pub metrics: TimelineMetrics,
    pub asset_namespace: String,
    /// Extensions a dropped file may carry to land on the image channel.
    pub image_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            default_scale: DEFAULT_SCALE,
            metrics: TimelineMetrics::default(),
            asset_namespace: "cuelane".to_string(),
            image_extensions: IMAGE_EXTENSIONS.iter().map(ToString::to_string).collect(),
            audio_extensions: AUDIO_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    Move,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarOrigin {
    pub bar: BarRef,
    pub start_ms: i64,
    pub duration_ms: u64,
    pub width_px: f64,
}

/// Bar geometry captured at mousedown; all later math reads from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragSession {
    pub mode: DragMode,
    pub start_x: f64,
    pub origins: Vec<BarOrigin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarPreview {
    pub bar: BarRef,
    pub start_ms: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAction {
    Splice,
    StartHere,
    StopHere,
    Duplicate,
}

impl ContextAction {
    fn name(self) -> &'static str {
        match self {
            Self::Splice => "splice",
            Self::StartHere => "start here",
            Self::StopHere => "stop here",
            Self::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOutcome {
    pub action: ContextAction,
    /// Slot created by the action, if any.
    pub created: Option<BarRef>,
}

/// Pending "click on the canvas to place this element" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub bar: BarRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Selection {
    bars: BTreeSet<BarRef>,
}

/// One editor session. Owns the composition and all interaction state.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    settings: SessionSettings,
    composition: Composition,
    scale: f64,
    scroll_left: f64,
    selection: Selection,
    marquee: Option<(f64, f64)>,
    drag: Option<DragSession>,
    capture: Option<CaptureTarget>,
    resolved_durations: BTreeMap<String, u64>,
    revision: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        let composition = Composition::new(settings.slot_count);
        Self::with_composition(settings, composition)
    }

    #[must_use]
    pub fn with_composition(settings: SessionSettings, composition: Composition) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            scale: timeline::clamp_scale(settings.default_scale),
            settings,
            composition,
            scroll_left: 0.0,
            selection: Selection::default(),
            marquee: None,
            drag: None,
            capture: None,
            resolved_durations: BTreeMap::new(),
            revision: 0,
        };
        session.ensure();
        info!(session_id = %session.id, slot_count = session.settings.slot_count, "session opened");
        session
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[must_use]
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    #[must_use]
    pub fn tables(&self) -> &ChannelTables {
        &self.composition.tables
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn scroll_left(&self) -> f64 {
        self.scroll_left
    }

    /// Bumped by every mutation; hosts re-render when it changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn selection(&self) -> Vec<BarRef> {
        self.selection.bars.iter().copied().collect()
    }

    #[must_use]
    pub fn is_selected(&self, bar: BarRef) -> bool {
        self.selection.bars.contains(&bar)
    }

    #[must_use]
    pub fn drag(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    #[must_use]
    pub fn capture(&self) -> Option<CaptureTarget> {
        self.capture
    }

    fn text_factory(&self) -> impl Fn(usize) -> TextSlot + use<> {
        let style = self.composition.style.default_text_style.clone();
        move |_| TextSlot {
            style: style.clone(),
            ..TextSlot::default()
        }
    }

    /// Repairs every channel table. Called before any read or write.
    fn ensure(&mut self) {
        let text_factory = self.text_factory();
        let slot_count = self.settings.slot_count;
        guard::ensure_tables(
            &mut self.composition.tables,
            slot_count,
            text_factory,
            |_| ImageSlot::default(),
            |_| SoundSlot::default(),
        );
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn check_index(&self, bar: BarRef) -> Result<(), SessionError> {
        if bar.slot >= self.composition.tables.len(bar.channel) {
            return Err(SessionError::SlotOutOfRange {
                channel: bar.channel,
                index: bar.slot,
            });
        }
        Ok(())
    }

    fn check_active(&self, bar: BarRef) -> Result<(), SessionError> {
        self.check_index(bar)?;
        let tables = &self.composition.tables;
        let active = match bar.channel {
            Channel::Text => tables.texts[bar.slot].is_active(),
            Channel::Image => tables.images[bar.slot].is_active(),
            Channel::Sound => tables.sounds[bar.slot].is_active(),
        };
        if active {
            Ok(())
        } else {
            Err(SessionError::EmptySlot {
                channel: bar.channel,
                index: bar.slot,
            })
        }
    }

    // Slot editing.

    #[instrument(skip(self, edit), fields(session_id = %self.id, slot))]
    pub fn edit_text<F>(&mut self, slot: usize, edit: F) -> Result<TextSlot, SessionError>
    where
        F: FnOnce(&mut TextSlot),
    {
        self.ensure();
        self.check_index(BarRef::new(Channel::Text, slot))?;
        let record = &mut self.composition.tables.texts[slot];
        edit(record);
        let updated = record.clone();
        self.touch();
        debug!("text slot edited");
        Ok(updated)
    }

    #[instrument(skip(self, edit), fields(session_id = %self.id, slot))]
    pub fn edit_image<F>(&mut self, slot: usize, edit: F) -> Result<ImageSlot, SessionError>
    where
        F: FnOnce(&mut ImageSlot),
    {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        let record = &mut self.composition.tables.images[slot];
        edit(record);
        if record.z_index < MIN_Z_INDEX {
            record.z_index = MIN_Z_INDEX;
        }
        let updated = record.clone();
        self.touch();
        debug!("image slot edited");
        Ok(updated)
    }

    #[instrument(skip(self, edit), fields(session_id = %self.id, slot))]
    pub fn edit_sound<F>(&mut self, slot: usize, edit: F) -> Result<SoundSlot, SessionError>
    where
        F: FnOnce(&mut SoundSlot),
    {
        self.ensure();
        self.check_index(BarRef::new(Channel::Sound, slot))?;
        let record = &mut self.composition.tables.sounds[slot];
        edit(record);
        let updated = record.clone();
        self.touch();
        debug!("sound slot edited");
        Ok(updated)
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn clear_slot(&mut self, bar: BarRef) -> Result<(), SessionError> {
        self.ensure();
        self.check_index(bar)?;
        let blank_text = (self.text_factory())(bar.slot);
        let tables = &mut self.composition.tables;
        match bar.channel {
            Channel::Text => tables.texts[bar.slot] = blank_text,
            Channel::Image => tables.images[bar.slot] = ImageSlot::default(),
            Channel::Sound => tables.sounds[bar.slot] = SoundSlot::default(),
        }
        self.selection.bars.remove(&bar);
        self.touch();
        info!("slot cleared");
        Ok(())
    }

    /// Anchors a text or image slot to the selected token, or releases it.
    #[instrument(skip(self, scene), fields(session_id = %self.id))]
    pub fn set_on_token(
        &mut self,
        bar: BarRef,
        on_token: bool,
        scene: &dyn Scene,
    ) -> Result<(), SessionError> {
        self.ensure();
        self.check_index(bar)?;
        if on_token && scene.controlled_token().is_none() {
            warn!("on-token requested without a selected token");
            return Err(SessionError::MissingToken);
        }
        let tables = &mut self.composition.tables;
        match bar.channel {
            Channel::Text => tables.texts[bar.slot].on_token = on_token,
            Channel::Image => tables.images[bar.slot].on_token = on_token,
            Channel::Sound => {
                return Err(SessionError::UnsupportedAction {
                    action: "on-token placement",
                    channel: Channel::Sound,
                });
            }
        }
        self.touch();
        info!(on_token, "token anchoring changed");
        Ok(())
    }

    #[instrument(skip(self, scene), fields(session_id = %self.id, slot))]
    pub fn set_stretch_to_target(
        &mut self,
        slot: usize,
        stretch: StretchToTarget,
        scene: &dyn Scene,
    ) -> Result<(), SessionError> {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        if stretch.enabled && scene.user_target().is_none() {
            warn!("stretch-to-target requested without a target");
            return Err(SessionError::MissingTarget);
        }
        self.composition.tables.images[slot].stretch_to_target = stretch;
        self.touch();
        info!(enabled = stretch.enabled, tiling = stretch.tiling, "stretch-to-target changed");
        Ok(())
    }

    pub fn set_rect_background(&mut self, rect: RectBackground) {
        self.composition.rect = rect;
        self.touch();
    }

    pub fn set_global_style(&mut self, style: GlobalStyle) {
        self.composition.style = style;
        self.touch();
    }

    pub fn set_audio_bed(&mut self, bed: Option<AudioBed>) {
        self.composition.audio_bed = bed;
        self.touch();
    }

    // Animation curves.

    #[instrument(skip(self, step), fields(session_id = %self.id, slot, kind = ?step.kind()))]
    pub fn add_animation(&mut self, slot: usize, step: CurveStep) -> Result<usize, SessionError> {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        let kind = step.kind();
        let curves = &mut self.composition.tables.images[slot].animations;
        curves.push(step);
        let index = curves.len(kind) - 1;
        self.touch();
        info!(index, "animation step added");
        Ok(index)
    }

    #[instrument(skip(self, step), fields(session_id = %self.id, slot, index, kind = ?step.kind()))]
    pub fn insert_animation(
        &mut self,
        slot: usize,
        index: usize,
        step: CurveStep,
    ) -> Result<(), SessionError> {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        self.composition.tables.images[slot]
            .animations
            .insert(index, step);
        self.touch();
        info!("animation step inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn remove_animation(
        &mut self,
        slot: usize,
        kind: CurveKind,
        index: usize,
    ) -> Result<bool, SessionError> {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        let removed = self.composition.tables.images[slot]
            .animations
            .remove(kind, index);
        if removed {
            self.touch();
            info!("animation step removed");
        } else {
            debug!("animation remove ignored; index out of range");
        }
        Ok(removed)
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn set_animation_enabled(
        &mut self,
        slot: usize,
        kind: CurveKind,
        index: usize,
        enabled: bool,
    ) -> Result<bool, SessionError> {
        self.ensure();
        self.check_index(BarRef::new(Channel::Image, slot))?;
        let changed = self.composition.tables.images[slot]
            .animations
            .set_enabled(kind, index, enabled);
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    // Timeline layout and interaction.

    pub fn layout(&mut self) -> TimelineLayout {
        self.ensure();
        timeline::layout(
            &self.composition.tables,
            &self.resolved_durations,
            self.scale,
            &self.settings.metrics,
        )
    }

    #[must_use]
    pub fn resolved_duration(&self, file: &str) -> Option<u64> {
        self.resolved_durations.get(file).copied()
    }

    pub fn set_resolved_duration(&mut self, file: impl Into<String>, duration_ms: u64) {
        self.resolved_durations.insert(file.into(), duration_ms);
        self.touch();
    }

    /// Probes every active sound whose length is still unknown. Failed probes
    /// record the fallback duration so layout stays stable.
    #[instrument(skip(self, probe), fields(session_id = %self.id))]
    pub fn resolve_sound_durations(&mut self, probe: &dyn DurationProbe) -> usize {
        self.ensure();
        let pending: BTreeSet<String> = self
            .composition
            .tables
            .sounds
            .iter()
            .filter(|slot| slot.is_active() && !self.resolved_durations.contains_key(&slot.file))
            .map(|slot| slot.file.clone())
            .collect();

        let mut resolved = 0;
        for file in pending {
            let duration = match probe.probe_duration_ms(&file) {
                Ok(duration) => {
                    resolved += 1;
                    duration
                }
                Err(error) => {
                    warn!(%file, error = %format!("{error:#}"), "sound duration probe failed; using fallback");
                    self.settings.metrics.fallback_sound_duration_ms
                }
            };
            self.resolved_durations.insert(file, duration);
        }
        if resolved > 0 {
            self.touch();
        }
        debug!(resolved, "sound durations resolved");
        resolved
    }

    fn sound_duration(&self, sound: &SoundSlot) -> u64 {
        sound.effective_duration(
            self.resolved_durations.get(&sound.file).copied(),
            self.settings.metrics.fallback_sound_duration_ms,
        )
    }

    /// Zooms around the cursor. Bars are re-derived from stored times on the
    /// next [`Session::layout`].
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn wheel(&mut self, delta_y: f64, cursor_x: f64) -> ZoomOutcome {
        let outcome = timeline::zoom_at(self.scale, delta_y, cursor_x, self.scroll_left);
        self.scale = outcome.scale;
        self.scroll_left = outcome.scroll_left;
        debug!(scale = outcome.scale, scroll_left = outcome.scroll_left, "timeline zoomed");
        outcome
    }

    pub fn set_scroll_left(&mut self, scroll_left: f64) {
        self.scroll_left = scroll_left.max(0.0);
    }

    /// Mousedown on empty timeline space: drops the selection and starts a marquee.
    pub fn begin_marquee(&mut self, x: f64, y: f64) {
        self.selection.bars.clear();
        self.drag = None;
        self.marquee = Some((x, y));
    }

    /// Mouseup after a marquee drag; selects every bar touching the rectangle.
    pub fn end_marquee(&mut self, x: f64, y: f64) -> Vec<BarRef> {
        let Some(origin) = self.marquee.take() else {
            return Vec::new();
        };
        let rect = Rect::from_corners(origin, (x, y));
        let hits = self.layout().bars_in(&rect);
        self.selection.bars.extend(hits.iter().copied());
        debug!(selected = hits.len(), "marquee selection");
        hits
    }

    pub fn clear_selection(&mut self) {
        self.selection.bars.clear();
    }

    /// Mousedown on a bar. Toggles it in the selection; when it ends up
    /// selected, starts a move (or resize, with shift) for the whole selection.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn pointer_down_on_bar(&mut self, bar: BarRef, x: f64, shift: bool) -> bool {
        if !self.selection.bars.remove(&bar) {
            self.selection.bars.insert(bar);
        }
        if !self.selection.bars.contains(&bar) {
            self.drag = None;
            return false;
        }

        let layout = self.layout();
        let origins = self
            .selection
            .bars
            .iter()
            .filter_map(|selected| layout.bar(*selected))
            .map(|bar_layout| BarOrigin {
                bar: bar_layout.bar,
                start_ms: bar_layout.start_ms,
                duration_ms: bar_layout.duration_ms,
                width_px: bar_layout.width,
            })
            .collect();
        self.drag = Some(DragSession {
            mode: if shift { DragMode::Resize } else { DragMode::Move },
            start_x: x,
            origins,
        });
        true
    }

    /// Where the dragged bars would land if released at `x`.
    #[must_use]
    pub fn drag_preview(&self, x: f64) -> Vec<BarPreview> {
        let Some(drag) = &self.drag else {
            return Vec::new();
        };
        let delta = x - drag.start_x;
        let snap_ms = self.settings.metrics.snap_ms;
        drag.origins
            .iter()
            .map(|origin| match drag.mode {
                DragMode::Move => BarPreview {
                    bar: origin.bar,
                    start_ms: timeline::moved_start(origin.start_ms, delta, self.scale, snap_ms),
                    duration_ms: origin.duration_ms,
                },
                DragMode::Resize => BarPreview {
                    bar: origin.bar,
                    start_ms: origin.start_ms,
                    duration_ms: timeline::resized_duration(
                        origin.start_ms,
                        origin.width_px,
                        delta,
                        self.scale,
                        snap_ms,
                    ),
                },
            })
            .collect()
    }

    /// Mouseup after a bar drag. Commits the preview to the slot records.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn pointer_up(&mut self, x: f64) -> Vec<BarPreview> {
        let previews = self.drag_preview(x);
        let Some(drag) = self.drag.take() else {
            return Vec::new();
        };
        if (x - drag.start_x).abs() < f64::EPSILON {
            debug!("bar clicked without movement");
            return Vec::new();
        }

        self.ensure();
        let tables = &mut self.composition.tables;
        for preview in &previews {
            let slot = preview.bar.slot;
            match (drag.mode, preview.bar.channel) {
                (DragMode::Move, Channel::Text) => {
                    if let Some(text) = tables.texts.get_mut(slot) {
                        text.delay = clamp_time(preview.start_ms);
                    }
                }
                (DragMode::Move, Channel::Image) => {
                    if let Some(image) = tables.images.get_mut(slot) {
                        image.delay = clamp_time(preview.start_ms);
                    }
                }
                (DragMode::Move, Channel::Sound) => {
                    if let Some(sound) = tables.sounds.get_mut(slot) {
                        sound.delay = clamp_time(
                            preview.start_ms.saturating_add(to_signed(sound.time_start)),
                        );
                    }
                }
                (DragMode::Resize, Channel::Text) => {
                    if let Some(text) = tables.texts.get_mut(slot) {
                        text.duration = preview.duration_ms;
                    }
                }
                (DragMode::Resize, Channel::Image) => {
                    if let Some(image) = tables.images.get_mut(slot) {
                        image.duration = preview.duration_ms;
                    }
                }
                (DragMode::Resize, Channel::Sound) => {
                    if let Some(sound) = tables.sounds.get_mut(slot) {
                        sound.duration = preview.duration_ms;
                    }
                }
            }
        }
        self.touch();
        info!(mode = ?drag.mode, bars = previews.len(), "drag committed");
        previews
    }

    /// Steps an image's z-index, never below 1.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn step_z_index(&mut self, slot: usize, delta: i64) -> Result<i64, SessionError> {
        self.ensure();
        self.check_active(BarRef::new(Channel::Image, slot))?;
        let image = &mut self.composition.tables.images[slot];
        image.z_index = image.z_index.saturating_add(delta).max(MIN_Z_INDEX);
        let z_index = image.z_index;
        self.touch();
        info!(z_index, "z-index stepped");
        Ok(z_index)
    }

    /// Runs a right-click action at `x_px` on `bar`.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn context_action(
        &mut self,
        bar: BarRef,
        action: ContextAction,
        x_px: f64,
    ) -> Result<ContextOutcome, SessionError> {
        self.ensure();
        self.check_active(bar)?;
        let fraction = self
            .layout()
            .bar(bar)
            .map_or(0.0, |layout| layout.fraction_at(x_px));

        let created = match (action, bar.channel) {
            (ContextAction::Splice, Channel::Sound) => {
                Some(BarRef::new(Channel::Sound, self.splice_sound(bar.slot, fraction)?))
            }
            (ContextAction::StartHere, Channel::Sound) => {
                self.sound_start_here(bar.slot, fraction)?;
                None
            }
            (ContextAction::StopHere, Channel::Sound) => {
                self.sound_stop_here(bar.slot, fraction)?;
                None
            }
            (ContextAction::Duplicate, Channel::Text | Channel::Image) => {
                Some(BarRef::new(bar.channel, self.duplicate(bar)?))
            }
            (action, channel) => {
                return Err(SessionError::UnsupportedAction {
                    action: action.name(),
                    channel,
                });
            }
        };
        Ok(ContextOutcome { action, created })
    }

    /// Splits a sound at `fraction` of its length into two contiguous slots.
    /// Returns the index of the new slot.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn splice_sound(&mut self, slot: usize, fraction: f64) -> Result<usize, SessionError> {
        self.ensure();
        self.check_active(BarRef::new(Channel::Sound, slot))?;
        let target = self
            .composition
            .tables
            .first_empty(Channel::Sound)
            .ok_or(SessionError::NoFreeSlot(Channel::Sound))?;

        let original = self.composition.tables.sounds[slot].clone();
        let duration = self.sound_duration(&original);
        let split = timeline::split_point(duration, fraction, self.settings.metrics.snap_ms);

        let mut tail = original.clone();
        tail.time_start = split;
        tail.delay = original.delay.saturating_add(split);

        let head = &mut self.composition.tables.sounds[slot];
        head.time_start = 0;
        head.time_end = duration - split;

        self.composition.tables.sounds[target] = tail;
        self.touch();
        info!(split, new_slot = target, "sound spliced");
        Ok(target)
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn sound_start_here(&mut self, slot: usize, fraction: f64) -> Result<u64, SessionError> {
        self.ensure();
        self.check_active(BarRef::new(Channel::Sound, slot))?;
        let duration = self.sound_duration(&self.composition.tables.sounds[slot]);
        let point = timeline::split_point(duration, fraction, self.settings.metrics.snap_ms);
        self.composition.tables.sounds[slot].time_start = point;
        self.touch();
        info!(time_start = point, "sound start trimmed");
        Ok(point)
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn sound_stop_here(&mut self, slot: usize, fraction: f64) -> Result<u64, SessionError> {
        self.ensure();
        self.check_active(BarRef::new(Channel::Sound, slot))?;
        let duration = self.sound_duration(&self.composition.tables.sounds[slot]);
        let point = timeline::split_point(duration, fraction, self.settings.metrics.snap_ms);
        let time_end = duration - point;
        self.composition.tables.sounds[slot].time_end = time_end;
        self.touch();
        info!(time_end, "sound end trimmed");
        Ok(time_end)
    }

    /// Copies a text or image slot into the next empty slot, placed right
    /// after the source ends.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn duplicate(&mut self, bar: BarRef) -> Result<usize, SessionError> {
        self.ensure();
        self.check_active(bar)?;
        let target = self
            .composition
            .tables
            .first_empty(bar.channel)
            .ok_or(SessionError::NoFreeSlot(bar.channel))?;

        let tables = &mut self.composition.tables;
        match bar.channel {
            Channel::Text => {
                let mut copy = tables.texts[bar.slot].clone();
                copy.delay = copy.delay.saturating_add(copy.duration);
                tables.texts[target] = copy;
            }
            Channel::Image => {
                let mut copy = tables.images[bar.slot].clone();
                copy.delay = copy.delay.saturating_add(copy.duration);
                tables.images[target] = copy;
            }
            Channel::Sound => {
                return Err(SessionError::UnsupportedAction {
                    action: ContextAction::Duplicate.name(),
                    channel: Channel::Sound,
                });
            }
        }
        self.touch();
        info!(new_slot = target, "slot duplicated");
        Ok(target)
    }

    /// Uploads a dropped file and places it in the first empty slot of the
    /// matching channel.
    #[instrument(skip(self, bytes, store), fields(session_id = %self.id, size = bytes.len()))]
    pub fn drop_file(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        store: &mut dyn AssetStore,
    ) -> Result<BarRef, SessionError> {
        self.ensure();
        let channel = match classify_asset_with(
            file_name,
            &self.settings.image_extensions,
            &self.settings.audio_extensions,
        ) {
            Some(channel @ (Channel::Image | Channel::Sound)) => channel,
            _ => return Err(SessionError::UnsupportedAsset(file_name.to_string())),
        };
        let slot = self
            .composition
            .tables
            .first_empty(channel)
            .ok_or(SessionError::NoFreeSlot(channel))?;

        let path = store
            .upload(&self.settings.asset_namespace, file_name, bytes)
            .map_err(|error| SessionError::Upload(format!("{error:#}")))?;

        let tables = &mut self.composition.tables;
        match channel {
            Channel::Image => {
                tables.images[slot] = ImageSlot {
                    file: path,
                    ..ImageSlot::default()
                };
            }
            _ => {
                tables.sounds[slot] = SoundSlot {
                    file: path,
                    ..SoundSlot::default()
                };
            }
        }
        self.touch();
        info!(%channel, slot, "file dropped onto timeline");
        Ok(BarRef::new(channel, slot))
    }

    // Click-to-position capture.

    /// Arms a capture for `bar`, replacing any capture already armed.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn arm_capture(&mut self, bar: BarRef) -> Result<(), SessionError> {
        self.ensure();
        self.check_index(bar)?;
        if bar.channel == Channel::Sound {
            return Err(SessionError::UnsupportedAction {
                action: "position capture",
                channel: Channel::Sound,
            });
        }
        if let Some(previous) = self.capture.replace(CaptureTarget { bar }) {
            debug!(?previous, "previous capture disarmed");
        }
        Ok(())
    }

    pub fn disarm_capture(&mut self) -> Option<CaptureTarget> {
        self.capture.take()
    }

    /// Writes a captured canvas point into the armed slot's x/y.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn complete_capture(&mut self, x: i64, y: i64) -> Option<BarRef> {
        let capture = self.capture.take()?;
        self.ensure();
        let tables = &mut self.composition.tables;
        match capture.bar.channel {
            Channel::Text => {
                let text = tables.texts.get_mut(capture.bar.slot)?;
                text.x = x;
                text.y = y;
            }
            Channel::Image => {
                let image = tables.images.get_mut(capture.bar.slot)?;
                image.x = x;
                image.y = y;
            }
            Channel::Sound => return None,
        }
        self.touch();
        info!(x, y, "position captured");
        Some(capture.bar)
    }

    // Compilation.

    #[instrument(skip(self, scene), fields(session_id = %self.id))]
    pub fn compile_chain(&mut self, scene: &dyn Scene, options: CompileOptions) -> OperationChain {
        self.ensure();
        compiler::compile(&self.composition, scene.availability(), options)
    }

    /// Source text for a reusable macro.
    #[instrument(skip(self, scene), fields(session_id = %self.id))]
    pub fn compile_macro(&mut self, scene: &dyn Scene) -> String {
        let chain = self.compile_chain(scene, CompileOptions::literal());
        let script = compiler::render_literal(&chain);
        info!(bytes = script.len(), "macro compiled");
        script
    }

    /// Plays the whole composition through a live sequencer.
    #[instrument(skip(self, scene, api), fields(session_id = %self.id))]
    pub fn preview<A: SequencerApi>(
        &mut self,
        scene: &dyn Scene,
        api: &mut A,
    ) -> Result<A::Handle, SessionError> {
        let chain = self.compile_chain(scene, CompileOptions::live());
        let handle = compiler::invoke_live(&chain, scene, api)?;
        info!(operations = chain.operations.len(), "preview started");
        Ok(handle)
    }

    /// Plays a single slot through a live sequencer.
    #[instrument(skip(self, scene, api), fields(session_id = %self.id))]
    pub fn preview_slot<A: SequencerApi>(
        &mut self,
        bar: BarRef,
        scene: &dyn Scene,
        api: &mut A,
    ) -> Result<A::Handle, SessionError> {
        self.ensure();
        self.check_active(bar)?;
        let chain = compiler::compile_slot(&self.composition, bar, scene.availability()).ok_or(
            SessionError::EmptySlot {
                channel: bar.channel,
                index: bar.slot,
            },
        )?;
        let handle = compiler::invoke_live(&chain, scene, api)?;
        info!("slot preview started");
        Ok(handle)
    }

    // Templates and presets.

    #[must_use]
    pub fn to_template(&self, name: &str) -> TemplateRecord {
        let mut tables = self.composition.tables.clone();
        guard::ensure_tables(
            &mut tables,
            self.settings.slot_count,
            self.text_factory(),
            |_| ImageSlot::default(),
            |_| SoundSlot::default(),
        );
        let composition = &self.composition;
        template::flatten(
            name,
            &tables,
            &composition.rect,
            &composition.style,
            composition.audio_bed.as_ref(),
        )
    }

    /// Replaces the composition with a template's contents, resized to this
    /// session's slot count.
    #[instrument(skip(self, record), fields(session_id = %self.id, template = %record.name))]
    pub fn apply_template(&mut self, record: &TemplateRecord) {
        self.composition = template::unflatten(record, self.settings.slot_count);
        self.selection = Selection::default();
        self.drag = None;
        self.capture = None;
        self.ensure();
        self.touch();
        info!("template applied");
    }

    #[instrument(skip(self, store), fields(session_id = %self.id))]
    pub fn save_preset(&self, store: &PresetStore, name: &str) -> Result<usize, SessionError> {
        let index = store.append(self.to_template(name))?;
        Ok(index)
    }

    #[instrument(skip(self, store), fields(session_id = %self.id))]
    pub fn load_preset(&mut self, store: &PresetStore, index: usize) -> Result<(), SessionError> {
        let presets = store.load()?;
        let record = presets
            .get(index)
            .ok_or(SessionError::PresetNotFound(index))?;
        self.apply_template(record);
        Ok(())
    }
}

fn clamp_time(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
