//! Lowers a [`Composition`] into sequencing-API calls.
//!
//! Lowering always produces an [`OperationChain`] first. The chain is then
//! either printed as macro source ([`render_literal`]) or replayed against a
//! live [`SequencerApi`] ([`invoke_live`]), so both outputs come from the
//! same resolved parameters.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    curves::resolve_position_waypoints,
    model::{
        AttachOptions, AudioBed, Channel, Composition, DEFAULT_ELEMENT_DURATION_MS, Ease,
        GlobalStyle, ImageSlot, Offset, RectBackground, SoundSlot, TEXT_Z_INDEX, TextSlot,
        TextStyle,
    },
    session::SessionError,
    timeline::BarRef,
};

/// Blur strength used for the filter instance that animated blur steps target.
pub const BLUR_STUB_STRENGTH: f64 = 0.0001;
pub const ANIMATED_BLUR_ID: &str = "animatedBlur";
const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    /// The token the user controls when the sequence runs.
    Source,
    /// The user's first targeted token.
    Target,
}

impl TokenRole {
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Source => "token",
            Self::Target => "target",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Str(String),
    Num(f64),
    Int(i64),
    Bool(bool),
    Null,
    Object(Vec<(String, Arg)>),
    Token(TokenRole),
}

impl Arg {
    fn to_live(&self, scene: &dyn Scene) -> Result<LiveArg, SessionError> {
        Ok(match self {
            Self::Token(TokenRole::Source) => {
                LiveArg::Token(scene.controlled_token().ok_or(SessionError::MissingToken)?)
            }
            Self::Token(TokenRole::Target) => {
                LiveArg::Token(scene.user_target().ok_or(SessionError::MissingTarget)?)
            }
            other => LiveArg::Value(other.to_json()),
        })
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Str(value) => Value::String(value.clone()),
            Self::Num(value) => serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::Int(value) => Value::from(*value),
            Self::Bool(value) => Value::Bool(*value),
            Self::Null => Value::Null,
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Token(role) => Value::String(role.identifier().to_string()),
        }
    }

    fn uses(&self, role: TokenRole) -> bool {
        match self {
            Self::Token(used) => *used == role,
            Self::Object(fields) => fields.iter().any(|(_, value)| value.uses(role)),
            _ => false,
        }
    }

    fn write_literal(&self, out: &mut String) {
        match self {
            Self::Str(value) => out.push_str(&quote(value)),
            Self::Num(value) => out.push_str(&format_number(*value)),
            Self::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Bool(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Null => out.push_str("null"),
            Self::Object(fields) if fields.is_empty() => out.push_str("{}"),
            Self::Object(fields) => {
                out.push_str("{ ");
                for (index, (key, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    value.write_literal(out);
                }
                out.push_str(" }");
            }
            Self::Token(role) => out.push_str(role.identifier()),
        }
    }
}

fn str_arg(value: impl Into<String>) -> Arg {
    Arg::Str(value.into())
}

fn num(value: f64) -> Arg {
    Arg::Num(value)
}

fn int(value: u64) -> Arg {
    Arg::Int(i64::try_from(value).unwrap_or(i64::MAX))
}

fn object<const N: usize>(fields: [(&str, Arg); N]) -> Arg {
    Arg::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub verb: String,
    pub args: Vec<Arg>,
}

impl Call {
    fn new(verb: &str, args: Vec<Arg>) -> Self {
        Self {
            verb: verb.to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Effect,
    Sound,
}

impl SectionKind {
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Effect => "effect",
            Self::Sound => "sound",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Background,
    Slot(BarRef),
    AudioBed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: SectionKind,
    pub origin: Origin,
    pub calls: Vec<Call>,
}

impl Operation {
    fn new(kind: SectionKind, origin: Origin) -> Self {
        Self {
            kind,
            origin,
            calls: Vec::new(),
        }
    }

    fn push(&mut self, verb: &str, args: Vec<Arg>) {
        self.calls.push(Call::new(verb, args));
    }

    #[must_use]
    pub fn verbs(&self) -> Vec<&str> {
        self.calls.iter().map(|call| call.verb.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationChain {
    pub operations: Vec<Operation>,
    /// Non-fatal notes produced while lowering, e.g. a skipped stretch.
    pub warnings: Vec<String>,
}

impl OperationChain {
    #[must_use]
    pub fn uses(&self, role: TokenRole) -> bool {
        self.operations
            .iter()
            .flat_map(|operation| operation.calls.iter())
            .flat_map(|call| call.args.iter())
            .any(|arg| arg.uses(role))
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.operations
            .iter()
            .map(|operation| operation.calls.len() + 1)
            .sum()
    }

    /// Flat verb transcript including section openers.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        let mut verbs = Vec::with_capacity(self.call_count());
        for operation in &self.operations {
            verbs.push(operation.kind.verb().to_string());
            verbs.extend(operation.calls.iter().map(|call| call.verb.clone()));
        }
        verbs
    }
}

/// What the scene can resolve at compile time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnchorAvailability {
    pub token: bool,
    pub target: bool,
}

/// Host-side token lookup.
pub trait Scene {
    fn controlled_token(&self) -> Option<String>;
    fn user_target(&self) -> Option<String>;

    fn availability(&self) -> AnchorAvailability {
        AnchorAvailability {
            token: self.controlled_token().is_some(),
            target: self.user_target().is_some(),
        }
    }
}

/// A scene with fixed answers; used by the CLI and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticScene {
    pub token: Option<String>,
    pub target: Option<String>,
}

impl Scene for StaticScene {
    fn controlled_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user_target(&self) -> Option<String> {
        self.target.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiveArg {
    Value(Value),
    Token(String),
}

/// The external sequencing API as seen by live preview.
pub trait SequencerApi {
    type Handle;

    fn begin(&mut self, kind: SectionKind) -> anyhow::Result<()>;
    fn call(&mut self, verb: &str, args: &[LiveArg]) -> anyhow::Result<()>;
    fn play(&mut self) -> anyhow::Result<Self::Handle>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub verb: String,
    pub args: Vec<LiveArg>,
}

/// Sequencer that records every call instead of running it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSequencer {
    pub calls: Vec<RecordedCall>,
    pub played: usize,
}

impl RecordingSequencer {
    #[must_use]
    pub fn verbs(&self) -> Vec<String> {
        self.calls.iter().map(|call| call.verb.clone()).collect()
    }
}

impl SequencerApi for RecordingSequencer {
    type Handle = usize;

    fn begin(&mut self, kind: SectionKind) -> anyhow::Result<()> {
        self.calls.push(RecordedCall {
            verb: kind.verb().to_string(),
            args: Vec::new(),
        });
        Ok(())
    }

    fn call(&mut self, verb: &str, args: &[LiveArg]) -> anyhow::Result<()> {
        self.calls.push(RecordedCall {
            verb: verb.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn play(&mut self) -> anyhow::Result<Self::Handle> {
        self.played += 1;
        Ok(self.calls.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub include_background: bool,
    pub include_audio_bed: bool,
    /// Single-slot preview adds `time_start` to a sound's `endTime`. The full
    /// sequence paths do not.
    pub end_time_includes_start: bool,
}

impl CompileOptions {
    #[must_use]
    pub fn literal() -> Self {
        Self {
            include_background: true,
            include_audio_bed: true,
            end_time_includes_start: false,
        }
    }

    #[must_use]
    pub fn live() -> Self {
        Self {
            include_background: true,
            include_audio_bed: false,
            end_time_includes_start: false,
        }
    }

    #[must_use]
    pub fn single_slot() -> Self {
        Self {
            include_background: false,
            include_audio_bed: false,
            end_time_includes_start: true,
        }
    }
}

/// One active slot, tagged by channel.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Image(usize, &'a ImageSlot),
    Text(usize, &'a TextSlot),
    Sound(usize, &'a SoundSlot),
}

impl Element<'_> {
    #[must_use]
    pub fn bar(&self) -> BarRef {
        match self {
            Self::Image(slot, _) => BarRef::new(Channel::Image, *slot),
            Self::Text(slot, _) => BarRef::new(Channel::Text, *slot),
            Self::Sound(slot, _) => BarRef::new(Channel::Sound, *slot),
        }
    }

    #[must_use]
    pub fn start_time(&self) -> u64 {
        match self {
            Self::Image(_, image) => image.delay,
            Self::Text(_, text) => text.delay,
            Self::Sound(_, sound) => sound.logical_start(),
        }
    }
}

/// Active slots in declaration order: images, texts, sounds.
#[must_use]
pub fn active_elements(composition: &Composition) -> Vec<Element<'_>> {
    let tables = &composition.tables;
    let images = tables
        .images
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_active())
        .map(|(index, slot)| Element::Image(index, slot));
    let texts = tables
        .texts
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_active())
        .map(|(index, slot)| Element::Text(index, slot));
    let sounds = tables
        .sounds
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_active())
        .map(|(index, slot)| Element::Sound(index, slot));
    images.chain(texts).chain(sounds).collect()
}

struct Lowering<'a> {
    style: &'a GlobalStyle,
    anchors: AnchorAvailability,
    options: CompileOptions,
    warnings: Vec<String>,
}

impl Lowering<'_> {
    fn lower(&mut self, element: Element<'_>) -> Operation {
        match element {
            Element::Image(slot, image) => self.lower_image(slot, image),
            Element::Text(slot, text) => self.lower_text(slot, text),
            Element::Sound(slot, sound) => self.lower_sound(slot, sound),
        }
    }

    fn screen_space(&self, operation: &mut Operation, x: i64, y: i64) {
        operation.push("screenSpace", Vec::new());
        if self.style.screen_space_above_ui {
            operation.push("screenSpaceAboveUI", Vec::new());
        }
        operation.push(
            "screenSpacePosition",
            vec![object([("x", Arg::Int(x)), ("y", Arg::Int(y))])],
        );
        operation.push(
            "screenSpaceAnchor",
            vec![object([("x", num(0.5)), ("y", num(0.5))])],
        );
    }

    fn lower_background(&self, rect: &RectBackground, span: u64) -> Operation {
        let mut operation = Operation::new(SectionKind::Effect, Origin::Background);
        operation.push(
            "shape",
            vec![
                str_arg("rectangle"),
                object([
                    ("width", num(rect.width)),
                    ("height", num(rect.height)),
                    ("fillColor", str_arg(&rect.fill_color)),
                    ("fillAlpha", num(rect.fill_alpha)),
                ]),
            ],
        );
        self.screen_space(&mut operation, rect.x, rect.y);
        let duration = if rect.duration > 0 {
            rect.duration
        } else if span > 0 {
            span
        } else {
            DEFAULT_ELEMENT_DURATION_MS
        };
        operation.push("delay", vec![int(rect.delay)]);
        operation.push("duration", vec![int(duration)]);
        operation.push("fadeIn", vec![int(rect.fade_in)]);
        operation.push("fadeOut", vec![int(rect.fade_out)]);
        operation
    }

    fn lower_image(&mut self, slot: usize, image: &ImageSlot) -> Operation {
        let mut operation =
            Operation::new(SectionKind::Effect, Origin::Slot(BarRef::new(Channel::Image, slot)));
        operation.push("file", vec![str_arg(&image.file)]);

        if image.on_token {
            operation.push(
                "atLocation",
                vec![
                    Arg::Token(TokenRole::Source),
                    object([("cacheLocation", Arg::Bool(true))]),
                ],
            );
        } else {
            self.screen_space(&mut operation, image.x, image.y);
        }

        operation.push("scale", vec![num(image.scale)]);
        operation.push("opacity", vec![num(image.opacity)]);
        operation.push("duration", vec![int(image.duration)]);
        operation.push("delay", vec![int(image.delay)]);
        operation.push("fadeIn", vec![int(image.fade_in_duration)]);
        operation.push("fadeOut", vec![int(image.fade_out_duration)]);
        operation.push("zIndex", vec![Arg::Int(image.z_index)]);
        operation.push("mirrorX", vec![Arg::Bool(image.mirror_x)]);
        operation.push("mirrorY", vec![Arg::Bool(image.mirror_y)]);

        if image.size.is_set() {
            operation.push(
                "size",
                vec![
                    object([
                        ("width", image.size.width.map_or(Arg::Null, num)),
                        ("height", image.size.height.map_or(Arg::Null, num)),
                    ]),
                    object([("gridUnits", Arg::Bool(image.size.grid_units))]),
                ],
            );
        }

        let curves = &image.animations;
        let base = base_offset(image.on_token, image.x, image.y);
        for (step, waypoint) in resolve_position_waypoints(base, &curves.position) {
            for (axis, from, to) in [
                ("position.x", waypoint.from.x, waypoint.to.x),
                ("position.y", waypoint.from.y, waypoint.to.y),
            ] {
                operation.push(
                    "animateProperty",
                    vec![
                        str_arg("sprite"),
                        str_arg(axis),
                        tween(
                            from,
                            to,
                            step.duration,
                            step.delay,
                            step.ease,
                            step.from_end,
                            &[("gridUnits", Arg::Bool(step.params.grid_units))],
                        ),
                    ],
                );
            }
        }

        for step in curves.rotation.iter().filter(|step| step.enabled) {
            if step.params.looping {
                operation.push(
                    "loopProperty",
                    vec![
                        str_arg("sprite"),
                        str_arg("rotation"),
                        object([
                            ("from", num(step.params.from)),
                            ("to", num(step.params.to)),
                            ("duration", int(step.duration)),
                            ("delay", int(step.delay)),
                            ("ease", str_arg(step.ease.as_str())),
                        ]),
                    ],
                );
            } else {
                operation.push(
                    "animateProperty",
                    vec![
                        str_arg("sprite"),
                        str_arg("rotation"),
                        tween(
                            step.params.from,
                            step.params.to,
                            step.duration,
                            step.delay,
                            step.ease,
                            step.from_end,
                            &[],
                        ),
                    ],
                );
            }
        }

        for step in curves.scale.iter().filter(|step| step.enabled) {
            for axis in ["scale.x", "scale.y"] {
                operation.push(
                    "animateProperty",
                    vec![
                        str_arg("sprite"),
                        str_arg(axis),
                        tween(
                            step.params.from,
                            step.params.to,
                            step.duration,
                            step.delay,
                            step.ease,
                            step.from_end,
                            &[],
                        ),
                    ],
                );
            }
        }

        for step in curves.alpha.iter().filter(|step| step.enabled) {
            operation.push(
                "animateProperty",
                vec![
                    str_arg("alphaFilter"),
                    str_arg("alpha"),
                    tween(
                        step.params.from,
                        step.params.to,
                        step.duration,
                        step.delay,
                        step.ease,
                        step.from_end,
                        &[],
                    ),
                ],
            );
        }

        if curves.has_animated_blur() {
            operation.push(
                "filter",
                vec![
                    str_arg("Blur"),
                    object([
                        ("strength", num(BLUR_STUB_STRENGTH)),
                        ("blurX", num(BLUR_STUB_STRENGTH)),
                        ("blurY", num(BLUR_STUB_STRENGTH)),
                    ]),
                    str_arg(ANIMATED_BLUR_ID),
                ],
            );
            let target = format!("effectFilters.{ANIMATED_BLUR_ID}");
            for step in curves.blur.iter().filter(|step| step.enabled) {
                for property in ["strength", "blurX", "blurY"] {
                    operation.push(
                        "animateProperty",
                        vec![
                            str_arg(&target),
                            str_arg(property),
                            tween(
                                step.params.from,
                                step.params.to,
                                step.duration,
                                step.delay,
                                step.ease,
                                step.from_end,
                                &[],
                            ),
                        ],
                    );
                }
            }
        }

        let filters = &image.filters;
        if filters.color_matrix.enabled {
            let matrix = &filters.color_matrix;
            operation.push(
                "filter",
                vec![
                    str_arg("ColorMatrix"),
                    object([
                        ("hue", num(matrix.hue)),
                        ("brightness", num(matrix.brightness)),
                        ("contrast", num(matrix.contrast)),
                        ("saturate", num(matrix.saturate)),
                    ]),
                ],
            );
        }
        if filters.glow.enabled {
            let glow = &filters.glow;
            operation.push(
                "filter",
                vec![
                    str_arg("Glow"),
                    object([
                        ("distance", num(glow.distance)),
                        ("outerStrength", num(glow.outer_strength)),
                        ("innerStrength", num(glow.inner_strength)),
                        ("color", str_arg(&glow.color)),
                        ("quality", num(glow.quality)),
                        ("knockout", Arg::Bool(glow.knockout)),
                    ]),
                ],
            );
        }
        if filters.blur.enabled && !curves.has_animated_blur() {
            let blur = &filters.blur;
            operation.push(
                "filter",
                vec![
                    str_arg("Blur"),
                    object([
                        ("strength", num(blur.strength)),
                        ("blur", num(blur.blur)),
                        ("blurX", num(blur.blur_x)),
                        ("blurY", num(blur.blur_y)),
                        ("quality", int(u64::from(blur.quality))),
                        ("resolution", num(blur.resolution)),
                        ("kernelSize", int(u64::from(blur.kernel_size))),
                    ]),
                ],
            );
        }

        if image.on_token {
            if image.attach_to_source {
                operation.push(
                    "attachTo",
                    vec![
                        Arg::Token(TokenRole::Source),
                        attach_options(&image.attach_options),
                    ],
                );
            }
            if image.stretch_to_target.enabled {
                if self.anchors.target {
                    operation.push(
                        "stretchTo",
                        vec![
                            Arg::Token(TokenRole::Target),
                            object([("tiling", Arg::Bool(image.stretch_to_target.tiling))]),
                        ],
                    );
                } else {
                    self.warnings.push(format!(
                        "image slot {} asks to stretch to a target but none is selected",
                        slot + 1
                    ));
                }
            }
            if image.below_token {
                operation.push("belowTokens", Vec::new());
            }
        }
        if image.persist {
            operation.push("persist", Vec::new());
        }
        operation
    }

    fn lower_text(&mut self, slot: usize, text: &TextSlot) -> Operation {
        let mut operation =
            Operation::new(SectionKind::Effect, Origin::Slot(BarRef::new(Channel::Text, slot)));
        let style = &text.style;
        operation.push("text", vec![str_arg(&text.text), text_style(style)]);
        operation.push("rotate", vec![num(style.rotate)]);

        match (text.on_token, text.attach) {
            (true, true) => operation.push(
                "attachTo",
                vec![
                    Arg::Token(TokenRole::Source),
                    attach_options(&text.attach_options),
                ],
            ),
            (true, false) => operation.push(
                "atLocation",
                vec![
                    Arg::Token(TokenRole::Source),
                    object([("cacheLocation", Arg::Bool(true))]),
                ],
            ),
            (false, _) => self.screen_space(&mut operation, text.x, text.y),
        }

        operation.push("duration", vec![int(text.duration)]);
        operation.push("delay", vec![int(text.delay)]);
        operation.push("zIndex", vec![Arg::Int(TEXT_Z_INDEX)]);

        // Zero-delta tweens are still emitted so output stays uniform.
        let base = base_offset(text.on_token, text.x, text.y);
        for (axis, from, delta) in [
            ("position.x", base.x, style.move_x_by),
            ("position.y", base.y, style.move_y_by),
        ] {
            operation.push(
                "animateProperty",
                vec![
                    str_arg("sprite"),
                    str_arg(axis),
                    object([
                        ("from", num(from)),
                        ("to", num(from + delta)),
                        ("duration", int(style.movement_duration)),
                        ("ease", str_arg(style.movement_ease.as_str())),
                    ]),
                ],
            );
        }
        for (axis, to) in [("scale.x", style.scale_x_to), ("scale.y", style.scale_y_to)] {
            operation.push(
                "animateProperty",
                vec![
                    str_arg("sprite"),
                    str_arg(axis),
                    object([
                        ("from", num(1.0)),
                        ("to", num(to)),
                        ("duration", int(style.scale_duration)),
                        ("ease", str_arg(style.scale_ease.as_str())),
                    ]),
                ],
            );
        }

        if text.persist {
            operation.push("persist", Vec::new());
        }
        operation
    }

    fn lower_sound(&self, slot: usize, sound: &SoundSlot) -> Operation {
        let mut operation =
            Operation::new(SectionKind::Sound, Origin::Slot(BarRef::new(Channel::Sound, slot)));
        operation.push("file", vec![str_arg(&sound.file)]);
        operation.push("delay", vec![int(sound.delay)]);
        operation.push("fadeInAudio", vec![int(sound.fade_in)]);
        operation.push("fadeOutAudio", vec![int(sound.fade_out)]);
        operation.push("volume", vec![num(sound.volume)]);
        if sound.duration > 0 {
            operation.push("duration", vec![int(sound.duration)]);
        }
        if sound.time_start > 0 {
            operation.push("startTime", vec![int(sound.time_start)]);
        }
        if sound.time_end > 0 {
            let end_time = if self.options.end_time_includes_start {
                sound.time_end.saturating_add(sound.time_start)
            } else {
                sound.time_end
            };
            operation.push("endTime", vec![int(end_time)]);
        }
        operation
    }

    fn lower_audio_bed(bed: &AudioBed) -> Operation {
        let mut operation = Operation::new(SectionKind::Sound, Origin::AudioBed);
        operation.push("file", vec![str_arg(&bed.file)]);
        operation.push("delay", vec![int(bed.delay)]);
        operation.push("fadeInAudio", vec![int(bed.fade_in)]);
        operation.push("fadeOutAudio", vec![int(bed.fade_out)]);
        operation.push("volume", vec![num(bed.volume)]);
        operation
    }
}

fn base_offset(on_token: bool, x: i64, y: i64) -> Offset {
    if on_token {
        Offset::default()
    } else {
        Offset {
            x: x as f64,
            y: y as f64,
        }
    }
}

fn tween(
    from: f64,
    to: f64,
    duration: u64,
    delay: u64,
    ease: Ease,
    from_end: bool,
    extra: &[(&str, Arg)],
) -> Arg {
    let mut fields = vec![
        ("from".to_string(), num(from)),
        ("to".to_string(), num(to)),
        ("duration".to_string(), int(duration)),
        ("delay".to_string(), int(delay)),
        ("ease".to_string(), str_arg(ease.as_str())),
        ("fromEnd".to_string(), Arg::Bool(from_end)),
    ];
    fields.extend(
        extra
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone())),
    );
    Arg::Object(fields)
}

fn attach_options(options: &AttachOptions) -> Arg {
    object([
        ("align", str_arg(options.align.as_str())),
        ("edge", str_arg(options.edge.as_str())),
        ("bindVisibility", Arg::Bool(options.bind_visibility)),
        ("bindAlpha", Arg::Bool(options.bind_alpha)),
        ("bindRotation", Arg::Bool(options.bind_rotation)),
        ("randomOffset", num(options.random_offset)),
        (
            "offset",
            object([("x", num(options.offset.x)), ("y", num(options.offset.y))]),
        ),
    ])
}

fn text_style(style: &TextStyle) -> Arg {
    object([
        ("fontFamily", str_arg(&style.font_family)),
        ("fontSize", num(style.font_size)),
        ("fill", str_arg(&style.fill)),
        ("stroke", str_arg(&style.stroke)),
        ("strokeThickness", num(style.stroke_thickness)),
        ("dropShadow", Arg::Bool(style.drop_shadow)),
        ("dropShadowColor", str_arg(&style.drop_shadow_color)),
        ("dropShadowBlur", num(style.drop_shadow_blur)),
        ("dropShadowAngle", num(style.drop_shadow_angle)),
        ("dropShadowDistance", num(style.drop_shadow_distance)),
        ("wordWrap", Arg::Bool(style.word_wrap)),
        ("wordWrapWidth", num(style.word_wrap_width)),
        ("align", str_arg(style.align.as_str())),
    ])
}

/// Latest end time among active elements, ignoring unprobed sound lengths.
#[must_use]
pub fn sequence_span(composition: &Composition) -> u64 {
    active_elements(composition)
        .into_iter()
        .map(|element| match element {
            Element::Image(_, image) => image.end_time(),
            Element::Text(_, text) => text.end_time(),
            Element::Sound(_, sound) => sound.logical_start().saturating_add(sound.duration),
        })
        .max()
        .unwrap_or(0)
}

/// Lowers the whole composition. Elements are ordered by start time; ties
/// keep declaration order.
#[instrument(skip(composition))]
#[must_use]
pub fn compile(
    composition: &Composition,
    anchors: AnchorAvailability,
    options: CompileOptions,
) -> OperationChain {
    let mut lowering = Lowering {
        style: &composition.style,
        anchors,
        options,
        warnings: Vec::new(),
    };

    let mut operations = Vec::new();
    if options.include_background {
        operations.push(lowering.lower_background(&composition.rect, sequence_span(composition)));
    }

    let mut elements = active_elements(composition);
    elements.sort_by_key(Element::start_time);
    operations.extend(elements.into_iter().map(|element| lowering.lower(element)));

    if options.include_audio_bed {
        if let Some(bed) = composition.audio_bed.as_ref().filter(|bed| !bed.file.is_empty()) {
            operations.push(Lowering::lower_audio_bed(bed));
        }
    }

    for warning in &lowering.warnings {
        warn!(%warning, "lowering warning");
    }
    debug!(operations = operations.len(), "composition lowered");
    OperationChain {
        operations,
        warnings: lowering.warnings,
    }
}

/// Lowers one slot for preview. Returns `None` when the slot is empty or
/// out of range.
#[must_use]
pub fn compile_slot(
    composition: &Composition,
    bar: BarRef,
    anchors: AnchorAvailability,
) -> Option<OperationChain> {
    let tables = &composition.tables;
    let element = match bar.channel {
        Channel::Image => tables
            .images
            .get(bar.slot)
            .filter(|slot| slot.is_active())
            .map(|slot| Element::Image(bar.slot, slot)),
        Channel::Text => tables
            .texts
            .get(bar.slot)
            .filter(|slot| slot.is_active())
            .map(|slot| Element::Text(bar.slot, slot)),
        Channel::Sound => tables
            .sounds
            .get(bar.slot)
            .filter(|slot| slot.is_active())
            .map(|slot| Element::Sound(bar.slot, slot)),
    }?;

    let mut lowering = Lowering {
        style: &composition.style,
        anchors,
        options: CompileOptions::single_slot(),
        warnings: Vec::new(),
    };
    let operation = lowering.lower(element);
    Some(OperationChain {
        operations: vec![operation],
        warnings: lowering.warnings,
    })
}

/// Prints the chain as macro source.
#[must_use]
pub fn render_literal(chain: &OperationChain) -> String {
    let mut out = String::new();
    if chain.uses(TokenRole::Source) {
        out.push_str("const token = canvas.tokens.controlled[0];\n");
        out.push_str(
            "if (!token) { ui.notifications.warn(\"Select a token first.\"); return; }\n",
        );
    }
    if chain.uses(TokenRole::Target) {
        out.push_str("const target = Array.from(game.user.targets)[0];\n");
        out.push_str("if (!target) { ui.notifications.warn(\"Target a token first.\"); return; }\n");
    }
    if !out.is_empty() {
        out.push('\n');
    }

    out.push_str("new Sequence()\n");
    for operation in &chain.operations {
        let _ = writeln!(out, "{INDENT}.{}()", operation.kind.verb());
        for call in &operation.calls {
            out.push_str(INDENT);
            out.push_str(INDENT);
            out.push('.');
            out.push_str(&call.verb);
            out.push('(');
            for (index, arg) in call.args.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                arg.write_literal(&mut out);
            }
            out.push_str(")\n");
        }
    }
    let _ = writeln!(out, "{INDENT}.play();");
    out
}

/// Replays the chain against a live sequencer and starts playback.
///
/// Token and target references are resolved for the whole chain first, so
/// a missing anchor fails before the sequencer sees any call.
pub fn invoke_live<A: SequencerApi>(
    chain: &OperationChain,
    scene: &dyn Scene,
    api: &mut A,
) -> Result<A::Handle, SessionError> {
    let resolved = chain
        .operations
        .iter()
        .map(|operation| {
            let calls = operation
                .calls
                .iter()
                .map(|call| {
                    let args = call
                        .args
                        .iter()
                        .map(|arg| arg.to_live(scene))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok((call.verb.as_str(), args))
                })
                .collect::<Result<Vec<_>, SessionError>>()?;
            Ok((operation.kind, calls))
        })
        .collect::<Result<Vec<_>, SessionError>>()?;

    for (kind, calls) in resolved {
        api.begin(kind)?;
        for (verb, args) in calls {
            api.call(verb, &args)?;
        }
    }
    Ok(api.play()?)
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}
