use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::curves::AnimationCurves;

pub const DEFAULT_SLOT_COUNT: usize = 5;
pub const DEFAULT_ELEMENT_DURATION_MS: u64 = 3_000;
pub const DEFAULT_FADE_MS: u64 = 500;
pub const DEFAULT_SOUND_VOLUME: f64 = 0.8;
pub const MIN_Z_INDEX: i64 = 1;
/// Draw priority of every text element; always above image slots.
pub const TEXT_Z_INDEX: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Image,
    Text,
    Sound,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Image, Channel::Text, Channel::Sound];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::Sound => "sound",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Text => "Text",
            Self::Sound => "Sound",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Easing curves understood by the sequencing API, serialized under their API names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ease {
    #[default]
    Linear,
    EaseInSine,
    EaseOutSine,
    EaseInOutSine,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInExpo,
    EaseOutExpo,
    EaseInOutExpo,
    EaseInBack,
    EaseOutBack,
    EaseInOutBack,
    EaseInElastic,
    EaseOutElastic,
    EaseInOutElastic,
    EaseInBounce,
    EaseOutBounce,
    EaseInOutBounce,
}

impl Ease {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseInSine => "easeInSine",
            Self::EaseOutSine => "easeOutSine",
            Self::EaseInOutSine => "easeInOutSine",
            Self::EaseInQuad => "easeInQuad",
            Self::EaseOutQuad => "easeOutQuad",
            Self::EaseInOutQuad => "easeInOutQuad",
            Self::EaseInCubic => "easeInCubic",
            Self::EaseOutCubic => "easeOutCubic",
            Self::EaseInOutCubic => "easeInOutCubic",
            Self::EaseInQuart => "easeInQuart",
            Self::EaseOutQuart => "easeOutQuart",
            Self::EaseInOutQuart => "easeInOutQuart",
            Self::EaseInExpo => "easeInExpo",
            Self::EaseOutExpo => "easeOutExpo",
            Self::EaseInOutExpo => "easeInOutExpo",
            Self::EaseInBack => "easeInBack",
            Self::EaseOutBack => "easeOutBack",
            Self::EaseInOutBack => "easeInOutBack",
            Self::EaseInElastic => "easeInElastic",
            Self::EaseOutElastic => "easeOutElastic",
            Self::EaseInOutElastic => "easeInOutElastic",
            Self::EaseInBounce => "easeInBounce",
            Self::EaseOutBounce => "easeOutBounce",
            Self::EaseInOutBounce => "easeInOutBounce",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    #[default]
    Center,
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Alignment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::TopLeft => "top-left",
            Self::Top => "top",
            Self::TopRight => "top-right",
            Self::Left => "left",
            Self::Right => "right",
            Self::BottomLeft => "bottom-left",
            Self::Bottom => "bottom",
            Self::BottomRight => "bottom-right",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    #[default]
    On,
    Inner,
    Outer,
}

impl Edge {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Inner => "inner",
            Self::Outer => "outer",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

/// Token-follow options; only consulted when the element is attached to a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachOptions {
    pub align: Alignment,
    pub edge: Edge,
    pub bind_visibility: bool,
    pub bind_alpha: bool,
    pub bind_rotation: bool,
    pub random_offset: f64,
    pub offset: Offset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f64,
    pub fill: String,
    pub stroke: String,
    pub stroke_thickness: f64,
    pub drop_shadow: bool,
    pub drop_shadow_color: String,
    pub drop_shadow_blur: f64,
    pub drop_shadow_angle: f64,
    pub drop_shadow_distance: f64,
    pub word_wrap: bool,
    pub word_wrap_width: f64,
    pub align: TextAlign,
    pub rotate: f64,
    pub move_x_by: f64,
    pub move_y_by: f64,
    pub movement_duration: u64,
    pub movement_ease: Ease,
    pub scale_x_to: f64,
    pub scale_y_to: f64,
    pub scale_duration: u64,
    pub scale_ease: Ease,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Signika".to_string(),
            font_size: 48.0,
            fill: "#ffffff".to_string(),
            stroke: "#000000".to_string(),
            stroke_thickness: 4.0,
            drop_shadow: true,
            drop_shadow_color: "#000000".to_string(),
            drop_shadow_blur: 4.0,
            drop_shadow_angle: 0.5,
            drop_shadow_distance: 5.0,
            word_wrap: false,
            word_wrap_width: 600.0,
            align: TextAlign::Center,
            rotate: 0.0,
            move_x_by: 0.0,
            move_y_by: 0.0,
            movement_duration: 1_000,
            movement_ease: Ease::Linear,
            scale_x_to: 1.0,
            scale_y_to: 1.0,
            scale_duration: 1_000,
            scale_ease: Ease::Linear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSlot {
    pub text: String,
    pub x: i64,
    pub y: i64,
    pub delay: u64,
    pub duration: u64,
    pub on_token: bool,
    pub attach: bool,
    pub persist: bool,
    pub attach_options: AttachOptions,
    pub style: TextStyle,
}

impl Default for TextSlot {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 0,
            y: 0,
            delay: 0,
            duration: DEFAULT_ELEMENT_DURATION_MS,
            on_token: false,
            attach: false,
            persist: false,
            attach_options: AttachOptions::default(),
            style: TextStyle::default(),
        }
    }
}

impl TextSlot {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.text.is_empty()
    }

    #[must_use]
    pub fn end_time(&self) -> u64 {
        self.delay.saturating_add(self.duration)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeOverride {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub grid_units: bool,
}

impl SizeOverride {
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorMatrixFilter {
    pub enabled: bool,
    pub hue: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub saturate: f64,
}

impl Default for ColorMatrixFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            hue: 0.0,
            brightness: 1.0,
            contrast: 1.0,
            saturate: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlowFilter {
    pub enabled: bool,
    pub distance: f64,
    pub outer_strength: f64,
    pub inner_strength: f64,
    pub color: String,
    pub quality: f64,
    pub knockout: bool,
}

impl Default for GlowFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            distance: 10.0,
            outer_strength: 4.0,
            inner_strength: 0.0,
            color: "#ffffff".to_string(),
            quality: 0.1,
            knockout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurFilter {
    pub enabled: bool,
    pub strength: f64,
    pub blur: f64,
    pub blur_x: f64,
    pub blur_y: f64,
    pub quality: u32,
    pub resolution: f64,
    pub kernel_size: u32,
}

impl Default for BlurFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 8.0,
            blur: 2.0,
            blur_x: 2.0,
            blur_y: 2.0,
            quality: 4,
            resolution: 1.0,
            kernel_size: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFilters {
    pub color_matrix: ColorMatrixFilter,
    pub glow: GlowFilter,
    pub blur: BlurFilter,
}

/// Stretch-to-target settings. Older records stored a bare bool, which still loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StretchToTarget {
    pub enabled: bool,
    pub tiling: bool,
}

impl<'de> Deserialize<'de> for StretchToTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Full {
                #[serde(default)]
                enabled: bool,
                #[serde(default)]
                tiling: bool,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(enabled) => Self {
                enabled,
                tiling: false,
            },
            Repr::Full { enabled, tiling } => Self { enabled, tiling },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSlot {
    pub file: String,
    pub x: i64,
    pub y: i64,
    pub scale: f64,
    pub opacity: f64,
    pub duration: u64,
    pub delay: u64,
    pub z_index: i64,
    pub fade_in_duration: u64,
    pub fade_out_duration: u64,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub on_token: bool,
    pub size: SizeOverride,
    pub filters: ImageFilters,
    pub animations: AnimationCurves,
    pub persist: bool,
    pub attach_to_source: bool,
    pub stretch_to_target: StretchToTarget,
    pub below_token: bool,
    pub attach_options: AttachOptions,
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self {
            file: String::new(),
            x: 0,
            y: 0,
            scale: 1.0,
            opacity: 1.0,
            duration: DEFAULT_ELEMENT_DURATION_MS,
            delay: 0,
            z_index: MIN_Z_INDEX,
            fade_in_duration: DEFAULT_FADE_MS,
            fade_out_duration: DEFAULT_FADE_MS,
            mirror_x: false,
            mirror_y: false,
            on_token: false,
            size: SizeOverride::default(),
            filters: ImageFilters::default(),
            animations: AnimationCurves::default(),
            persist: false,
            attach_to_source: false,
            stretch_to_target: StretchToTarget::default(),
            below_token: false,
            attach_options: AttachOptions::default(),
        }
    }
}

impl ImageSlot {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.file.is_empty()
    }

    #[must_use]
    pub fn end_time(&self) -> u64 {
        self.delay.saturating_add(self.duration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSlot {
    pub file: String,
    pub delay: u64,
    /// Zero means "use the clip's own length".
    pub duration: u64,
    pub fade_in: u64,
    pub fade_out: u64,
    pub time_start: u64,
    pub time_end: u64,
    pub volume: f64,
}

impl Default for SoundSlot {
    fn default() -> Self {
        Self {
            file: String::new(),
            delay: 0,
            duration: 0,
            fade_in: 0,
            fade_out: 0,
            time_start: 0,
            time_end: 0,
            volume: DEFAULT_SOUND_VOLUME,
        }
    }
}

impl SoundSlot {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.file.is_empty()
    }

    /// Duration used for layout: explicit, then probed, then the fallback.
    #[must_use]
    pub fn effective_duration(&self, resolved: Option<u64>, fallback: u64) -> u64 {
        if self.duration > 0 {
            return self.duration;
        }
        match resolved {
            Some(resolved) if resolved > 0 => resolved,
            _ => fallback,
        }
    }

    /// Timeline start of the visible bar, which includes the trimmed head.
    #[must_use]
    pub fn visual_start(&self) -> i64 {
        to_signed(self.delay) - to_signed(self.time_start)
    }

    /// Point at which audio is actually heard.
    #[must_use]
    pub fn logical_start(&self) -> u64 {
        self.delay.saturating_add(self.time_start)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelTables {
    pub texts: Vec<TextSlot>,
    pub images: Vec<ImageSlot>,
    pub sounds: Vec<SoundSlot>,
}

impl ChannelTables {
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            texts: vec![TextSlot::default(); slot_count],
            images: vec![ImageSlot::default(); slot_count],
            sounds: vec![SoundSlot::default(); slot_count],
        }
    }

    #[must_use]
    pub fn active_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Text => self.texts.iter().filter(|slot| slot.is_active()).count(),
            Channel::Image => self.images.iter().filter(|slot| slot.is_active()).count(),
            Channel::Sound => self.sounds.iter().filter(|slot| slot.is_active()).count(),
        }
    }

    #[must_use]
    pub fn first_empty(&self, channel: Channel) -> Option<usize> {
        match channel {
            Channel::Text => self.texts.iter().position(|slot| !slot.is_active()),
            Channel::Image => self.images.iter().position(|slot| !slot.is_active()),
            Channel::Sound => self.sounds.iter().position(|slot| !slot.is_active()),
        }
    }

    #[must_use]
    pub fn len(&self, channel: Channel) -> usize {
        match channel {
            Channel::Text => self.texts.len(),
            Channel::Image => self.images.len(),
            Channel::Sound => self.sounds.len(),
        }
    }
}

/// Full-screen rectangle drawn underneath every other element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectBackground {
    pub fill_color: String,
    pub fill_alpha: f64,
    pub width: f64,
    pub height: f64,
    pub x: i64,
    pub y: i64,
    pub delay: u64,
    /// Zero spans the whole sequence.
    pub duration: u64,
    pub fade_in: u64,
    pub fade_out: u64,
}

impl Default for RectBackground {
    fn default() -> Self {
        Self {
            fill_color: "#000000".to_string(),
            fill_alpha: 0.5,
            width: 1_920.0,
            height: 1_080.0,
            x: 0,
            y: 0,
            delay: 0,
            duration: 0,
            fade_in: DEFAULT_FADE_MS,
            fade_out: DEFAULT_FADE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalStyle {
    pub default_text_style: TextStyle,
    pub screen_space_above_ui: bool,
}

impl Default for GlobalStyle {
    fn default() -> Self {
        Self {
            default_text_style: TextStyle::default(),
            screen_space_above_ui: true,
        }
    }
}

/// Standalone "splash" track appended to saved macros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioBed {
    pub file: String,
    pub volume: f64,
    pub delay: u64,
    pub fade_in: u64,
    pub fade_out: u64,
}

impl Default for AudioBed {
    fn default() -> Self {
        Self {
            file: String::new(),
            volume: DEFAULT_SOUND_VOLUME,
            delay: 0,
            fade_in: DEFAULT_FADE_MS,
            fade_out: DEFAULT_FADE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub tables: ChannelTables,
    pub rect: RectBackground,
    pub style: GlobalStyle,
    pub audio_bed: Option<AudioBed>,
}

impl Composition {
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            tables: ChannelTables::new(slot_count),
            rect: RectBackground::default(),
            style: GlobalStyle::default(),
            audio_bed: None,
        }
    }
}

pub(crate) fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
