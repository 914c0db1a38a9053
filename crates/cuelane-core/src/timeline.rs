//! Timeline geometry.
//!
//! Everything here is a pure function of slot records and plain numbers; the
//! stateful interaction layer lives in [`crate::session`].

use std::{cmp::Reverse, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use crate::model::{Channel, ChannelTables, TEXT_Z_INDEX, to_signed};

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 3.0;
pub const DEFAULT_SCALE: f64 = 1.0;
pub const ZOOM_STEP: f64 = 0.1;
/// Milliseconds covered by one pixel at scale 1.
pub const MS_PER_PX: f64 = 10.0;
pub const DEFAULT_SNAP_MS: u64 = 10;
pub const DEFAULT_MIN_WIDTH_PX: f64 = 800.0;
pub const DEFAULT_FALLBACK_SOUND_DURATION_MS: u64 = 3_000;
pub const DEFAULT_ROW_HEIGHT_PX: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetrics {
    pub snap_ms: u64,
    pub fallback_sound_duration_ms: u64,
    pub min_width_px: f64,
    pub row_height_px: f64,
}

impl Default for TimelineMetrics {
    fn default() -> Self {
        Self {
            snap_ms: DEFAULT_SNAP_MS,
            fallback_sound_duration_ms: DEFAULT_FALLBACK_SOUND_DURATION_MS,
            min_width_px: DEFAULT_MIN_WIDTH_PX,
            row_height_px: DEFAULT_ROW_HEIGHT_PX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BarRef {
    pub channel: Channel,
    pub slot: usize,
}

impl BarRef {
    #[must_use]
    pub fn new(channel: Channel, slot: usize) -> Self {
        Self { channel, slot }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Builds a normalized rectangle from two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }

    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarLayout {
    pub bar: BarRef,
    pub lane_label: String,
    /// Left edge in timeline milliseconds; negative when a sound's trimmed
    /// head starts before zero.
    pub start_ms: i64,
    pub duration_ms: u64,
    pub left: f64,
    pub width: f64,
    pub top: f64,
    pub height: f64,
    pub fade_in_pct: f64,
    pub fade_out_pct: f64,
    pub hatch_start: f64,
    pub hatch_end: f64,
    pub z_index: Option<i64>,
}

impl BarLayout {
    #[must_use]
    pub fn end_ms(&self) -> i64 {
        self.start_ms.saturating_add(to_signed(self.duration_ms))
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect {
            x: self.left,
            y: self.top,
            width: self.width,
            height: self.height,
        }
    }

    /// Position of `x_px` along the bar, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn fraction_at(&self, x_px: f64) -> f64 {
        if self.width <= 0.0 {
            return 0.0;
        }
        ((x_px - self.left) / self.width).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineLayout {
    pub scale: f64,
    pub base_width: f64,
    pub bars: Vec<BarLayout>,
}

impl TimelineLayout {
    #[must_use]
    pub fn scaled_width(&self) -> f64 {
        self.base_width * self.scale
    }

    #[must_use]
    pub fn bar(&self, bar: BarRef) -> Option<&BarLayout> {
        self.bars.iter().find(|layout| layout.bar == bar)
    }

    /// Topmost bar under the point, if any.
    #[must_use]
    pub fn hit_test(&self, x: f64, y: f64) -> Option<BarRef> {
        self.bars
            .iter()
            .rev()
            .find(|layout| layout.bounds().contains(x, y))
            .map(|layout| layout.bar)
    }

    #[must_use]
    pub fn bars_in(&self, marquee: &Rect) -> Vec<BarRef> {
        self.bars
            .iter()
            .filter(|layout| layout.bounds().intersects(marquee))
            .map(|layout| layout.bar)
            .collect()
    }

    /// Image bars in rendered (descending z-index) order.
    #[must_use]
    pub fn image_order(&self) -> Vec<usize> {
        self.bars
            .iter()
            .filter(|layout| layout.bar.channel == Channel::Image)
            .map(|layout| layout.bar.slot)
            .collect()
    }
}

#[must_use]
pub fn time_to_px(time_ms: f64, scale: f64) -> f64 {
    time_ms / MS_PER_PX * scale
}

#[must_use]
pub fn px_to_time(px: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    px * MS_PER_PX / scale
}

#[must_use]
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return DEFAULT_SCALE;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Rounds a time to the nearest multiple of `grid_ms`.
#[must_use]
pub fn snap(time_ms: f64, grid_ms: u64) -> i64 {
    if grid_ms == 0 {
        return time_ms.round() as i64;
    }
    let grid = grid_ms as f64;
    ((time_ms / grid).round() * grid) as i64
}

#[must_use]
pub fn fade_percent(fade_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    (fade_ms as f64 / duration_ms as f64 * 100.0).clamp(0.0, 100.0)
}

/// Lays out every active slot. Unprobed sounds use the fallback duration.
#[must_use]
pub fn layout(
    tables: &ChannelTables,
    resolved_durations: &BTreeMap<String, u64>,
    scale: f64,
    metrics: &TimelineMetrics,
) -> TimelineLayout {
    let scale = clamp_scale(scale);
    let mut rows: Vec<(BarRef, i64, u64, u64, u64, u64, u64, Option<i64>)> = Vec::new();

    let mut images: Vec<(usize, i64)> = tables
        .images
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_active())
        .map(|(index, slot)| (index, slot.z_index))
        .collect();
    images.sort_by_key(|(_, z_index)| Reverse(*z_index));
    for (index, _) in images {
        let slot = &tables.images[index];
        rows.push((
            BarRef::new(Channel::Image, index),
            to_signed(slot.delay),
            slot.duration,
            slot.fade_in_duration,
            slot.fade_out_duration,
            0,
            0,
            Some(slot.z_index),
        ));
    }

    for (index, slot) in tables.texts.iter().enumerate() {
        if !slot.is_active() {
            continue;
        }
        rows.push((
            BarRef::new(Channel::Text, index),
            to_signed(slot.delay),
            slot.duration,
            0,
            0,
            0,
            0,
            Some(TEXT_Z_INDEX),
        ));
    }

    for (index, slot) in tables.sounds.iter().enumerate() {
        if !slot.is_active() {
            continue;
        }
        let duration = slot.effective_duration(
            resolved_durations.get(&slot.file).copied(),
            metrics.fallback_sound_duration_ms,
        );
        rows.push((
            BarRef::new(Channel::Sound, index),
            slot.visual_start(),
            duration,
            slot.fade_in,
            slot.fade_out,
            slot.time_start,
            slot.time_end,
            None,
        ));
    }

    let mut max_end = 0_i64;
    let bars: Vec<BarLayout> = rows
        .into_iter()
        .enumerate()
        .map(
            |(row, (bar, start_ms, duration_ms, fade_in, fade_out, head, tail, z_index))| {
                let layout = BarLayout {
                    bar,
                    lane_label: format!("{} {}", bar.channel.label(), bar.slot + 1),
                    start_ms,
                    duration_ms,
                    left: time_to_px(start_ms as f64, scale),
                    width: time_to_px(duration_ms as f64, scale),
                    top: row as f64 * metrics.row_height_px,
                    height: metrics.row_height_px,
                    fade_in_pct: fade_percent(fade_in, duration_ms),
                    fade_out_pct: fade_percent(fade_out, duration_ms),
                    hatch_start: time_to_px(head as f64, scale),
                    hatch_end: time_to_px(tail as f64, scale),
                    z_index,
                };
                max_end = max_end.max(layout.end_ms());
                layout
            },
        )
        .collect();

    TimelineLayout {
        scale,
        base_width: metrics.min_width_px.max(max_end as f64 / MS_PER_PX),
        bars,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomOutcome {
    pub scale: f64,
    pub scroll_left: f64,
}

/// Applies one wheel notch; the time under `cursor_x` stays under it.
#[must_use]
pub fn zoom_at(scale: f64, wheel_delta_y: f64, cursor_x: f64, scroll_left: f64) -> ZoomOutcome {
    let current = clamp_scale(scale);
    let direction = if wheel_delta_y > 0.0 {
        -1.0
    } else if wheel_delta_y < 0.0 {
        1.0
    } else {
        0.0
    };
    let next = clamp_scale(((current + direction * ZOOM_STEP) * 100.0).round() / 100.0);

    let anchor_ms = px_to_time(scroll_left + cursor_x, current);
    let scroll_left = (time_to_px(anchor_ms, next) - cursor_x).max(0.0);

    ZoomOutcome {
        scale: next,
        scroll_left,
    }
}

/// Snapped start time after moving a bar that started at `origin_start_ms`.
#[must_use]
pub fn moved_start(origin_start_ms: i64, delta_px: f64, scale: f64, snap_ms: u64) -> i64 {
    snap(
        origin_start_ms as f64 + px_to_time(delta_px, scale),
        snap_ms,
    )
}

/// Duration after dragging the right edge by `delta_px`. Never shorter than
/// one grid step.
#[must_use]
pub fn resized_duration(
    origin_start_ms: i64,
    origin_width_px: f64,
    delta_px: f64,
    scale: f64,
    snap_ms: u64,
) -> u64 {
    let right_px = time_to_px(origin_start_ms as f64, scale) + origin_width_px + delta_px;
    let right_ms = snap(px_to_time(right_px, scale), snap_ms);
    let duration = right_ms.saturating_sub(origin_start_ms);
    u64::try_from(duration).unwrap_or(0).max(snap_ms.max(1))
}

/// Offset into a clip for a fractional click position, on the snap grid.
#[must_use]
pub fn split_point(duration_ms: u64, fraction: f64, snap_ms: u64) -> u64 {
    let raw = duration_ms as f64 * fraction.clamp(0.0, 1.0);
    u64::try_from(snap(raw, snap_ms)).unwrap_or(0).min(duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageSlot, SoundSlot, TextSlot};

    fn tables_with_sound(sound: SoundSlot) -> ChannelTables {
        let mut tables = ChannelTables::new(3);
        tables.sounds[0] = sound;
        tables
    }

    #[test]
    fn sound_bar_starts_at_trimmed_head() {
        let tables = tables_with_sound(SoundSlot {
            file: "audio/hit.ogg".to_string(),
            delay: 1_000,
            time_start: 200,
            time_end: 300,
            duration: 0,
            ..SoundSlot::default()
        });
        let durations = BTreeMap::from([("audio/hit.ogg".to_string(), 2_000)]);

        let layout = layout(&tables, &durations, 1.0, &TimelineMetrics::default());
        let bar = layout
            .bar(BarRef::new(Channel::Sound, 0))
            .expect("sound bar should be laid out");

        assert_eq!(bar.duration_ms, 2_000);
        assert!((bar.left - 80.0).abs() < 1e-9);
        assert!((bar.width - 200.0).abs() < 1e-9);
        assert!((bar.hatch_start - 20.0).abs() < 1e-9);
        assert!((bar.hatch_end - 30.0).abs() < 1e-9);
    }

    #[test]
    fn unresolved_sound_uses_fallback() {
        let tables = tables_with_sound(SoundSlot {
            file: "audio/unknown.mp3".to_string(),
            ..SoundSlot::default()
        });
        let layout = layout(&tables, &BTreeMap::new(), 2.0, &TimelineMetrics::default());
        assert!((layout.bars[0].width - 600.0).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_has_zero_fade_percentage() {
        assert!(fade_percent(500, 0).abs() < f64::EPSILON);
        assert!((fade_percent(500, 2_000) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn width_has_floor_and_grows_with_content() {
        let mut tables = ChannelTables::new(2);
        let metrics = TimelineMetrics::default();
        assert!((layout(&tables, &BTreeMap::new(), 1.0, &metrics).base_width - 800.0).abs() < 1e-9);

        tables.texts[1] = TextSlot {
            text: "Long".to_string(),
            delay: 9_000,
            duration: 3_000,
            ..TextSlot::default()
        };
        let wide = layout(&tables, &BTreeMap::new(), 2.0, &metrics);
        assert!((wide.base_width - 1_200.0).abs() < 1e-9);
        assert!((wide.scaled_width() - 2_400.0).abs() < 1e-9);
    }

    #[test]
    fn images_render_by_descending_z_index_with_stable_ties() {
        let mut tables = ChannelTables::new(4);
        for (index, z_index) in [(0, 2), (1, 5), (2, 2), (3, 1)] {
            tables.images[index] = ImageSlot {
                file: format!("img/{index}.png"),
                z_index,
                ..ImageSlot::default()
            };
        }
        let layout = layout(&tables, &BTreeMap::new(), 1.0, &TimelineMetrics::default());
        assert_eq!(layout.image_order(), vec![1, 0, 2, 3]);
    }

    #[test]
    fn zoom_keeps_cursor_time_fixed() {
        let scale = 1.0;
        let scroll_left = 300.0;
        let cursor_x = 120.0;
        let anchor_ms = px_to_time(scroll_left + cursor_x, scale);

        let zoomed = zoom_at(scale, -1.0, cursor_x, scroll_left);
        assert!((zoomed.scale - 1.1).abs() < 1e-9);
        let anchor_after = px_to_time(zoomed.scroll_left + cursor_x, zoomed.scale);
        assert!((anchor_after - anchor_ms).abs() < 1e-6);
    }

    #[test]
    fn zoom_is_clamped() {
        assert!((zoom_at(MAX_SCALE, -1.0, 0.0, 0.0).scale - MAX_SCALE).abs() < f64::EPSILON);
        assert!((zoom_at(MIN_SCALE, 1.0, 0.0, 0.0).scale - MIN_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn move_and_resize_snap_to_grid() {
        assert_eq!(moved_start(1_000, 12.3, 1.0, 10), 1_120);
        assert_eq!(moved_start(1_000, -4.0, 2.0, 10), 980);
        assert_eq!(resized_duration(1_000, 100.0, 27.0, 1.0, 10), 1_270);
        assert_eq!(resized_duration(1_000, 100.0, -500.0, 1.0, 10), 10);
    }

    #[test]
    fn marquee_selects_intersecting_bars() {
        let mut tables = ChannelTables::new(2);
        tables.texts[0].text = "A".to_string();
        tables.texts[1] = TextSlot {
            text: "B".to_string(),
            delay: 5_000,
            ..TextSlot::default()
        };
        let layout = layout(&tables, &BTreeMap::new(), 1.0, &TimelineMetrics::default());

        let marquee = Rect::from_corners((450.0, 60.0), (10.0, 0.0));
        assert_eq!(layout.bars_in(&marquee), vec![BarRef::new(Channel::Text, 0)]);
        assert_eq!(layout.hit_test(510.0, 30.0), Some(BarRef::new(Channel::Text, 1)));
    }
}
