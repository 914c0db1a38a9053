//! Per-image animation lists.
//!
//! Each list is ordered and keeps disabled entries in place, so the index of
//! an entry only changes through an explicit insert or remove.

use serde::{Deserialize, Serialize};

use crate::model::{Ease, Offset};

pub const DEFAULT_STEP_DURATION_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Position,
    Rotation,
    Scale,
    Alpha,
    Blur,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationStep<P> {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_step_duration")]
    pub duration: u64,
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub ease: Ease,
    #[serde(default)]
    pub from_end: bool,
    #[serde(flatten)]
    pub params: P,
}

impl<P: Default> Default for AnimationStep<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P> AnimationStep<P> {
    #[must_use]
    pub fn new(params: P) -> Self {
        Self {
            enabled: true,
            duration: DEFAULT_STEP_DURATION_MS,
            delay: 0,
            ease: Ease::Linear,
            from_end: false,
            params,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, duration: u64, delay: u64, ease: Ease) -> Self {
        self.duration = duration;
        self.delay = delay;
        self.ease = ease;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Offset applied on top of the previous resolved endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionParams {
    pub move_to_x: f64,
    pub move_to_y: f64,
    pub grid_units: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationParams {
    pub from: f64,
    pub to: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleParams {
    pub from: f64,
    pub to: f64,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self { from: 1.0, to: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaParams {
    pub from: f64,
    pub to: f64,
}

impl Default for AlphaParams {
    fn default() -> Self {
        Self { from: 0.0, to: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurParams {
    pub from: f64,
    pub to: f64,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self { from: 0.0, to: 8.0 }
    }
}

pub type PositionStep = AnimationStep<PositionParams>;
pub type RotationStep = AnimationStep<RotationParams>;
pub type ScaleStep = AnimationStep<ScaleParams>;
pub type AlphaStep = AnimationStep<AlphaParams>;
pub type BlurStep = AnimationStep<BlurParams>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveStep {
    Position(PositionStep),
    Rotation(RotationStep),
    Scale(ScaleStep),
    Alpha(AlphaStep),
    Blur(BlurStep),
}

impl CurveStep {
    #[must_use]
    pub fn kind(&self) -> CurveKind {
        match self {
            Self::Position(_) => CurveKind::Position,
            Self::Rotation(_) => CurveKind::Rotation,
            Self::Scale(_) => CurveKind::Scale,
            Self::Alpha(_) => CurveKind::Alpha,
            Self::Blur(_) => CurveKind::Blur,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationCurves {
    pub position: Vec<PositionStep>,
    pub rotation: Vec<RotationStep>,
    pub scale: Vec<ScaleStep>,
    pub alpha: Vec<AlphaStep>,
    pub blur: Vec<BlurStep>,
}

trait StepList {
    fn len(&self) -> usize;
    fn remove_at(&mut self, index: usize) -> bool;
    fn set_enabled_at(&mut self, index: usize, enabled: bool) -> bool;
    fn enabled_count(&self) -> usize;
}

impl<P> StepList for Vec<AnimationStep<P>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn remove_at(&mut self, index: usize) -> bool {
        if index >= Vec::len(self) {
            return false;
        }
        self.remove(index);
        true
    }

    fn set_enabled_at(&mut self, index: usize, enabled: bool) -> bool {
        match self.get_mut(index) {
            Some(step) => {
                step.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn enabled_count(&self) -> usize {
        self.iter().filter(|step| step.enabled).count()
    }
}

impl AnimationCurves {
    fn list(&self, kind: CurveKind) -> &dyn StepList {
        match kind {
            CurveKind::Position => &self.position,
            CurveKind::Rotation => &self.rotation,
            CurveKind::Scale => &self.scale,
            CurveKind::Alpha => &self.alpha,
            CurveKind::Blur => &self.blur,
        }
    }

    fn list_mut(&mut self, kind: CurveKind) -> &mut dyn StepList {
        match kind {
            CurveKind::Position => &mut self.position,
            CurveKind::Rotation => &mut self.rotation,
            CurveKind::Scale => &mut self.scale,
            CurveKind::Alpha => &mut self.alpha,
            CurveKind::Blur => &mut self.blur,
        }
    }

    #[must_use]
    pub fn len(&self, kind: CurveKind) -> usize {
        self.list(kind).len()
    }

    #[must_use]
    pub fn enabled_count(&self, kind: CurveKind) -> usize {
        self.list(kind).enabled_count()
    }

    pub fn push(&mut self, step: CurveStep) {
        match step {
            CurveStep::Position(step) => self.position.push(step),
            CurveStep::Rotation(step) => self.rotation.push(step),
            CurveStep::Scale(step) => self.scale.push(step),
            CurveStep::Alpha(step) => self.alpha.push(step),
            CurveStep::Blur(step) => self.blur.push(step),
        }
    }

    /// Inserts before `index`; an index past the end appends.
    pub fn insert(&mut self, index: usize, step: CurveStep) {
        fn insert_clamped<T>(list: &mut Vec<T>, index: usize, value: T) {
            let index = index.min(list.len());
            list.insert(index, value);
        }

        match step {
            CurveStep::Position(step) => insert_clamped(&mut self.position, index, step),
            CurveStep::Rotation(step) => insert_clamped(&mut self.rotation, index, step),
            CurveStep::Scale(step) => insert_clamped(&mut self.scale, index, step),
            CurveStep::Alpha(step) => insert_clamped(&mut self.alpha, index, step),
            CurveStep::Blur(step) => insert_clamped(&mut self.blur, index, step),
        }
    }

    pub fn remove(&mut self, kind: CurveKind, index: usize) -> bool {
        self.list_mut(kind).remove_at(index)
    }

    pub fn set_enabled(&mut self, kind: CurveKind, index: usize, enabled: bool) -> bool {
        self.list_mut(kind).set_enabled_at(index, enabled)
    }

    #[must_use]
    pub fn has_animated_blur(&self) -> bool {
        self.blur.iter().any(|step| step.enabled)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
            && self.rotation.is_empty()
            && self.scale.is_empty()
            && self.alpha.is_empty()
            && self.blur.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub from: Offset,
    pub to: Offset,
}

/// Resolves enabled position steps into absolute waypoints, each starting
/// where the previous one ended.
#[must_use]
pub fn resolve_position_waypoints(
    base: Offset,
    steps: &[PositionStep],
) -> Vec<(&PositionStep, Waypoint)> {
    let mut cursor = base;
    steps
        .iter()
        .filter(|step| step.enabled)
        .map(|step| {
            let to = Offset {
                x: cursor.x + step.params.move_to_x,
                y: cursor.y + step.params.move_to_y,
            };
            let waypoint = Waypoint { from: cursor, to };
            cursor = to;
            (step, waypoint)
        })
        .collect()
}

const fn default_enabled() -> bool {
    true
}

const fn default_step_duration() -> u64 {
    DEFAULT_STEP_DURATION_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(x: f64, y: f64) -> PositionStep {
        AnimationStep::new(PositionParams {
            move_to_x: x,
            move_to_y: y,
            grid_units: false,
        })
    }

    #[test]
    fn position_steps_chain_from_previous_endpoint() {
        let steps = vec![position(10.0, 0.0), position(-5.0, 0.0)];
        let waypoints = resolve_position_waypoints(Offset { x: 100.0, y: 50.0 }, &steps);

        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].1.from, Offset { x: 100.0, y: 50.0 });
        assert_eq!(waypoints[0].1.to, Offset { x: 110.0, y: 50.0 });
        assert_eq!(waypoints[1].1.from, Offset { x: 110.0, y: 50.0 });
        assert_eq!(waypoints[1].1.to, Offset { x: 105.0, y: 50.0 });
    }

    #[test]
    fn disabled_position_steps_do_not_move_the_cursor() {
        let steps = vec![
            position(10.0, 0.0),
            position(1_000.0, 1_000.0).disabled(),
            position(0.0, 5.0),
        ];
        let waypoints = resolve_position_waypoints(Offset::default(), &steps);

        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[1].1.to, Offset { x: 10.0, y: 5.0 });
    }

    #[test]
    fn removing_an_entry_keeps_disabled_flags_on_shifted_entries() {
        let mut curves = AnimationCurves::default();
        curves.push(CurveStep::Alpha(AnimationStep::default()));
        curves.push(CurveStep::Alpha(AnimationStep::<AlphaParams>::default().disabled()));
        curves.push(CurveStep::Alpha(AnimationStep::default()));

        assert!(curves.remove(CurveKind::Alpha, 0));
        assert_eq!(curves.len(CurveKind::Alpha), 2);
        assert!(!curves.alpha[0].enabled);
        assert!(curves.alpha[1].enabled);
        assert!(!curves.remove(CurveKind::Alpha, 7));
    }

    #[test]
    fn rotation_loop_flag_uses_wire_name() {
        let step = AnimationStep::new(RotationParams {
            from: 0.0,
            to: 360.0,
            looping: true,
        });
        let json = serde_json::to_value(&step).expect("step should serialize");
        assert_eq!(json["loop"], serde_json::Value::Bool(true));
        assert_eq!(json["duration"], serde_json::json!(1_000));
    }
}
