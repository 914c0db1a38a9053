use crate::{
    compiler::StaticScene,
    curves::{
        AlphaParams, AnimationStep, BlurParams, CurveStep, PositionParams, RotationParams,
        ScaleParams,
    },
    model::{AudioBed, Composition, DEFAULT_SLOT_COUNT, Ease, ImageSlot, SoundSlot, TextSlot},
    session::{Session, SessionSettings},
};

pub const DEMO_TOKEN_ID: &str = "token.demo-hero";
pub const DEMO_TARGET_ID: &str = "token.demo-goblin";
pub const DEMO_BOOM_DURATION_MS: u64 = 2_400;

/// Three-channel composition with fixed values, used by the CLI and tests.
#[must_use]
pub fn demo_composition() -> Composition {
    let mut composition = Composition::new(DEFAULT_SLOT_COUNT);
    composition.rect.fill_alpha = 0.4;

    let tables = &mut composition.tables;
    tables.images[0] = ImageSlot {
        file: "cuelane/fx/explosion.webm".to_string(),
        on_token: true,
        duration: 1_500,
        z_index: 2,
        fade_in_duration: 200,
        ..ImageSlot::default()
    };
    let curves = &mut tables.images[0].animations;
    curves.push(CurveStep::Alpha(
        AnimationStep::new(AlphaParams { from: 0.0, to: 1.0 }).with_timing(300, 0, Ease::EaseOutSine),
    ));
    curves.push(CurveStep::Position(AnimationStep::new(PositionParams {
        move_to_x: 10.0,
        move_to_y: 0.0,
        grid_units: false,
    })));
    curves.push(CurveStep::Position(AnimationStep::new(PositionParams {
        move_to_x: -5.0,
        move_to_y: 0.0,
        grid_units: false,
    })));

    tables.images[1] = ImageSlot {
        file: "cuelane/fx/ring.png".to_string(),
        x: 960,
        y: 540,
        delay: 500,
        duration: 2_000,
        ..ImageSlot::default()
    };
    let curves = &mut tables.images[1].animations;
    curves.push(CurveStep::Scale(
        AnimationStep::new(ScaleParams { from: 0.5, to: 1.5 }).with_timing(800, 0, Ease::EaseOutBack),
    ));
    curves.push(CurveStep::Rotation(AnimationStep::new(RotationParams {
        from: 0.0,
        to: 360.0,
        looping: true,
    })));
    curves.push(CurveStep::Blur(
        AnimationStep::new(BlurParams { from: 0.0, to: 6.0 }).with_timing(600, 1_200, Ease::Linear),
    ));

    tables.texts[0] = TextSlot {
        text: "Critical Hit!".to_string(),
        on_token: true,
        delay: 200,
        duration: 2_000,
        ..TextSlot::default()
    };

    tables.sounds[0] = SoundSlot {
        file: "cuelane/sfx/boom.ogg".to_string(),
        fade_out: 300,
        ..SoundSlot::default()
    };
    tables.sounds[1] = SoundSlot {
        file: "cuelane/sfx/ring.wav".to_string(),
        delay: 400,
        duration: 1_800,
        time_start: 200,
        volume: 0.6,
        ..SoundSlot::default()
    };

    composition.audio_bed = Some(AudioBed {
        file: "cuelane/music/bed.ogg".to_string(),
        volume: 0.3,
        ..AudioBed::default()
    });
    composition
}

#[must_use]
pub fn demo_session() -> Session {
    let mut session = Session::with_composition(SessionSettings::default(), demo_composition());
    session.set_resolved_duration("cuelane/sfx/boom.ogg", DEMO_BOOM_DURATION_MS);
    session
}

/// Scene with both a controlled token and a target.
#[must_use]
pub fn demo_scene() -> StaticScene {
    StaticScene {
        token: Some(DEMO_TOKEN_ID.to_string()),
        target: Some(DEMO_TARGET_ID.to_string()),
    }
}
