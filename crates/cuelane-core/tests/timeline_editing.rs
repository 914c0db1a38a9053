use cuelane_core::{
    BarRef, Channel, ContextAction, ImageSlot, Session, SessionError, SessionSettings, SoundSlot,
    TextSlot, fixtures::demo_session, model::Composition,
};

fn sound(slot: usize) -> BarRef {
    BarRef::new(Channel::Sound, slot)
}

fn text(slot: usize) -> BarRef {
    BarRef::new(Channel::Text, slot)
}

fn image(slot: usize) -> BarRef {
    BarRef::new(Channel::Image, slot)
}

fn session_with(build: impl FnOnce(&mut Composition)) -> Session {
    let mut composition = Composition::new(5);
    build(&mut composition);
    Session::with_composition(SessionSettings::default(), composition)
}

#[test]
fn splice_at_quarter_splits_into_contiguous_slots() {
    let mut session = session_with(|composition| {
        composition.tables.sounds[0] = SoundSlot {
            file: "sfx/long.ogg".to_string(),
            delay: 500,
            ..SoundSlot::default()
        };
    });
    session.set_resolved_duration("sfx/long.ogg", 4_000);

    let layout = session.layout();
    let bar = layout.bar(sound(0)).expect("sound bar should exist").clone();
    let click_x = bar.left + bar.width * 0.25;

    let outcome = session
        .context_action(sound(0), ContextAction::Splice, click_x)
        .expect("splice should succeed");
    assert_eq!(outcome.created, Some(sound(1)));

    let sounds = &session.tables().sounds;
    assert_eq!(sounds[0].time_start, 0);
    assert_eq!(sounds[0].time_end, 3_000);
    assert_eq!(sounds[1].time_start, 1_000);
    assert_eq!(sounds[1].delay, 1_500);
    assert_eq!(sounds[0].file, sounds[1].file);
}

#[test]
fn splice_without_free_slot_changes_nothing() {
    let mut session = session_with(|composition| {
        for (index, slot) in composition.tables.sounds.iter_mut().enumerate() {
            slot.file = format!("sfx/{index}.ogg");
        }
    });
    let before = session.tables().clone();

    let error = session
        .splice_sound(0, 0.5)
        .expect_err("every sound slot is taken");
    assert!(matches!(error, SessionError::NoFreeSlot(Channel::Sound)));
    assert_eq!(session.tables(), &before);
}

#[test]
fn start_and_stop_here_trim_the_clip() {
    let mut session = session_with(|composition| {
        composition.tables.sounds[2] = SoundSlot {
            file: "sfx/voice.wav".to_string(),
            duration: 2_000,
            ..SoundSlot::default()
        };
    });

    assert_eq!(session.sound_start_here(2, 0.1).expect("trim start"), 200);
    assert_eq!(session.sound_stop_here(2, 0.75).expect("trim end"), 500);

    let slot = &session.tables().sounds[2];
    assert_eq!(slot.time_start, 200);
    assert_eq!(slot.time_end, 500);
}

#[test]
fn duplicate_places_copy_back_to_back() {
    let mut session = demo_session();
    let outcome = session
        .context_action(text(0), ContextAction::Duplicate, 0.0)
        .expect("duplicate should succeed");
    assert_eq!(outcome.created, Some(text(1)));

    let texts = &session.tables().texts;
    assert_eq!(texts[1].text, texts[0].text);
    assert_eq!(texts[1].delay, texts[0].delay + texts[0].duration);

    let error = session
        .context_action(sound(0), ContextAction::Duplicate, 0.0)
        .expect_err("sounds cannot be duplicated");
    assert!(matches!(error, SessionError::UnsupportedAction { .. }));
}

#[test]
fn multi_select_move_uses_positions_from_mousedown() {
    let mut session = session_with(|composition| {
        composition.tables.texts[0] = TextSlot {
            text: "Hit".to_string(),
            delay: 1_000,
            ..TextSlot::default()
        };
        composition.tables.images[0] = ImageSlot {
            file: "fx/flash.png".to_string(),
            delay: 500,
            ..ImageSlot::default()
        };
    });

    assert!(session.pointer_down_on_bar(text(0), 100.0, false));
    assert!(session.pointer_up(100.0).is_empty());
    assert!(session.pointer_down_on_bar(image(0), 50.0, false));
    assert_eq!(session.selection(), vec![image(0), text(0)]);

    let preview = session.drag_preview(55.0);
    assert_eq!(preview.len(), 2);
    assert_eq!(session.tables().texts[0].delay, 1_000);

    let committed = session.pointer_up(62.3);
    assert_eq!(committed.len(), 2);
    assert_eq!(session.tables().images[0].delay, 620);
    assert_eq!(session.tables().texts[0].delay, 1_120);
}

#[test]
fn moving_a_trimmed_sound_keeps_its_window() {
    let mut session = session_with(|composition| {
        composition.tables.sounds[0] = SoundSlot {
            file: "sfx/hit.ogg".to_string(),
            delay: 1_000,
            time_start: 200,
            duration: 1_000,
            ..SoundSlot::default()
        };
    });

    session.pointer_down_on_bar(sound(0), 0.0, false);
    session.pointer_up(20.0);

    let slot = &session.tables().sounds[0];
    assert_eq!(slot.delay, 1_200);
    assert_eq!(slot.time_start, 200);
    assert_eq!(slot.visual_start(), 1_000);
}

#[test]
fn sound_dragged_before_zero_clamps_delay() {
    let mut session = session_with(|composition| {
        composition.tables.sounds[0] = SoundSlot {
            file: "sfx/hit.ogg".to_string(),
            delay: 300,
            time_start: 100,
            ..SoundSlot::default()
        };
    });

    session.pointer_down_on_bar(sound(0), 200.0, false);
    session.pointer_up(0.0);
    assert_eq!(session.tables().sounds[0].delay, 0);
}

#[test]
fn shift_drag_resizes_every_selected_bar() {
    let mut session = session_with(|composition| {
        composition.tables.texts[0] = TextSlot {
            text: "A".to_string(),
            delay: 1_000,
            duration: 2_000,
            ..TextSlot::default()
        };
        composition.tables.texts[1] = TextSlot {
            text: "B".to_string(),
            delay: 0,
            duration: 500,
            ..TextSlot::default()
        };
    });

    session.begin_marquee(0.0, 0.0);
    let selected = session.end_marquee(1_000.0, 100.0);
    assert_eq!(selected.len(), 2);

    session.clear_selection();
    session.pointer_down_on_bar(text(0), 0.0, true);
    session.pointer_down_on_bar(text(1), 0.0, true);
    session.pointer_up(30.0);

    let texts = &session.tables().texts;
    assert_eq!(texts[0].duration, 2_300);
    assert_eq!(texts[1].duration, 800);

    session.clear_selection();
    session.pointer_down_on_bar(text(1), 0.0, true);
    session.pointer_up(-5_000.0);
    assert_eq!(session.tables().texts[1].duration, 10);
}

#[test]
fn clicking_a_selected_bar_deselects_it() {
    let mut session = demo_session();
    assert!(session.pointer_down_on_bar(image(1), 10.0, false));
    session.pointer_up(10.0);
    assert!(!session.pointer_down_on_bar(image(1), 10.0, false));
    assert!(session.selection().is_empty());
    assert!(session.drag().is_none());
}

#[test]
fn marquee_replaces_previous_selection() {
    let mut session = demo_session();
    session.pointer_down_on_bar(sound(1), 0.0, false);
    session.pointer_up(0.0);

    session.begin_marquee(0.0, 0.0);
    assert!(session.selection().is_empty());
    let hits = session.end_marquee(60.0, 30.0);
    assert_eq!(hits, vec![image(0), image(1)]);
    assert_eq!(session.selection(), vec![image(0), image(1)]);
}

#[test]
fn zoom_rescales_bars_from_stored_times() {
    let mut session = demo_session();
    let before = session.layout();

    for _ in 0..3 {
        session.wheel(-120.0, 200.0);
    }
    for _ in 0..3 {
        session.wheel(120.0, 200.0);
    }
    assert!((session.scale() - 1.0).abs() < 1e-9);
    assert_eq!(session.layout(), before);

    let zoomed = session.wheel(-120.0, 0.0);
    assert!((zoomed.scale - 1.1).abs() < 1e-9);
    let after = session.layout();
    let bar = after.bar(text(0)).expect("text bar should exist");
    assert!((bar.width - 220.0).abs() < 1e-9);
}

#[test]
fn z_index_step_keeps_ties_in_order() {
    let mut session = session_with(|composition| {
        for (index, z_index) in [(0, 3), (1, 3), (2, 1)] {
            composition.tables.images[index] = ImageSlot {
                file: format!("fx/{index}.png"),
                z_index,
                ..ImageSlot::default()
            };
        }
    });
    assert_eq!(session.layout().image_order(), vec![0, 1, 2]);

    assert_eq!(session.step_z_index(2, 5).expect("step up"), 6);
    assert_eq!(session.layout().image_order(), vec![2, 0, 1]);

    assert_eq!(session.step_z_index(2, -10).expect("step down"), 1);
    assert_eq!(session.layout().image_order(), vec![0, 1, 2]);
}

#[test]
fn capture_writes_position_to_armed_slot() {
    let mut session = demo_session();
    session.arm_capture(image(1)).expect("image capture should arm");
    session.arm_capture(text(2)).expect("text capture replaces it");

    assert_eq!(session.complete_capture(320, 240), Some(text(2)));
    assert_eq!(session.tables().texts[2].x, 320);
    assert_eq!(session.tables().texts[2].y, 240);
    assert_eq!(session.tables().images[1].x, 960);
    assert_eq!(session.complete_capture(1, 1), None);

    assert!(session.arm_capture(sound(0)).is_err());
}

#[test]
fn duplicate_without_free_slot_changes_nothing() {
    let mut session = session_with(|composition| {
        for (index, slot) in composition.tables.texts.iter_mut().enumerate() {
            slot.text = format!("line {index}");
        }
    });
    let before = session.tables().clone();
    let revision = session.revision();

    let error = session
        .context_action(text(0), ContextAction::Duplicate, 0.0)
        .expect_err("every text slot is taken");
    assert!(matches!(error, SessionError::NoFreeSlot(Channel::Text)));
    assert_eq!(session.tables(), &before);
    assert_eq!(session.revision(), revision);
}
