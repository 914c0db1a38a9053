use cuelane_core::{
    BarRef, Channel, CompileOptions, ImageSlot, RecordingSequencer, Session, SessionError,
    SessionSettings, SoundSlot, StaticScene, StretchToTarget, TextSlot,
    compiler::{
        Arg, Call, LiveArg, Operation, OperationChain, Origin, TokenRole, compile_slot,
        invoke_live, render_literal,
    },
    curves::{AlphaParams, AnimationStep, BlurParams, CurveKind, CurveStep},
    fixtures::{DEMO_TOKEN_ID, demo_scene, demo_session},
    model::Composition,
};

fn slot_origin(channel: Channel, slot: usize) -> Origin {
    Origin::Slot(BarRef::new(channel, slot))
}

fn operation(chain: &OperationChain, origin: Origin) -> &Operation {
    chain
        .operations
        .iter()
        .find(|operation| operation.origin == origin)
        .expect("operation should be present")
}

fn calls<'a>(operation: &'a Operation, verb: &str) -> Vec<&'a Call> {
    operation.calls.iter().filter(|call| call.verb == verb).collect()
}

fn field<'a>(arg: &'a Arg, key: &str) -> &'a Arg {
    match arg {
        Arg::Object(fields) => fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
            .expect("field should be present"),
        other => panic!("expected an object argument, got {other:?}"),
    }
}

fn session_with(build: impl FnOnce(&mut Composition)) -> Session {
    let mut composition = Composition::new(5);
    build(&mut composition);
    Session::with_composition(SessionSettings::default(), composition)
}

#[test]
fn operations_follow_start_time_with_background_first() {
    let mut session = demo_session();
    let chain = session.compile_chain(&demo_scene(), CompileOptions::literal());

    let origins: Vec<Origin> = chain.operations.iter().map(|operation| operation.origin).collect();
    assert_eq!(
        origins,
        vec![
            Origin::Background,
            slot_origin(Channel::Image, 0),
            slot_origin(Channel::Sound, 0),
            slot_origin(Channel::Text, 0),
            slot_origin(Channel::Image, 1),
            slot_origin(Channel::Sound, 1),
            Origin::AudioBed,
        ]
    );
    assert!(chain.warnings.is_empty());
}

#[test]
fn position_steps_chain_from_the_previous_endpoint() {
    let mut session = demo_session();
    let chain = session.compile_chain(&demo_scene(), CompileOptions::live());
    let image = operation(&chain, slot_origin(Channel::Image, 0));

    let x_tweens: Vec<&Call> = calls(image, "animateProperty")
        .into_iter()
        .filter(|call| call.args[1] == Arg::Str("position.x".to_string()))
        .collect();
    assert_eq!(x_tweens.len(), 2);
    assert_eq!(field(&x_tweens[0].args[2], "from"), &Arg::Num(0.0));
    assert_eq!(field(&x_tweens[0].args[2], "to"), &Arg::Num(10.0));
    assert_eq!(field(&x_tweens[1].args[2], "from"), &Arg::Num(10.0));
    assert_eq!(field(&x_tweens[1].args[2], "to"), &Arg::Num(5.0));
}

#[test]
fn disabled_steps_emit_nothing_and_keep_their_index() {
    let mut session = session_with(|composition| {
        composition.tables.images[0] = ImageSlot {
            file: "fx/fade.png".to_string(),
            ..ImageSlot::default()
        };
    });
    for enabled in [true, false, true] {
        let mut step = AnimationStep::<AlphaParams>::default();
        step.enabled = enabled;
        session
            .add_animation(0, CurveStep::Alpha(step))
            .expect("image slot should accept steps");
    }

    let scene = StaticScene::default();
    let chain = session.compile_chain(&scene, CompileOptions::live());
    let image = operation(&chain, slot_origin(Channel::Image, 0));
    assert_eq!(calls(image, "animateProperty").len(), 2);

    assert!(session.remove_animation(0, CurveKind::Alpha, 0).expect("remove"));
    let alpha = &session.tables().images[0].animations.alpha;
    assert!(!alpha[0].enabled);
    assert!(alpha[1].enabled);

    let chain = session.compile_chain(&scene, CompileOptions::live());
    let image = operation(&chain, slot_origin(Channel::Image, 0));
    assert_eq!(calls(image, "animateProperty").len(), 1);
}

#[test]
fn literal_and_live_issue_the_same_calls() {
    let mut session = demo_session();
    let scene = demo_scene();

    let mut recorder = RecordingSequencer::default();
    let handle = session
        .preview(&scene, &mut recorder)
        .expect("preview should run with a token selected");
    assert_eq!(recorder.played, 1);
    assert_eq!(handle, recorder.calls.len());

    let live = session.compile_chain(&scene, CompileOptions::live());
    assert_eq!(recorder.verbs(), live.transcript());

    let literal = session.compile_chain(&scene, CompileOptions::literal());
    let script = render_literal(&literal);
    let literal_calls = script
        .lines()
        .filter(|line| line.trim_start().starts_with('.') && !line.contains(".play()"))
        .count();
    assert_eq!(literal_calls, literal.call_count());
    assert_eq!(literal.operations.len(), live.operations.len() + 1);

    let anchored = recorder
        .calls
        .iter()
        .find(|call| call.verb == "atLocation")
        .expect("on-token image should anchor");
    assert_eq!(anchored.args[0], LiveArg::Token(DEMO_TOKEN_ID.to_string()));
}

#[test]
fn literal_script_guards_token_use() {
    let mut session = demo_session();
    let script = session.compile_macro(&demo_scene());

    assert!(script.starts_with("const token = canvas.tokens.controlled[0];"));
    assert!(!script.contains("const target"));
    assert!(script.contains("    .effect()\n        .file(\"cuelane/fx/explosion.webm\")"));
    assert!(script.contains(".atLocation(token, { cacheLocation: true })"));
    assert!(script.contains(".loopProperty(\"sprite\", \"rotation\""));
    assert!(script.contains(".filter(\"Blur\", { strength: 0.0001, blurX: 0.0001, blurY: 0.0001 }, \"animatedBlur\")"));
    assert!(script.contains(".file(\"cuelane/music/bed.ogg\")"));
    assert!(script.trim_end().ends_with(".play();"));
}

#[test]
fn preview_without_token_fails_before_any_call() {
    let mut session = demo_session();
    let mut recorder = RecordingSequencer::default();
    let error = session
        .preview(&StaticScene::default(), &mut recorder)
        .expect_err("on-token elements need a token");

    assert!(matches!(error, SessionError::MissingToken));
    assert_eq!(error.severity(), cuelane_core::Severity::Warning);
    assert!(recorder.calls.is_empty());
    assert_eq!(recorder.played, 0);
}

#[test]
fn single_slot_preview_shifts_end_time_by_start() {
    let mut session = session_with(|composition| {
        composition.tables.sounds[0] = SoundSlot {
            file: "sfx/clip.ogg".to_string(),
            time_start: 200,
            time_end: 500,
            ..SoundSlot::default()
        };
    });
    let scene = StaticScene::default();

    let full = session.compile_chain(&scene, CompileOptions::live());
    let sound = operation(&full, slot_origin(Channel::Sound, 0));
    assert_eq!(calls(sound, "endTime")[0].args, vec![Arg::Int(500)]);
    assert_eq!(calls(sound, "startTime")[0].args, vec![Arg::Int(200)]);

    let single = compile_slot(
        session.composition(),
        BarRef::new(Channel::Sound, 0),
        Default::default(),
    )
    .expect("active slot should compile");
    assert_eq!(single.operations.len(), 1);
    assert_eq!(calls(&single.operations[0], "endTime")[0].args, vec![Arg::Int(700)]);

    let mut recorder = RecordingSequencer::default();
    session
        .preview_slot(BarRef::new(Channel::Sound, 0), &scene, &mut recorder)
        .expect("sound preview needs no token");
    assert_eq!(recorder.verbs()[0], "sound");
    assert!(!recorder.verbs().contains(&"shape".to_string()));
}

#[test]
fn text_renders_above_images_in_screen_space() {
    let mut session = session_with(|composition| {
        composition.tables.texts[0] = TextSlot {
            text: "Round 2".to_string(),
            x: 400,
            y: 300,
            ..TextSlot::default()
        };
    });
    let chain = session.compile_chain(&StaticScene::default(), CompileOptions::live());
    let text = operation(&chain, slot_origin(Channel::Text, 0));

    assert_eq!(calls(text, "zIndex")[0].args, vec![Arg::Int(1_000)]);
    assert_eq!(calls(text, "screenSpace").len(), 1);
    assert_eq!(calls(text, "screenSpaceAboveUI").len(), 1);
    assert!(calls(text, "atLocation").is_empty());
}

#[test]
fn stretch_without_target_is_skipped_with_a_warning() {
    let mut session = session_with(|composition| {
        composition.tables.images[0] = ImageSlot {
            file: "fx/beam.webm".to_string(),
            on_token: true,
            stretch_to_target: StretchToTarget {
                enabled: true,
                tiling: true,
            },
            ..ImageSlot::default()
        };
    });

    let token_only = StaticScene {
        token: Some("token.a".to_string()),
        target: None,
    };
    let chain = session.compile_chain(&token_only, CompileOptions::literal());
    assert_eq!(chain.warnings.len(), 1);
    assert!(calls(operation(&chain, slot_origin(Channel::Image, 0)), "stretchTo").is_empty());

    let with_target = StaticScene {
        token: Some("token.a".to_string()),
        target: Some("token.b".to_string()),
    };
    let script = session.compile_macro(&with_target);
    assert!(script.contains("const target = Array.from(game.user.targets)[0];"));
    assert!(script.contains(".stretchTo(target, { tiling: true })"));
}

#[test]
fn anchoring_preconditions_abort_without_mutation() {
    let mut session = demo_session();
    let empty = StaticScene::default();
    let revision = session.revision();

    let error = session
        .set_on_token(BarRef::new(Channel::Image, 1), true, &empty)
        .expect_err("no token selected");
    assert!(matches!(error, SessionError::MissingToken));

    let error = session
        .set_stretch_to_target(
            1,
            StretchToTarget {
                enabled: true,
                tiling: false,
            },
            &empty,
        )
        .expect_err("no target selected");
    assert!(matches!(error, SessionError::MissingTarget));

    assert_eq!(session.revision(), revision);
    assert!(!session.tables().images[1].on_token);
    assert!(!session.tables().images[1].stretch_to_target.enabled);

    session
        .set_on_token(BarRef::new(Channel::Image, 1), true, &demo_scene())
        .expect("token is selected");
    assert!(session.tables().images[1].on_token);
}

fn image_operation(session: &mut Session, scene: &StaticScene) -> Operation {
    let chain = session.compile_chain(scene, CompileOptions::live());
    operation(&chain, slot_origin(Channel::Image, 0)).clone()
}

fn filter_names(operation: &Operation) -> Vec<&Arg> {
    calls(operation, "filter")
        .into_iter()
        .map(|call| &call.args[0])
        .collect()
}

#[test]
fn live_replay_without_target_sends_nothing() {
    let mut session = session_with(|composition| {
        composition.tables.images[0] = ImageSlot {
            file: "fx/beam.webm".to_string(),
            on_token: true,
            stretch_to_target: StretchToTarget {
                enabled: true,
                tiling: false,
            },
            ..ImageSlot::default()
        };
    });
    let chain = session.compile_chain(&demo_scene(), CompileOptions::live());
    assert!(chain.uses(TokenRole::Target));

    let token_only = StaticScene {
        token: Some("token.a".to_string()),
        target: None,
    };
    let mut recorder = RecordingSequencer::default();
    let error = invoke_live(&chain, &token_only, &mut recorder)
        .expect_err("stretch needs a target at replay time");

    assert!(matches!(error, SessionError::MissingTarget));
    assert!(recorder.calls.is_empty());
    assert_eq!(recorder.played, 0);
}

#[test]
fn on_token_tail_follows_its_own_flags_in_order() {
    let scene = demo_scene();
    for (attach, stretch, below, expected) in [
        (true, true, true, vec!["attachTo", "stretchTo", "belowTokens"]),
        (false, true, false, vec!["stretchTo"]),
        (true, false, true, vec!["attachTo", "belowTokens"]),
        (false, false, true, vec!["belowTokens"]),
        (false, false, false, vec![]),
    ] {
        let mut session = session_with(|composition| {
            composition.tables.images[0] = ImageSlot {
                file: "fx/aura.webm".to_string(),
                on_token: true,
                attach_to_source: attach,
                below_token: below,
                stretch_to_target: StretchToTarget {
                    enabled: stretch,
                    tiling: false,
                },
                ..ImageSlot::default()
            };
        });
        let image = image_operation(&mut session, &scene);
        let verbs = image.verbs();
        let tail: Vec<&str> = verbs
            .iter()
            .copied()
            .filter(|verb| matches!(*verb, "attachTo" | "stretchTo" | "belowTokens"))
            .collect();
        assert_eq!(tail, expected, "attach={attach} stretch={stretch} below={below}");
        assert_eq!(&verbs[verbs.len() - expected.len()..], expected.as_slice());
    }
}

#[test]
fn animated_blur_replaces_the_static_blur_filter() {
    let blur_step = AnimationStep::new(BlurParams { from: 0.0, to: 4.0 });
    let mut session = session_with(|composition| {
        let mut image = ImageSlot {
            file: "fx/haze.png".to_string(),
            ..ImageSlot::default()
        };
        image.filters.blur.enabled = true;
        image.animations.push(CurveStep::Blur(blur_step.clone()));
        composition.tables.images[0] = image;
    });
    let scene = StaticScene::default();

    let image = image_operation(&mut session, &scene);
    let blurs = calls(&image, "filter");
    assert_eq!(blurs.len(), 1);
    assert_eq!(blurs[0].args[0], Arg::Str("Blur".to_string()));
    assert_eq!(blurs[0].args[2], Arg::Str("animatedBlur".to_string()));
    let animated = calls(&image, "animateProperty")
        .into_iter()
        .filter(|call| call.args[0] == Arg::Str("effectFilters.animatedBlur".to_string()))
        .count();
    assert_eq!(animated, 3);

    session
        .set_animation_enabled(0, CurveKind::Blur, 0, false)
        .expect("blur step should exist");
    let image = image_operation(&mut session, &scene);
    let blurs = calls(&image, "filter");
    assert_eq!(blurs.len(), 1);
    assert_eq!(blurs[0].args.len(), 2);
    assert_eq!(field(&blurs[0].args[1], "blurX"), &Arg::Num(2.0));
}

#[test]
fn static_filters_are_emitted_only_when_enabled() {
    let mut session = session_with(|composition| {
        composition.tables.images[0] = ImageSlot {
            file: "fx/orb.png".to_string(),
            ..ImageSlot::default()
        };
    });
    let scene = StaticScene::default();
    assert!(filter_names(&image_operation(&mut session, &scene)).is_empty());

    session
        .edit_image(0, |image| image.filters.glow.enabled = true)
        .expect("slot 0 should exist");
    assert_eq!(
        filter_names(&image_operation(&mut session, &scene)),
        vec![&Arg::Str("Glow".to_string())]
    );

    session
        .edit_image(0, |image| image.filters.color_matrix.enabled = true)
        .expect("slot 0 should exist");
    assert_eq!(
        filter_names(&image_operation(&mut session, &scene)),
        vec![
            &Arg::Str("ColorMatrix".to_string()),
            &Arg::Str("Glow".to_string())
        ]
    );
}

#[test]
fn size_is_emitted_only_when_a_dimension_is_set() {
    let mut session = session_with(|composition| {
        composition.tables.images[0] = ImageSlot {
            file: "fx/orb.png".to_string(),
            ..ImageSlot::default()
        };
    });
    let scene = StaticScene::default();
    assert!(calls(&image_operation(&mut session, &scene), "size").is_empty());

    session
        .edit_image(0, |image| image.size.height = Some(64.0))
        .expect("slot 0 should exist");
    let image = image_operation(&mut session, &scene);
    let sizes = calls(&image, "size");
    assert_eq!(sizes.len(), 1);
    assert_eq!(field(&sizes[0].args[0], "width"), &Arg::Null);
    assert_eq!(field(&sizes[0].args[0], "height"), &Arg::Num(64.0));

    let verbs = image.verbs();
    let mirror_y = verbs.iter().position(|verb| *verb == "mirrorY");
    let size = verbs.iter().position(|verb| *verb == "size");
    assert_eq!(size, mirror_y.map(|index| index + 1));
}

#[test]
fn attached_text_uses_attach_to_with_the_source_token() {
    let mut session = session_with(|composition| {
        composition.tables.texts[0] = TextSlot {
            text: "Follow".to_string(),
            on_token: true,
            attach: true,
            ..TextSlot::default()
        };
    });
    let chain = session.compile_chain(&demo_scene(), CompileOptions::live());
    let text = operation(&chain, slot_origin(Channel::Text, 0));

    assert_eq!(&text.verbs()[..3], &["text", "rotate", "attachTo"]);
    let attach = calls(text, "attachTo");
    assert_eq!(attach[0].args[0], Arg::Token(TokenRole::Source));
    assert!(matches!(attach[0].args[1], Arg::Object(_)));
    assert!(calls(text, "atLocation").is_empty());
    assert!(calls(text, "screenSpace").is_empty());
}

#[test]
fn zero_delta_text_tweens_are_still_emitted() {
    let mut session = session_with(|composition| {
        let mut text = TextSlot {
            text: "Still".to_string(),
            x: 120,
            y: 80,
            ..TextSlot::default()
        };
        text.style.move_x_by = 0.0;
        text.style.move_y_by = 0.0;
        text.style.scale_x_to = 1.0;
        text.style.scale_y_to = 1.0;
        composition.tables.texts[0] = text;
    });
    let chain = session.compile_chain(&StaticScene::default(), CompileOptions::live());
    let text = operation(&chain, slot_origin(Channel::Text, 0));

    let tweens = calls(text, "animateProperty");
    let properties: Vec<&Arg> = tweens.iter().map(|call| &call.args[1]).collect();
    assert_eq!(
        properties,
        vec![
            &Arg::Str("position.x".to_string()),
            &Arg::Str("position.y".to_string()),
            &Arg::Str("scale.x".to_string()),
            &Arg::Str("scale.y".to_string()),
        ]
    );
    assert_eq!(field(&tweens[0].args[2], "from"), &Arg::Num(120.0));
    assert_eq!(field(&tweens[0].args[2], "to"), &Arg::Num(120.0));
    assert_eq!(field(&tweens[3].args[2], "from"), &Arg::Num(1.0));
    assert_eq!(field(&tweens[3].args[2], "to"), &Arg::Num(1.0));
}
