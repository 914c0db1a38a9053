pub mod assets;
pub mod compiler;
pub mod config;
pub mod curves;
pub mod diagnostics;
pub mod fixtures;
pub mod guard;
pub mod model;
pub mod parity;
pub mod persistence;
pub mod session;
pub mod template;
pub mod timeline;

pub use assets::{
    AssetEntry, AssetStore, DurationProbe, FileDurationProbe, LocalAssetStore, classify_asset,
    probe_audio_duration_ms, scan_assets,
};
pub use compiler::{
    CompileOptions, OperationChain, RecordingSequencer, Scene, SequencerApi, StaticScene, compile,
    compile_slot, invoke_live, render_literal,
};
pub use config::AppConfig;
pub use curves::{AnimationCurves, AnimationStep, CurveKind, CurveStep};
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_from_config};
pub use model::{
    AudioBed, Channel, ChannelTables, Composition, DEFAULT_SLOT_COUNT, GlobalStyle, ImageSlot,
    RectBackground, SoundSlot, StretchToTarget, TextSlot, TextStyle,
};
pub use parity::{ParityReport, generate_parity_report};
pub use persistence::PresetStore;
pub use session::{
    ContextAction, ContextOutcome, DragMode, Session, SessionError, SessionSettings, Severity,
};
pub use template::TemplateRecord;
pub use timeline::{BarLayout, BarRef, TimelineLayout, TimelineMetrics};
