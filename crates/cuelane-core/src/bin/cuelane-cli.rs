use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cuelane_core::{
    AppConfig,
    assets::{probe_audio_duration_ms, scan_assets_with},
    init_tracing_from_config,
    fixtures::{demo_scene, demo_session},
    generate_parity_report,
    parity::write_parity_report,
};

#[derive(Debug, Parser)]
#[command(name = "cuelane-cli")]
#[command(about = "Headless tools for cuelane compositions, presets and assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `diagnostics.logs_dir` from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the demo composition as macro source.
    DemoMacro {
        #[arg(long, default_value = "data/macros/demo.js")]
        output: PathBuf,
    },
    /// Manages the saved preset list.
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
    ParityReport {
        #[arg(long, default_value = "data/parity/report.json")]
        output: PathBuf,
    },
    /// Prints a sound file's duration in milliseconds.
    Probe { file: PathBuf },
    /// Lists image and audio files under a directory.
    Scan { directory: Option<PathBuf> },
}

#[derive(Debug, Subcommand)]
enum PresetAction {
    List,
    SaveDemo {
        #[arg(long, default_value = "Demo")]
        name: String,
    },
    Delete { index: usize },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default();
    if let Some(log_dir) = cli.log_dir {
        config.diagnostics.logs_dir = log_dir;
    }
    let _telemetry = init_tracing_from_config(&config.diagnostics)?;

    match cli.command {
        Commands::DemoMacro { output } => {
            let script = demo_session().compile_macro(&demo_scene());
            if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&output, script)
                .with_context(|| format!("failed to write macro: {}", output.display()))?;
            tracing::info!(path = %output.display(), "demo macro written");
        }
        Commands::Preset { action } => {
            let store = config.preset_store();
            match action {
                PresetAction::List => {
                    for (index, preset) in store.load()?.iter().enumerate() {
                        println!("{index}\t{}\t{} slots", preset.name, preset.slot_count);
                    }
                }
                PresetAction::SaveDemo { name } => {
                    let index = demo_session().save_preset(&store, &name)?;
                    println!("saved preset {index}: {name}");
                }
                PresetAction::Delete { index } => {
                    let removed = store.delete(index)?;
                    println!("deleted preset {index}: {}", removed.name);
                }
            }
        }
        Commands::ParityReport { output } => {
            let report = generate_parity_report(&mut demo_session(), &demo_scene())?;
            write_parity_report(&output, &report)?;
            tracing::info!(path = %output.display(), modes_agree = report.modes_agree, "parity report generated");
        }
        Commands::Probe { file } => {
            let duration = probe_audio_duration_ms(&file)?;
            println!("{duration}");
        }
        Commands::Scan { directory } => {
            let directory = directory.unwrap_or_else(|| config.assets.storage_root.clone());
            let assets = scan_assets_with(
                &directory,
                &config.assets.image_extensions,
                &config.assets.audio_extensions,
            )?;
            for asset in assets {
                println!("{}\t{}\t{}", asset.channel, asset.size_bytes, asset.path);
            }
        }
    }

    Ok(())
}
