use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use transcoder::{
    config::{BatchConfig, DEFAULT_CONFIG_FILE},
    preset, BatchEvent, Coordinator, RunOutcome,
};

/// Batch-apply a filter preset to every video in a folder using FFmpeg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the FFmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Folder containing the input videos
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Folder receiving the Fixed_* outputs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Filter preset display name (see --list-presets)
    #[arg(short, long)]
    preset: Option<String>,

    /// Per-file encoder timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Save the merged settings back to the configuration file
    #[arg(long)]
    save: bool,

    /// Print the available presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, cfg: &mut BatchConfig) {
        if let Some(ffmpeg) = &self.ffmpeg {
            cfg.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(input) = &self.input {
            cfg.input_path = input.clone();
        }
        if let Some(output) = &self.output {
            cfg.output_dir = output.clone();
        }
        if let Some(preset) = &self.preset {
            cfg.preset = preset.clone();
        }
        if self.timeout.is_some() {
            cfg.encoder_timeout_secs = self.timeout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Use RUST_LOG if set, otherwise info (debug with --verbose)
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    if args.list_presets {
        for preset in preset::presets() {
            println!("{}\n    -vf {} -af {}", preset.name, preset.video_filter(), preset.audio_filter());
        }
        return Ok(());
    }

    let mut cfg = BatchConfig::load_config(Some(&args.config))
        .context("Failed to load configuration")?;
    args.apply(&mut cfg);

    if args.save {
        cfg.save_config(&args.config)
            .context("Failed to save configuration")?;
        info!("Settings saved to {}", args.config.display());
    }

    info!("Configuration loaded:");
    info!("  FFmpeg path: {}", cfg.ffmpeg_path.display());
    info!("  Input folder: {}", cfg.input_path.display());
    info!("  Output folder: {}", cfg.output_dir.display());
    info!("  Filter: {}", cfg.preset);
    match cfg.encoder_timeout_secs {
        Some(secs) => info!("  Encoder timeout: {}s", secs),
        None => info!("  Encoder timeout: none"),
    }

    let coordinator: Coordinator = Coordinator::new();
    let mut handle = coordinator
        .start(cfg)
        .context("Failed to start batch")?;

    println!("--- Starting New Batch ---");
    let mut summary = None;
    while let Some(event) = handle.next_event().await {
        for line in event.log_lines() {
            println!("{}", line);
        }
        if let BatchEvent::Finished(s) = event {
            summary = Some(s);
        }
    }

    let summary = match summary {
        Some(s) => s,
        None => {
            // Worker ended without a terminal event; surface the join error if any
            let s = handle.wait().await.context("Batch worker failed")?;
            warn!("Batch {} finished without a terminal event", s.run_id);
            s
        }
    };

    match &summary.outcome {
        RunOutcome::Aborted { kind, message } => {
            error!("Batch aborted ({:?}): {}", kind, message);
            bail!("batch aborted: {}", message);
        }
        RunOutcome::NothingToDo => Ok(()),
        RunOutcome::Completed if summary.failed > 0 => {
            bail!("{} of {} file(s) failed", summary.failed, summary.total);
        }
        RunOutcome::Completed => Ok(()),
    }
}
