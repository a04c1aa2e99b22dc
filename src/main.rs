//! Application entry point: Mewsage command-line client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] (defaults when missing) and apply overrides.
//! 4. Create the [`tokio`] runtime.
//! 5. Run the requested command.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;

use mewsage::{
    api::{HttpClient, PredictionService},
    audio::{AudioPlayer, CpalCapture, RodioPlayer},
    config::{AppConfig, AppPaths},
    display::{history_row, probability_lines, ResultView},
    history::HistoryBrowser,
    recorder::{RecorderController, RecorderEvent},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "mewsage", version)]
#[command(about = "Record cat sounds and ask the Mewsage server what they mean")]
struct Cli {
    /// Backend base URL, overriding `server.base_url`.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Settings file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep settings, recordings and the playback cache under this directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone and analyse in real time.
    Record {
        /// Keep recording after each analysis instead of stopping.
        #[arg(long)]
        keep_going: bool,
    },
    /// Upload an existing audio file for a full prediction.
    Predict {
        file: PathBuf,
        /// Upload id; a random UUID when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    /// List past predictions.
    History {
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Delete past predictions by id.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Download and play the audio of a past prediction.
    PlayHistory {
        id: String,
        /// Records to load before searching further back for the id.
        #[arg(short, long)]
        limit: Option<u32>,
        /// Playback volume between 0.0 and 1.0.
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Play a local audio file, e.g. a saved recording.
    Play {
        file: PathBuf,
        /// Playback volume between 0.0 and 1.0.
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Show the effective settings.
    Config {
        /// Write the settings file if it does not exist yet.
        #[arg(long)]
        init: bool,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments
    let cli = Cli::parse();

    // 3. Configuration
    let paths = match &cli.data_dir {
        Some(root) => AppPaths::rooted(root),
        None => AppPaths::new(),
    };
    let settings_file = cli.config.clone().unwrap_or_else(|| paths.settings_file.clone());
    let mut config = AppConfig::load_from(&settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 5. Command
    rt.block_on(run(cli.command, config, paths, settings_file))
}

async fn run(command: Command, config: AppConfig, paths: AppPaths, settings_file: PathBuf) -> Result<()> {
    match command {
        Command::Record { keep_going } => record(config, paths, keep_going).await,
        Command::Predict { file, id } => predict(&config, &file, id).await,
        Command::History { limit } => {
            let mut browser = history_browser(&config, limit)?;
            browser.refresh().await?;
            print_history(&browser);
            Ok(())
        }
        Command::Delete { ids } => {
            let mut browser = history_browser(&config, None)?;
            let notice = browser.delete(&ids).await?;
            println!("{notice}");
            print_history(&browser);
            Ok(())
        }
        Command::PlayHistory { id, limit, volume } => {
            let mut browser = history_browser(&config, limit)?;
            browser
                .play(&id, &player(volume), &paths.temp_audio_file)
                .await?;
            Ok(())
        }
        Command::Play { file, volume } => {
            player(volume).play_file(&file).await?;
            Ok(())
        }
        Command::Config { init } => show_config(&config, &settings_file, init),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn record(mut config: AppConfig, paths: AppPaths, keep_going: bool) -> Result<()> {
    if keep_going {
        config.recorder.auto_stop_after_analysis = false;
    }
    let api = HttpClient::from_config(&config.server)?;
    let capture = CpalCapture::new(config.recorder.input_device.clone());
    let floor = config.recorder.level_floor_db;

    let (recorder, mut events) = RecorderController::new(
        config.recorder,
        paths.recordings_dir,
        Arc::new(capture),
        Arc::new(api),
    );
    log::info!("Recording against {}", config.server.base_url);
    recorder.start().await?;
    println!("Recording… press Enter to stop (level floor {floor} dBFS)");

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut level = 0.0_f32;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    RecorderEvent::Started { path } => println!("Capturing to {}", path.display()),
                    RecorderEvent::Tick { elapsed_secs } => {
                        let phase = recorder.snapshot().phase;
                        eprint!(
                            "\r{:<9} {:02}:{:02}  {}",
                            phase.label(),
                            elapsed_secs / 60,
                            elapsed_secs % 60,
                            level_bar(level)
                        );
                        let _ = std::io::stderr().flush();
                    }
                    RecorderEvent::Level(l) => level = l,
                    RecorderEvent::Analyzing { .. } => eprintln!("\nAnalyzing…"),
                    RecorderEvent::Result(view) => println!("{view}"),
                    RecorderEvent::Notice(msg) => println!("{msg}"),
                    RecorderEvent::Stopped => {
                        eprintln!();
                        break;
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        recorder.stop().await;
                    }
                    // No terminal attached; rely on Ctrl-C or auto-stop.
                    _ => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                recorder.stop().await;
            }
        }
    }

    if let Some(view) = recorder.snapshot().result {
        log::debug!("last result: {view:?}");
    }
    Ok(())
}

async fn predict(config: &AppConfig, file: &Path, id: Option<String>) -> Result<()> {
    let api = HttpClient::from_config(&config.server)?;
    let file_id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = api.predict_file(file, &file_id).await;
    println!("{}", ResultView::from_result(&result));
    if let Ok(outcome) = &result {
        for line in probability_lines(outcome, 3) {
            println!("{line}");
        }
    }
    Ok(())
}

fn player(volume: Option<f32>) -> RodioPlayer {
    volume.map_or_else(RodioPlayer::new, RodioPlayer::with_volume)
}

fn history_browser(config: &AppConfig, limit: Option<u32>) -> Result<HistoryBrowser> {
    let api = HttpClient::from_config(&config.server)?;
    Ok(HistoryBrowser::new(
        Arc::new(api),
        limit.unwrap_or(config.history.limit),
    ))
}

fn print_history(browser: &HistoryBrowser) {
    if browser.records().is_empty() {
        println!("No recordings yet.");
        return;
    }
    for record in browser.records() {
        println!("{}", history_row(record));
    }
}

fn show_config(config: &AppConfig, settings_file: &Path, init: bool) -> Result<()> {
    if init {
        if settings_file.exists() {
            println!("{} already exists", settings_file.display());
        } else {
            config.save_to(settings_file)?;
            println!("Wrote {}", settings_file.display());
        }
    }
    println!("# {}", settings_file.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn level_bar(level: f32) -> String {
    let filled = (level.clamp(0.0, 1.0) * 20.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled), " ".repeat(20 - filled))
}
