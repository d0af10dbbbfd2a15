//! trailguide - play talking trail narration from the terminal
//!
//! Subcommands:
//! - `trailguide play <file>` - Play a narration file with stdin transport controls
//! - `trailguide region <project.json>` - Print the map region framing a project
//! - `trailguide downloads` - List trails downloaded for offline use

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use trailguide_lib::audio::session::format_time;
use trailguide_lib::commands;
use trailguide_lib::trail::Project;
use trailguide_lib::{init_logging, AppSettings, AppState, SessionSnapshot};

#[derive(Parser)]
#[command(name = "trailguide")]
#[command(about = "Talking trail narration player")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an audio file. Reads p (play/pause), f, b, s <secs>, x (stop), q from stdin
    Play {
        /// Audio file path or file:// URI
        file: String,

        /// Directory holding settings.json and the download database
        #[arg(long, default_value = ".trailguide")]
        app_dir: PathBuf,
    },

    /// Print the map region that frames a project's first trail
    Region {
        /// Path to a project.json
        project: PathBuf,
    },

    /// List trails downloaded for offline use
    Downloads {
        #[arg(long, default_value = ".trailguide")]
        app_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Play { file, app_dir } => {
            start_logging(&app_dir);
            play(&file, &app_dir).await
        }
        Commands::Region { project } => {
            init_logging("warn");
            region(&project)
        }
        Commands::Downloads { app_dir } => {
            start_logging(&app_dir);
            downloads(&app_dir)
        }
    }
}

fn start_logging(app_dir: &Path) {
    let filter = AppSettings::load(app_dir)
        .map(|settings| settings.logging.filter)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&filter);
}

async fn play(file: &str, app_dir: &Path) -> Result<()> {
    let state = AppState::initialize(app_dir)?;
    let mut updates = state.session.subscribe();

    if let Err(e) = commands::play_audio(file.to_string(), &state).await {
        state.shutdown().await;
        anyhow::bail!(e);
    }

    println!(
        "p play/pause | f/b skip {}s | s <secs> seek | x stop | q quit",
        state.session.skip_interval_ms() / 1000
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                render(&snapshot);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !handle_input(line.trim(), &state).await {
                    break;
                }
            }
        }
    }

    state.shutdown().await;
    println!();
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_input(input: &str, state: &AppState) -> bool {
    let session = &state.session;
    match input.split_once(' ').unwrap_or((input, "")) {
        ("p", _) => {
            if session.snapshot().playing {
                session.pause().await;
            } else {
                session.play().await;
            }
        }
        ("f", _) => session.forward().await,
        ("b", _) => session.backward().await,
        ("s", secs) => match secs.trim().parse::<f64>() {
            Ok(secs) => session.seek_to((secs * 1000.0) as i64).await,
            Err(_) => eprintln!("usage: s <seconds>"),
        },
        ("x", _) => session.stop().await,
        ("q", _) => return false,
        ("", _) => {}
        (other, _) => eprintln!("unknown command: {}", other),
    }
    true
}

fn render(snapshot: &SessionSnapshot) {
    let Some(uri) = snapshot.source_uri.as_deref() else {
        print!("\r\x1b[2K[stopped]");
        let _ = std::io::stdout().flush();
        return;
    };

    const WIDTH: usize = 30;
    let filled = (snapshot.progress() * WIDTH as f64).round() as usize;
    let bar: String = (0..WIDTH).map(|i| if i < filled { '#' } else { '-' }).collect();
    let icon = if snapshot.playing { ">" } else { "||" };

    print!(
        "\r\x1b[2K{} [{}] {} / {}  {}",
        icon,
        bar,
        format_time(snapshot.position_ms),
        format_time(snapshot.duration_ms),
        uri
    );
    let _ = std::io::stdout().flush();
}

fn region(path: &Path) -> Result<()> {
    let project = Project::load(path)
        .with_context(|| format!("Failed to load project {}", path.display()))?;
    let region = project
        .region()
        .context("Project has no attractions with valid coordinates")?;
    println!("{}", serde_json::to_string_pretty(&region)?);
    Ok(())
}

fn downloads(app_dir: &Path) -> Result<()> {
    let state = AppState::initialize(app_dir)?;
    let downloads = commands::get_downloaded_trails(&state).map_err(anyhow::Error::msg)?;

    if downloads.is_empty() {
        println!("No downloaded trails");
    }
    for download in downloads {
        let when = chrono::DateTime::from_timestamp(download.downloaded_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:>4}  {:<24} {:<32} {}", download.id, download.name, download.talking_point, when);
    }
    Ok(())
}
