// crates/scenecraft-cli/src/main.rs
//
// Thin command-line shell around scenecraft-media's render engine, a batch
// counterpart to an interactive eframe GUI shell, wired up with clap and
// tracing the way a small media-processing binary typically is.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scenecraft_media::RenderOptions;

#[derive(Parser, Debug)]
#[command(name = "scenecraft", about = "Render a project JSON to an encoded video file")]
struct Cli {
    /// Path to the project JSON file describing scenes, transitions and encoding.
    project: PathBuf,

    /// TrueType/OpenType font used to burn in scene subtitles. Omit to
    /// render without captions even if a scene specifies subtitle text.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Cross-fade outgoing/incoming audio across transition scenes instead
    /// of silence for their duration.
    #[arg(long)]
    audio_transition: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let opts = RenderOptions {
        font_path: cli.font,
        enable_audio_transition: cli.audio_transition,
    };

    match scenecraft_media::render_from_json_file_with_options(&cli.project, &opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "render failed");
            ExitCode::FAILURE
        }
    }
}
