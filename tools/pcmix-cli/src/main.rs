//! pcmix CLI - drive the mixer with synthetic emulated devices
//!
//! # Commands
//!
//! - `pcmix play` - mix tone voices to the default audio device in real time
//! - `pcmix render` - mix offline and write what the device would have played to a WAV file
//! - `pcmix voices` - list the available tone voices
//!
//! # Usage
//!
//! ```bash
//! # Five seconds of every voice, recording the mix as it is produced
//! pcmix play --seconds 5 --capture mix.wav
//!
//! # Only the Sound Blaster and FM voices, per-sample scheduling
//! pcmix play --voice sb,fm --sample-accurate
//!
//! # Offline render through the playback resampler
//! pcmix render out.wav --rate 48000 --blocksize 512
//! ```
//!
//! Mixer settings come from `mixer.toml` in the platform config directory
//! (or `--config`), with command-line flags taking precedence.

mod driver;
mod play;
mod render;
mod settings;
mod tone;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// pcmix - audio mixer driver
#[derive(Parser)]
#[command(name = "pcmix")]
#[command(about = "Drive the pcmix audio mixer with synthetic sound devices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mix tone voices to the default audio device in real time
    Play(play::PlayArgs),

    /// Mix offline and write the device-side stream to a WAV file
    Render(render::RenderArgs),

    /// List the available tone voices
    Voices,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => play::execute(args),
        Commands::Render(args) => render::execute(args),
        Commands::Voices => {
            tone::print_voices();
            Ok(())
        }
    }
}
