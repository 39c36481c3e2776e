//! Mixer settings shared by the play and render commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pcmix_core::MixerConfig;
use tracing::debug;

/// Mixer options common to every command
#[derive(Args, Debug, Clone)]
pub struct MixerArgs {
    /// Mixer configuration file (defaults to mixer.toml in the config directory, if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output sample rate in Hz
    #[arg(long)]
    pub rate: Option<u32>,

    /// Host block size in frames
    #[arg(long)]
    pub blocksize: Option<u32>,

    /// Prebuffer latency in milliseconds (max 90)
    #[arg(long)]
    pub prebuffer: Option<u32>,

    /// Swap left and right output channels
    #[arg(long)]
    pub swapstereo: bool,

    /// Schedule one mixing event per output sample
    #[arg(long)]
    pub sample_accurate: bool,

    /// Master volume ("L[:R]" percent or "D<dB>")
    #[arg(long)]
    pub master: Option<String>,

    /// Voices to enable, comma separated (default: all)
    #[arg(long = "voice", value_delimiter = ',')]
    pub voices: Vec<String>,

    /// Seconds of audio to mix
    #[arg(short, long, default_value = "5")]
    pub seconds: u32,
}

/// Default location of the mixer configuration file.
///
/// On Linux: `~/.config/pcmix/mixer.toml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.pcmix", "", "pcmix")
        .map(|dirs| dirs.config_dir().join("mixer.toml"))
}

impl MixerArgs {
    /// Build the effective configuration: file (if any), then flags
    pub fn resolve(&self) -> Result<MixerConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| default_config_path().filter(|path| path.exists()));

        let mut config = match &path {
            Some(path) => {
                debug!("Loading mixer config from {}", path.display());
                MixerConfig::load(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?
            }
            None => MixerConfig::default(),
        };

        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(blocksize) = self.blocksize {
            config.blocksize = blocksize;
        }
        if let Some(prebuffer) = self.prebuffer {
            config.prebuffer = prebuffer;
        }
        if let Some(master) = &self.master {
            config.master_volume = master.clone();
        }
        config.swapstereo |= self.swapstereo;
        config.sample_accurate |= self.sample_accurate;

        config.validate().context("Invalid mixer settings")?;
        Ok(config)
    }
}
