//! Mixer error types

use crate::registry::MAX_CHANNEL_NAME_LEN;

/// Errors raised while configuring the mixer or opening its host output.
///
/// Runtime faults on the audio path (render overrun/underrun, ring overflow,
/// drift anomalies) are never reported through this type. They are logged
/// and counted in [`crate::MixerMetrics`] instead.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("Mixer channel name '{0}' is longer than {MAX_CHANNEL_NAME_LEN} characters")]
    ChannelNameTooLong(String),

    #[error("Mixer channel '{0}' is already registered")]
    DuplicateChannel(String),

    #[error("No audio output device available")]
    NoOutputDevice,

    #[error("Failed to open audio stream: {0}")]
    Stream(String),

    #[error("Invalid mixer configuration: {0}")]
    Config(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Audio capture failed: {0}")]
    Capture(#[from] hound::Error),
}
