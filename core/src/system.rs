//! Mixer startup: output ring, host stream and mixer context in one place

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MixerConfig;
use crate::error::MixerError;
use crate::mixer::Mixer;
use crate::output::AudioOutput;
use crate::playback::{PlaybackStats, PlaybackStatsShared};
use crate::ring::{OUTPUT_BUFFER_SIZE, RingWriter, output_ring};

/// A mixer wired to the host audio device.
///
/// If the device cannot be opened the mixer runs in silent mode instead of
/// failing, so emulation keeps its timing.
pub struct MixerSystem {
    mixer: Mixer,
    output: Option<AudioOutput>,
}

impl MixerSystem {
    pub fn start(config: &MixerConfig) -> Result<Self, MixerError> {
        config.validate()?;

        if config.nosound {
            debug!("Mixer: no sound mode selected");
            return Self::silent(config);
        }

        let (writer, reader) = output_ring(OUTPUT_BUFFER_SIZE);
        let output = match AudioOutput::open(config, reader) {
            Ok(output) => output,
            Err(e) => {
                warn!("Can't open audio: {}, running in silent mode", e);
                return Self::silent(config);
            }
        };

        match mixer_for_device(config, output.sample_rate(), writer) {
            Ok(mixer) => {
                info!("Audio output running at {}Hz", output.sample_rate());
                Ok(Self {
                    mixer,
                    output: Some(output),
                })
            }
            Err(e) => {
                warn!(
                    "Device rate {}Hz unusable: {}, running in silent mode",
                    output.sample_rate(),
                    e
                );
                drop(output);
                Self::silent(config)
            }
        }
    }

    fn silent(config: &MixerConfig) -> Result<Self, MixerError> {
        Ok(Self {
            mixer: Mixer::new(config, None)?,
            output: None,
        })
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn output(&self) -> Option<&AudioOutput> {
        self.output.as_ref()
    }

    pub fn is_silent(&self) -> bool {
        self.mixer.is_silent()
    }

    pub fn playback_stats(&self) -> Option<Arc<PlaybackStatsShared>> {
        self.output.as_ref().map(AudioOutput::stats)
    }

    pub fn playback_snapshot(&self) -> Option<PlaybackStats> {
        self.output.as_ref().map(|output| output.stats().snapshot())
    }

    /// Stop the host stream, then finish the mixer
    pub fn stop(self) -> Result<(), MixerError> {
        drop(self.output);
        self.mixer.stop()
    }
}

/// Mixer at the rate the device actually opened with
fn mixer_for_device(
    config: &MixerConfig,
    device_rate: u32,
    writer: RingWriter,
) -> Result<Mixer, MixerError> {
    let negotiated = MixerConfig {
        rate: device_rate,
        ..config.clone()
    };
    Mixer::new(&negotiated, Some(writer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nosound_never_opens_device() {
        let config = MixerConfig {
            nosound: true,
            ..Default::default()
        };
        let system = MixerSystem::start(&config).unwrap();
        assert!(system.is_silent());
        assert!(system.output().is_none());
        assert!(system.playback_snapshot().is_none());
        system.stop().unwrap();
    }

    #[test]
    fn test_invalid_config_fails_before_device() {
        let config = MixerConfig {
            blocksize: 0,
            ..Default::default()
        };
        assert!(matches!(
            MixerSystem::start(&config),
            Err(MixerError::Config(_))
        ));
    }

    #[test]
    fn test_device_rate_is_adopted() {
        let (writer, _reader) = output_ring(1024);
        let mixer = mixer_for_device(&MixerConfig::default(), 48000, writer).unwrap();
        assert_eq!(mixer.rate(), 48000);
        assert!(!mixer.is_silent());
    }

    #[test]
    fn test_unusable_device_rate_falls_back_to_silent() {
        let config = MixerConfig::default();
        let (writer, _reader) = output_ring(1024);
        assert!(matches!(
            mixer_for_device(&config, 4000, writer),
            Err(MixerError::Config(_))
        ));

        let system = MixerSystem::silent(&config).unwrap();
        assert!(system.is_silent());
        assert_eq!(system.mixer().rate(), 44100);
    }
}
