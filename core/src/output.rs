//! Host audio output using cpal
//!
//! The stream callback owns a [`PlaybackResampler`] over the consumer end of
//! the output ring and converts its 16-bit frames to whatever sample format
//! the device negotiated.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error};

use crate::config::MixerConfig;
use crate::error::MixerError;
use crate::playback::{LatencyBounds, PlaybackResampler, PlaybackStatsShared};
use crate::ring::{OutputFrame, RingReader};

/// A running host output stream
pub struct AudioOutput {
    /// The cpal stream (kept alive for the duration)
    _stream: cpal::Stream,
    sample_rate: u32,
    blocksize: Option<u32>,
    bounds: LatencyBounds,
    stats: Arc<PlaybackStatsShared>,
}

impl AudioOutput {
    /// Open the default output device and start playing from `reader`.
    ///
    /// Asks for a stereo stream at `config.rate` with a fixed block size and
    /// falls back to the device's default configuration when that is not
    /// supported. The negotiated rate is available from [`sample_rate`](Self::sample_rate).
    pub fn open(config: &MixerConfig, reader: RingReader) -> Result<Self, MixerError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(MixerError::NoOutputDevice)?;

        let supported = negotiate(&device, config.rate)?;
        let sample_format = supported.sample_format();
        let blocksize = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&config.blocksize) =>
            {
                Some(config.blocksize)
            }
            _ => None,
        };

        let mut stream_config: cpal::StreamConfig = supported.into();
        stream_config.buffer_size = match blocksize {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        };

        let sample_rate = stream_config.sample_rate.0;
        if sample_rate != config.rate || blocksize.is_none() {
            debug!(
                "Mixer got different values from the device: rate {}Hz, blocksize {:?}",
                sample_rate, blocksize
            );
        }

        let bounds = config.latency_bounds(sample_rate, blocksize.unwrap_or(config.blocksize));
        let resampler = PlaybackResampler::new(reader, bounds);
        let stats = resampler.stats();

        let stream = match sample_format {
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, resampler, |s| s)?
            }
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, resampler, |s| {
                    f32::from(s) / 32768.0
                })?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, resampler, |s| {
                    (i32::from(s) + 32768) as u16
                })?
            }
            other => {
                return Err(MixerError::Stream(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| MixerError::Stream(format!("Failed to play audio stream: {}", e)))?;

        debug!(
            "Audio stream started: {}Hz, {} channels, {:?}, min/max={}/{}",
            sample_rate,
            stream_config.channels,
            sample_format,
            bounds.min_needed,
            bounds.max_needed
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
            blocksize,
            bounds,
            stats,
        })
    }

    /// Negotiated output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated fixed block size, if the device accepted one
    pub fn blocksize(&self) -> Option<u32> {
        self.blocksize
    }

    pub fn latency_bounds(&self) -> LatencyBounds {
        self.bounds
    }

    pub fn stats(&self) -> Arc<PlaybackStatsShared> {
        self.stats.clone()
    }
}

/// Pick a stereo configuration at `rate`, or the device default
fn negotiate(device: &cpal::Device, rate: u32) -> Result<cpal::SupportedStreamConfig, MixerError> {
    let wanted = cpal::SampleRate(rate);
    let stereo = device
        .supported_output_configs()
        .ok()
        .into_iter()
        .flatten()
        .filter(|range| range.channels() == 2)
        .filter(|range| range.min_sample_rate() <= wanted && wanted <= range.max_sample_rate())
        .max_by_key(|range| range.sample_format() == cpal::SampleFormat::I16);

    match stereo {
        Some(range) => Ok(range.with_sample_rate(wanted)),
        None => device
            .default_output_config()
            .map_err(|e| MixerError::Stream(format!("Failed to get default output config: {}", e))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut resampler: PlaybackResampler,
    convert: fn(i16) -> T,
) -> Result<cpal::Stream, MixerError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    // Pre-allocate the frame buffer for the callback
    let mut frames: Vec<OutputFrame> = vec![[0; 2]; 4096];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let needed = data.len() / channels;
                if frames.len() < needed {
                    frames.resize(needed, [0; 2]);
                }
                let block = &mut frames[..needed];
                resampler.fill(block);
                write_interleaved(data, channels, block, convert);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| MixerError::Stream(format!("Failed to build audio stream: {}", e)))
}

/// Spread stereo frames over a device buffer with `channels` interleaved channels.
///
/// Mono devices get the average of both sides; extra channels are silent.
fn write_interleaved<T: Copy>(
    data: &mut [T],
    channels: usize,
    frames: &[OutputFrame],
    convert: fn(i16) -> T,
) {
    let silence = convert(0);
    for (slot, frame) in data.chunks_mut(channels).zip(frames) {
        match slot {
            [mono] => {
                *mono = convert(((i32::from(frame[0]) + i32::from(frame[1])) / 2) as i16);
            }
            [left, right, rest @ ..] => {
                *left = convert(frame[0]);
                *right = convert(frame[1]);
                rest.fill(silence);
            }
            [] => {}
        }
    }
    let covered = frames.len() * channels;
    if covered < data.len() {
        data[covered..].fill(silence);
    }
}
