//! pcmix core - real-time audio mixer for hardware emulators
//!
//! Combines independently clocked sound sources into one stereo stream for a
//! host audio device.
//!
//! # Architecture
//!
//! - [`ChannelRegistry`] - live channels, owned through RAII [`ChannelHandle`]s
//! - [`SampleFormat`] - decoding of raw 8/16/32-bit PCM into stereo pairs
//! - [`MixerChannel`] - per-source rate conversion into a bounded render buffer
//! - [`Mixer`] - per-millisecond (or per-sample) mixdown into the output ring
//! - [`PlaybackResampler`] - callback-side drain that absorbs rate mismatch
//! - [`MillisecondClock`] / [`DriftCorrector`] - drift-free frame scheduling
//! - [`AudioOutput`] / [`MixerSystem`] - cpal host stream and silent-mode fallback
//!
//! The producer (the emulator's timer) and the consumer (the host audio
//! callback) share only the lock-free output ring. Neither ever waits for
//! the other: the producer drops frames when the ring is full and the
//! consumer plays silence when it is empty.

pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod format;
pub mod gain;
pub mod metrics;
pub mod mixer;
pub mod output;
pub mod playback;
pub mod registry;
pub mod ring;
pub mod system;
pub mod timing;

pub use capture::{CaptureSink, WavCapture};
pub use channel::{ChannelStats, MixerChannel, RENDER_BUFFER_SIZE, RenderFrame};
pub use config::{MixerConfig, format_volume_row, parse_volume};
pub use error::MixerError;
pub use format::{ByteOrder, SampleFormat, SampleWidth};
pub use gain::{ChannelGain, StereoVolume, UNITY_GAIN, VOLUME_SHIFT};
pub use metrics::MixerMetrics;
pub use mixer::Mixer;
pub use output::AudioOutput;
pub use playback::{LatencyBounds, PlaybackResampler, PlaybackStats, PlaybackStatsShared};
pub use registry::{
    ChannelHandle, ChannelHandler, ChannelId, ChannelInfo, ChannelRegistry, MAX_CHANNEL_NAME_LEN,
};
pub use ring::{OUTPUT_BUFFER_SIZE, OutputFrame, RingReader, RingWriter, output_ring};
pub use system::MixerSystem;
pub use timing::{DriftCorrector, MillisecondClock, SampleClock, SecondSummary};
