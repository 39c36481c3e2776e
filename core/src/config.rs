//! Mixer configuration (`[mixer]`-style TOML)
//!
//! Read once at startup. Every key is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MixerError;
use crate::gain::StereoVolume;
use crate::playback::{LatencyBounds, MAX_PREBUFFER_MS};

/// Accepted output sample rates
pub const RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=192_000;

/// Accepted host block sizes, in frames
pub const BLOCKSIZE_RANGE: std::ops::RangeInclusive<u32> = 64..=16384;

/// Mixer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Output sample rate in Hz (default: 44100)
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Host callback block size in frames (default: 1024)
    #[serde(default = "default_blocksize")]
    pub blocksize: u32,
    /// Target buffered latency in ms (default: 20, max: 90)
    #[serde(default = "default_prebuffer")]
    pub prebuffer: u32,
    /// Keep the clock running without rendering or opening a device
    #[serde(default)]
    pub nosound: bool,
    /// Swap left and right at output
    #[serde(default)]
    pub swapstereo: bool,
    /// Schedule one mixing event per output sample instead of per millisecond
    #[serde(default)]
    pub sample_accurate: bool,
    /// Master volume, in the same syntax as [`parse_volume`] (default: "100")
    #[serde(default = "default_master_volume")]
    pub master_volume: String,
}

fn default_rate() -> u32 {
    44100
}
fn default_blocksize() -> u32 {
    1024
}
fn default_prebuffer() -> u32 {
    20
}
fn default_master_volume() -> String {
    "100".to_string()
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            blocksize: default_blocksize(),
            prebuffer: default_prebuffer(),
            nosound: false,
            swapstereo: false,
            sample_accurate: false,
            master_volume: default_master_volume(),
        }
    }
}

impl MixerConfig {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MixerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MixerError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the mixer cannot run with.
    ///
    /// An oversized prebuffer is not an error; it is clamped when the latency
    /// bounds are derived.
    pub fn validate(&self) -> Result<(), MixerError> {
        if !RATE_RANGE.contains(&self.rate) {
            return Err(MixerError::Config(format!(
                "rate {} outside {}..={}",
                self.rate,
                RATE_RANGE.start(),
                RATE_RANGE.end()
            )));
        }
        if !BLOCKSIZE_RANGE.contains(&self.blocksize) {
            return Err(MixerError::Config(format!(
                "blocksize {} outside {}..={}",
                self.blocksize,
                BLOCKSIZE_RANGE.start(),
                BLOCKSIZE_RANGE.end()
            )));
        }
        if self.prebuffer > MAX_PREBUFFER_MS {
            warn!(
                "Mixer prebuffer {}ms clamped to {}ms",
                self.prebuffer, MAX_PREBUFFER_MS
            );
        }
        Ok(())
    }

    /// Prebuffer actually used, in ms
    pub fn prebuffer_ms(&self) -> u32 {
        self.prebuffer.min(MAX_PREBUFFER_MS)
    }

    /// Ring occupancy window for the given (possibly device-negotiated) rate and block size
    pub fn latency_bounds(&self, rate: u32, blocksize: u32) -> LatencyBounds {
        LatencyBounds::new(rate, blocksize, self.prebuffer_ms())
    }

    pub fn master(&self) -> StereoVolume {
        parse_volume(&self.master_volume, StereoVolume::UNITY)
    }
}

/// Parse a volume string into a left/right pair, starting from `current`.
///
/// `"L[:R]"` is in percent, a single value applies to both sides. A leading
/// `D` switches to decibels (`"D-6"`). Negative results reset to 1.0 and
/// characters that do not start a number are skipped.
pub fn parse_volume(text: &str, current: StereoVolume) -> StereoVolume {
    let mut left = current.left;
    let mut right = current.right;
    let mut rest = text;

    let decibels = rest.starts_with(['D', 'd']);
    if decibels {
        rest = &rest[1..];
    }

    let mut second = false;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix(':') {
            rest = after;
            second = true;
        }
        let Some((value, len)) = leading_number(rest) else {
            let mut chars = rest.chars();
            chars.next();
            rest = chars.as_str();
            continue;
        };
        rest = &rest[len..];

        let mut value = if decibels {
            10f32.powf(value / 20.0)
        } else {
            value / 100.0
        };
        if value < 0.0 {
            value = 1.0;
        }
        if second {
            right = value;
        } else {
            left = value;
        }
    }

    if !second {
        right = left;
    }
    StereoVolume::new(left, right)
}

/// Longest prefix of `text` that parses as a decimal number, and its byte length
fn leading_number(text: &str) -> Option<(f32, usize)> {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if !text[digits_start..end].bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    // Optional exponent, only if followed by digits
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        if bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            end = exp_end;
        }
    }

    text[..end].parse().ok().map(|value| (value, end))
}

/// One line of the volume listing: percent and dB for both sides
pub fn format_volume_row(name: &str, volume: StereoVolume) -> String {
    format!(
        "{:<8} {:>3.0}:{:<3.0}  {:+.2}:{:<+.2}",
        name,
        volume.left * 100.0,
        volume.right * 100.0,
        20.0 * volume.left.log10(),
        20.0 * volume.right.log10()
    )
}

/// Heading printed above [`format_volume_row`] lines
pub const VOLUME_LISTING_HEADER: &str = "Channel  Main    Main(dB)";
