//! Capture of the final mixed stream
//!
//! While a [`CaptureSink`] is installed on the mixer, every tick's clipped
//! output frames are handed to it. [`WavCapture`] records them to a 16-bit
//! stereo WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::MixerError;
use crate::ring::OutputFrame;

/// Receiver for the mixer's output frames
pub trait CaptureSink: Send {
    /// Append one tick's frames, mixed at `rate` Hz
    fn add_wave(&mut self, rate: u32, frames: &[OutputFrame]) -> Result<(), MixerError>;

    /// Flush and close the recording
    fn finish(self: Box<Self>) -> Result<(), MixerError>;
}

/// Records captured audio to a WAV file
pub struct WavCapture {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    rate: u32,
    frames_written: u64,
}

impl WavCapture {
    pub fn create(path: impl AsRef<Path>, rate: u32) -> Result<Self, MixerError> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        debug!("Capturing mixer output to {}", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
            rate,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn close(&mut self) -> Result<(), MixerError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            debug!(
                "Finished capture {} ({} frames)",
                self.path.display(),
                self.frames_written
            );
        }
        Ok(())
    }
}

impl CaptureSink for WavCapture {
    fn add_wave(&mut self, rate: u32, frames: &[OutputFrame]) -> Result<(), MixerError> {
        if rate != self.rate {
            warn!(
                "Capture rate changed from {} to {} Hz; file header keeps {} Hz",
                self.rate, rate, self.rate
            );
            self.rate = rate;
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for frame in frames {
            writer.write_sample(frame[0])?;
            writer.write_sample(frame[1])?;
        }
        self.frames_written += frames.len() as u64;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), MixerError> {
        self.close()
    }
}

impl Drop for WavCapture {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to finalize capture {}: {}", self.path.display(), e);
        }
    }
}
