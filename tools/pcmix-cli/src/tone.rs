//! Tone voices standing in for emulated sound devices
//!
//! Each voice owns a mixer channel at its own sample rate and pushes raw PCM
//! in its own format, the way a sound card emulation would.

use anyhow::{Context, Result};
use pcmix_core::{ByteOrder, ChannelHandle, Mixer, MixerChannel, SampleFormat, SampleWidth};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
}

/// A synthetic device: channel name, rate, raw format and tone
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub name: &'static str,
    pub rate: u32,
    pub format: SampleFormat,
    pub waveform: Waveform,
    pub frequency: f32,
    pub amplitude: f32,
}

pub const VOICES: &[Voice] = &[
    Voice {
        name: "SPKR",
        rate: 11025,
        format: SampleFormat::U8_MONO,
        waveform: Waveform::Square,
        frequency: 440.0,
        amplitude: 0.15,
    },
    Voice {
        name: "DISNEY",
        rate: 7000,
        format: SampleFormat::I8_MONO,
        waveform: Waveform::Square,
        frequency: 110.0,
        amplitude: 0.15,
    },
    Voice {
        name: "SB",
        rate: 22050,
        format: SampleFormat::U8_STEREO,
        waveform: Waveform::Saw,
        frequency: 220.0,
        amplitude: 0.2,
    },
    Voice {
        name: "FM",
        rate: 49716,
        format: SampleFormat::I16_STEREO,
        waveform: Waveform::Sine,
        frequency: 330.0,
        amplitude: 0.25,
    },
    Voice {
        name: "GUS",
        rate: 44100,
        format: SampleFormat::U16_STEREO_SWAPPED,
        waveform: Waveform::Sine,
        frequency: 554.37,
        amplitude: 0.2,
    },
    Voice {
        name: "CDAUDIO",
        rate: 44100,
        format: SampleFormat::I32_MONO,
        waveform: Waveform::Sine,
        frequency: 659.25,
        amplitude: 0.15,
    },
];

/// Phase-continuous tone source for one voice
pub struct ToneGenerator {
    voice: Voice,
    phase: f32,
    scratch: Vec<u8>,
}

impl ToneGenerator {
    pub fn new(voice: Voice) -> Self {
        Self {
            voice,
            phase: 0.0,
            scratch: Vec::new(),
        }
    }

    /// Next sample in the 16-bit domain
    fn next_value(&mut self) -> i16 {
        let shape = match self.voice.waveform {
            Waveform::Sine => (self.phase * std::f32::consts::TAU).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * self.phase - 1.0,
        };
        self.phase = (self.phase + self.voice.frequency / self.voice.rate as f32).fract();
        (shape * self.voice.amplitude * f32::from(i16::MAX)) as i16
    }

    /// Channel handler body: push `due` source frames
    pub fn render(&mut self, channel: &mut MixerChannel, due: usize) {
        let format = self.voice.format;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        for _ in 0..due {
            let value = self.next_value();
            // Stereo voices sit left of centre
            encode_frame(format, [value, value / 2], &mut scratch);
        }
        channel.add_samples(format, &scratch);
        self.scratch = scratch;
    }
}

/// Append one frame in `format`'s raw layout
pub fn encode_frame(format: SampleFormat, frame: [i16; 2], out: &mut Vec<u8>) {
    let swapped = format.byte_order == ByteOrder::Swapped;
    for &value in &frame[..format.channels()] {
        match format.width {
            SampleWidth::Bits8 => {
                let raw = (value >> 8) as u8;
                out.push(if format.signed { raw } else { raw ^ 0x80 });
            }
            SampleWidth::Bits16 => {
                let mut raw = value as u16;
                if !format.signed {
                    raw ^= 0x8000;
                }
                if swapped {
                    raw = raw.swap_bytes();
                }
                out.extend_from_slice(&raw.to_ne_bytes());
            }
            SampleWidth::Bits32 => {
                let mut raw = i32::from(value) as u32;
                if !format.signed {
                    raw ^= 0x8000_0000;
                }
                if swapped {
                    raw = raw.swap_bytes();
                }
                out.extend_from_slice(&raw.to_ne_bytes());
            }
        }
    }
}

fn selected(voice: &Voice, only: &[String]) -> bool {
    only.is_empty() || only.iter().any(|name| name.eq_ignore_ascii_case(voice.name))
}

/// Register and enable the selected voices. Dropping the handles removes them.
pub fn attach_voices(mixer: &Mixer, only: &[String]) -> Result<Vec<ChannelHandle>> {
    let mut handles = Vec::new();
    for voice in VOICES.iter().copied().filter(|voice| selected(voice, only)) {
        let mut generator = ToneGenerator::new(voice);
        let handle = mixer
            .add_channel(
                move |channel: &mut MixerChannel, due: usize| generator.render(channel, due),
                voice.rate,
                voice.name,
            )
            .with_context(|| format!("Failed to add voice {}", voice.name))?;
        handle.enable(true);
        handles.push(handle);
    }

    if handles.is_empty() {
        anyhow::bail!("No voice matches {:?}; see `pcmix voices`", only);
    }
    Ok(handles)
}

pub fn print_voices() {
    println!("{:<8} {:>6}  {:<28} Tone", "Voice", "Rate", "Format");
    for voice in VOICES {
        println!(
            "{:<8} {:>6}  {:<28} {:?} {:.0}Hz",
            voice.name,
            voice.rate,
            format!(
                "{:?} {} {} {:?}",
                voice.format.width,
                if voice.format.signed { "signed" } else { "unsigned" },
                if voice.format.stereo { "stereo" } else { "mono" },
                voice.format.byte_order
            ),
            voice.waveform,
            voice.frequency
        );
    }
}
