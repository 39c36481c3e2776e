//! Raw PCM sample formats and decoding
//!
//! Emulated devices hand the mixer raw sample bytes in whatever layout their
//! hardware produces. A [`SampleFormat`] describes that layout (width,
//! signedness, channel count, byte order) and decodes one frame at a time into
//! the mixer's 16-bit sample domain.
//!
//! 16-bit and 32-bit sources both carry 16-bit range data; 32-bit values are
//! passed through unscaled. 8-bit values are shifted up by 8 bits.

/// Width of a single raw sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleWidth {
    Bits8,
    Bits16,
    Bits32,
}

impl SampleWidth {
    /// Size of one sample value in bytes
    pub const fn bytes(self) -> usize {
        match self {
            SampleWidth::Bits8 => 1,
            SampleWidth::Bits16 => 2,
            SampleWidth::Bits32 => 4,
        }
    }
}

/// Byte order of multi-byte sample values relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Native,
    Swapped,
}

/// Layout descriptor for raw PCM data pushed into a mixer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub width: SampleWidth,
    pub signed: bool,
    pub stereo: bool,
    pub byte_order: ByteOrder,
}

const fn fmt(width: SampleWidth, signed: bool, stereo: bool, byte_order: ByteOrder) -> SampleFormat {
    SampleFormat {
        width,
        signed,
        stereo,
        byte_order,
    }
}

impl SampleFormat {
    pub const U8_MONO: Self = fmt(SampleWidth::Bits8, false, false, ByteOrder::Native);
    pub const U8_STEREO: Self = fmt(SampleWidth::Bits8, false, true, ByteOrder::Native);
    pub const I8_MONO: Self = fmt(SampleWidth::Bits8, true, false, ByteOrder::Native);
    pub const I8_STEREO: Self = fmt(SampleWidth::Bits8, true, true, ByteOrder::Native);
    pub const I16_MONO: Self = fmt(SampleWidth::Bits16, true, false, ByteOrder::Native);
    pub const I16_STEREO: Self = fmt(SampleWidth::Bits16, true, true, ByteOrder::Native);
    pub const U16_MONO: Self = fmt(SampleWidth::Bits16, false, false, ByteOrder::Native);
    pub const U16_STEREO: Self = fmt(SampleWidth::Bits16, false, true, ByteOrder::Native);
    pub const I32_MONO: Self = fmt(SampleWidth::Bits32, true, false, ByteOrder::Native);
    pub const I32_STEREO: Self = fmt(SampleWidth::Bits32, true, true, ByteOrder::Native);
    pub const I16_MONO_SWAPPED: Self = fmt(SampleWidth::Bits16, true, false, ByteOrder::Swapped);
    pub const I16_STEREO_SWAPPED: Self = fmt(SampleWidth::Bits16, true, true, ByteOrder::Swapped);
    pub const U16_MONO_SWAPPED: Self = fmt(SampleWidth::Bits16, false, false, ByteOrder::Swapped);
    pub const U16_STEREO_SWAPPED: Self = fmt(SampleWidth::Bits16, false, true, ByteOrder::Swapped);
    pub const I32_MONO_SWAPPED: Self = fmt(SampleWidth::Bits32, true, false, ByteOrder::Swapped);
    pub const I32_STEREO_SWAPPED: Self = fmt(SampleWidth::Bits32, true, true, ByteOrder::Swapped);

    /// Every encoding devices are expected to use
    pub const ALL: [SampleFormat; 16] = [
        Self::U8_MONO,
        Self::U8_STEREO,
        Self::I8_MONO,
        Self::I8_STEREO,
        Self::I16_MONO,
        Self::I16_STEREO,
        Self::U16_MONO,
        Self::U16_STEREO,
        Self::I32_MONO,
        Self::I32_STEREO,
        Self::I16_MONO_SWAPPED,
        Self::I16_STEREO_SWAPPED,
        Self::U16_MONO_SWAPPED,
        Self::U16_STEREO_SWAPPED,
        Self::I32_MONO_SWAPPED,
        Self::I32_STEREO_SWAPPED,
    ];

    /// Number of interleaved channels (1 or 2)
    pub const fn channels(self) -> usize {
        if self.stereo { 2 } else { 1 }
    }

    /// Size of one frame (all channels) in bytes
    pub const fn frame_bytes(self) -> usize {
        self.width.bytes() * self.channels()
    }

    /// Number of whole frames contained in `data`
    pub fn frame_count(self, data: &[u8]) -> usize {
        data.len() / self.frame_bytes()
    }

    /// Decode one frame into a 16-bit-domain `[left, right]` pair.
    ///
    /// Mono frames report the same value on both sides. `frame` must hold at
    /// least [`frame_bytes`](Self::frame_bytes) bytes.
    pub fn decode_frame(self, frame: &[u8]) -> [i64; 2] {
        let width = self.width.bytes();
        let left = self.decode_value(&frame[..width]);
        let right = if self.stereo {
            self.decode_value(&frame[width..2 * width])
        } else {
            left
        };
        [left, right]
    }

    /// Iterate over every whole frame in `data`. A trailing partial frame is ignored.
    pub fn frames(self, data: &[u8]) -> impl Iterator<Item = [i64; 2]> + '_ {
        data.chunks_exact(self.frame_bytes())
            .map(move |frame| self.decode_frame(frame))
    }

    fn decode_value(self, bytes: &[u8]) -> i64 {
        match self.width {
            SampleWidth::Bits8 => {
                let raw = if self.signed { bytes[0] } else { bytes[0] ^ 0x80 };
                ((raw as i8) as i64) << 8
            }
            SampleWidth::Bits16 => {
                let mut raw = u16::from_ne_bytes([bytes[0], bytes[1]]);
                if self.byte_order == ByteOrder::Swapped {
                    raw = raw.swap_bytes();
                }
                if !self.signed {
                    raw ^= 0x8000;
                }
                (raw as i16) as i64
            }
            SampleWidth::Bits32 => {
                let mut raw = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if self.byte_order == ByteOrder::Swapped {
                    raw = raw.swap_bytes();
                }
                if !self.signed {
                    raw ^= 0x8000_0000;
                }
                (raw as i32) as i64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swapped16(v: u16) -> [u8; 2] {
        v.swap_bytes().to_ne_bytes()
    }

    // =============================================================
    // 8-bit
    // =============================================================

    #[test]
    fn test_unsigned_8bit_centering() {
        let f = SampleFormat::U8_MONO;
        assert_eq!(f.decode_frame(&[0x00]), [-32768, -32768]);
        assert_eq!(f.decode_frame(&[0x80]), [0, 0]);
        assert_eq!(f.decode_frame(&[0xFF]), [32512, 32512]);
        assert_eq!(f.decode_frame(&[0x81]), [256, 256]);
    }

    #[test]
    fn test_signed_8bit() {
        let f = SampleFormat::I8_MONO;
        assert_eq!(f.decode_frame(&[0x00]), [0, 0]);
        assert_eq!(f.decode_frame(&[0x7F]), [32512, 32512]);
        assert_eq!(f.decode_frame(&[0x80]), [-32768, -32768]);
        assert_eq!(f.decode_frame(&[0xFF]), [-256, -256]);
    }

    #[test]
    fn test_stereo_8bit_keeps_channel_order() {
        assert_eq!(SampleFormat::U8_STEREO.decode_frame(&[0x00, 0xFF]), [-32768, 32512]);
        assert_eq!(SampleFormat::I8_STEREO.decode_frame(&[0x01, 0xFE]), [256, -512]);
    }

    // =============================================================
    // 16-bit
    // =============================================================

    #[test]
    fn test_signed_16bit_native() {
        let f = SampleFormat::I16_MONO;
        assert_eq!(f.decode_frame(&1234i16.to_ne_bytes()), [1234, 1234]);
        assert_eq!(f.decode_frame(&(-32768i16).to_ne_bytes()), [-32768, -32768]);
    }

    #[test]
    fn test_unsigned_16bit_native() {
        let f = SampleFormat::U16_MONO;
        assert_eq!(f.decode_frame(&0u16.to_ne_bytes()), [-32768, -32768]);
        assert_eq!(f.decode_frame(&0x8000u16.to_ne_bytes()), [0, 0]);
        assert_eq!(f.decode_frame(&0xFFFFu16.to_ne_bytes()), [32767, 32767]);
    }

    #[test]
    fn test_16bit_swapped_byte_order() {
        assert_eq!(
            SampleFormat::I16_MONO_SWAPPED.decode_frame(&swapped16(0x1234)),
            [0x1234, 0x1234]
        );
        assert_eq!(
            SampleFormat::U16_MONO_SWAPPED.decode_frame(&swapped16(0x8001)),
            [1, 1]
        );

        let mut stereo = Vec::new();
        stereo.extend_from_slice(&swapped16((-2i16) as u16));
        stereo.extend_from_slice(&swapped16(300));
        assert_eq!(SampleFormat::I16_STEREO_SWAPPED.decode_frame(&stereo), [-2, 300]);
    }

    #[test]
    fn test_unsigned_16bit_stereo() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x7FFFu16.to_ne_bytes());
        data.extend_from_slice(&0xC000u16.to_ne_bytes());
        assert_eq!(SampleFormat::U16_STEREO.decode_frame(&data), [-1, 0x4000]);

        let mut swapped = Vec::new();
        swapped.extend_from_slice(&swapped16(0x7FFF));
        swapped.extend_from_slice(&swapped16(0xC000));
        assert_eq!(SampleFormat::U16_STEREO_SWAPPED.decode_frame(&swapped), [-1, 0x4000]);
    }

    // =============================================================
    // 32-bit
    // =============================================================

    #[test]
    fn test_32bit_passes_value_through() {
        let f = SampleFormat::I32_MONO;
        assert_eq!(f.decode_frame(&(-1000i32).to_ne_bytes()), [-1000, -1000]);

        let swapped = (20000i32 as u32).swap_bytes().to_ne_bytes();
        assert_eq!(SampleFormat::I32_MONO_SWAPPED.decode_frame(&swapped), [20000, 20000]);

        let mut stereo = Vec::new();
        stereo.extend_from_slice(&5i32.to_ne_bytes());
        stereo.extend_from_slice(&(-7i32).to_ne_bytes());
        assert_eq!(SampleFormat::I32_STEREO.decode_frame(&stereo), [5, -7]);

        let mut stereo_swapped = Vec::new();
        stereo_swapped.extend_from_slice(&(5u32).swap_bytes().to_ne_bytes());
        stereo_swapped.extend_from_slice(&((-7i32) as u32).swap_bytes().to_ne_bytes());
        assert_eq!(SampleFormat::I32_STEREO_SWAPPED.decode_frame(&stereo_swapped), [5, -7]);
    }

    // =============================================================
    // Framing
    // =============================================================

    #[test]
    fn test_frame_sizes() {
        assert_eq!(SampleFormat::U8_MONO.frame_bytes(), 1);
        assert_eq!(SampleFormat::U8_STEREO.frame_bytes(), 2);
        assert_eq!(SampleFormat::I16_STEREO.frame_bytes(), 4);
        assert_eq!(SampleFormat::I32_STEREO_SWAPPED.frame_bytes(), 8);
    }

    #[test]
    fn test_all_formats_are_distinct() {
        for (i, a) in SampleFormat::ALL.iter().enumerate() {
            for b in &SampleFormat::ALL[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_frames_ignores_trailing_partial_frame() {
        let data = [0x80u8, 0x80, 0xFF, 0x00, 0x42];
        let frames: Vec<_> = SampleFormat::U8_STEREO.frames(&data).collect();
        assert_eq!(frames, vec![[0, 0], [32512, -32768]]);
        assert_eq!(SampleFormat::U8_STEREO.frame_count(&data), 2);
    }
}
