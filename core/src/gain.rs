//! Per-channel and master gain as fixed-point multipliers
//!
//! Gain is applied once, when a source sample is decoded. Interpolation and
//! mixdown then work on already-scaled values, so every multiplier carries
//! [`VOLUME_SHIFT`] fraction bits that the mixdown stage shifts back out.

/// Fraction bits in a gain multiplier
pub const VOLUME_SHIFT: u32 = 13;

/// Multiplier for unity gain (1.0 scale, full channel and master volume)
pub const UNITY_GAIN: i64 = 1 << VOLUME_SHIFT;

/// A left/right volume pair (1.0 = unity)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoVolume {
    pub left: f32,
    pub right: f32,
}

impl StereoVolume {
    pub const UNITY: Self = Self {
        left: 1.0,
        right: 1.0,
    };

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

impl Default for StereoVolume {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Fixed-point multiplier for one side: `2^13 * scale * channel * master`
#[inline]
pub fn gain_multiplier(scale: f32, channel: f32, master: f32) -> i64 {
    (UNITY_GAIN as f32 * scale * channel * master) as i64
}

/// Gain parameters of one channel and the multipliers derived from them.
///
/// Every setter recomputes the multipliers before returning, so they are never
/// stale with respect to the stored parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelGain {
    volume: StereoVolume,
    scale: f32,
    multiplier: [i64; 2],
}

impl ChannelGain {
    /// Unity volume and scale under the given master volume
    pub fn new(master: StereoVolume) -> Self {
        let mut gain = Self {
            volume: StereoVolume::UNITY,
            scale: 1.0,
            multiplier: [UNITY_GAIN; 2],
        };
        gain.refresh(master);
        gain
    }

    pub fn set_volume(&mut self, volume: StereoVolume, master: StereoVolume) {
        self.volume = volume;
        self.refresh(master);
    }

    pub fn set_scale(&mut self, scale: f32, master: StereoVolume) {
        self.scale = scale;
        self.refresh(master);
    }

    /// Recompute the multipliers, e.g. after the master volume changed
    pub fn refresh(&mut self, master: StereoVolume) {
        self.multiplier = [
            gain_multiplier(self.scale, self.volume.left, master.left),
            gain_multiplier(self.scale, self.volume.right, master.right),
        ];
    }

    pub fn volume(&self) -> StereoVolume {
        self.volume
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// `[left, right]` multipliers with [`VOLUME_SHIFT`] fraction bits
    pub fn multiplier(&self) -> [i64; 2] {
        self.multiplier
    }
}
