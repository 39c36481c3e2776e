//! Output ring buffer between the mixing tick and the playback callback
//!
//! Single producer (the mixing tick) and single consumer (the host audio
//! callback). Neither side ever waits: the writer stops pushing when the ring
//! is full and the reader only sees frames that were completely written.

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

/// Default ring capacity in stereo frames (~370ms at 44.1kHz)
pub const OUTPUT_BUFFER_SIZE: usize = 16 * 1024;

/// A clipped, interleaved stereo output frame
pub type OutputFrame = [i16; 2];

/// Create a ring holding up to `capacity` frames and split it into its two ends
pub fn output_ring(capacity: usize) -> (RingWriter, RingReader) {
    let ring = HeapRb::<OutputFrame>::new(capacity.max(1));
    let (producer, consumer) = ring.split();
    (RingWriter { producer }, RingReader { consumer })
}

/// Producer end, owned by the mixer
pub struct RingWriter {
    producer: HeapProd<OutputFrame>,
}

impl RingWriter {
    /// Push frames in order until the ring is full.
    ///
    /// Returns how many were written; the rest of the slice is dropped by the caller.
    pub fn push_frames(&mut self, frames: &[OutputFrame]) -> usize {
        self.producer.push_slice(frames)
    }

    /// Frames written but not yet consumed
    pub fn occupied(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }
}

/// Consumer end, owned by the playback callback
pub struct RingReader {
    consumer: HeapCons<OutputFrame>,
}

impl RingReader {
    /// Total frames waiting to be played
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// The longest run of unread frames that is contiguous in memory
    pub fn sequential(&self) -> &[OutputFrame] {
        self.consumer.as_slices().0
    }

    /// Mark the first `count` unread frames as played
    pub fn consume(&mut self, count: usize) -> usize {
        self.consumer.skip(count)
    }

    /// Pop up to `out.len()` frames in order
    pub fn pop_frames(&mut self, out: &mut [OutputFrame]) -> usize {
        self.consumer.pop_slice(out)
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring() {
        let (writer, reader) = output_ring(8);
        assert_eq!(writer.occupied(), 0);
        assert_eq!(reader.available(), 0);
        assert!(reader.sequential().is_empty());
        assert_eq!(reader.capacity(), 8);
    }

    #[test]
    fn test_push_stops_when_full() {
        let (mut writer, reader) = output_ring(4);
        let frames: Vec<OutputFrame> = (0..6).map(|i| [i, -i]).collect();
        assert_eq!(writer.push_frames(&frames), 4);
        assert_eq!(writer.vacant(), 0);
        assert_eq!(reader.available(), 4);
        assert_eq!(writer.push_frames(&frames), 0);
    }

    #[test]
    fn test_fifo_order_across_wrap() {
        let (mut writer, mut reader) = output_ring(4);
        writer.push_frames(&[[1, 1], [2, 2], [3, 3]]);
        assert_eq!(reader.consume(2), 2);
        writer.push_frames(&[[4, 4], [5, 5], [6, 6]]);

        let mut out = [[0i16; 2]; 8];
        let n = reader.pop_frames(&mut out);
        assert_eq!(&out[..n], &[[3, 3], [4, 4], [5, 5], [6, 6]]);
    }

    #[test]
    fn test_sequential_is_prefix_of_unread() {
        let (mut writer, mut reader) = output_ring(4);
        writer.push_frames(&[[1, 1], [2, 2], [3, 3], [4, 4]]);
        reader.consume(3);
        writer.push_frames(&[[5, 5], [6, 6]]);

        let head = reader.sequential().to_vec();
        assert!(!head.is_empty());
        assert_eq!(head[0], [4, 4]);
        assert!(head.len() <= reader.available());
    }

    #[test]
    fn test_occupancy_stays_in_bounds_under_interleaving() {
        let (mut writer, mut reader) = output_ring(16);
        let mut next: i16 = 0;
        let mut expected: i16 = 0;

        for step in 0..200usize {
            let burst: Vec<OutputFrame> = (0..(step % 7))
                .map(|k| {
                    let v = next.wrapping_add(k as i16);
                    [v, v]
                })
                .collect();
            let pushed = writer.push_frames(&burst);
            next = next.wrapping_add(pushed as i16);
            assert!(writer.occupied() <= 16);

            let mut out = vec![[0i16; 2]; step % 5];
            let popped = reader.pop_frames(&mut out);
            for frame in &out[..popped] {
                // Unread data is never overwritten: frames come out in push order
                assert_eq!(frame[0], expected);
                expected = expected.wrapping_add(1);
            }
            assert!(reader.available() <= 16);
        }
    }
}
