use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::ring::{RingReader, output_ring};

fn mixer_with_ring(config: MixerConfig, capacity: usize) -> (Mixer, RingReader) {
    let (writer, reader) = output_ring(capacity);
    let mixer = Mixer::new(&config, Some(writer)).unwrap();
    (mixer, reader)
}

fn drain(reader: &mut RingReader) -> Vec<OutputFrame> {
    let mut out = vec![[0i16; 2]; reader.available()];
    let n = reader.pop_frames(&mut out);
    out.truncate(n);
    out
}

/// Channel handler producing a constant 16-bit stereo frame
fn constant_i16(frame: [i16; 2]) -> impl FnMut(&mut MixerChannel, usize) + Send + 'static {
    move |chan: &mut MixerChannel, due: usize| {
        let data: Vec<i16> = std::iter::repeat_n(frame, due).flatten().collect();
        chan.add_samples_i16(true, &data);
    }
}

/// Collects captured frames in memory
struct MemoryCapture {
    frames: Arc<Mutex<Vec<OutputFrame>>>,
    finished: Arc<AtomicUsize>,
}

impl CaptureSink for MemoryCapture {
    fn add_wave(&mut self, _rate: u32, frames: &[OutputFrame]) -> Result<(), MixerError> {
        self.frames.lock().unwrap().extend_from_slice(frames);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), MixerError> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================
// End-to-end mixing
// =============================================================

#[test]
fn test_two_u8_channels_one_second() {
    let (mut mixer, mut reader) = mixer_with_ring(MixerConfig::default(), 65536);

    let mut phase_a = 0u8;
    let a = mixer
        .add_channel(
            move |chan: &mut MixerChannel, due: usize| {
                let data: Vec<u8> = (0..due)
                    .map(|_| {
                        phase_a = phase_a.wrapping_add(8);
                        phase_a
                    })
                    .collect();
                chan.add_samples_u8(false, &data);
            },
            11025,
            "SB",
        )
        .unwrap();
    let b = mixer
        .add_channel(
            |chan: &mut MixerChannel, due: usize| chan.add_samples_u8(false, &vec![0xC0; due]),
            22050,
            "DISNEY",
        )
        .unwrap();
    a.enable(true);
    b.enable(true);
    a.set_volume(1.0, 1.0);
    b.set_volume(1.0, 1.0);

    for _ in 0..1000 {
        mixer.tick();
    }

    assert_eq!(reader.available(), 44100);
    let metrics = mixer.metrics();
    assert_eq!(metrics.total_frames_mixed, 44100);
    assert_eq!(metrics.total_frames_dropped, 0);
    assert_eq!(metrics.seconds_elapsed, 1);
    let summary = metrics.last_second.unwrap();
    assert_eq!(summary.frames, 44100);
    assert_eq!(summary.expected, 44100);

    // Channel B contributes a constant +64 << 8 once its first sample is loaded
    let frames = drain(&mut reader);
    assert!(frames[100..].iter().any(|f| f[0] != 0));
}

#[test]
fn test_equal_rate_channel_passes_through() {
    let (mut mixer, mut reader) = mixer_with_ring(MixerConfig::default(), 1024);
    let chan = mixer
        .add_channel(constant_i16([1000, -1000]), 44100, "DAC")
        .unwrap();
    chan.enable(true);

    mixer.tick();
    let frames = drain(&mut reader);
    assert_eq!(frames.len(), 45);
    assert!(frames.iter().all(|f| *f == [1000, -1000]));
}

#[test]
fn test_disabled_channel_is_not_mixed() {
    let (mut mixer, mut reader) = mixer_with_ring(MixerConfig::default(), 1024);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let _chan = mixer
        .add_channel(
            move |_: &mut MixerChannel, _: usize| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            22050,
            "OFF",
        )
        .unwrap();

    mixer.tick();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(drain(&mut reader).iter().all(|f| *f == [0, 0]));
}

#[test]
fn test_swapstereo_exchanges_sides() {
    let config = MixerConfig {
        swapstereo: true,
        ..Default::default()
    };
    let (mut mixer, mut reader) = mixer_with_ring(config, 1024);
    let chan = mixer
        .add_channel(constant_i16([1000, -1000]), 44100, "DAC")
        .unwrap();
    chan.enable(true);

    mixer.tick();
    assert!(drain(&mut reader).iter().all(|f| *f == [-1000, 1000]));
}

#[test]
fn test_output_is_clipped() {
    let (mut mixer, mut reader) = mixer_with_ring(MixerConfig::default(), 1024);
    let a = mixer
        .add_channel(constant_i16([30000, -30000]), 44100, "A")
        .unwrap();
    let b = mixer
        .add_channel(constant_i16([30000, -30000]), 44100, "B")
        .unwrap();
    a.enable(true);
    b.enable(true);

    mixer.tick();
    assert!(drain(&mut reader).iter().all(|f| *f == [32767, -32768]));
}

#[test]
fn test_master_volume_scales_output() {
    let (mut mixer, mut reader) = mixer_with_ring(MixerConfig::default(), 1024);
    let chan = mixer
        .add_channel(constant_i16([1000, 1000]), 44100, "DAC")
        .unwrap();
    chan.enable(true);
    mixer.set_master_volume(0.5, 0.25);
    assert_eq!(mixer.master_volume(), StereoVolume::new(0.5, 0.25));

    mixer.tick();
    assert!(drain(&mut reader).iter().all(|f| *f == [500, 250]));
}

#[test]
fn test_master_volume_from_config() {
    let config = MixerConfig {
        master_volume: "50".to_string(),
        ..Default::default()
    };
    let (mixer, _reader) = mixer_with_ring(config, 16);
    assert_eq!(mixer.master_volume(), StereoVolume::new(0.5, 0.5));
}

// =============================================================
// Ring overflow and metrics
// =============================================================

#[test]
fn test_full_ring_drops_frames() {
    let (mut mixer, reader) = mixer_with_ring(MixerConfig::default(), 100);
    for _ in 0..5 {
        mixer.tick();
    }
    assert_eq!(reader.available(), 100);

    let metrics = mixer.metrics();
    assert_eq!(metrics.frames_mixed, 45 + 44 * 4);
    assert_eq!(metrics.total_frames_dropped, 45 + 44 * 4 - 100);
    assert_eq!(metrics.buffer_fill, 100);
}

#[test]
fn test_channel_underruns_are_counted() {
    let (mut mixer, _reader) = mixer_with_ring(MixerConfig::default(), 4096);
    let chan = mixer
        .add_channel(
            |chan: &mut MixerChannel, due: usize| chan.add_samples_i16(false, &vec![1; due / 2]),
            44100,
            "SLOW",
        )
        .unwrap();
    chan.enable(true);

    for _ in 0..10 {
        mixer.tick();
    }
    assert!(mixer.metrics().channel_underruns > 0);
    assert!(chan.info().unwrap().underrun_wait <= 45);
}

// =============================================================
// Silent mode
// =============================================================

#[test]
fn test_silent_mode_keeps_time_without_rendering() {
    let mut mixer = Mixer::new(&MixerConfig::default(), None).unwrap();
    assert!(mixer.is_silent());

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let chan = mixer
        .add_channel(
            move |_: &mut MixerChannel, _: usize| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            44100,
            "SB",
        )
        .unwrap();
    chan.enable(true);

    for _ in 0..1000 {
        mixer.tick();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(mixer.metrics().seconds_elapsed, 1);
    assert_eq!(mixer.metrics().total_frames_mixed, 0);
}

#[test]
fn test_nosound_ignores_writer() {
    let config = MixerConfig {
        nosound: true,
        ..Default::default()
    };
    let (mut mixer, reader) = mixer_with_ring(config, 1024);
    assert!(mixer.is_silent());
    mixer.tick();
    assert_eq!(reader.available(), 0);
}

#[test]
fn test_invalid_config_rejected() {
    let config = MixerConfig {
        rate: 100,
        ..Default::default()
    };
    assert!(matches!(
        Mixer::new(&config, None),
        Err(MixerError::Config(_))
    ));
}

// =============================================================
// Channels
// =============================================================

#[test]
fn test_find_channel_and_drop_handle() {
    let mixer = Mixer::new(&MixerConfig::default(), None).unwrap();
    let handle = mixer
        .add_channel(|_: &mut MixerChannel, _: usize| {}, 22050, "GUS")
        .unwrap();
    handle.set_volume(0.5, 0.75);

    let info = mixer.find_channel("gus").unwrap();
    assert_eq!(info.name, "GUS");
    assert_eq!(info.src_rate, 22050);
    assert_eq!(info.volume, StereoVolume::new(0.5, 0.75));

    assert!(matches!(
        mixer.add_channel(|_: &mut MixerChannel, _: usize| {}, 44100, "Gus"),
        Err(MixerError::DuplicateChannel(_))
    ));

    drop(handle);
    assert!(mixer.find_channel("GUS").is_none());
    assert!(mixer.channels().is_empty());
}

#[test]
fn test_volume_listing_rows() {
    let mixer = Mixer::new(&MixerConfig::default(), None).unwrap();
    let _a = mixer
        .add_channel(|_: &mut MixerChannel, _: usize| {}, 44100, "SB")
        .unwrap();
    let _b = mixer
        .add_channel(|_: &mut MixerChannel, _: usize| {}, 44100, "FM")
        .unwrap();

    let rows = mixer.volume_listing();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], VOLUME_LISTING_HEADER);
    assert!(rows[1].starts_with("MASTER"));
    assert!(rows[2].starts_with("SB "));
    assert!(rows[3].starts_with("FM "));
}

// =============================================================
// Capture
// =============================================================

#[test]
fn test_capture_receives_clipped_frames() {
    let (mut mixer, _reader) = mixer_with_ring(MixerConfig::default(), 4096);
    let chan = mixer
        .add_channel(constant_i16([123, 456]), 44100, "DAC")
        .unwrap();
    chan.enable(true);

    let frames = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicUsize::new(0));
    mixer.start_capture(Box::new(MemoryCapture {
        frames: frames.clone(),
        finished: finished.clone(),
    }));
    assert!(mixer.is_capturing());

    for _ in 0..10 {
        mixer.tick();
    }
    mixer.stop_capture().unwrap();
    assert!(!mixer.is_capturing());
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    let captured = frames.lock().unwrap();
    assert_eq!(captured.len(), 45 + 44 * 9);
    assert!(captured.iter().all(|f| *f == [123, 456]));
}

#[test]
fn test_stop_finishes_capture() {
    let (mut mixer, _reader) = mixer_with_ring(MixerConfig::default(), 64);
    let finished = Arc::new(AtomicUsize::new(0));
    mixer.start_capture(Box::new(MemoryCapture {
        frames: Arc::new(Mutex::new(Vec::new())),
        finished: finished.clone(),
    }));
    mixer.stop().unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

// =============================================================
// Precision mode
// =============================================================

fn precision_config() -> MixerConfig {
    MixerConfig {
        sample_accurate: true,
        ..Default::default()
    }
}

#[test]
fn test_event_interval() {
    let nominal = Mixer::new(&MixerConfig::default(), None).unwrap();
    assert_eq!(nominal.event_interval_ms(), 1.0);

    let precise = Mixer::new(&precision_config(), None).unwrap();
    assert!((precise.event_interval_ms() - 1000.0 / 44100.0).abs() < 1e-12);
}

#[test]
fn test_sample_events_produce_one_frame_each() {
    let (mut mixer, reader) = mixer_with_ring(precision_config(), 65536);
    let chan = mixer
        .add_channel(constant_i16([10, 20]), 22050, "DAC")
        .unwrap();
    chan.enable(true);

    let interval = mixer.event_interval_ms();
    let mut total = 0;
    for i in 0..44100 {
        total += mixer.sample_event(i as f64 * interval, false);
    }

    assert_eq!(total, 44100);
    assert_eq!(reader.available(), 44100);
    assert_eq!(mixer.metrics().seconds_elapsed, 1);
    assert_eq!(mixer.metrics().last_second.unwrap().frames, 44100);
}

#[test]
fn test_drift_correction_throttles_when_emulation_stalls() {
    let (mut mixer, _reader) = mixer_with_ring(precision_config(), 4096);

    // Emulated time frozen while timing matters: audio gets ahead and stops
    let stalled: usize = (0..1000).map(|_| mixer.sample_event(0.0, true)).sum();
    assert!(stalled > 0);
    assert!(stalled < 100);

    // Once timing no longer matters the reference resets and output resumes
    let resumed: usize = (0..1000).map(|_| mixer.sample_event(0.0, false)).sum();
    assert_eq!(resumed, 1000);
}

#[test]
fn test_important_events_from_late_start_produce_one_frame_each() {
    let (mut mixer, reader) = mixer_with_ring(precision_config(), 65536);
    let interval = mixer.event_interval_ms();

    let due: Vec<usize> = (0..1000)
        .map(|i| mixer.sample_event(5000.0 + i as f64 * interval, true))
        .collect();

    assert!(due.iter().all(|&n| n == 1), "{:?}", &due[..5]);
    assert_eq!(reader.available(), 1000);
    assert_eq!(mixer.metrics().total_frames_dropped, 0);
}

#[test]
fn test_capture_from_late_start_keeps_pace() {
    let (mut mixer, _reader) = mixer_with_ring(precision_config(), 65536);
    let frames = Arc::new(Mutex::new(Vec::new()));
    mixer.start_capture(Box::new(MemoryCapture {
        frames: frames.clone(),
        finished: Arc::new(AtomicUsize::new(0)),
    }));

    // Nominal ticks before switching to timed events
    for _ in 0..10 {
        mixer.tick();
    }
    mixer.start_timing(12_000.0);
    let captured_before = frames.lock().unwrap().len();

    let interval = mixer.event_interval_ms();
    let total: usize = (0..441)
        .map(|i| mixer.sample_event(12_000.0 + i as f64 * interval, false))
        .sum();

    assert_eq!(total, 441);
    assert_eq!(frames.lock().unwrap().len(), captured_before + 441);
}

#[test]
fn test_mix_samples_splits_at_millisecond_boundary() {
    let (mut mixer, reader) = mixer_with_ring(MixerConfig::default(), 4096);
    assert_eq!(mixer.samples_this_ms(), 45);

    mixer.mix_samples(50);
    assert_eq!(reader.available(), 50);
    assert_eq!(mixer.samples_this_ms(), 44);

    // Finishing the millisecond only mixes what is left of it
    mixer.tick();
    assert_eq!(reader.available(), 45 + 44);
}
