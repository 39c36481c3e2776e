//! Channel registry and owning channel handles
//!
//! The registry owns every live [`MixerChannel`] together with its pull
//! handler, keyed by a stable [`ChannelId`]. Devices hold a [`ChannelHandle`];
//! dropping the handle removes the channel, so subsystem teardown never
//! leaves dangling entries behind.
//!
//! The registry sits behind a mutex shared by the producer tick and by
//! configuration code adjusting gains from other threads. Gain changes land
//! either before or after a tick, never in the middle of one.

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::channel::MixerChannel;
use crate::error::MixerError;
use crate::gain::StereoVolume;
use crate::metrics::ChannelTickReport;

/// Longest accepted channel name, in characters
pub const MAX_CHANNEL_NAME_LEN: usize = 31;

/// Pull callback invoked once per tick with the number of source samples due.
///
/// The handler pushes samples into the channel it is given. It runs with the
/// registry locked, so it must not call back into [`ChannelHandle`] methods.
pub type ChannelHandler = Box<dyn FnMut(&mut MixerChannel, usize) + Send>;

/// Stable identity of a registered channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u32);

/// Point-in-time view of a channel's settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub src_rate: u32,
    pub volume: StereoVolume,
    pub scale: f32,
    pub enabled: bool,
    pub underrun_wait: usize,
}

impl ChannelInfo {
    fn of(id: ChannelId, channel: &MixerChannel) -> Self {
        Self {
            id,
            name: channel.name().to_string(),
            src_rate: channel.src_rate(),
            volume: channel.gain().volume(),
            scale: channel.gain().scale(),
            enabled: channel.is_enabled(),
            underrun_wait: channel.underrun_wait(),
        }
    }
}

struct ChannelEntry {
    channel: MixerChannel,
    handler: ChannelHandler,
}

/// Owned set of live mixer channels
pub struct ChannelRegistry {
    entries: HashMap<ChannelId, ChannelEntry>,
    next_id: u32,
    mixer_rate: u32,
    master: StereoVolume,
}

impl ChannelRegistry {
    pub fn new(mixer_rate: u32) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            mixer_rate,
            master: StereoVolume::UNITY,
        }
    }

    /// Create and link a channel. New channels start disabled at unity gain.
    pub fn add(
        &mut self,
        handler: ChannelHandler,
        rate: u32,
        name: &str,
    ) -> Result<ChannelId, MixerError> {
        if name.chars().count() > MAX_CHANNEL_NAME_LEN {
            return Err(MixerError::ChannelNameTooLong(name.to_string()));
        }
        if self.find(name).is_some() {
            return Err(MixerError::DuplicateChannel(name.to_string()));
        }

        let id = ChannelId(self.next_id);
        self.next_id += 1;
        let channel = MixerChannel::new(name, rate, self.mixer_rate, self.master);
        self.entries.insert(id, ChannelEntry { channel, handler });
        debug!("Added mixer channel '{}' at {} Hz", name, rate);
        Ok(id)
    }

    /// Case-insensitive lookup by name
    pub fn find(&self, name: &str) -> Option<ChannelId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.channel.name().eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    /// Unlink and destroy a channel. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: ChannelId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                debug!("Removed mixer channel '{}'", entry.channel.name());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ChannelId) -> Option<&MixerChannel> {
        self.entries.get(&id).map(|entry| &entry.channel)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut MixerChannel> {
        self.entries.get_mut(&id).map(|entry| &mut entry.channel)
    }

    pub fn info(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.get(id).map(|channel| ChannelInfo::of(id, channel))
    }

    /// Snapshot of every channel, sorted by registration order
    pub fn infos(&self) -> Vec<ChannelInfo> {
        let mut infos: Vec<_> = self
            .entries
            .iter()
            .map(|(id, entry)| ChannelInfo::of(*id, &entry.channel))
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn master_volume(&self) -> StereoVolume {
        self.master
    }

    /// Change the master volume and recompute every channel's multipliers
    pub fn set_master_volume(&mut self, master: StereoVolume) {
        self.master = master;
        for entry in self.entries.values_mut() {
            entry.channel.set_master(master);
        }
    }

    /// Ask every enabled channel's handler for its share of `needed` frames.
    ///
    /// `frames_per_ms` is the nominal render cap for this millisecond.
    pub(crate) fn mix_data(&mut self, needed: usize, frames_per_ms: usize) -> ChannelTickReport {
        let mut report = ChannelTickReport::default();
        for entry in self.entries.values_mut() {
            let channel = &mut entry.channel;
            if !channel.is_enabled() {
                continue;
            }
            channel.begin_tick(frames_per_ms);
            let before = channel.stats();
            let due = channel.source_samples_due(needed);
            if due > 0 {
                (entry.handler)(channel, due);
            }
            let after = channel.stats();
            report.render_overruns += after.render_overruns - before.render_overruns;
            report.samples_discarded += after.samples_discarded - before.samples_discarded;
        }
        report
    }

    /// Sum every enabled channel into `accum` (cleared first) and drop the
    /// consumed frames from the channels' render buffers
    pub(crate) fn render_out(&mut self, accum: &mut [[i64; 2]], report: &mut ChannelTickReport) {
        accum.fill([0; 2]);
        let needed = accum.len();
        for entry in self.entries.values_mut() {
            let channel = &mut entry.channel;
            if channel.is_enabled() {
                if channel.mix_into(accum, needed) {
                    report.underruns += 1;
                }
            } else {
                channel.clear_rendered();
            }
        }
    }
}

/// Registry shared between the mixer and every channel handle
pub type SharedRegistry = Arc<Mutex<ChannelRegistry>>;

/// Lock the registry, recovering the data if a handler panicked while holding it
pub(crate) fn lock_registry(registry: &Mutex<ChannelRegistry>) -> MutexGuard<'_, ChannelRegistry> {
    registry.lock().unwrap_or_else(|e| {
        warn!("Mixer channel registry mutex poisoned; continuing");
        e.into_inner()
    })
}

/// Owning handle to a registered channel.
///
/// All setters take effect atomically with respect to the mixing tick.
/// Dropping the handle unregisters the channel.
pub struct ChannelHandle {
    id: ChannelId,
    name: String,
    registry: SharedRegistry,
}

impl ChannelHandle {
    pub(crate) fn new(id: ChannelId, name: &str, registry: SharedRegistry) -> Self {
        Self {
            id,
            name: name.to_string(),
            registry,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_channel<R>(&self, f: impl FnOnce(&mut MixerChannel) -> R) -> Option<R> {
        lock_registry(&self.registry).get_mut(self.id).map(f)
    }

    pub fn set_freq(&self, rate: u32) {
        self.with_channel(|channel| channel.set_freq(rate));
    }

    pub fn set_volume(&self, left: f32, right: f32) {
        self.with_channel(|channel| channel.set_volume(left, right));
    }

    pub fn set_scale(&self, scale: f32) {
        self.with_channel(|channel| channel.set_scale(scale));
    }

    pub fn enable(&self, enabled: bool) {
        self.with_channel(|channel| channel.enable(enabled));
    }

    pub fn is_enabled(&self) -> bool {
        self.with_channel(|channel| channel.is_enabled())
            .unwrap_or(false)
    }

    pub fn set_overrendering(&self, allow: bool) {
        self.with_channel(|channel| channel.set_overrendering(allow));
    }

    /// Current per-channel volume, or unity if the channel is gone
    pub fn volume(&self) -> StereoVolume {
        self.with_channel(|channel| channel.gain().volume())
            .unwrap_or(StereoVolume::UNITY)
    }

    pub fn info(&self) -> Option<ChannelInfo> {
        lock_registry(&self.registry).info(self.id)
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        lock_registry(&self.registry).remove(self.id);
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent() -> ChannelHandler {
        Box::new(|_: &mut MixerChannel, _: usize| {})
    }

    #[test]
    fn test_add_and_find_case_insensitive() {
        let mut registry = ChannelRegistry::new(44100);
        let id = registry.add(silent(), 22050, "SB").unwrap();
        assert_eq!(registry.find("sb"), Some(id));
        assert_eq!(registry.find("Sb"), Some(id));
        assert_eq!(registry.find("GUS"), None);
    }

    #[test]
    fn test_new_channel_defaults() {
        let mut registry = ChannelRegistry::new(44100);
        let id = registry.add(silent(), 11025, "SPKR").unwrap();
        let info = registry.info(id).unwrap();
        assert!(!info.enabled);
        assert_eq!(info.src_rate, 11025);
        assert_eq!(info.volume, StereoVolume::UNITY);
        assert_eq!(info.scale, 1.0);
    }

    #[test]
    fn test_name_too_long_is_rejected() {
        let mut registry = ChannelRegistry::new(44100);
        let name = "X".repeat(MAX_CHANNEL_NAME_LEN + 1);
        let err = registry.add(silent(), 44100, &name).unwrap_err();
        assert!(matches!(err, MixerError::ChannelNameTooLong(_)));

        let ok = "Y".repeat(MAX_CHANNEL_NAME_LEN);
        assert!(registry.add(silent(), 44100, &ok).is_ok());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = ChannelRegistry::new(44100);
        registry.add(silent(), 44100, "FM").unwrap();
        let err = registry.add(silent(), 44100, "fm").unwrap_err();
        assert!(matches!(err, MixerError::DuplicateChannel(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unlinks_channel() {
        let mut registry = ChannelRegistry::new(44100);
        let id = registry.add(silent(), 44100, "CDAUDIO").unwrap();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.find("CDAUDIO").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_master_volume_recomputes_all_channels() {
        let mut registry = ChannelRegistry::new(44100);
        let a = registry.add(silent(), 44100, "A").unwrap();
        let b = registry.add(silent(), 44100, "B").unwrap();
        registry.get_mut(b).unwrap().set_volume(0.5, 0.5);

        registry.set_master_volume(StereoVolume::new(0.5, 0.25));
        assert_eq!(registry.get(a).unwrap().gain().multiplier(), [4096, 2048]);
        assert_eq!(registry.get(b).unwrap().gain().multiplier(), [2048, 1024]);
    }

    #[test]
    fn test_infos_sorted_by_registration() {
        let mut registry = ChannelRegistry::new(44100);
        for name in ["ONE", "TWO", "THREE", "FOUR"] {
            registry.add(silent(), 44100, name).unwrap();
        }
        let names: Vec<_> = registry.infos().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["ONE", "TWO", "THREE", "FOUR"]);
    }

    #[test]
    fn test_handle_drop_removes_channel() {
        let registry: SharedRegistry = Arc::new(Mutex::new(ChannelRegistry::new(44100)));
        let id = lock_registry(&registry).add(silent(), 44100, "GUS").unwrap();
        let handle = ChannelHandle::new(id, "GUS", registry.clone());

        handle.enable(true);
        handle.set_volume(0.5, 1.0);
        let info = handle.info().unwrap();
        assert!(info.enabled);
        assert_eq!(info.volume, StereoVolume::new(0.5, 1.0));
        assert_eq!(handle.volume(), StereoVolume::new(0.5, 1.0));

        drop(handle);
        assert!(lock_registry(&registry).is_empty());
    }

    #[test]
    fn test_handler_receives_due_samples() {
        let mut registry = ChannelRegistry::new(44100);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = registry
            .add(
                Box::new(move |_: &mut MixerChannel, due: usize| sink.lock().unwrap().push(due)),
                22050,
                "DAC",
            )
            .unwrap();

        // Disabled channels are not asked for samples
        registry.mix_data(44, 44);
        assert!(seen.lock().unwrap().is_empty());

        registry.get_mut(id).unwrap().enable(true);
        registry.mix_data(44, 44);
        registry.mix_data(45, 45);
        assert_eq!(*seen.lock().unwrap(), vec![22, 22]);
    }
}
