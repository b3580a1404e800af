//! Sound buffer cache
//!
//! Decoded one-shot buffers live in a slot map addressed by [`BufferKey`].
//! Each buffer carries a use count; buffers at zero sit on an unused list
//! (front = most recently released) and are only freed when the total
//! footprint exceeds the configured maximum, oldest first, until it drops to
//! the minimum again.

use crate::audio::decoder::{decode_all, Decoder};
use crate::audio::format::PcmData;
use crate::audio::resources::ResourceStore;
use crate::audio::AudioError;
use crate::config::SoundConfig;
use slotmap::SlotMap;
use std::collections::{HashMap, VecDeque};

slotmap::new_key_type! {
    /// Stable handle to a cached buffer
    pub struct BufferKey;
}

/// A decoded sound held by the cache
#[derive(Debug)]
pub struct SoundBuffer {
    id: String,
    pcm: PcmData,
    volume: f32,
    min_distance: f32,
    max_distance: f32,
    use_count: usize,
}

impl SoundBuffer {
    /// Sound id this buffer was loaded for
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Decoded samples
    pub fn pcm(&self) -> &PcmData {
        &self.pcm
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.pcm.duration()
    }

    /// Memory footprint in bytes
    pub fn size_bytes(&self) -> usize {
        self.pcm.size_bytes()
    }

    /// Base volume from the sound record
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Resolved min falloff distance
    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    /// Resolved max falloff distance
    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Number of live references
    pub fn use_count(&self) -> usize {
        self.use_count
    }
}

/// Bounded cache of decoded sound buffers
pub struct SoundBufferCache {
    buffers: SlotMap<BufferKey, SoundBuffer>,
    by_name: HashMap<String, BufferKey>,
    /// Buffers with a use count of zero; front is the most recently released
    unused: VecDeque<BufferKey>,
    total_bytes: usize,
    min_bytes: usize,
    max_bytes: usize,
    default_min_distance: f32,
    default_max_distance: f32,
}

impl SoundBufferCache {
    /// Create an empty cache with the given footprint bounds
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        let defaults = SoundConfig::default();
        Self {
            buffers: SlotMap::with_key(),
            by_name: HashMap::new(),
            unused: VecDeque::new(),
            total_bytes: 0,
            min_bytes: min_bytes.min(max_bytes),
            max_bytes,
            default_min_distance: defaults.default_min_distance,
            default_max_distance: defaults.default_max_distance,
        }
    }

    /// Create a cache using the bounds and falloff defaults from `config`
    pub fn from_config(config: &SoundConfig) -> Self {
        let mut cache = Self::new(config.buffer_cache_min, config.buffer_cache_max);
        cache.set_default_distances(config.default_min_distance, config.default_max_distance);
        cache
    }

    /// Falloff distances used for records that leave them unset
    pub fn set_default_distances(&mut self, min_distance: f32, max_distance: f32) {
        self.default_min_distance = min_distance;
        self.default_max_distance = max_distance;
    }

    /// Look up or decode `sound_id` and take a reference to it
    ///
    /// # Errors
    /// - `ResourceNotFound` if the store has no record for `sound_id` or the
    ///   record's file is missing
    /// - `DecodeError` / `UnsupportedFormat` if the file cannot be decoded
    pub fn get_or_load(
        &mut self,
        sound_id: &str,
        store: &dyn ResourceStore,
        decoder: &dyn Decoder,
    ) -> Result<BufferKey, AudioError> {
        let key = self.load(sound_id, store, decoder)?;
        self.acquire(key);
        Ok(key)
    }

    /// Decode `sound_id` into the cache without taking a reference
    pub fn preload(
        &mut self,
        sound_id: &str,
        store: &dyn ResourceStore,
        decoder: &dyn Decoder,
    ) -> Result<BufferKey, AudioError> {
        self.load(sound_id, store, decoder)
    }

    fn load(
        &mut self,
        sound_id: &str,
        store: &dyn ResourceStore,
        decoder: &dyn Decoder,
    ) -> Result<BufferKey, AudioError> {
        if let Some(&key) = self.by_name.get(sound_id) {
            return Ok(key);
        }

        let record = store
            .sound_record(sound_id)
            .ok_or_else(|| AudioError::ResourceNotFound(sound_id.to_string()))?;

        let pcm = decoder
            .open(&record.file)
            .and_then(|mut stream| decode_all(stream.as_mut()))
            .map_err(|e| match e {
                AudioError::ResourceNotFound(_) | AudioError::UnsupportedFormat(_) => e,
                other => AudioError::DecodeError {
                    resource: record.file.clone(),
                    reason: other.to_string(),
                },
            })?;
        if pcm.samples.is_empty() {
            return Err(AudioError::DecodeError {
                resource: record.file.clone(),
                reason: "no audio data".to_string(),
            });
        }

        let (min_distance, max_distance) =
            record.resolved_distances(self.default_min_distance, self.default_max_distance);
        let buffer = SoundBuffer {
            id: sound_id.to_string(),
            volume: record.volume.clamp(0.0, 1.0),
            pcm,
            min_distance,
            max_distance,
            use_count: 0,
        };

        let size = buffer.size_bytes();
        let key = self.buffers.insert(buffer);
        self.by_name.insert(sound_id.to_string(), key);
        self.total_bytes += size;
        log::debug!(
            "Loaded sound '{}' from '{}' ({} bytes, cache {} bytes)",
            sound_id,
            record.file,
            size,
            self.total_bytes
        );

        // The new buffer joins the unused list only after eviction so it is
        // never a candidate for its own load.
        self.evict_if_needed();
        self.unused.push_front(key);
        Ok(key)
    }

    fn acquire(&mut self, key: BufferKey) {
        if let Some(buffer) = self.buffers.get_mut(key) {
            if buffer.use_count == 0 {
                self.unused.retain(|k| *k != key);
            }
            buffer.use_count += 1;
        }
    }

    /// Drop one reference to `key`
    ///
    /// At zero the buffer moves to the front of the unused list; it stays
    /// decoded until cache pressure evicts it.
    pub fn release(&mut self, key: BufferKey) {
        let Some(buffer) = self.buffers.get_mut(key) else {
            return;
        };
        if buffer.use_count == 0 {
            return;
        }
        buffer.use_count -= 1;
        if buffer.use_count == 0 {
            self.unused.push_front(key);
        }
    }

    fn evict_if_needed(&mut self) {
        if self.total_bytes <= self.max_bytes {
            return;
        }

        while self.total_bytes > self.min_bytes {
            let Some(key) = self.unused.pop_back() else {
                log::warn!(
                    "No unused sound buffers left to free; cache at {} bytes (max {})",
                    self.total_bytes,
                    self.max_bytes
                );
                return;
            };
            if let Some(buffer) = self.buffers.remove(key) {
                self.by_name.remove(&buffer.id);
                self.total_bytes -= buffer.size_bytes();
                log::debug!("Evicted sound buffer '{}' ({} bytes)", buffer.id, buffer.size_bytes());
            }
        }
    }

    /// Change the footprint bounds, evicting at once if now above max
    pub fn set_bounds(&mut self, min_bytes: usize, max_bytes: usize) {
        self.min_bytes = min_bytes.min(max_bytes);
        self.max_bytes = max_bytes;
        self.evict_if_needed();
    }

    /// Free every buffer with a use count of zero
    pub fn clear_unused(&mut self) {
        for key in self.unused.drain(..) {
            if let Some(buffer) = self.buffers.remove(key) {
                self.by_name.remove(&buffer.id);
                self.total_bytes -= buffer.size_bytes();
            }
        }
    }

    /// Buffer for a key
    pub fn get(&self, key: BufferKey) -> Option<&SoundBuffer> {
        self.buffers.get(key)
    }

    /// Key of a cached sound id
    pub fn key_for(&self, sound_id: &str) -> Option<BufferKey> {
        self.by_name.get(sound_id).copied()
    }

    /// Use count of a cached sound id (0 when not cached)
    pub fn use_count(&self, sound_id: &str) -> usize {
        self.key_for(sound_id)
            .and_then(|key| self.buffers.get(key))
            .map_or(0, |buffer| buffer.use_count)
    }

    /// Total decoded bytes held
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of cached buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the cache holds no buffers
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of buffers eligible for eviction
    pub fn unused_count(&self) -> usize {
        self.unused.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use crate::audio::resources::{MemoryResources, SoundRecord};

    /// Mono buffer of exactly `bytes` bytes
    fn pcm_of_size(bytes: usize) -> PcmData {
        PcmData::new(AudioFormat::new(8000, 1), vec![0; bytes / 2])
    }

    fn store_with(sounds: &[(&str, usize)]) -> MemoryResources {
        let mut store = MemoryResources::new();
        for (id, bytes) in sounds {
            store.add_sound(*id, SoundRecord::new(format!("{id}.wav")), pcm_of_size(*bytes));
        }
        store
    }

    #[test]
    fn test_no_redundant_decode_while_referenced() {
        let store = store_with(&[("door", 1000)]);
        let mut cache = SoundBufferCache::new(10_000, 20_000);

        let a = cache.get_or_load("door", &store, &store).unwrap();
        let b = cache.get_or_load("door", &store, &store).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.open_count("door.wav"), 1);
        assert_eq!(cache.use_count("door"), 2);
        assert_eq!(cache.unused_count(), 0);
    }

    #[test]
    fn test_missing_record_and_missing_file() {
        let mut store = MemoryResources::new();
        store.add_record("ghost", SoundRecord::new("ghost.wav"));
        let mut cache = SoundBufferCache::new(100, 200);

        assert!(matches!(
            cache.get_or_load("nothing", &store, &store),
            Err(AudioError::ResourceNotFound(_))
        ));
        assert!(matches!(
            cache.get_or_load("ghost", &store, &store),
            Err(AudioError::ResourceNotFound(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_data_is_a_decode_error() {
        let mut store = MemoryResources::new();
        store.add_sound("blank", SoundRecord::new("blank.wav"), pcm_of_size(0));
        let mut cache = SoundBufferCache::new(100, 200);

        assert!(matches!(
            cache.get_or_load("blank", &store, &store),
            Err(AudioError::DecodeError { .. })
        ));
    }

    #[test]
    fn test_release_keeps_buffer_decoded() {
        let store = store_with(&[("door", 1000)]);
        let mut cache = SoundBufferCache::new(10_000, 20_000);

        let key = cache.get_or_load("door", &store, &store).unwrap();
        cache.release(key);
        cache.release(key);
        assert_eq!(cache.use_count("door"), 0);
        assert_eq!(cache.unused_count(), 1);
        assert!(cache.get(key).is_some());

        // Reacquiring does not decode again
        cache.get_or_load("door", &store, &store).unwrap();
        assert_eq!(store.open_count("door.wav"), 1);
        assert_eq!(cache.unused_count(), 0);
    }

    #[test]
    fn test_eviction_skips_referenced_buffers() {
        let store = store_with(&[("a", 400), ("b", 400), ("c", 400)]);
        let mut cache = SoundBufferCache::new(500, 1000);

        let a = cache.get_or_load("a", &store, &store).unwrap();
        let b = cache.get_or_load("b", &store, &store).unwrap();
        cache.release(b);

        // 1200 > 1000: only "b" may go; "a" is held and "c" is new
        let c = cache.get_or_load("c", &store, &store).unwrap();
        assert!(cache.get(a).is_some());
        assert!(cache.get(b).is_none());
        assert!(cache.get(c).is_some());
        assert_eq!(cache.total_bytes(), 800);
    }

    #[test]
    fn test_overflow_without_candidates_keeps_new_buffer() {
        let store = store_with(&[("a", 600), ("b", 600)]);
        let mut cache = SoundBufferCache::new(500, 1000);

        cache.get_or_load("a", &store, &store).unwrap();
        let b = cache.get_or_load("b", &store, &store).unwrap();
        assert!(cache.get(b).is_some());
        assert_eq!(cache.total_bytes(), 1200);
    }

    #[test]
    fn test_oldest_unused_evicted_first() {
        let store = store_with(&[("a", 300), ("b", 300), ("c", 300), ("d", 300)]);
        let mut cache = SoundBufferCache::new(600, 1000);

        for id in ["a", "b", "c"] {
            let key = cache.get_or_load(id, &store, &store).unwrap();
            cache.release(key);
        }
        cache.get_or_load("d", &store, &store).unwrap();

        assert!(cache.key_for("a").is_none());
        assert!(cache.key_for("b").is_none());
        assert!(cache.key_for("c").is_some());
        assert!(cache.key_for("d").is_some());
        assert_eq!(cache.total_bytes(), 600);
    }

    #[test]
    fn test_preload_does_not_hold_reference() {
        let store = store_with(&[("a", 100)]);
        let mut cache = SoundBufferCache::new(1000, 2000);

        let key = cache.preload("a", &store, &store).unwrap();
        assert_eq!(cache.use_count("a"), 0);
        assert_eq!(cache.unused_count(), 1);
        assert_eq!(cache.get(key).map(SoundBuffer::size_bytes), Some(100));
    }

    #[test]
    fn test_set_bounds_and_clear_unused() {
        let store = store_with(&[("a", 400), ("b", 400)]);
        let mut cache = SoundBufferCache::new(1000, 2000);

        let a = cache.get_or_load("a", &store, &store).unwrap();
        cache.preload("b", &store, &store).unwrap();

        cache.set_bounds(100, 500);
        assert!(cache.key_for("b").is_none());
        assert_eq!(cache.total_bytes(), 400);

        cache.release(a);
        cache.clear_unused();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_record_settings_are_applied() {
        let mut store = MemoryResources::new();
        store.add_sound(
            "step",
            SoundRecord::new("step.wav").with_volume(0.5).with_distances(2.0, 40.0),
            pcm_of_size(64),
        );
        store.add_sound("plain", SoundRecord::new("plain.wav"), pcm_of_size(64));
        let mut cache = SoundBufferCache::new(1000, 2000);
        cache.set_default_distances(5.0, 500.0);

        let step = cache.get_or_load("step", &store, &store).unwrap();
        let plain = cache.get_or_load("plain", &store, &store).unwrap();
        let step = cache.get(step).unwrap();
        assert_eq!(step.volume(), 0.5);
        assert_eq!((step.min_distance(), step.max_distance()), (2.0, 40.0));
        let plain = cache.get(plain).unwrap();
        assert_eq!((plain.min_distance(), plain.max_distance()), (5.0, 500.0));
    }
}
