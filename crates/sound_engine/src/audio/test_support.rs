//! Shared fixtures for sound core tests

use crate::audio::backend::NullOutput;
use crate::audio::cache::SoundBufferCache;
use crate::audio::format::{AudioFormat, PcmData};
use crate::audio::loudness::LoudnessIndex;
use crate::audio::mixer::CategoryVolumes;
use crate::audio::registry::PlaybackContext;
use crate::audio::resources::{MemoryResources, SoundRecord};
use crate::audio::spatial::SpatialAudio;
use crate::foundation::math::Vec3;
use crate::world::{EntityId, RegionId, SoundWorld};
use std::cell::RefCell;
use std::collections::HashMap;

/// Mutable world of positioned entities
#[derive(Default)]
pub struct TestWorld {
    entities: RefCell<HashMap<EntityId, (Vec3, RegionId)>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entity: EntityId, position: Vec3, region: RegionId) {
        self.entities.borrow_mut().insert(entity, (position, region));
    }

    pub fn move_to(&self, entity: EntityId, position: Vec3) {
        if let Some(entry) = self.entities.borrow_mut().get_mut(&entity) {
            entry.0 = position;
        }
    }

    pub fn remove(&self, entity: EntityId) {
        self.entities.borrow_mut().remove(&entity);
    }
}

impl SoundWorld for TestWorld {
    fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.entities.borrow().get(&entity).map(|(p, _)| *p)
    }

    fn exists(&self, entity: EntityId) -> bool {
        self.entities.borrow().contains_key(&entity)
    }

    fn region(&self, entity: EntityId) -> Option<RegionId> {
        self.entities.borrow().get(&entity).map(|(_, r)| *r)
    }
}

/// Mono buffer of exactly `bytes` bytes
pub fn pcm_of_size(bytes: usize) -> PcmData {
    PcmData::new(AudioFormat::new(8000, 1), vec![0; bytes / 2])
}

/// Store with the sounds used across the scenario tests
pub fn standard_resources() -> MemoryResources {
    let mut store = MemoryResources::new();
    store.add_sound("hit", SoundRecord::new("sound/hit.wav"), PcmData::tone(300.0, 0.5, 8000, 0.5));
    store.add_sound(
        "footstep",
        SoundRecord::new("sound/foot.wav").with_distances(1.0, 50.0),
        PcmData::tone(120.0, 0.2, 8000, 0.5),
    );
    store.add_sound("wind", SoundRecord::new("sound/wind.wav"), PcmData::tone(80.0, 1.0, 8000, 0.3));
    store.add_sound(
        "door",
        SoundRecord::new("sound/door.wav").with_volume(0.5),
        PcmData::tone(500.0, 2.0, 8000, 0.5),
    );
    store.add_file("vo/greeting.wav", PcmData::tone(220.0, 1.0, 8000, 0.5));
    store.add_file("vo/farewell.wav", PcmData::tone(180.0, 1.0, 8000, 0.5));
    store
}

/// Everything the registry needs, owned in one place
pub struct Harness {
    pub output: NullOutput,
    pub cache: SoundBufferCache,
    pub store: MemoryResources,
    pub world: TestWorld,
    pub volumes: CategoryVolumes,
    pub spatial: SpatialAudio,
    pub loudness: LoudnessIndex,
}

impl Harness {
    pub fn new(max_channels: usize) -> Self {
        Self {
            output: NullOutput::new(max_channels),
            cache: SoundBufferCache::new(1 << 20, 2 << 20),
            store: standard_resources(),
            world: TestWorld::new(),
            volumes: CategoryVolumes::default(),
            spatial: SpatialAudio::default(),
            loudness: LoudnessIndex::new(),
        }
    }

    pub fn ctx(&mut self) -> PlaybackContext<'_> {
        PlaybackContext {
            output: &mut self.output,
            cache: &mut self.cache,
            store: &self.store,
            decoder: &self.store,
            world: &self.world,
            volumes: &self.volumes,
            spatial: &self.spatial,
            loudness: &mut self.loudness,
        }
    }
}
