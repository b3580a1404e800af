//! End-to-end scenarios across cache, registry and facade

use super::backend::NullOutput;
use super::resources::{MemoryResources, SoundRecord};
use super::test_support::{pcm_of_size, standard_resources, TestWorld};
use super::*;
use crate::config::SoundConfig;
use crate::foundation::math::Vec3;
use crate::world::{EntityId, RegionId};
use std::rc::Rc;

const MIB: usize = 1024 * 1024;

fn manager(config: &SoundConfig, store: MemoryResources, world: Rc<TestWorld>) -> (SoundManager, Rc<MemoryResources>) {
    let store = Rc::new(store);
    let services = SoundServices {
        decoder: Box::new(Rc::clone(&store)),
        store: Box::new(Rc::clone(&store)),
        world,
    };
    let sound = SoundManager::new(config, Box::new(NullOutput::new(config.max_channels)), services);
    (sound, store)
}

#[test]
fn test_cache_pressure_evicts_back_to_minimum() {
    let mut store = MemoryResources::new();
    for i in 0..6 {
        store.add_sound(format!("clip{i}"), SoundRecord::new(format!("clip{i}.wav")), pcm_of_size(MIB / 2));
    }
    let mut cache = SoundBufferCache::new(MIB, 2 * MIB);

    let held: Vec<BufferKey> = (0..5)
        .map(|i| cache.get_or_load(&format!("clip{i}"), &store, &store).unwrap())
        .collect();
    // Everything is referenced, so the overflow is tolerated
    assert_eq!(cache.total_bytes(), 5 * MIB / 2);
    for key in held {
        cache.release(key);
    }
    assert_eq!(cache.unused_count(), 5);

    let sixth = cache.get_or_load("clip5", &store, &store).unwrap();
    assert!(cache.total_bytes() <= MIB);
    assert_eq!(cache.total_bytes(), MIB);
    assert!(cache.get(sixth).is_some());
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_footstep_volume_is_attenuated_but_audible() {
    let world = Rc::new(TestWorld::new());
    let walker = EntityId(12);
    world.add(walker, Vec3::new(10.0, 0.0, 0.0), RegionId(0));
    let (mut sound, _) = manager(&SoundConfig::default(), standard_resources(), world);

    let handle = sound.play_sound_3d(
        walker,
        "footstep",
        PlayParams::default().with_category(SoundCategory::Movement),
    );
    sound.update(0.01);

    let volume = sound.effective_volume(handle).unwrap();
    assert!(volume > 0.0);
    assert!(volume < 1.0);
}

#[test]
fn test_no_redundant_decode_across_instances() {
    let world = Rc::new(TestWorld::new());
    let (a, b) = (EntityId(1), EntityId(2));
    world.add(a, Vec3::zeros(), RegionId(0));
    world.add(b, Vec3::zeros(), RegionId(0));
    let (mut sound, store) = manager(&SoundConfig::default(), standard_resources(), world);

    sound.play_sound_3d(a, "door", PlayParams::default());
    sound.play_sound_3d(b, "door", PlayParams::default());
    sound.play_sound("door", PlayParams::default());
    assert_eq!(sound.active_sound_count(), 3);
    assert_eq!(store.open_count("sound/door.wav"), 1);
}

#[test]
fn test_stopped_sound_is_gone_after_next_update() {
    let world = Rc::new(TestWorld::new());
    let (mut sound, _) = manager(&SoundConfig::default(), standard_resources(), world);

    let handle = sound.play_sound(
        "wind",
        PlayParams::default().with_mode(PlayMode::LOOP),
    );
    sound.stop_sound("wind");
    assert!(!sound.get_sound_playing(None, "wind"));
    sound.update(0.1);
    assert!(!sound.is_sound_playing(handle));
    assert_eq!(sound.active_sound_count(), 0);
}

#[test]
fn test_channel_exhaustion_is_a_soft_failure() {
    let config = SoundConfig {
        max_channels: 2,
        ..Default::default()
    };
    let world = Rc::new(TestWorld::new());
    let (mut sound, _) = manager(&config, standard_resources(), world);

    assert!(sound.play_sound("hit", PlayParams::default()).is_valid());
    assert!(sound.play_sound("door", PlayParams::default()).is_valid());
    assert!(!sound.play_sound("wind", PlayParams::default()).is_valid());

    // Channels come back once sounds finish
    for _ in 0..6 {
        sound.update(0.1);
    }
    assert!(sound.play_sound("wind", PlayParams::default()).is_valid());
}

#[test]
fn test_settings_change_updates_cache_bounds() {
    let world = Rc::new(TestWorld::new());
    let (mut sound, _) = manager(&SoundConfig::default(), standard_resources(), world);
    sound.preload_sound("door");
    sound.preload_sound("wind");
    let before = sound.cache_bytes();
    assert!(before > 0);

    let tight = SoundConfig {
        buffer_cache_min: 0,
        buffer_cache_max: 1,
        ..Default::default()
    };
    sound.process_changed_settings(&tight);
    assert_eq!(sound.cache_bytes(), 0);
}
