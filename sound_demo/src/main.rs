//! Sound demo application
//!
//! Simulates a guard patrolling around the listener for a few seconds:
//! footsteps follow the guard, the guard speaks, a playlist streams in the
//! background and the guard's region is finally unloaded. Every resource is
//! synthesized in memory, so the demo runs without any asset files.
//!
//! Build with `--features rodio` to hear it on the default output device.

use rand::Rng;
use sound_engine::audio::resources::{MemoryResources, SoundRecord};
use sound_engine::audio::PcmData;
use sound_engine::foundation::logging;
use sound_engine::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

const SAMPLE_RATE: u32 = 22_050;
const TICK: f32 = 1.0 / 30.0;
const GUARD: EntityId = EntityId(1);
const BARRACKS: RegionId = RegionId(4);

/// One patrolling entity circling the origin
struct PatrolWorld {
    guard: RefCell<Option<Vec3>>,
}

impl PatrolWorld {
    fn new() -> Self {
        Self {
            guard: RefCell::new(Some(Vec3::new(8.0, 0.0, 0.0))),
        }
    }

    fn step(&self, time: f32) {
        if let Some(position) = self.guard.borrow_mut().as_mut() {
            let angle = time * 0.8;
            *position = Vec3::new(8.0 * angle.cos(), 0.0, 8.0 * angle.sin());
        }
    }
}

impl SoundWorld for PatrolWorld {
    fn position(&self, entity: EntityId) -> Option<Vec3> {
        (entity == GUARD).then(|| *self.guard.borrow()).flatten()
    }

    fn exists(&self, entity: EntityId) -> bool {
        entity == GUARD && self.guard.borrow().is_some()
    }

    fn region(&self, entity: EntityId) -> Option<RegionId> {
        self.exists(entity).then_some(BARRACKS)
    }
}

fn build_resources() -> MemoryResources {
    let mut resources = MemoryResources::new();
    resources.add_sound(
        "footstep",
        SoundRecord::new("sound/fx/foot.wav").with_distances(1.0, 40.0),
        PcmData::tone(90.0, 0.12, SAMPLE_RATE, 0.6),
    );
    resources.add_sound(
        "torch",
        SoundRecord::new("sound/fx/torch.wav").with_volume(0.4),
        PcmData::tone(60.0, 1.5, SAMPLE_RATE, 0.3),
    );
    resources.add_sound(
        "crickets",
        SoundRecord::new("sound/amb/crickets.wav").with_volume(0.3),
        PcmData::tone(4000.0, 0.8, SAMPLE_RATE, 0.1),
    );
    resources.add_region_sound(BARRACKS, "crickets", 60);
    resources.add_file("vo/guard/halt.wav", PcmData::tone(210.0, 1.2, SAMPLE_RATE, 0.5));
    resources.add_file("music/explore/dawn.ogg", PcmData::tone(330.0, 3.0, SAMPLE_RATE, 0.2));
    resources.add_file("music/explore/dusk.ogg", PcmData::tone(262.0, 3.0, SAMPLE_RATE, 0.2));
    resources
}

fn main() -> Result<(), AudioError> {
    logging::init();

    let resources = Rc::new(build_resources());
    let world = Rc::new(PatrolWorld::new());
    let services = SoundServices {
        decoder: Box::new(Rc::clone(&resources)),
        store: Box::new(resources),
        world: world.clone(),
    };

    let config = SoundConfig {
        music_crossfade: 0.5,
        region_sound_min_interval: 1.0,
        region_sound_max_interval: 2.0,
        ..Default::default()
    };
    let mut sound = match SoundManager::with_backend(&config, BackendKind::default(), services) {
        Ok(sound) => sound,
        Err(e) => {
            log::warn!("{}; falling back to silent output", e);
            let resources = Rc::new(build_resources());
            let services = SoundServices {
                decoder: Box::new(Rc::clone(&resources)),
                store: Box::new(resources),
                world: world.clone(),
            };
            SoundManager::new(&config, Box::new(NullOutput::new(config.max_channels)), services)
        }
    };

    let mut rng = rand::thread_rng();
    sound.play_playlist("explore");
    sound.set_listener_region(Some(BARRACKS));
    sound.play_sound_3d(GUARD, "torch", PlayParams::default().with_mode(PlayMode::LOOP));

    let mut time = 0.0;
    let mut next_step = 0.0;
    while time < 8.0 {
        world.step(time);

        if time >= next_step {
            let params = PlayParams::default()
                .with_category(SoundCategory::Movement)
                .with_pitch(rng.gen_range(0.9..1.1));
            sound.play_sound_3d(GUARD, "footstep", params);
            next_step += 0.5;
        }

        if (2.0..2.0 + TICK).contains(&time) {
            sound.say(Some(GUARD), "vo/guard/halt.wav");
        }
        if !sound.say_done(Some(GUARD)) {
            log::debug!("Guard mouth open: {:.2}", sound.say_loudness(Some(GUARD)));
        }

        if (4.0..4.0 + TICK).contains(&time) {
            log::info!("Pausing effects for one second");
            sound.pause_sounds(SoundCategories::EFFECT | SoundCategories::MOVEMENT);
        }
        if (5.0..5.0 + TICK).contains(&time) {
            sound.resume_sounds(SoundCategories::EFFECT | SoundCategories::MOVEMENT);
        }

        if (6.5..6.5 + TICK).contains(&time) {
            log::info!("Unloading the barracks");
            sound.stop_sounds_in_region(BARRACKS);
            sound.set_listener_region(None);
        }

        sound.set_listener_pos_dir(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y(), false);
        sound.update(TICK);

        time += TICK;
        std::thread::sleep(std::time::Duration::from_secs_f32(TICK));
    }

    log::info!(
        "Demo finished: {} sounds active, {} bytes cached, music on '{}'",
        sound.active_sound_count(),
        sound.cache_bytes(),
        sound.current_music_track().unwrap_or("nothing")
    );
    sound.clear();
    Ok(())
}
