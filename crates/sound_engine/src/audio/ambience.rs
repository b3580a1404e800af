//! Regional ambience
//!
//! While the listener is inside a region, a random ambient sound from that
//! region's table is played every few seconds. Each entry carries a chance
//! out of 100; when the chances of a region add up to less than 100 a roll
//! may pick nothing. A new sound is never started while the previous one is
//! still playing.

use crate::audio::category::SoundCategory;
use crate::audio::registry::{ActiveSoundRegistry, Emitter, PlayParams, PlaybackContext, SoundHandle};
use crate::audio::resources::RegionSound;
use crate::config::SoundConfig;
use crate::world::RegionId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random ambient sounds for the listener's region
pub struct RegionAmbience {
    region: Option<RegionId>,
    time_to_next: f32,
    min_interval: f32,
    max_interval: f32,
    current: SoundHandle,
    rng: StdRng,
}

impl RegionAmbience {
    /// Create from configuration with an entropy-seeded generator
    pub fn new(config: &SoundConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create with a deterministic sequence of picks
    pub fn with_seed(config: &SoundConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SoundConfig, rng: StdRng) -> Self {
        let mut ambience = Self {
            region: None,
            time_to_next: 0.0,
            min_interval: 0.0,
            max_interval: 0.0,
            current: SoundHandle::invalid(),
            rng,
        };
        ambience.apply_config(config);
        ambience
    }

    /// Take the pause interval from `config`
    pub fn apply_config(&mut self, config: &SoundConfig) {
        self.min_interval = config.region_sound_min_interval.max(0.0);
        self.max_interval = config.region_sound_max_interval.max(self.min_interval);
    }

    /// Region the listener is in, `None` when it is in none
    pub fn set_region(&mut self, region: Option<RegionId>) {
        if self.region != region {
            log::debug!("Listener region changed to {:?}", region);
            self.region = region;
        }
    }

    /// Region the listener is in
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Handle of the ambient sound started last
    pub fn current(&self) -> SoundHandle {
        self.current
    }

    /// Pick an entry from `sounds`, or none
    fn roll(&mut self, sounds: &[RegionSound]) -> Option<String> {
        let total: u32 = sounds.iter().map(|s| s.chance).sum();
        let roll = self.rng.gen_range(0..total.max(100));

        let mut position = 0;
        for sound in sounds {
            position += sound.chance;
            if roll < position {
                return Some(sound.sound_id.clone());
            }
        }
        None
    }

    /// Count down the pause and start the next ambient sound when it is due
    pub fn update(&mut self, delta_time: f32, registry: &mut ActiveSoundRegistry, ctx: &mut PlaybackContext<'_>) {
        let Some(region) = self.region else {
            return;
        };
        if registry.is_handle_playing(self.current) {
            return;
        }
        if self.time_to_next > 0.0 {
            self.time_to_next -= delta_time;
            return;
        }
        self.time_to_next = self.rng.gen_range(self.min_interval..=self.max_interval);

        let sounds = ctx.store.region_sounds(region);
        if sounds.is_empty() {
            return;
        }
        let Some(sound_id) = self.roll(&sounds) else {
            return;
        };

        let params = PlayParams::default().with_category(SoundCategory::Effect);
        self.current = match registry.play(ctx, Emitter::Listener, &sound_id, params) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Failed to play region sound '{}': {}", sound_id, e);
                SoundHandle::invalid()
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::Harness;
    use crate::audio::backend::AudioOutput;

    const FOREST: RegionId = RegionId(4);

    fn config(min: f32, max: f32) -> SoundConfig {
        SoundConfig {
            region_sound_min_interval: min,
            region_sound_max_interval: max,
            ..Default::default()
        }
    }

    fn tick(h: &mut Harness, registry: &mut ActiveSoundRegistry, ambience: &mut RegionAmbience, dt: f32) {
        h.output.update(dt);
        registry.update_all(&mut h.ctx(), dt);
        ambience.update(dt, registry, &mut h.ctx());
    }

    #[test]
    fn test_no_region_plays_nothing() {
        let mut h = Harness::new(8);
        h.store.add_region_sound(FOREST, "wind", 100);
        let mut registry = ActiveSoundRegistry::new(100.0, 3000.0);
        let mut ambience = RegionAmbience::with_seed(&config(0.0, 0.0), 1);

        for _ in 0..10 {
            tick(&mut h, &mut registry, &mut ambience, 0.1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_certain_sound_plays_then_waits() {
        let mut h = Harness::new(8);
        h.store.add_region_sound(FOREST, "hit", 100);
        let mut registry = ActiveSoundRegistry::new(100.0, 3000.0);
        let mut ambience = RegionAmbience::with_seed(&config(2.0, 2.0), 9);
        ambience.set_region(Some(FOREST));

        tick(&mut h, &mut registry, &mut ambience, 0.125);
        let first = ambience.current();
        assert!(registry.is_handle_playing(first));
        assert!(registry.is_playing(None, "hit"));

        // The half-second sound ends, then the two second pause runs down
        for _ in 0..12 {
            tick(&mut h, &mut registry, &mut ambience, 0.125);
        }
        assert!(registry.is_empty());
        assert_eq!(ambience.current(), first);

        for _ in 0..10 {
            tick(&mut h, &mut registry, &mut ambience, 0.125);
        }
        assert_ne!(ambience.current(), first);
        assert!(registry.is_handle_playing(ambience.current()));
    }

    #[test]
    fn test_low_chances_sometimes_pick_nothing() {
        let mut h = Harness::new(8);
        h.store.add_region_sound(FOREST, "hit", 10);
        let mut registry = ActiveSoundRegistry::new(100.0, 3000.0);
        let mut ambience = RegionAmbience::with_seed(&config(0.0, 0.0), 42);
        ambience.set_region(Some(FOREST));

        let mut started = 0;
        let mut skipped = 0;
        for _ in 0..200 {
            ambience.update(0.1, &mut registry, &mut h.ctx());
            if registry.is_empty() {
                skipped += 1;
            } else {
                started += 1;
                registry.clear(&mut h.output, &mut h.cache);
            }
        }
        assert!(started > 0);
        assert!(skipped > started);
    }

    #[test]
    fn test_roll_respects_weights_above_one_hundred() {
        let mut ambience = RegionAmbience::with_seed(&config(0.0, 0.0), 3);
        let sounds = vec![RegionSound::new("crow", 150), RegionSound::new("owl", 50)];

        let crows = (0..1000)
            .filter(|_| ambience.roll(&sounds).as_deref() == Some("crow"))
            .count();
        // Summed chances exceed 100, so every roll picks something
        assert!((650..850).contains(&crows));
        assert!((0..100).all(|_| ambience.roll(&sounds).is_some()));
    }
}
