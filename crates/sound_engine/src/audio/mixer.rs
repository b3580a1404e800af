//! Category volume mixing
//!
//! Holds the master and per-category volume levels and derives the final
//! category factor applied to every playing sound.

use crate::audio::category::SoundCategory;
use crate::config::SoundConfig;
use std::collections::HashMap;

/// Volume groups for independent volume control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeGroup {
    /// Master volume (affects all sounds)
    Master,
    /// Sound effects
    Effects,
    /// Background music
    Music,
    /// Speech
    Voice,
    /// Footsteps and other movement sounds
    Footsteps,
}

impl VolumeGroup {
    /// Group that scales sounds of `category`
    pub fn for_category(category: SoundCategory) -> Self {
        match category {
            SoundCategory::Effect => Self::Effects,
            SoundCategory::Voice => Self::Voice,
            SoundCategory::Movement => Self::Footsteps,
            SoundCategory::Music => Self::Music,
        }
    }
}

/// Volume levels for the master and every category group
#[derive(Debug, Clone)]
pub struct CategoryVolumes {
    /// Volume levels for each group (0.0 to 1.0)
    group_volumes: HashMap<VolumeGroup, f32>,
}

impl CategoryVolumes {
    /// Create volume levels from configuration
    pub fn from_config(config: &SoundConfig) -> Self {
        let mut volumes = Self {
            group_volumes: HashMap::new(),
        };
        volumes.apply_config(config);
        volumes
    }

    /// Set volume for a specific group (0.0 to 1.0)
    pub fn set_group_volume(&mut self, group: VolumeGroup, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.group_volumes.insert(group, clamped);
    }

    /// Get volume for a specific group
    pub fn group_volume(&self, group: VolumeGroup) -> f32 {
        *self.group_volumes.get(&group).unwrap_or(&1.0)
    }

    /// Category volume times master volume
    pub fn effective_volume(&self, category: SoundCategory) -> f32 {
        let group_vol = self.group_volume(VolumeGroup::for_category(category));
        let master_vol = self.group_volume(VolumeGroup::Master);

        group_vol * master_vol
    }

    /// Take every level from `config`; returns whether any level changed
    pub fn apply_config(&mut self, config: &SoundConfig) -> bool {
        let levels = [
            (VolumeGroup::Master, config.master_volume),
            (VolumeGroup::Effects, config.sfx_volume),
            (VolumeGroup::Music, config.music_volume),
            (VolumeGroup::Voice, config.voice_volume),
            (VolumeGroup::Footsteps, config.footsteps_volume),
        ];

        let mut changed = false;
        for (group, level) in levels {
            let previous = self.group_volumes.get(&group).copied();
            self.set_group_volume(group, level);
            changed |= previous != self.group_volumes.get(&group).copied();
        }
        changed
    }
}

impl Default for CategoryVolumes {
    fn default() -> Self {
        Self::from_config(&SoundConfig::default())
    }
}
