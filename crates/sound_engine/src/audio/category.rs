//! Sound categories and play-mode flags

use bitflags::bitflags;

/// Classification of a sound, driving volume scaling and pause grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCategory {
    /// Sound effects (combat, UI, world objects)
    Effect,
    /// Speech
    Voice,
    /// Footsteps and other movement sounds
    Movement,
    /// Background music
    Music,
}

impl SoundCategory {
    /// Every category, in mask bit order
    pub const ALL: [Self; 4] = [Self::Effect, Self::Voice, Self::Movement, Self::Music];

    /// The mask bit for this category
    pub fn mask(self) -> SoundCategories {
        match self {
            Self::Effect => SoundCategories::EFFECT,
            Self::Voice => SoundCategories::VOICE,
            Self::Movement => SoundCategories::MOVEMENT,
            Self::Music => SoundCategories::MUSIC,
        }
    }

    /// Whether an entity may play the same sound of this category several
    /// times at once. Overlapping footsteps are expected; everything else
    /// restarts instead of stacking.
    pub fn allows_stacking(self) -> bool {
        matches!(self, Self::Movement)
    }
}

bitflags! {
    /// Set of categories, used by pause/resume/stop
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SoundCategories: u32 {
        /// Sound effects
        const EFFECT = 1 << 0;
        /// Speech
        const VOICE = 1 << 1;
        /// Footsteps
        const MOVEMENT = 1 << 2;
        /// Music
        const MUSIC = 1 << 3;
    }
}

impl SoundCategories {
    /// Whether `category` is part of this set
    pub fn has(self, category: SoundCategory) -> bool {
        self.contains(category.mask())
    }
}

bitflags! {
    /// How a sound instance behaves after it starts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlayMode: u32 {
        /// Restart from the beginning when the end is reached
        const LOOP = 1 << 0;
        /// Exempt from the listener environment filter (e.g. underwater)
        const NO_ENV = 1 << 1;
        /// Keep the start position instead of following the owning entity
        const NO_TRACK = 1 << 2;
        /// Stop once the listener is far away
        const REMOVE_AT_DISTANCE = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_masks_are_distinct() {
        let mut combined = SoundCategories::empty();
        for category in SoundCategory::ALL {
            assert!(!combined.intersects(category.mask()));
            combined |= category.mask();
        }
        assert_eq!(combined, SoundCategories::all());
    }

    #[test]
    fn test_only_movement_stacks() {
        assert!(SoundCategory::Movement.allows_stacking());
        assert!(!SoundCategory::Effect.allows_stacking());
        assert!(!SoundCategory::Voice.allows_stacking());
    }

    #[test]
    fn test_has() {
        let mask = SoundCategories::EFFECT | SoundCategories::MUSIC;
        assert!(mask.has(SoundCategory::Music));
        assert!(!mask.has(SoundCategory::Voice));
    }
}
