//! Spatial audio system
//!
//! Owns the single listener record and provides distance-based attenuation
//! between a sound's min and max distance.

use crate::foundation::math::{utils, Vec3};

/// Acoustic environment of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Open air
    Normal,
    /// Listener is submerged; outputs apply a low-pass filter
    Underwater,
}

/// The spatial reference point for 3D sounds
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    /// World position
    pub position: Vec3,
    /// Facing direction (unit length)
    pub direction: Vec3,
    /// Up vector (unit length)
    pub up: Vec3,
    /// Whether the listener is submerged
    pub underwater: bool,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            underwater: false,
        }
    }
}

impl Listener {
    /// Current environment
    pub fn environment(&self) -> Environment {
        if self.underwater {
            Environment::Underwater
        } else {
            Environment::Normal
        }
    }

    /// Unit vector pointing to the listener's right
    pub fn right(&self) -> Vec3 {
        utils::normalize_or(&self.direction.cross(&self.up), Vec3::new(1.0, 0.0, 0.0))
    }
}

/// Configuration for spatial audio
#[derive(Debug, Clone)]
pub struct SpatialConfig {
    /// Falloff exponent (1.0 = linear, 2.0 = quadratic)
    pub falloff_exponent: f32,
    /// Distance beyond which `REMOVE_AT_DISTANCE` sounds are stopped
    pub remove_distance: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            falloff_exponent: 1.0,
            remove_distance: 2000.0,
        }
    }
}

/// Spatial audio system holding the listener
pub struct SpatialAudio {
    config: SpatialConfig,
    listener: Listener,
}

impl SpatialAudio {
    /// Create a new spatial audio system
    pub fn new(config: SpatialConfig) -> Self {
        Self {
            config,
            listener: Listener::default(),
        }
    }

    /// Set the listener position and orientation
    pub fn set_listener(&mut self, position: Vec3, direction: Vec3, up: Vec3, underwater: bool) {
        self.listener = Listener {
            position,
            direction: utils::normalize_or(&direction, Vec3::new(0.0, 0.0, -1.0)),
            up: utils::normalize_or(&up, Vec3::new(0.0, 1.0, 0.0)),
            underwater,
        };
    }

    /// The listener record
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Distance from the listener to `position`
    pub fn distance_to(&self, position: &Vec3) -> f32 {
        utils::distance(position, &self.listener.position)
    }

    /// Whether a `REMOVE_AT_DISTANCE` sound at `position` should stop
    pub fn is_beyond_removal(&self, position: &Vec3) -> bool {
        self.distance_to(position) > self.config.remove_distance
    }

    /// Calculate attenuation factor for a sound at given position
    pub fn calculate_attenuation(&self, sound_position: &Vec3, min_distance: f32, max_distance: f32) -> f32 {
        let distance = self.distance_to(sound_position);

        // Beyond max distance, sound is inaudible
        if distance > max_distance {
            return 0.0;
        }

        // Within min distance, no attenuation
        if distance <= min_distance {
            return 1.0;
        }

        // Apply falloff curve
        let normalized_distance = (distance - min_distance) / (max_distance - min_distance);

        let attenuation: f32 = 1.0 - normalized_distance.powf(self.config.falloff_exponent);
        attenuation.max(0.0)
    }
}

impl Default for SpatialAudio {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}
