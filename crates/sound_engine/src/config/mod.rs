//! Configuration system
//!
//! [`SoundConfig`] carries every recognized sound option. It can be loaded from
//! `.toml` or `.ron` files through the [`Config`] trait and is re-applied at
//! runtime through `SoundManager::process_changed_settings`.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;
        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, picking the format from the file name extension
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

const MIB: usize = 1024 * 1024;

/// Sound settings
///
/// Volumes are linear gains in `[0, 1]`. Cache bounds are in bytes of decoded
/// PCM data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Disables all sound when false; the manager becomes a silent shell
    pub use_sound: bool,
    /// Master volume, applied to every category
    pub master_volume: f32,
    /// Sound effect volume
    pub sfx_volume: f32,
    /// Music volume
    pub music_volume: f32,
    /// Voice (speech) volume
    pub voice_volume: f32,
    /// Footstep/movement volume
    pub footsteps_volume: f32,
    /// Eviction target once the cache overflows
    pub buffer_cache_min: usize,
    /// Cache size above which unused buffers are evicted
    pub buffer_cache_max: usize,
    /// Maximum simultaneous output channels
    pub max_channels: usize,
    /// Distance below which speech is heard at full volume
    pub voice_min_distance: f32,
    /// Distance beyond which speech is inaudible
    pub voice_max_distance: f32,
    /// Min distance for sound records that do not specify one
    pub default_min_distance: f32,
    /// Max distance for sound records that do not specify one
    pub default_max_distance: f32,
    /// Crossfade between music tracks in seconds (0 = hard cut)
    pub music_crossfade: f32,
    /// Resource prefix under which playlist folders live
    pub music_prefix: String,
    /// Looping ambience played while the listener is underwater
    pub underwater_sound: Option<String>,
    /// Shortest pause in seconds between regional ambient sounds
    pub region_sound_min_interval: f32,
    /// Longest pause in seconds between regional ambient sounds
    pub region_sound_max_interval: f32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            use_sound: true,
            master_volume: 1.0,
            sfx_volume: 1.0,
            music_volume: 0.5,
            voice_volume: 0.8,
            footsteps_volume: 0.15,
            buffer_cache_min: 14 * MIB,
            buffer_cache_max: 16 * MIB,
            max_channels: 64,
            voice_min_distance: 100.0,
            voice_max_distance: 3000.0,
            default_min_distance: 1.0,
            default_max_distance: 2000.0,
            music_crossfade: 0.0,
            music_prefix: "music/".to_string(),
            underwater_sound: None,
            region_sound_min_interval: 5.0,
            region_sound_max_interval: 35.0,
        }
    }
}

impl SoundConfig {
    /// Return a copy with volumes clamped to `[0, 1]` and consistent bounds
    pub fn validated(&self) -> Self {
        let mut config = self.clone();
        for volume in [
            &mut config.master_volume,
            &mut config.sfx_volume,
            &mut config.music_volume,
            &mut config.voice_volume,
            &mut config.footsteps_volume,
        ] {
            *volume = volume.clamp(0.0, 1.0);
        }
        config.buffer_cache_min = config.buffer_cache_min.min(config.buffer_cache_max);
        config.voice_min_distance = config.voice_min_distance.max(1.0);
        config.voice_max_distance = config.voice_max_distance.max(config.voice_min_distance);
        config.default_min_distance = config.default_min_distance.max(1.0);
        config.default_max_distance = config.default_max_distance.max(config.default_min_distance);
        config.music_crossfade = config.music_crossfade.max(0.0);
        config.region_sound_min_interval = config.region_sound_min_interval.max(0.0);
        config.region_sound_max_interval = config.region_sound_max_interval.max(config.region_sound_min_interval);
        config
    }
}

impl Config for SoundConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SoundConfig::default();
        assert_eq!(config, config.validated());
        assert!(config.buffer_cache_min <= config.buffer_cache_max);
    }

    #[test]
    fn test_validation_clamps_volumes_and_bounds() {
        let config = SoundConfig {
            master_volume: 1.5,
            sfx_volume: -0.2,
            buffer_cache_min: 10,
            buffer_cache_max: 5,
            ..Default::default()
        }
        .validated();

        assert_eq!(config.master_volume, 1.0);
        assert_eq!(config.sfx_volume, 0.0);
        assert_eq!(config.buffer_cache_min, 5);
    }

    #[test]
    fn test_validation_orders_region_intervals() {
        let config = SoundConfig {
            region_sound_min_interval: 10.0,
            region_sound_max_interval: 2.0,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.region_sound_max_interval, 10.0);
    }

    #[test]
    fn test_parse_toml_with_partial_fields() {
        let text = "master_volume = 0.25\nuse_sound = false\nunderwater_sound = \"underwater\"\n";
        let config = SoundConfig::from_str_with_format(text, "sound.toml").unwrap();
        assert_eq!(config.master_volume, 0.25);
        assert!(!config.use_sound);
        assert_eq!(config.underwater_sound.as_deref(), Some("underwater"));
        assert_eq!(config.music_volume, SoundConfig::default().music_volume);
    }

    #[test]
    fn test_parse_ron() {
        let text = "(music_volume: 0.1, buffer_cache_max: 2048)";
        let config = SoundConfig::from_str_with_format(text, "sound.ron").unwrap();
        assert_eq!(config.music_volume, 0.1);
        assert_eq!(config.buffer_cache_max, 2048);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SoundConfig::from_str_with_format("", "sound.ini");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
