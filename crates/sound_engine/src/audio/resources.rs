//! Resource store capability
//!
//! Maps sound ids to [`SoundRecord`]s (file, base volume, falloff distances),
//! lists resources for playlist scanning and knows which ambient sounds each
//! region plays.

use crate::audio::decoder::{Decoder, DecoderStream, PcmStream};
use crate::audio::format::PcmData;
use crate::audio::AudioError;
use crate::config::Config;
use crate::world::RegionId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Static description of a sound id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundRecord {
    /// Resource path of the audio file
    pub file: String,
    /// Base volume in `[0, 1]`
    #[serde(default = "default_record_volume")]
    pub volume: f32,
    /// Distance below which the sound plays at full volume (0 = default)
    #[serde(default)]
    pub min_distance: f32,
    /// Distance beyond which the sound is silent (0 = default)
    #[serde(default)]
    pub max_distance: f32,
}

fn default_record_volume() -> f32 {
    1.0
}

impl SoundRecord {
    /// Record for `file` at full volume with default distances
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            volume: 1.0,
            min_distance: 0.0,
            max_distance: 0.0,
        }
    }

    /// Set the base volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Set falloff distances
    pub fn with_distances(mut self, min_distance: f32, max_distance: f32) -> Self {
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    /// Falloff distances with defaults applied and `1 <= min <= max`
    pub fn resolved_distances(&self, default_min: f32, default_max: f32) -> (f32, f32) {
        let (min, max) = if self.min_distance <= 0.0 && self.max_distance <= 0.0 {
            (default_min, default_max)
        } else {
            (self.min_distance, self.max_distance)
        };
        let min = min.max(1.0);
        (min, max.max(min))
    }
}

/// Ambient sound a region may play, with its relative chance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSound {
    /// Sound id
    pub sound_id: String,
    /// Chance out of 100 (or out of the summed chances when they exceed 100)
    pub chance: u32,
}

impl RegionSound {
    /// Create an entry
    pub fn new(sound_id: impl Into<String>, chance: u32) -> Self {
        Self {
            sound_id: sound_id.into(),
            chance,
        }
    }
}

/// Lookup of sound ids and resource files
pub trait ResourceStore {
    /// Record for a sound id
    fn sound_record(&self, sound_id: &str) -> Option<SoundRecord>;

    /// Whether a resource file exists
    fn exists(&self, path: &str) -> bool;

    /// Resource files whose path starts with `prefix`, sorted
    fn list(&self, prefix: &str) -> Vec<String>;

    /// Ambient sounds of `region`
    fn region_sounds(&self, _region: RegionId) -> Vec<RegionSound> {
        Vec::new()
    }
}

impl<T: ResourceStore + ?Sized> ResourceStore for std::rc::Rc<T> {
    fn sound_record(&self, sound_id: &str) -> Option<SoundRecord> {
        (**self).sound_record(sound_id)
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        (**self).list(prefix)
    }

    fn region_sounds(&self, region: RegionId) -> Vec<RegionSound> {
        (**self).region_sounds(region)
    }
}

/// Table of sound records, loadable from `.toml` or `.ron`
///
/// ```toml
/// [sounds.footstep]
/// file = "sound/fx/foot.wav"
/// volume = 0.8
/// min_distance = 1.0
/// max_distance = 50.0
///
/// [[regions]]
/// region = 3
/// sounds = [{ sound_id = "crow", chance = 20 }]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundTable {
    /// Records by sound id
    #[serde(default)]
    pub sounds: BTreeMap<String, SoundRecord>,
    /// Ambient sounds per region
    #[serde(default)]
    pub regions: Vec<RegionSounds>,
}

/// Ambient sound list of one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSounds {
    /// Raw region id
    pub region: u32,
    /// Sounds the region may play
    #[serde(default)]
    pub sounds: Vec<RegionSound>,
}

impl Config for SoundTable {}

/// Resource store over a directory tree plus a sound table
pub struct FsResourceStore {
    root: PathBuf,
    table: SoundTable,
}

impl FsResourceStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>, table: SoundTable) -> Self {
        Self {
            root: root.into(),
            table,
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceStore for FsResourceStore {
    fn sound_record(&self, sound_id: &str) -> Option<SoundRecord> {
        self.table
            .sounds
            .get(sound_id)
            .or_else(|| self.table.sounds.get(&sound_id.to_lowercase()))
            .cloned()
    }

    fn exists(&self, path: &str) -> bool {
        self.root.join(path).is_file()
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        let dir = self.root.join(prefix);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            log::debug!("No resource directory at {}", dir.display());
            return Vec::new();
        };

        let mut files: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| format!("{}{}", prefix, entry.file_name().to_string_lossy()))
            .collect();
        files.sort();
        files
    }

    fn region_sounds(&self, region: RegionId) -> Vec<RegionSound> {
        self.table
            .regions
            .iter()
            .filter(|entry| entry.region == region.0)
            .flat_map(|entry| entry.sounds.iter().cloned())
            .collect()
    }
}

/// In-memory store and decoder
///
/// Serves synthesized or pre-decoded PCM. Used by tools, the demo and tests;
/// counts how often each file has been opened.
#[derive(Default)]
pub struct MemoryResources {
    records: HashMap<String, SoundRecord>,
    files: BTreeMap<String, PcmData>,
    regions: HashMap<RegionId, Vec<RegionSound>>,
    opens: RefCell<HashMap<String, usize>>,
}

impl MemoryResources {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file
    pub fn add_file(&mut self, path: impl Into<String>, pcm: PcmData) {
        self.files.insert(path.into(), pcm);
    }

    /// Register a sound id
    pub fn add_record(&mut self, sound_id: impl Into<String>, record: SoundRecord) {
        self.records.insert(sound_id.into(), record);
    }

    /// Register a file together with a sound id pointing at it
    pub fn add_sound(&mut self, sound_id: impl Into<String>, record: SoundRecord, pcm: PcmData) {
        self.files.insert(record.file.clone(), pcm);
        self.records.insert(sound_id.into(), record);
    }

    /// Let `region` play `sound_id` as ambience
    pub fn add_region_sound(&mut self, region: RegionId, sound_id: impl Into<String>, chance: u32) {
        self.regions
            .entry(region)
            .or_default()
            .push(RegionSound::new(sound_id, chance));
    }

    /// How many times `path` has been opened
    pub fn open_count(&self, path: &str) -> usize {
        self.opens.borrow().get(path).copied().unwrap_or(0)
    }
}

impl ResourceStore for MemoryResources {
    fn sound_record(&self, sound_id: &str) -> Option<SoundRecord> {
        self.records.get(sound_id).cloned()
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        self.files
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn region_sounds(&self, region: RegionId) -> Vec<RegionSound> {
        self.regions.get(&region).cloned().unwrap_or_default()
    }
}

impl Decoder for MemoryResources {
    fn open(&self, path: &str) -> Result<Box<dyn DecoderStream>, AudioError> {
        let pcm = self
            .files
            .get(path)
            .ok_or_else(|| AudioError::ResourceNotFound(path.to_string()))?;
        *self.opens.borrow_mut().entry(path.to_string()).or_insert(0) += 1;
        Ok(Box::new(PcmStream::new(pcm.clone())))
    }
}
