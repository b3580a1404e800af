//! # Sound Engine
//!
//! Sound management core for a simulation or game: decoded buffer caching,
//! per-entity sound tracking, speech with lip-sync loudness, streamed music
//! playlists and 3D attenuation around a single listener.
//!
//! ## Features
//!
//! - **Buffer Cache**: decoded one-shot sounds shared between instances,
//!   bounded by a min/max footprint with oldest-unused eviction
//! - **Entity Tracking**: sounds follow their entity and stop with it
//! - **Speech**: one line per entity, loudness envelopes for lip-sync
//! - **Music**: playlists, random titles, optional crossfade
//! - **Pluggable Output**: silent output for tools and tests, rodio for devices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sound_engine::prelude::*;
//! use std::rc::Rc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SoundConfig::load_from_file("config/sound.toml")?;
//!     let table = SoundTable::load_from_file("config/sounds.toml")?;
//!     let store = Rc::new(FsResourceStore::new("resources", table));
//!
//!     let services = SoundServices {
//!         // `RodioDecoder` reads real files when the `rodio` feature is on
//!         decoder: Box::new(MemoryResources::new()),
//!         store: Box::new(store),
//!         world: Rc::new(EmptyWorld),
//!     };
//!     let mut sound = SoundManager::with_backend(&config, BackendKind::default(), services)?;
//!
//!     sound.play_playlist("explore");
//!     loop {
//!         sound.update(1.0 / 60.0);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod audio;
pub mod config;
pub mod foundation;
pub mod world;

pub use audio::AudioError;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::{
            backend::{AudioOutput, BackendKind, NullOutput},
            resources::{FsResourceStore, MemoryResources, SoundTable},
            PlayMode, PlayParams, SoundCategories, SoundCategory, SoundHandle, SoundManager,
            SoundServices,
        },
        config::{Config, SoundConfig},
        foundation::math::Vec3,
        world::{EmptyWorld, EntityId, RegionId, SoundWorld},
        AudioError,
    };
}
