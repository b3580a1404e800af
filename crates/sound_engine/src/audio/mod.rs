//! Sound management core
//!
//! Loading, caching, mixing and spatialization of sounds for the simulation,
//! plus tracking of which entities currently have sounds attached.
//!
//! - [`SoundManager`]: the facade gameplay code talks to
//! - [`SoundBufferCache`]: bounded cache of decoded one-shot buffers
//! - [`ActiveSoundRegistry`]: per-entity playing instances and speech
//! - [`MusicController`]: playlists and streamed background music
//! - [`RegionAmbience`]: random ambient sounds of the listener's region
//! - [`LoudnessIndex`]: amplitude envelopes for lip-sync
//! - [`backend::AudioOutput`]: device capability (silent and rodio backends)

pub mod ambience;
pub mod backend;
pub mod cache;
pub mod category;
pub mod decoder;
pub mod format;
pub mod loudness;
pub mod manager;
pub mod mixer;
pub mod music;
pub mod registry;
pub mod resources;
pub mod spatial;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

pub use ambience::RegionAmbience;
pub use backend::{AudioOutput, BackendKind, ChannelId, ChannelParams};
pub use cache::{BufferKey, SoundBuffer, SoundBufferCache};
pub use category::{PlayMode, SoundCategories, SoundCategory};
pub use decoder::{Decoder, DecoderStream};
pub use format::{AudioFormat, PcmData};
pub use loudness::{LoudnessEnvelope, LoudnessIndex};
pub use manager::{SoundManager, SoundServices};
pub use mixer::{CategoryVolumes, VolumeGroup};
pub use music::{MusicController, MusicState};
pub use registry::{ActiveSoundRegistry, Emitter, PlayParams, SoundHandle};
pub use resources::{RegionSound, ResourceStore, SoundRecord};
pub use spatial::{Environment, Listener, SpatialAudio};

use crate::config::ConfigError;
use thiserror::Error;

/// Errors produced by the sound core
///
/// Play-path errors never reach gameplay code: the facade logs them and
/// hands back an invalid [`SoundHandle`].
#[derive(Debug, Error)]
pub enum AudioError {
    /// The sound id or file is unknown to the resource store
    #[error("Sound resource not found: {0}")]
    ResourceNotFound(String),

    /// The decoder rejected the resource data
    #[error("Failed to decode '{resource}': {reason}")]
    DecodeError {
        /// Sound id or file that failed
        resource: String,
        /// Decoder message
        reason: String,
    },

    /// The output could not provide a channel
    #[error("Playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// The file is not in a format the decoder understands
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The output device could not be opened
    #[error("Audio backend initialization failed: {0}")]
    BackendInitFailed(String),

    /// The channel or sound handle is not (or no longer) valid
    #[error("Invalid sound handle")]
    InvalidHandle,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
