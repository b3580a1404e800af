//! Audio output implementations
//!
//! Platform-independent abstraction over audio playback libraries. The sound
//! core talks to exactly one [`AudioOutput`], chosen at startup by
//! [`create_backend`].

pub mod channel_pool;
pub mod null_backend;
#[cfg(feature = "rodio")]
pub mod rodio_backend;

pub use channel_pool::{ChannelId, ChannelPool};
pub use null_backend::NullOutput;
#[cfg(feature = "rodio")]
pub use rodio_backend::RodioOutput;

use crate::audio::category::{PlayMode, SoundCategory};
use crate::audio::format::{AudioFormat, PcmData};
use crate::audio::spatial::Listener;
use crate::audio::AudioError;
use crate::foundation::math::Vec3;
use serde::{Deserialize, Serialize};

/// Audio output trait for platform abstraction
///
/// # Threading
/// Not Send + Sync: the sound core is driven from the simulation thread.
/// Implementations that decode or mix on a device thread must keep every
/// method here non-blocking.
pub trait AudioOutput {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Reserve a channel; fails with `PlaybackUnavailable` when none is free
    fn allocate_channel(&mut self, params: &ChannelParams) -> Result<ChannelId, AudioError>;

    /// Start a whole decoded buffer on `channel`, beginning at `start_frame`.
    /// Looping channels restart from frame 0 after the first pass.
    fn play_buffer(&mut self, channel: ChannelId, pcm: &PcmData, start_frame: usize) -> Result<(), AudioError>;

    /// Append a chunk of a streamed sound to `channel`
    fn queue_stream(&mut self, channel: ChannelId, format: AudioFormat, samples: &[i16]) -> Result<(), AudioError>;

    /// Move a positional channel
    fn set_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), AudioError>;

    /// Set the final gain of a channel
    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<(), AudioError>;

    /// Set the playback rate of a channel
    fn set_pitch(&mut self, channel: ChannelId, pitch: f32) -> Result<(), AudioError>;

    /// Pause a channel
    fn pause(&mut self, channel: ChannelId) -> Result<(), AudioError>;

    /// Resume a paused channel
    fn resume(&mut self, channel: ChannelId) -> Result<(), AudioError>;

    /// Whether the channel has played everything submitted to it.
    /// Unknown channels report `true`.
    fn is_finished(&self, channel: ChannelId) -> bool;

    /// Number of submitted chunks that have not finished playing
    fn queued_chunks(&self, channel: ChannelId) -> usize;

    /// Stop a channel and return it to the pool (idempotent)
    fn release(&mut self, channel: ChannelId);

    /// Update listener position, orientation and environment
    fn set_listener(&mut self, listener: &Listener);

    /// Per-tick housekeeping
    fn update(&mut self, _delta_time: f32) {}

    /// Number of allocated channels
    fn active_channels(&self) -> usize;
}

/// Parameters for a new channel
#[derive(Debug, Clone)]
pub struct ChannelParams {
    /// Category of the sound
    pub category: SoundCategory,
    /// Play-mode flags
    pub mode: PlayMode,
    /// World position, `None` for 2D sounds
    pub position: Option<Vec3>,
    /// Initial gain
    pub volume: f32,
    /// Initial playback rate
    pub pitch: f32,
}

impl ChannelParams {
    /// Parameters for a non-positional channel
    pub fn flat(category: SoundCategory, mode: PlayMode) -> Self {
        Self {
            category,
            mode,
            position: None,
            volume: 1.0,
            pitch: 1.0,
        }
    }

    /// Whether the channel loops its buffer
    pub fn is_looping(&self) -> bool {
        self.mode.contains(PlayMode::LOOP)
    }
}

/// Available output implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Silent output that only simulates playback time
    Null,
    /// Device output through rodio (requires the `rodio` feature)
    Rodio,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "rodio") {
            Self::Rodio
        } else {
            Self::Null
        }
    }
}

/// Create an audio output of the requested kind
pub fn create_backend(kind: BackendKind, max_channels: usize) -> Result<Box<dyn AudioOutput>, AudioError> {
    match kind {
        BackendKind::Null => Ok(Box::new(NullOutput::new(max_channels))),
        #[cfg(feature = "rodio")]
        BackendKind::Rodio => Ok(Box::new(RodioOutput::new(max_channels)?)),
        #[cfg(not(feature = "rodio"))]
        BackendKind::Rodio => Err(AudioError::BackendInitFailed(
            "built without the `rodio` feature".to_string(),
        )),
    }
}
