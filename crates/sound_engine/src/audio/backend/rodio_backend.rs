//! Rodio audio output
//!
//! Uses the Rodio library for cross-platform device playback. Every channel
//! is a [`SpatialSink`]; the emitter is kept at unit distance from the
//! listener in the direction of the sound so that rodio only pans, while
//! distance attenuation stays with the sound core.
//!
//! # Example
//!
//! ```no_run
//! use sound_engine::audio::backend::{AudioOutput, ChannelParams, RodioOutput};
//! use sound_engine::audio::{PcmData, PlayMode, SoundCategory};
//!
//! let mut output = RodioOutput::new(32).unwrap();
//! let channel = output
//!     .allocate_channel(&ChannelParams::flat(SoundCategory::Effect, PlayMode::empty()))
//!     .unwrap();
//! output.play_buffer(channel, &PcmData::tone(440.0, 1.0, 44_100, 0.5), 0).unwrap();
//! ```

use super::{AudioOutput, ChannelId, ChannelParams, ChannelPool};
use crate::audio::category::PlayMode;
use crate::audio::format::{AudioFormat, PcmData};
use crate::audio::spatial::Listener;
use crate::audio::AudioError;
use crate::foundation::math::{utils, Vec3};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Source, SpatialSink};

/// Half the distance between the simulated ears
const EAR_OFFSET: f32 = 0.1;

/// Cutoff applied to sources started while the listener is underwater
const UNDERWATER_CUTOFF_HZ: u32 = 800;

/// Per-channel device state
struct RodioChannel {
    sink: SpatialSink,
    position: Option<Vec3>,
    looping: bool,
    /// Subject to the listener environment filter
    environmental: bool,
}

/// Rodio-based audio output
pub struct RodioOutput {
    /// Audio output stream (must be kept alive)
    _output_stream: OutputStream,
    /// Output stream handle for creating sinks
    stream_handle: OutputStreamHandle,
    channels: ChannelPool<RodioChannel>,
    listener: Listener,
}

impl RodioOutput {
    /// Open the default output device
    ///
    /// # Errors
    /// - `BackendInitFailed` if no output device can be opened
    pub fn new(max_channels: usize) -> Result<Self, AudioError> {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            AudioError::BackendInitFailed(format!("Failed to create audio output: {}", e))
        })?;

        log::info!("Rodio audio output initialized with {} channels", max_channels);
        Ok(Self {
            _output_stream: stream,
            stream_handle,
            channels: ChannelPool::with_capacity(max_channels),
            listener: Listener::default(),
        })
    }

    /// Emitter position presented to rodio for a sound at `position`
    fn emitter_for(listener: &Listener, position: Option<Vec3>) -> [f32; 3] {
        let emitter = match position {
            Some(position) => {
                let offset = position - listener.position;
                listener.position + utils::normalize_or(&offset, Vec3::zeros())
            }
            None => listener.position,
        };
        emitter.into()
    }

    fn ears(listener: &Listener) -> ([f32; 3], [f32; 3]) {
        let right = listener.right() * EAR_OFFSET;
        (
            (listener.position - right).into(),
            (listener.position + right).into(),
        )
    }

    fn channel(&self, channel: ChannelId) -> Result<&RodioChannel, AudioError> {
        self.channels.get(channel).ok_or(AudioError::InvalidHandle)
    }

    fn append<S>(&self, state: &RodioChannel, source: S)
    where
        S: Source<Item = i16> + Send + 'static,
    {
        if state.environmental && self.listener.underwater {
            state
                .sink
                .append(source.convert_samples::<f32>().low_pass(UNDERWATER_CUTOFF_HZ));
        } else {
            state.sink.append(source);
        }
    }
}

impl AudioOutput for RodioOutput {
    fn name(&self) -> &str {
        "rodio"
    }

    fn allocate_channel(&mut self, params: &ChannelParams) -> Result<ChannelId, AudioError> {
        if !self.channels.has_available() {
            return Err(AudioError::PlaybackUnavailable(format!(
                "all {} channels in use",
                self.channels.max_channels()
            )));
        }

        let (left, right) = Self::ears(&self.listener);
        let emitter = Self::emitter_for(&self.listener, params.position);
        let sink = SpatialSink::try_new(&self.stream_handle, emitter, left, right)
            .map_err(|e| AudioError::PlaybackUnavailable(format!("Failed to create sink: {}", e)))?;
        sink.set_volume(params.volume);
        sink.set_speed(params.pitch);

        let state = RodioChannel {
            sink,
            position: params.position,
            looping: params.is_looping(),
            environmental: !params.mode.contains(PlayMode::NO_ENV),
        };
        self.channels
            .allocate(params.category, state)
            .ok_or_else(|| AudioError::PlaybackUnavailable("channel pool exhausted".to_string()))
    }

    fn play_buffer(&mut self, channel: ChannelId, pcm: &PcmData, start_frame: usize) -> Result<(), AudioError> {
        let state = self.channel(channel)?;
        let channels = pcm.format.channels;
        let rate = pcm.format.sample_rate;

        let first_pass = SamplesBuffer::new(channels, rate, pcm.samples_from(start_frame).to_vec());
        self.append(state, first_pass);
        if state.looping {
            let whole = SamplesBuffer::new(channels, rate, pcm.samples.clone());
            self.append(state, whole.repeat_infinite());
        }
        Ok(())
    }

    fn queue_stream(&mut self, channel: ChannelId, format: AudioFormat, samples: &[i16]) -> Result<(), AudioError> {
        let state = self.channel(channel)?;
        let chunk = SamplesBuffer::new(format.channels, format.sample_rate, samples.to_vec());
        self.append(state, chunk);
        Ok(())
    }

    fn set_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), AudioError> {
        let emitter = Self::emitter_for(&self.listener, Some(position));
        let state = self.channels.get_mut(channel).ok_or(AudioError::InvalidHandle)?;
        state.position = Some(position);
        state.sink.set_emitter_position(emitter);
        Ok(())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<(), AudioError> {
        self.channel(channel)?.sink.set_volume(volume);
        Ok(())
    }

    fn set_pitch(&mut self, channel: ChannelId, pitch: f32) -> Result<(), AudioError> {
        self.channel(channel)?.sink.set_speed(pitch);
        Ok(())
    }

    fn pause(&mut self, channel: ChannelId) -> Result<(), AudioError> {
        self.channel(channel)?.sink.pause();
        Ok(())
    }

    fn resume(&mut self, channel: ChannelId) -> Result<(), AudioError> {
        self.channel(channel)?.sink.play();
        Ok(())
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        self.channels.get(channel).map_or(true, |c| c.sink.empty())
    }

    fn queued_chunks(&self, channel: ChannelId) -> usize {
        self.channels.get(channel).map_or(0, |c| c.sink.len())
    }

    fn release(&mut self, channel: ChannelId) {
        if let Some(state) = self.channels.remove(channel) {
            state.sink.stop();
        }
    }

    fn set_listener(&mut self, listener: &Listener) {
        if listener.underwater != self.listener.underwater {
            log::debug!("Listener environment changed to {:?}", listener.environment());
        }
        self.listener = listener.clone();

        let (left, right) = Self::ears(listener);
        for (_, state) in self.channels.iter() {
            state.sink.set_left_ear_position(left);
            state.sink.set_right_ear_position(right);
            state
                .sink
                .set_emitter_position(Self::emitter_for(listener, state.position));
        }
    }

    fn active_channels(&self) -> usize {
        self.channels.len()
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        for (_, state) in self.channels.iter() {
            state.sink.stop();
        }
        self.channels.clear();
        log::info!("Rodio audio output shutdown");
    }
}
