//! Silent output
//!
//! Tracks channels and simulated playback time without touching an audio
//! device. Used when no device is wanted and throughout the test suite.

use super::{AudioOutput, ChannelId, ChannelParams, ChannelPool};
use crate::audio::format::{AudioFormat, PcmData};
use crate::audio::spatial::Listener;
use crate::audio::AudioError;
use crate::foundation::math::Vec3;
use std::collections::VecDeque;

/// Simulated state of one channel
#[derive(Debug, Clone)]
struct NullChannel {
    looping: bool,
    paused: bool,
    volume: f32,
    pitch: f32,
    position: Option<Vec3>,
    /// Seconds of audio consumed so far
    played: f32,
    /// Seconds of audio submitted so far
    total: f32,
    /// End time of every submitted chunk, oldest first
    chunk_ends: VecDeque<f32>,
}

impl NullChannel {
    fn new(params: &ChannelParams) -> Self {
        Self {
            looping: params.is_looping(),
            paused: false,
            volume: params.volume,
            pitch: params.pitch,
            position: params.position,
            played: 0.0,
            total: 0.0,
            chunk_ends: VecDeque::new(),
        }
    }

    fn submit(&mut self, seconds: f32) {
        self.total += seconds;
        self.chunk_ends.push_back(self.total);
    }

    fn advance(&mut self, delta_time: f32) {
        if self.paused {
            return;
        }
        self.played += delta_time * self.pitch;
        if !self.looping {
            self.played = self.played.min(self.total);
            while self.chunk_ends.front().is_some_and(|end| *end <= self.played) {
                self.chunk_ends.pop_front();
            }
        }
    }
}

/// Audio output that plays nothing
pub struct NullOutput {
    channels: ChannelPool<NullChannel>,
    listener: Listener,
}

impl NullOutput {
    /// Create a silent output with `max_channels` channels
    pub fn new(max_channels: usize) -> Self {
        log::debug!("Null audio output created with {} channels", max_channels);
        Self {
            channels: ChannelPool::with_capacity(max_channels),
            listener: Listener::default(),
        }
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut NullChannel, AudioError> {
        self.channels.get_mut(channel).ok_or(AudioError::InvalidHandle)
    }

    /// Current gain of a channel
    pub fn volume(&self, channel: ChannelId) -> Option<f32> {
        self.channels.get(channel).map(|c| c.volume)
    }

    /// Current playback rate of a channel
    pub fn pitch(&self, channel: ChannelId) -> Option<f32> {
        self.channels.get(channel).map(|c| c.pitch)
    }

    /// Current position of a channel
    pub fn position(&self, channel: ChannelId) -> Option<Vec3> {
        self.channels.get(channel).and_then(|c| c.position)
    }

    /// Whether a channel is paused
    pub fn is_paused(&self, channel: ChannelId) -> bool {
        self.channels.get(channel).is_some_and(|c| c.paused)
    }

    /// Last listener passed to [`AudioOutput::set_listener`]
    pub fn listener(&self) -> &Listener {
        &self.listener
    }
}

impl AudioOutput for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn allocate_channel(&mut self, params: &ChannelParams) -> Result<ChannelId, AudioError> {
        self.channels
            .allocate(params.category, NullChannel::new(params))
            .ok_or_else(|| {
                AudioError::PlaybackUnavailable(format!(
                    "all {} channels in use",
                    self.channels.max_channels()
                ))
            })
    }

    fn play_buffer(&mut self, channel: ChannelId, pcm: &PcmData, start_frame: usize) -> Result<(), AudioError> {
        let state = self.channel_mut(channel)?;
        let start = pcm.format.frames_to_seconds(start_frame.min(pcm.frames()));
        state.submit(pcm.duration() - start);
        Ok(())
    }

    fn queue_stream(&mut self, channel: ChannelId, format: AudioFormat, samples: &[i16]) -> Result<(), AudioError> {
        let state = self.channel_mut(channel)?;
        let frames = samples.len() / usize::from(format.channels.max(1));
        state.submit(format.frames_to_seconds(frames));
        Ok(())
    }

    fn set_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), AudioError> {
        self.channel_mut(channel)?.position = Some(position);
        Ok(())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<(), AudioError> {
        self.channel_mut(channel)?.volume = volume;
        Ok(())
    }

    fn set_pitch(&mut self, channel: ChannelId, pitch: f32) -> Result<(), AudioError> {
        self.channel_mut(channel)?.pitch = pitch;
        Ok(())
    }

    fn pause(&mut self, channel: ChannelId) -> Result<(), AudioError> {
        self.channel_mut(channel)?.paused = true;
        Ok(())
    }

    fn resume(&mut self, channel: ChannelId) -> Result<(), AudioError> {
        self.channel_mut(channel)?.paused = false;
        Ok(())
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        self.channels
            .get(channel)
            .map_or(true, |c| !c.looping && c.played >= c.total)
    }

    fn queued_chunks(&self, channel: ChannelId) -> usize {
        self.channels.get(channel).map_or(0, |c| c.chunk_ends.len())
    }

    fn release(&mut self, channel: ChannelId) {
        self.channels.remove(channel);
    }

    fn set_listener(&mut self, listener: &Listener) {
        self.listener = listener.clone();
    }

    fn update(&mut self, delta_time: f32) {
        for (_, channel) in self.channels.iter_mut() {
            channel.advance(delta_time);
        }
    }

    fn active_channels(&self) -> usize {
        self.channels.len()
    }
}
