//! Music system
//!
//! Streams background music from playlists. A playlist is every resource
//! under `<music_prefix><name>/`; tracks are picked at random without
//! repeating the previous one, and the next title starts on its own when the
//! current one ends. Switching tracks is a hard cut unless a crossfade
//! duration is configured.

use crate::audio::backend::{AudioOutput, ChannelId, ChannelParams};
use crate::audio::category::{PlayMode, SoundCategory};
use crate::audio::registry::PlaybackContext;
use crate::audio::resources::ResourceStore;
use crate::audio::stream::StreamPump;
use crate::audio::AudioError;
use crate::config::SoundConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

/// Music playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicState {
    /// No music is playing
    Stopped,

    /// One track is streaming
    Streaming,

    /// Crossfading between two tracks
    Crossfading,
}

/// Internal track playback info
struct PlayingTrack {
    path: String,
    channel: ChannelId,
    pump: StreamPump,
    volume: f32, // Fade factor (for crossfading)
    playback_time: f32,
}

impl PlayingTrack {
    fn is_finished(&self, output: &dyn AudioOutput) -> bool {
        self.pump.is_exhausted() && output.is_finished(self.channel)
    }

    fn apply_volume(&self, output: &mut dyn AudioOutput, music_volume: f32) {
        if let Err(e) = output.set_volume(self.channel, self.volume * music_volume) {
            log::warn!("Failed to set music volume for '{}': {}", self.path, e);
        }
    }
}

/// Music controller managing playlists and the streamed track
pub struct MusicController {
    /// Current playing track
    current: Option<PlayingTrack>,

    /// Track being faded in during crossfade
    fading_in: Option<PlayingTrack>,

    /// Current playback state
    state: MusicState,

    /// Crossfade progress (0.0 to 1.0)
    fade_progress: f32,

    /// Crossfade duration; 0 switches tracks with a hard cut
    fade_duration: f32,

    /// Fade factor the outgoing track started its fade-out from
    fade_out_from: f32,

    music_prefix: String,
    current_playlist: Option<String>,
    /// Track lists, scanned once per playlist name
    playlists: HashMap<String, Vec<String>>,
    last_played: Option<String>,
    /// Start another title when the current one ends
    auto_advance: bool,
    paused: bool,
    rng: StdRng,
}

impl MusicController {
    /// Create a music controller from configuration
    pub fn new(config: &SoundConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a music controller with a deterministic track order
    pub fn with_seed(config: &SoundConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SoundConfig, rng: StdRng) -> Self {
        Self {
            current: None,
            fading_in: None,
            state: MusicState::Stopped,
            fade_progress: 0.0,
            fade_duration: config.music_crossfade.max(0.0),
            fade_out_from: 1.0,
            music_prefix: config.music_prefix.clone(),
            current_playlist: None,
            playlists: HashMap::new(),
            last_played: None,
            auto_advance: false,
            paused: false,
            rng,
        }
    }

    /// Take crossfade and prefix settings from `config`
    pub fn apply_config(&mut self, config: &SoundConfig) {
        self.fade_duration = config.music_crossfade.max(0.0);
        if self.music_prefix != config.music_prefix {
            self.music_prefix = config.music_prefix.clone();
            self.playlists.clear();
        }
    }

    /// Switch to playlist `name` and start a random title from it
    ///
    /// Does nothing if that playlist is already playing. Returns whether a
    /// new title was started.
    pub fn play_playlist(&mut self, name: &str, ctx: &mut PlaybackContext<'_>) -> bool {
        if self.current_playlist.as_deref() == Some(name) && self.is_music_playing() {
            return false;
        }
        self.current_playlist = Some(name.to_string());
        self.start_random_title(ctx)
    }

    fn playlist_tracks(&mut self, name: &str, store: &dyn ResourceStore) -> &[String] {
        let prefix = format!("{}{}/", self.music_prefix, name);
        self.playlists
            .entry(name.to_string())
            .or_insert_with(|| {
                let tracks = store.list(&prefix);
                log::debug!("Scanned playlist '{}': {} tracks", name, tracks.len());
                tracks
            })
            .as_slice()
    }

    /// Start a random title from the current playlist
    ///
    /// The previous title is excluded when the playlist has more than one.
    /// Returns whether a title was started.
    pub fn start_random_title(&mut self, ctx: &mut PlaybackContext<'_>) -> bool {
        let Some(playlist) = self.current_playlist.clone() else {
            log::debug!("No playlist selected");
            return false;
        };

        let last = self.last_played.clone();
        let tracks = self.playlist_tracks(&playlist, ctx.store).to_vec();
        if tracks.is_empty() {
            log::warn!("No music available in playlist '{}'", playlist);
            return false;
        }

        let candidates: Vec<&String> = if tracks.len() > 1 {
            tracks.iter().filter(|t| Some(*t) != last.as_ref()).collect()
        } else {
            tracks.iter().collect()
        };
        let Some(track) = candidates.choose(&mut self.rng).map(|t| (*t).clone()) else {
            return false;
        };

        match self.stream_music_full(&track, ctx) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to play music '{}': {}", track, e);
                false
            }
        }
    }

    /// Stream `file` relative to the music prefix
    pub fn stream_music(&mut self, file: &str, ctx: &mut PlaybackContext<'_>) -> Result<(), AudioError> {
        let path = format!("{}{}", self.music_prefix, file);
        self.stream_music_full(&path, ctx)
    }

    /// Stream the resource at `path`, replacing the current track
    pub fn stream_music_full(&mut self, path: &str, ctx: &mut PlaybackContext<'_>) -> Result<(), AudioError> {
        let stream = ctx.decoder.open(path)?;
        let mut pump = StreamPump::new(stream);

        let crossfade = self.fade_duration > 0.0 && self.current.is_some();
        let music_volume = ctx.volumes.effective_volume(SoundCategory::Music);
        let mut params = ChannelParams::flat(SoundCategory::Music, PlayMode::NO_ENV);
        params.volume = if crossfade { 0.0 } else { music_volume };

        let channel = ctx.output.allocate_channel(&params)?;
        if let Err(e) = pump.pump(ctx.output, channel) {
            ctx.output.release(channel);
            return Err(e);
        }
        if self.paused {
            if let Err(e) = ctx.output.pause(channel) {
                log::warn!("Failed to pause music '{}': {}", path, e);
            }
        }

        let new_track = PlayingTrack {
            path: path.to_string(),
            channel,
            pump,
            volume: if crossfade { 0.0 } else { 1.0 },
            playback_time: 0.0,
        };

        if crossfade {
            // A crossfade still in progress is cut short; the incoming track
            // fades out from wherever it had got to
            if let Some(pending) = self.fading_in.take() {
                if let Some(old) = self.current.replace(pending) {
                    ctx.output.release(old.channel);
                }
            }
            self.fade_out_from = self.current.as_ref().map_or(1.0, |t| t.volume);
            self.fading_in = Some(new_track);
            self.state = MusicState::Crossfading;
            self.fade_progress = 0.0;
        } else {
            self.release_tracks(ctx.output);
            self.current = Some(new_track);
            self.state = MusicState::Streaming;
        }

        log::info!("Playing music '{}'", path);
        self.last_played = Some(path.to_string());
        self.auto_advance = true;
        Ok(())
    }

    fn release_tracks(&mut self, output: &mut dyn AudioOutput) {
        for track in self.current.take().into_iter().chain(self.fading_in.take()) {
            output.release(track.channel);
        }
    }

    /// Stop the music and disable automatic advancing
    pub fn stop_music(&mut self, output: &mut dyn AudioOutput) {
        self.release_tracks(output);
        self.state = MusicState::Stopped;
        self.fade_progress = 0.0;
        self.auto_advance = false;
    }

    /// Whether a track is streaming
    pub fn is_music_playing(&self) -> bool {
        self.state != MusicState::Stopped
    }

    /// Pause the music stream
    pub fn pause(&mut self, output: &mut dyn AudioOutput) {
        self.paused = true;
        for track in self.current.iter().chain(self.fading_in.iter()) {
            if let Err(e) = output.pause(track.channel) {
                log::warn!("Failed to pause music '{}': {}", track.path, e);
            }
        }
    }

    /// Resume the music stream
    pub fn resume(&mut self, output: &mut dyn AudioOutput) {
        self.paused = false;
        for track in self.current.iter().chain(self.fading_in.iter()) {
            if let Err(e) = output.resume(track.channel) {
                log::warn!("Failed to resume music '{}': {}", track.path, e);
            }
        }
    }

    /// Re-apply the music volume without advancing time
    pub fn apply_volume(&self, output: &mut dyn AudioOutput, music_volume: f32) {
        for track in self.current.iter().chain(self.fading_in.iter()) {
            track.apply_volume(output, music_volume);
        }
    }

    /// Update the music system (call once per frame)
    ///
    /// # Arguments
    /// * `delta_time` - Time since last frame in seconds
    /// * `ctx` - Output, decoder and category volumes
    pub fn update(&mut self, delta_time: f32, ctx: &mut PlaybackContext<'_>) {
        if self.paused {
            return;
        }
        let music_volume = ctx.volumes.effective_volume(SoundCategory::Music);

        for track in self.current.iter_mut().chain(self.fading_in.iter_mut()) {
            if let Err(e) = track.pump.pump(ctx.output, track.channel) {
                log::warn!("Music stream '{}' failed: {}", track.path, e);
            }
            track.playback_time += delta_time;
        }

        if self.state == MusicState::Crossfading {
            self.fade_progress += delta_time / self.fade_duration.max(f32::EPSILON);

            if self.fade_progress >= 1.0 {
                // Crossfade complete
                if let Some(old) = self.current.take() {
                    ctx.output.release(old.channel);
                }
                self.current = self.fading_in.take();
                if let Some(current) = self.current.as_mut() {
                    current.volume = 1.0;
                }
                self.state = MusicState::Streaming;
                self.fade_progress = 0.0;
                self.fade_out_from = 1.0;
            } else {
                let fade = self.fade_progress.clamp(0.0, 1.0);
                if let Some(current) = self.current.as_mut() {
                    current.volume = self.fade_out_from * (1.0 - fade);
                }
                if let Some(fading) = self.fading_in.as_mut() {
                    fading.volume = fade;
                }
            }
        }
        self.apply_volume(ctx.output, music_volume);

        let ended = match self.state {
            MusicState::Streaming => self.current.as_ref().map_or(true, |t| t.is_finished(&*ctx.output)),
            MusicState::Crossfading | MusicState::Stopped => false,
        };
        if ended {
            if let Some(track) = self.current.take() {
                log::debug!("Music '{}' finished after {:.1}s", track.path, track.playback_time);
                ctx.output.release(track.channel);
            }
            self.state = MusicState::Stopped;
            if self.auto_advance {
                self.start_random_title(ctx);
            }
        }
    }

    /// Get current playback state
    pub fn state(&self) -> MusicState {
        self.state
    }

    /// Resource path of the track currently heard (the incoming one while
    /// crossfading)
    pub fn current_track(&self) -> Option<&str> {
        self.fading_in
            .as_ref()
            .or(self.current.as_ref())
            .map(|t| t.path.as_str())
    }

    /// Resource path of the most recently started track
    pub fn last_played(&self) -> Option<&str> {
        self.last_played.as_deref()
    }

    /// Name of the selected playlist
    pub fn current_playlist(&self) -> Option<&str> {
        self.current_playlist.as_deref()
    }

    /// Get current playback time in seconds
    pub fn playback_time(&self) -> f32 {
        self.current.as_ref().map_or(0.0, |t| t.playback_time)
    }
}
