//! Sound manager facade
//!
//! The one entry point gameplay code uses. Owns the output, the buffer
//! cache, the active sound registry, the music controller, the regional
//! ambience, the loudness index, category volumes and the listener. Play-path failures are logged
//! and turned into invalid handles; audio never fails the caller.
//!
//! # Example
//!
//! ```no_run
//! use sound_engine::audio::backend::NullOutput;
//! use sound_engine::audio::resources::{MemoryResources, SoundRecord};
//! use sound_engine::audio::{PcmData, PlayParams, SoundManager, SoundServices};
//! use sound_engine::config::SoundConfig;
//! use sound_engine::world::EmptyWorld;
//! use std::rc::Rc;
//!
//! let mut resources = MemoryResources::new();
//! resources.add_sound("chime", SoundRecord::new("chime.wav"), PcmData::tone(880.0, 0.5, 22_050, 0.5));
//! let resources = Rc::new(resources);
//!
//! let services = SoundServices {
//!     decoder: Box::new(Rc::clone(&resources)),
//!     store: Box::new(resources),
//!     world: Rc::new(EmptyWorld),
//! };
//! let config = SoundConfig::default();
//! let mut sound = SoundManager::new(&config, Box::new(NullOutput::new(config.max_channels)), services);
//!
//! let handle = sound.play_sound("chime", PlayParams::default());
//! sound.update(1.0 / 60.0);
//! assert!(sound.is_sound_playing(handle));
//! ```

use crate::audio::ambience::RegionAmbience;
use crate::audio::backend::{create_backend, AudioOutput, BackendKind, NullOutput};
use crate::audio::cache::SoundBufferCache;
use crate::audio::category::{PlayMode, SoundCategories, SoundCategory};
use crate::audio::decoder::{Decoder, DecoderStream};
use crate::audio::loudness::LoudnessIndex;
use crate::audio::mixer::CategoryVolumes;
use crate::audio::music::MusicController;
use crate::audio::registry::{ActiveSoundRegistry, Emitter, PlayParams, PlaybackContext, SoundHandle};
use crate::audio::resources::ResourceStore;
use crate::audio::spatial::{Listener, SpatialAudio};
use crate::audio::AudioError;
use crate::config::SoundConfig;
use crate::foundation::math::Vec3;
use crate::world::{EntityId, RegionId, SoundWorld};
use std::rc::Rc;

/// Collaborators injected into the sound manager
pub struct SoundServices {
    /// Opens resource files for decoding
    pub decoder: Box<dyn Decoder>,
    /// Resolves sound ids and lists playlists
    pub store: Box<dyn ResourceStore>,
    /// Entity positions, lifetime and regions
    pub world: Rc<dyn SoundWorld>,
}

/// Everything that only exists while sound is enabled
struct SoundCore {
    output: Box<dyn AudioOutput>,
    services: SoundServices,
    cache: SoundBufferCache,
    registry: ActiveSoundRegistry,
    music: MusicController,
    ambience: RegionAmbience,
    loudness: LoudnessIndex,
    volumes: CategoryVolumes,
    spatial: SpatialAudio,
    underwater: SoundHandle,
}

impl SoundCore {
    fn new(config: &SoundConfig, output: Box<dyn AudioOutput>, services: SoundServices) -> Self {
        Self {
            output,
            services,
            cache: SoundBufferCache::from_config(config),
            registry: ActiveSoundRegistry::new(config.voice_min_distance, config.voice_max_distance),
            music: MusicController::new(config),
            ambience: RegionAmbience::new(config),
            loudness: LoudnessIndex::new(),
            volumes: CategoryVolumes::from_config(config),
            spatial: SpatialAudio::default(),
            underwater: SoundHandle::invalid(),
        }
    }

    /// Borrow the collaborators next to the registry, music and ambience
    fn split(
        &mut self,
    ) -> (
        PlaybackContext<'_>,
        &mut ActiveSoundRegistry,
        &mut MusicController,
        &mut RegionAmbience,
    ) {
        let Self {
            output,
            services,
            cache,
            registry,
            music,
            ambience,
            loudness,
            volumes,
            spatial,
            ..
        } = self;
        let ctx = PlaybackContext {
            output: output.as_mut(),
            cache,
            store: services.store.as_ref(),
            decoder: services.decoder.as_ref(),
            world: services.world.as_ref(),
            volumes,
            spatial,
            loudness,
        };
        (ctx, registry, music, ambience)
    }

    fn play(&mut self, emitter: Emitter, sound_id: &str, params: PlayParams) -> Result<SoundHandle, AudioError> {
        let (mut ctx, registry, _, _) = self.split();
        registry.play(&mut ctx, emitter, sound_id, params)
    }

    /// Start or stop the underwater ambience to match the listener
    fn update_underwater(&mut self, underwater_sound: Option<&str>) {
        let submerged = self.spatial.listener().underwater;
        let playing = self.registry.is_handle_playing(self.underwater);

        match underwater_sound {
            Some(sound_id) if submerged && !playing => {
                let params = PlayParams::default().with_mode(PlayMode::LOOP | PlayMode::NO_ENV);
                self.underwater = match self.play(Emitter::Listener, sound_id, params) {
                    Ok(handle) => handle,
                    Err(e) => {
                        log::warn!("Failed to start underwater ambience '{}': {}", sound_id, e);
                        SoundHandle::invalid()
                    }
                };
            }
            _ if playing && (!submerged || underwater_sound.is_none()) => {
                self.registry
                    .stop_handle(self.underwater, self.output.as_mut(), &mut self.cache);
                self.underwater = SoundHandle::invalid();
            }
            _ => {}
        }
    }
}

/// Sound manager facade
pub struct SoundManager {
    core: Option<SoundCore>,
    config: SoundConfig,
}

impl SoundManager {
    /// Create a sound manager around an already opened output
    ///
    /// With `use_sound = false` the output is dropped and every operation
    /// becomes a no-op.
    pub fn new(config: &SoundConfig, output: Box<dyn AudioOutput>, services: SoundServices) -> Self {
        let config = config.validated();
        if !config.use_sound {
            log::info!("Sound disabled by configuration");
            return Self { core: None, config };
        }

        log::info!(
            "Sound manager initialized with '{}' output (cache {}..{} bytes)",
            output.name(),
            config.buffer_cache_min,
            config.buffer_cache_max
        );
        Self {
            core: Some(SoundCore::new(&config, output, services)),
            config,
        }
    }

    /// Create a sound manager, opening an output of the given kind
    ///
    /// # Errors
    /// - `BackendInitFailed` if the output cannot be opened
    pub fn with_backend(config: &SoundConfig, kind: BackendKind, services: SoundServices) -> Result<Self, AudioError> {
        if !config.use_sound {
            return Ok(Self::new(config, Box::new(NullOutput::new(0)), services));
        }
        let output = create_backend(kind, config.max_channels)?;
        Ok(Self::new(config, output, services))
    }

    /// A manager with sound switched off
    pub fn disabled() -> Self {
        Self {
            core: None,
            config: SoundConfig {
                use_sound: false,
                ..Default::default()
            },
        }
    }

    /// Whether sound is enabled
    pub fn is_enabled(&self) -> bool {
        self.core.is_some()
    }

    /// Active configuration
    pub fn config(&self) -> &SoundConfig {
        &self.config
    }

    fn absorb(result: Result<SoundHandle, AudioError>, what: &str, name: &str) -> SoundHandle {
        result.unwrap_or_else(|e| {
            log::warn!("Failed to {} '{}': {}", what, name, e);
            SoundHandle::invalid()
        })
    }

    // ---- One-shot and looping sounds ----

    /// Play a non-positional sound
    pub fn play_sound(&mut self, sound_id: &str, params: PlayParams) -> SoundHandle {
        let Some(core) = self.core.as_mut() else {
            return SoundHandle::invalid();
        };
        Self::absorb(core.play(Emitter::Listener, sound_id, params), "play sound", sound_id)
    }

    /// Play a sound attached to `entity`
    pub fn play_sound_3d(&mut self, entity: EntityId, sound_id: &str, params: PlayParams) -> SoundHandle {
        let Some(core) = self.core.as_mut() else {
            return SoundHandle::invalid();
        };
        Self::absorb(core.play(Emitter::Entity(entity), sound_id, params), "play sound", sound_id)
    }

    /// Play a sound at a fixed world position
    pub fn play_sound_3d_at(&mut self, position: Vec3, sound_id: &str, params: PlayParams) -> SoundHandle {
        let Some(core) = self.core.as_mut() else {
            return SoundHandle::invalid();
        };
        Self::absorb(core.play(Emitter::Fixed(position), sound_id, params), "play sound", sound_id)
    }

    /// Play a non-positional stream from a caller-supplied decoder, such as
    /// a video soundtrack
    pub fn play_track(&mut self, label: &str, stream: Box<dyn DecoderStream>, category: SoundCategory) -> SoundHandle {
        let Some(core) = self.core.as_mut() else {
            return SoundHandle::invalid();
        };
        let (mut ctx, registry, _, _) = core.split();
        Self::absorb(registry.play_stream(&mut ctx, label, stream, category), "play track", label)
    }

    /// Stop `sound_id` on `entity`
    pub fn stop_sound_3d(&mut self, entity: EntityId, sound_id: &str) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop(Some(entity), sound_id, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Stop every sound of `entity`, speech included
    pub fn stop_entity_sounds(&mut self, entity: EntityId) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop_entity(entity, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Stop non-positional and fixed-position sounds with `sound_id`
    pub fn stop_sound(&mut self, sound_id: &str) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop_free(sound_id, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Stop the sound behind `handle`
    pub fn stop_sound_handle(&mut self, handle: SoundHandle) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop_handle(handle, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Stop every sound in the given categories
    pub fn stop_category(&mut self, mask: SoundCategories) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop_category(mask, core.output.as_mut(), &mut core.cache);
            if mask.has(SoundCategory::Music) {
                core.music.stop_music(core.output.as_mut());
            }
        }
    }

    /// Stop the sounds of every entity in `region`, e.g. when it unloads
    pub fn stop_sounds_in_region(&mut self, region: RegionId) {
        if let Some(core) = self.core.as_mut() {
            core.registry.stop_region(
                region,
                core.services.world.as_ref(),
                core.output.as_mut(),
                &mut core.cache,
            );
        }
    }

    /// Fade `sound_id` on `entity` to silence over `duration` seconds
    pub fn fade_out_sound_3d(&mut self, entity: EntityId, sound_id: &str, duration: f32) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .fade_out(entity, sound_id, duration, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Whether `owner` (`None` for free sounds) is playing `sound_id`
    pub fn get_sound_playing(&self, owner: Option<EntityId>, sound_id: &str) -> bool {
        self.core
            .as_ref()
            .is_some_and(|core| core.registry.is_playing(owner, sound_id))
    }

    /// Whether the sound behind `handle` is still active
    pub fn is_sound_playing(&self, handle: SoundHandle) -> bool {
        self.core
            .as_ref()
            .is_some_and(|core| core.registry.is_handle_playing(handle))
    }

    /// Move a fixed-position sound
    pub fn set_sound_position(&mut self, handle: SoundHandle, position: Vec3) {
        if let Some(core) = self.core.as_mut() {
            if let Err(e) = core
                .registry
                .set_handle_position(handle, position, core.output.as_mut())
            {
                log::debug!("Cannot move sound: {}", e);
            }
        }
    }

    /// Final volume last applied to the sound behind `handle`
    pub fn effective_volume(&self, handle: SoundHandle) -> Option<f32> {
        self.core
            .as_ref()
            .and_then(|core| core.registry.effective_volume(handle))
    }

    /// Decode `sound_id` ahead of its first use
    pub fn preload_sound(&mut self, sound_id: &str) {
        if let Some(core) = self.core.as_mut() {
            let result = core.cache.preload(
                sound_id,
                core.services.store.as_ref(),
                core.services.decoder.as_ref(),
            );
            if let Err(e) = result {
                log::warn!("Failed to preload '{}': {}", sound_id, e);
            }
        }
    }

    // ---- Speech ----

    /// Start speech for `owner` (`None` for non-positional speech),
    /// replacing any speech it is still playing
    pub fn say(&mut self, owner: Option<EntityId>, file: &str) -> SoundHandle {
        let Some(core) = self.core.as_mut() else {
            return SoundHandle::invalid();
        };
        let (mut ctx, registry, _, _) = core.split();
        Self::absorb(registry.say(&mut ctx, owner, file), "say", file)
    }

    /// Whether `owner` has finished speaking
    pub fn say_done(&self, owner: Option<EntityId>) -> bool {
        self.core
            .as_ref()
            .map_or(true, |core| core.registry.say_done(owner))
    }

    /// Interrupt the speech of `owner`
    pub fn stop_say(&mut self, owner: Option<EntityId>) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .stop_say(owner, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Current speech loudness of `owner` in `[0, 1]`, for lip-sync
    pub fn say_loudness(&self, owner: Option<EntityId>) -> f32 {
        self.core
            .as_ref()
            .map_or(0.0, |core| core.registry.say_loudness(owner, &core.loudness))
    }

    // ---- Music ----

    /// Switch to a playlist and start a random title from it
    pub fn play_playlist(&mut self, name: &str) -> bool {
        let Some(core) = self.core.as_mut() else {
            return false;
        };
        let (mut ctx, _, music, _) = core.split();
        music.play_playlist(name, &mut ctx)
    }

    /// Start a random title from the current playlist
    pub fn start_random_title(&mut self) -> bool {
        let Some(core) = self.core.as_mut() else {
            return false;
        };
        let (mut ctx, _, music, _) = core.split();
        music.start_random_title(&mut ctx)
    }

    /// Stream a music file relative to the music prefix
    pub fn stream_music(&mut self, file: &str) {
        let Some(core) = self.core.as_mut() else {
            return;
        };
        let (mut ctx, _, music, _) = core.split();
        if let Err(e) = music.stream_music(file, &mut ctx) {
            log::warn!("Failed to stream music '{}': {}", file, e);
        }
    }

    /// Stop the music and disable automatic advancing
    pub fn stop_music(&mut self) {
        if let Some(core) = self.core.as_mut() {
            core.music.stop_music(core.output.as_mut());
        }
    }

    /// Whether music is streaming
    pub fn is_music_playing(&self) -> bool {
        self.core
            .as_ref()
            .is_some_and(|core| core.music.is_music_playing())
    }

    /// Resource path of the track currently heard
    pub fn current_music_track(&self) -> Option<&str> {
        self.core.as_ref().and_then(|core| core.music.current_track())
    }

    // ---- Pausing, listener and per-tick update ----

    /// Pause every sound in `mask`
    pub fn pause_sounds(&mut self, mask: SoundCategories) {
        if let Some(core) = self.core.as_mut() {
            log::debug!("Pausing {:?}", mask);
            core.registry.pause(mask, core.output.as_mut());
            if mask.has(SoundCategory::Music) {
                core.music.pause(core.output.as_mut());
            }
        }
    }

    /// Resume every paused sound in `mask`
    pub fn resume_sounds(&mut self, mask: SoundCategories) {
        if let Some(core) = self.core.as_mut() {
            log::debug!("Resuming {:?}", mask);
            core.registry.resume(mask, core.output.as_mut());
            if mask.has(SoundCategory::Music) {
                core.music.resume(core.output.as_mut());
            }
        }
    }

    /// Update the listener; takes effect on the next [`Self::update`]
    pub fn set_listener_pos_dir(&mut self, position: Vec3, direction: Vec3, up: Vec3, underwater: bool) {
        if let Some(core) = self.core.as_mut() {
            core.spatial.set_listener(position, direction, up, underwater);
        }
    }

    /// Region the listener is in; its ambient sounds play from the next
    /// [`Self::update`]
    pub fn set_listener_region(&mut self, region: Option<RegionId>) {
        if let Some(core) = self.core.as_mut() {
            core.ambience.set_region(region);
        }
    }

    /// Region whose ambience is playing
    pub fn listener_region(&self) -> Option<RegionId> {
        self.core.as_ref().and_then(|core| core.ambience.region())
    }

    /// The listener record
    pub fn listener(&self) -> Option<&Listener> {
        self.core.as_ref().map(|core| core.spatial.listener())
    }

    /// Advance all sounds and music by `delta_time` seconds
    pub fn update(&mut self, delta_time: f32) {
        let Some(core) = self.core.as_mut() else {
            return;
        };

        core.output.set_listener(core.spatial.listener());
        core.output.update(delta_time);
        core.update_underwater(self.config.underwater_sound.as_deref());

        let (mut ctx, registry, music, ambience) = core.split();
        registry.update_all(&mut ctx, delta_time);
        music.update(delta_time, &mut ctx);
        ambience.update(delta_time, registry, &mut ctx);
    }

    /// Move all sounds of `old` to `new`
    pub fn update_entity(&mut self, old: EntityId, new: EntityId) {
        if let Some(core) = self.core.as_mut() {
            core.registry
                .rename_entity(old, new, core.output.as_mut(), &mut core.cache);
        }
    }

    /// Stop every sound and the music
    pub fn clear(&mut self) {
        if let Some(core) = self.core.as_mut() {
            core.registry.clear(core.output.as_mut(), &mut core.cache);
            core.music.stop_music(core.output.as_mut());
            core.underwater = SoundHandle::invalid();
            log::debug!("Cleared all sounds");
        }
    }

    /// Apply changed settings right away
    ///
    /// Volumes, cache bounds, falloff defaults and music options are taken
    /// from `config`, and every playing sound is re-leveled immediately,
    /// distance attenuation included. Toggling `use_sound` needs a new
    /// manager.
    pub fn process_changed_settings(&mut self, config: &SoundConfig) {
        let config = config.validated();
        if config.use_sound != self.config.use_sound {
            log::warn!("Changing use_sound requires restarting the sound system");
        }

        if let Some(core) = self.core.as_mut() {
            let changed = core.volumes.apply_config(&config);
            core.cache.set_bounds(config.buffer_cache_min, config.buffer_cache_max);
            core.cache
                .set_default_distances(config.default_min_distance, config.default_max_distance);
            core.registry
                .set_voice_distances(config.voice_min_distance, config.voice_max_distance);
            core.music.apply_config(&config);
            core.ambience.apply_config(&config);

            let (mut ctx, registry, music, _) = core.split();
            registry.rescan(&mut ctx);
            music.apply_volume(ctx.output, ctx.volumes.effective_volume(SoundCategory::Music));
            if changed {
                log::debug!("Applied changed sound volumes");
            }

            if config.underwater_sound != self.config.underwater_sound {
                core.registry
                    .stop_handle(core.underwater, core.output.as_mut(), &mut core.cache);
                core.underwater = SoundHandle::invalid();
            }
        }
        self.config = config;
    }

    /// Number of active sound instances
    pub fn active_sound_count(&self) -> usize {
        self.core.as_ref().map_or(0, |core| core.registry.len())
    }

    /// Decoded bytes held by the buffer cache
    pub fn cache_bytes(&self) -> usize {
        self.core.as_ref().map_or(0, |core| core.cache.total_bytes())
    }
}
