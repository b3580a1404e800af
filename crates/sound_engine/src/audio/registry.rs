//! Active sound registry
//!
//! Tracks every playing instance by owner (an entity, or `None` for free
//! sounds) with a separate speech slot per owner. The registry drives the
//! output each tick: positions follow their entities, volumes are recomputed
//! from category levels and distance, fades advance and finished instances
//! are released together with their buffers.

use crate::audio::backend::{AudioOutput, ChannelId, ChannelParams};
use crate::audio::cache::{BufferKey, SoundBufferCache};
use crate::audio::category::{PlayMode, SoundCategories, SoundCategory};
use crate::audio::decoder::{Decoder, DecoderStream};
use crate::audio::loudness::LoudnessIndex;
use crate::audio::mixer::CategoryVolumes;
use crate::audio::resources::ResourceStore;
use crate::audio::spatial::SpatialAudio;
use crate::audio::stream::StreamPump;
use crate::audio::AudioError;
use crate::foundation::math::Vec3;
use crate::world::{EntityId, RegionId, SoundWorld};
use slotmap::SlotMap;
use std::collections::HashMap;

slotmap::new_key_type! {
    /// Key of a registered sound instance
    pub struct InstanceKey;
}

/// Handle returned to callers for a started sound
///
/// The invalid handle is returned for every soft failure; all operations
/// accept it and do nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SoundHandle(Option<InstanceKey>);

impl SoundHandle {
    /// Handle that refers to no sound
    pub fn invalid() -> Self {
        Self(None)
    }

    /// Whether the handle came from a successful play call
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    fn key(&self) -> Option<InstanceKey> {
        self.0
    }
}

/// Where a sound is emitted from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emitter {
    /// Non-positional, heard at the listener
    Listener,
    /// Attached to an entity and following it
    Entity(EntityId),
    /// Fixed world position with no owner
    Fixed(Vec3),
}

impl Emitter {
    fn owner(&self) -> Option<EntityId> {
        match self {
            Self::Entity(entity) => Some(*entity),
            _ => None,
        }
    }
}

/// Per-call playback parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    /// Instance volume in `[0, 1]`
    pub volume: f32,
    /// Playback rate
    pub pitch: f32,
    /// Category for volume scaling and pausing
    pub category: SoundCategory,
    /// Play-mode flags
    pub mode: PlayMode,
    /// Start position as a fraction of the duration
    pub offset: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            category: SoundCategory::Effect,
            mode: PlayMode::empty(),
            offset: 0.0,
        }
    }
}

impl PlayParams {
    /// Set the instance volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Set the playback rate
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: SoundCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the play-mode flags
    pub fn with_mode(mut self, mode: PlayMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the start offset (fraction of the duration)
    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }
}

/// Audio data behind an instance
enum SoundSource {
    Buffer(BufferKey),
    Stream(StreamPump),
}

/// A playing (or paused) sound
pub struct SoundInstance {
    owner: Option<EntityId>,
    sound_id: String,
    category: SoundCategory,
    mode: PlayMode,
    channel: ChannelId,
    source: SoundSource,
    volume: f32,
    base_volume: f32,
    pitch: f32,
    position: Vec3,
    positional: bool,
    min_distance: f32,
    max_distance: f32,
    fade: f32,
    fade_remaining: Option<f32>,
    paused: bool,
    clock: f32,
    duration: Option<f32>,
    effective_volume: f32,
}

impl SoundInstance {
    /// Owning entity, `None` for free sounds
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    /// Sound id, or resource path for streams
    pub fn sound_id(&self) -> &str {
        &self.sound_id
    }

    /// Category
    pub fn category(&self) -> SoundCategory {
        self.category
    }

    /// Play-mode flags
    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Current world position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Whether the instance is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds into the resource
    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Volume last sent to the output
    pub fn effective_volume(&self) -> f32 {
        self.effective_volume
    }

    fn is_looping(&self) -> bool {
        self.mode.contains(PlayMode::LOOP)
    }

    fn tracks_owner(&self) -> bool {
        self.positional && !self.mode.contains(PlayMode::NO_TRACK)
    }

    fn compute_volume(&self, volumes: &CategoryVolumes, spatial: &SpatialAudio) -> f32 {
        let attenuation = if self.positional {
            spatial.calculate_attenuation(&self.position, self.min_distance, self.max_distance)
        } else {
            1.0
        };
        volumes.effective_volume(self.category) * self.volume * self.base_volume * attenuation * self.fade
    }

    fn advance_clock(&mut self, delta_time: f32) {
        self.clock += delta_time * self.pitch;
        if let Some(duration) = self.duration.filter(|d| *d > 0.0) {
            if self.is_looping() {
                self.clock %= duration;
            } else {
                self.clock = self.clock.min(duration);
            }
        }
    }
}

/// Borrowed collaborators needed to start or drive instances
pub struct PlaybackContext<'a> {
    /// Device output
    pub output: &'a mut dyn AudioOutput,
    /// Decoded buffer cache
    pub cache: &'a mut SoundBufferCache,
    /// Sound id lookup
    pub store: &'a dyn ResourceStore,
    /// File decoding
    pub decoder: &'a dyn Decoder,
    /// Entity positions and lifetime
    pub world: &'a dyn SoundWorld,
    /// Category levels
    pub volumes: &'a CategoryVolumes,
    /// Listener and attenuation
    pub spatial: &'a SpatialAudio,
    /// Speech envelopes
    pub loudness: &'a mut LoudnessIndex,
}

/// Instances belonging to one owner
#[derive(Debug, Default)]
struct OwnerSounds {
    sounds: Vec<InstanceKey>,
    speech: Option<InstanceKey>,
}

impl OwnerSounds {
    fn is_empty(&self) -> bool {
        self.sounds.is_empty() && self.speech.is_none()
    }
}

/// Start parameters shared by buffered and streamed instances
struct Placement {
    owner: Option<EntityId>,
    position: Option<Vec3>,
    min_distance: f32,
    max_distance: f32,
}

/// Registry of all active sound instances
pub struct ActiveSoundRegistry {
    instances: SlotMap<InstanceKey, SoundInstance>,
    owners: HashMap<Option<EntityId>, OwnerSounds>,
    paused: SoundCategories,
    voice_min_distance: f32,
    voice_max_distance: f32,
}

impl ActiveSoundRegistry {
    /// Create an empty registry; speech falls off between the given distances
    pub fn new(voice_min_distance: f32, voice_max_distance: f32) -> Self {
        Self {
            instances: SlotMap::with_key(),
            owners: HashMap::new(),
            paused: SoundCategories::empty(),
            voice_min_distance,
            voice_max_distance,
        }
    }

    /// Change the speech falloff distances for future speech
    pub fn set_voice_distances(&mut self, min_distance: f32, max_distance: f32) {
        self.voice_min_distance = min_distance;
        self.voice_max_distance = max_distance;
    }

    fn resolve_position(emitter: Emitter, world: &dyn SoundWorld) -> Result<Option<Vec3>, AudioError> {
        match emitter {
            Emitter::Listener => Ok(None),
            Emitter::Fixed(position) => Ok(Some(position)),
            Emitter::Entity(entity) => world.position(entity).map(Some).ok_or_else(|| {
                AudioError::PlaybackUnavailable(format!("entity {} has no position", entity))
            }),
        }
    }

    /// Start a cached sound
    ///
    /// An entity may play a given id of a given category only once: an
    /// earlier copy is stopped first unless the category stacks.
    ///
    /// # Errors
    /// Cache errors (`ResourceNotFound`, `DecodeError`, `UnsupportedFormat`)
    /// and `PlaybackUnavailable` from the output. The buffer reference is
    /// released again on output failure.
    pub fn play(
        &mut self,
        ctx: &mut PlaybackContext<'_>,
        emitter: Emitter,
        sound_id: &str,
        params: PlayParams,
    ) -> Result<SoundHandle, AudioError> {
        let owner = emitter.owner();
        let position = Self::resolve_position(emitter, ctx.world)?;

        if params.mode.contains(PlayMode::REMOVE_AT_DISTANCE)
            && position.is_some_and(|p| ctx.spatial.is_beyond_removal(&p))
        {
            log::debug!("Not starting '{}': too far from the listener", sound_id);
            return Ok(SoundHandle::invalid());
        }

        if owner.is_some() && !params.category.allows_stacking() {
            let previous: Vec<InstanceKey> = self
                .owner_sounds(owner)
                .filter(|(_, inst)| inst.sound_id == sound_id && inst.category == params.category)
                .map(|(key, _)| key)
                .collect();
            for key in previous {
                self.remove_instance(key, ctx.output, ctx.cache);
            }
        }

        let buffer_key = ctx.cache.get_or_load(sound_id, ctx.store, ctx.decoder)?;
        let Some(buffer) = ctx.cache.get(buffer_key) else {
            return Err(AudioError::InvalidHandle);
        };

        let offset = params.offset.clamp(0.0, 1.0);
        let pcm = buffer.pcm();
        let start_frame = ((pcm.frames() as f32) * offset) as usize;
        let mut instance = SoundInstance {
            owner,
            sound_id: sound_id.to_string(),
            category: params.category,
            mode: params.mode,
            channel: ChannelId::default(),
            source: SoundSource::Buffer(buffer_key),
            volume: params.volume.clamp(0.0, 1.0),
            base_volume: buffer.volume(),
            pitch: params.pitch,
            position: position.unwrap_or(ctx.spatial.listener().position),
            positional: position.is_some(),
            min_distance: buffer.min_distance(),
            max_distance: buffer.max_distance(),
            fade: 1.0,
            fade_remaining: None,
            paused: false,
            clock: buffer.duration() * offset,
            duration: Some(buffer.duration()),
            effective_volume: 0.0,
        };
        instance.effective_volume = instance.compute_volume(ctx.volumes, ctx.spatial);

        let started = Self::open_channel(ctx.output, &instance).and_then(|channel| {
            match ctx.output.play_buffer(channel, pcm, start_frame) {
                Ok(()) => Ok(channel),
                Err(e) => {
                    ctx.output.release(channel);
                    Err(e)
                }
            }
        });
        let channel = match started {
            Ok(channel) => channel,
            Err(e) => {
                ctx.cache.release(buffer_key);
                return Err(e);
            }
        };
        instance.channel = channel;

        log::debug!("Playing '{}' for {:?} on channel {:?}", sound_id, owner, channel);
        let key = self.register(instance, ctx.output);
        self.owners.entry(owner).or_default().sounds.push(key);
        Ok(SoundHandle(Some(key)))
    }

    /// Start a non-positional stream with no owner, such as a video track
    pub fn play_stream(
        &mut self,
        ctx: &mut PlaybackContext<'_>,
        label: &str,
        stream: Box<dyn DecoderStream>,
        category: SoundCategory,
    ) -> Result<SoundHandle, AudioError> {
        let placement = Placement {
            owner: None,
            position: None,
            min_distance: 1.0,
            max_distance: 1.0,
        };
        let key = self.start_stream(ctx, label, stream, category, PlayMode::NO_ENV, placement)?;
        self.owners.entry(None).or_default().sounds.push(key);
        Ok(SoundHandle(Some(key)))
    }

    /// Start speech for `owner` (`None` for non-positional speech)
    ///
    /// Any speech the owner is still playing is stopped first. The file's
    /// loudness envelope is indexed before playback starts.
    pub fn say(
        &mut self,
        ctx: &mut PlaybackContext<'_>,
        owner: Option<EntityId>,
        file: &str,
    ) -> Result<SoundHandle, AudioError> {
        self.stop_say(owner, ctx.output, ctx.cache);

        let position = match owner {
            Some(entity) => Self::resolve_position(Emitter::Entity(entity), ctx.world)?,
            None => None,
        };
        ctx.loudness.ensure_loaded(file, ctx.decoder);
        let stream = ctx.decoder.open(file)?;

        let placement = Placement {
            owner,
            position,
            min_distance: self.voice_min_distance,
            max_distance: self.voice_max_distance,
        };
        let key = self.start_stream(ctx, file, stream, SoundCategory::Voice, PlayMode::empty(), placement)?;
        self.owners.entry(owner).or_default().speech = Some(key);
        Ok(SoundHandle(Some(key)))
    }

    fn start_stream(
        &mut self,
        ctx: &mut PlaybackContext<'_>,
        label: &str,
        stream: Box<dyn DecoderStream>,
        category: SoundCategory,
        mode: PlayMode,
        placement: Placement,
    ) -> Result<InstanceKey, AudioError> {
        let pump = StreamPump::new(stream);
        let duration = pump.duration();
        let mut instance = SoundInstance {
            owner: placement.owner,
            sound_id: label.to_string(),
            category,
            mode,
            channel: ChannelId::default(),
            source: SoundSource::Stream(pump),
            volume: 1.0,
            base_volume: 1.0,
            pitch: 1.0,
            position: placement.position.unwrap_or(ctx.spatial.listener().position),
            positional: placement.position.is_some(),
            min_distance: placement.min_distance,
            max_distance: placement.max_distance,
            fade: 1.0,
            fade_remaining: None,
            paused: false,
            clock: 0.0,
            duration,
            effective_volume: 0.0,
        };
        instance.effective_volume = instance.compute_volume(ctx.volumes, ctx.spatial);

        let channel = Self::open_channel(ctx.output, &instance)?;
        if let SoundSource::Stream(pump) = &mut instance.source {
            if let Err(e) = pump.pump(ctx.output, channel) {
                ctx.output.release(channel);
                return Err(e);
            }
        }
        instance.channel = channel;

        log::debug!("Streaming '{}' for {:?} on channel {:?}", label, placement.owner, channel);
        Ok(self.register(instance, ctx.output))
    }

    fn open_channel(output: &mut dyn AudioOutput, instance: &SoundInstance) -> Result<ChannelId, AudioError> {
        output.allocate_channel(&ChannelParams {
            category: instance.category,
            mode: instance.mode,
            position: instance.positional.then_some(instance.position),
            volume: instance.effective_volume,
            pitch: instance.pitch,
        })
    }

    /// Insert a started instance, pausing it if its category is paused
    fn register(&mut self, mut instance: SoundInstance, output: &mut dyn AudioOutput) -> InstanceKey {
        if self.paused.has(instance.category) {
            if let Err(e) = output.pause(instance.channel) {
                log::warn!("Failed to pause new instance '{}': {}", instance.sound_id, e);
            }
            instance.paused = true;
        }
        self.instances.insert(instance)
    }

    fn owner_sounds(&self, owner: Option<EntityId>) -> impl Iterator<Item = (InstanceKey, &SoundInstance)> {
        self.owners
            .get(&owner)
            .map(|sounds| sounds.sounds.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|key| self.instances.get(*key).map(|inst| (*key, inst)))
    }

    /// Stop an instance and release its channel and buffer
    fn remove_instance(&mut self, key: InstanceKey, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        let Some(instance) = self.instances.remove(key) else {
            return;
        };
        output.release(instance.channel);
        if let SoundSource::Buffer(buffer_key) = instance.source {
            cache.release(buffer_key);
        }

        if let Some(sounds) = self.owners.get_mut(&instance.owner) {
            sounds.sounds.retain(|k| *k != key);
            if sounds.speech == Some(key) {
                sounds.speech = None;
            }
            if sounds.is_empty() {
                self.owners.remove(&instance.owner);
            }
        }
    }

    fn remove_all(&mut self, keys: Vec<InstanceKey>, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        for key in keys {
            self.remove_instance(key, output, cache);
        }
    }

    /// Stop every copy of `sound_id` played by `owner`
    pub fn stop(
        &mut self,
        owner: Option<EntityId>,
        sound_id: &str,
        output: &mut dyn AudioOutput,
        cache: &mut SoundBufferCache,
    ) {
        let keys = self
            .owner_sounds(owner)
            .filter(|(_, inst)| inst.sound_id == sound_id)
            .map(|(key, _)| key)
            .collect();
        self.remove_all(keys, output, cache);
    }

    /// Stop free (non-entity) sounds with `sound_id`
    pub fn stop_free(&mut self, sound_id: &str, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        self.stop(None, sound_id, output, cache);
    }

    /// Stop everything an entity plays, speech included
    pub fn stop_entity(&mut self, entity: EntityId, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        let Some(sounds) = self.owners.get(&Some(entity)) else {
            return;
        };
        let keys = sounds.sounds.iter().copied().chain(sounds.speech).collect();
        self.remove_all(keys, output, cache);
    }

    /// Stop every instance whose category is in `mask`
    pub fn stop_category(&mut self, mask: SoundCategories, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        let keys = self
            .instances
            .iter()
            .filter(|(_, inst)| mask.has(inst.category))
            .map(|(key, _)| key)
            .collect();
        self.remove_all(keys, output, cache);
    }

    /// Stop the instance behind `handle`
    pub fn stop_handle(&mut self, handle: SoundHandle, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        if let Some(key) = handle.key() {
            self.remove_instance(key, output, cache);
        }
    }

    /// Stop all sounds of entities that belong to `region`
    pub fn stop_region(
        &mut self,
        region: RegionId,
        world: &dyn SoundWorld,
        output: &mut dyn AudioOutput,
        cache: &mut SoundBufferCache,
    ) {
        let entities: Vec<EntityId> = self
            .owners
            .keys()
            .flatten()
            .copied()
            .filter(|entity| world.region(*entity) == Some(region))
            .collect();
        for entity in entities {
            log::debug!("Stopping sounds of entity {} in unloaded region {:?}", entity, region);
            self.stop_entity(entity, output, cache);
        }
    }

    /// Stop everything
    pub fn clear(&mut self, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        let keys = self.instances.keys().collect();
        self.remove_all(keys, output, cache);
        self.owners.clear();
    }

    /// Fade `sound_id` on `entity` linearly to silence over `duration`
    /// seconds, then stop it
    pub fn fade_out(
        &mut self,
        entity: EntityId,
        sound_id: &str,
        duration: f32,
        output: &mut dyn AudioOutput,
        cache: &mut SoundBufferCache,
    ) {
        let keys: Vec<InstanceKey> = self
            .owner_sounds(Some(entity))
            .filter(|(_, inst)| inst.sound_id == sound_id)
            .map(|(key, _)| key)
            .collect();
        if duration <= 0.0 {
            self.remove_all(keys, output, cache);
            return;
        }
        for key in keys {
            if let Some(instance) = self.instances.get_mut(key) {
                instance.fade_remaining = Some(duration);
            }
        }
    }

    /// Whether `owner` is playing `sound_id`; paused sounds count as playing
    pub fn is_playing(&self, owner: Option<EntityId>, sound_id: &str) -> bool {
        self.owner_sounds(owner).any(|(_, inst)| inst.sound_id == sound_id)
    }

    /// Whether `owner` has no speech in progress
    pub fn say_done(&self, owner: Option<EntityId>) -> bool {
        self.speech_of(owner).is_none()
    }

    /// Stop the speech of `owner`
    pub fn stop_say(&mut self, owner: Option<EntityId>, output: &mut dyn AudioOutput, cache: &mut SoundBufferCache) {
        if let Some(key) = self.owners.get(&owner).and_then(|sounds| sounds.speech) {
            self.remove_instance(key, output, cache);
        }
    }

    /// Loudness of the speech of `owner` at its current playback position
    pub fn say_loudness(&self, owner: Option<EntityId>, loudness: &LoudnessIndex) -> f32 {
        self.speech_of(owner)
            .map_or(0.0, |speech| loudness.sample(&speech.sound_id, speech.clock))
    }

    fn speech_of(&self, owner: Option<EntityId>) -> Option<&SoundInstance> {
        self.owners
            .get(&owner)
            .and_then(|sounds| sounds.speech)
            .and_then(|key| self.instances.get(key))
    }

    /// Advance every instance by `delta_time` seconds
    ///
    /// Order per instance: stream refill, completion, position tracking,
    /// distance removal, fade, clock, volume.
    pub fn update_all(&mut self, ctx: &mut PlaybackContext<'_>, delta_time: f32) {
        let gone: Vec<EntityId> = self
            .owners
            .keys()
            .flatten()
            .copied()
            .filter(|entity| !ctx.world.exists(*entity))
            .collect();
        for entity in gone {
            log::trace!("Pruning sounds of removed entity {}", entity);
            self.stop_entity(entity, ctx.output, ctx.cache);
        }

        let mut finished = Vec::new();
        for (key, instance) in self.instances.iter_mut() {
            if instance.paused {
                continue;
            }

            let looping = instance.is_looping();
            let channel = instance.channel;
            let done = match &mut instance.source {
                SoundSource::Buffer(_) => !looping && ctx.output.is_finished(channel),
                SoundSource::Stream(pump) => {
                    if let Err(e) = pump.pump(ctx.output, channel) {
                        log::warn!("Stream '{}' failed: {}", instance.sound_id, e);
                    }
                    pump.is_exhausted() && ctx.output.is_finished(channel)
                }
            };
            if done {
                finished.push(key);
                continue;
            }

            if let Some(entity) = instance.owner.filter(|_| instance.tracks_owner()) {
                if let Some(position) = ctx.world.position(entity) {
                    instance.position = position;
                    if let Err(e) = ctx.output.set_position(instance.channel, position) {
                        log::warn!("Failed to move '{}': {}", instance.sound_id, e);
                    }
                }
            }

            if instance.positional
                && instance.mode.contains(PlayMode::REMOVE_AT_DISTANCE)
                && ctx.spatial.is_beyond_removal(&instance.position)
            {
                finished.push(key);
                continue;
            }

            if let Some(remaining) = instance.fade_remaining {
                if delta_time >= remaining {
                    finished.push(key);
                    continue;
                }
                instance.fade -= delta_time / remaining * instance.fade;
                instance.fade_remaining = Some(remaining - delta_time);
            }

            instance.advance_clock(delta_time);
            Self::apply_volume(instance, ctx);
        }

        self.remove_all(finished, ctx.output, ctx.cache);
    }

    fn apply_volume(instance: &mut SoundInstance, ctx: &mut PlaybackContext<'_>) {
        instance.effective_volume = instance.compute_volume(ctx.volumes, ctx.spatial);
        if let Err(e) = ctx.output.set_volume(instance.channel, instance.effective_volume) {
            log::warn!("Failed to set volume of '{}': {}", instance.sound_id, e);
        }
    }

    /// Recompute and apply the volume of every running instance without
    /// advancing time; paused instances are re-leveled when they resume
    pub fn rescan(&mut self, ctx: &mut PlaybackContext<'_>) {
        for (_, instance) in self.instances.iter_mut().filter(|(_, inst)| !inst.paused) {
            Self::apply_volume(instance, ctx);
        }
    }

    /// Pause every instance in `mask`; new sounds in `mask` start paused
    pub fn pause(&mut self, mask: SoundCategories, output: &mut dyn AudioOutput) {
        self.paused |= mask;
        for (_, instance) in self.instances.iter_mut() {
            if !instance.paused && mask.has(instance.category) {
                if let Err(e) = output.pause(instance.channel) {
                    log::warn!("Failed to pause '{}': {}", instance.sound_id, e);
                }
                instance.paused = true;
            }
        }
    }

    /// Resume every paused instance in `mask`
    pub fn resume(&mut self, mask: SoundCategories, output: &mut dyn AudioOutput) {
        self.paused -= mask;
        for (_, instance) in self.instances.iter_mut() {
            if instance.paused && mask.has(instance.category) {
                if let Err(e) = output.resume(instance.channel) {
                    log::warn!("Failed to resume '{}': {}", instance.sound_id, e);
                }
                instance.paused = false;
            }
        }
    }

    /// Categories currently paused
    pub fn paused_categories(&self) -> SoundCategories {
        self.paused
    }

    /// Move every sound of `old` to `new`, e.g. after an entity was re-created
    ///
    /// Where both entities play the same non-stacking sound, or both speak,
    /// the moved instance replaces the one `new` already had.
    pub fn rename_entity(
        &mut self,
        old: EntityId,
        new: EntityId,
        output: &mut dyn AudioOutput,
        cache: &mut SoundBufferCache,
    ) {
        if old == new {
            return;
        }
        let Some(moved) = self.owners.remove(&Some(old)) else {
            return;
        };

        let mut replaced: Vec<InstanceKey> = self
            .owners
            .get(&Some(new))
            .and_then(|sounds| sounds.speech)
            .filter(|_| moved.speech.is_some())
            .into_iter()
            .collect();
        for key in &moved.sounds {
            let Some(incoming) = self.instances.get(*key) else {
                continue;
            };
            if incoming.category.allows_stacking() {
                continue;
            }
            replaced.extend(
                self.owner_sounds(Some(new))
                    .filter(|(_, inst)| inst.sound_id == incoming.sound_id && inst.category == incoming.category)
                    .map(|(key, _)| key),
            );
        }
        self.remove_all(replaced, output, cache);

        for key in moved.sounds.iter().copied().chain(moved.speech) {
            if let Some(instance) = self.instances.get_mut(key) {
                instance.owner = Some(new);
            }
        }
        let target = self.owners.entry(Some(new)).or_default();
        target.sounds.extend(moved.sounds);
        if moved.speech.is_some() {
            target.speech = moved.speech;
        }
    }

    /// Move a free positional sound
    pub fn set_handle_position(
        &mut self,
        handle: SoundHandle,
        position: Vec3,
        output: &mut dyn AudioOutput,
    ) -> Result<(), AudioError> {
        let instance = handle
            .key()
            .and_then(|key| self.instances.get_mut(key))
            .filter(|inst| inst.owner.is_none() && inst.positional)
            .ok_or(AudioError::InvalidHandle)?;
        instance.position = position;
        output.set_position(instance.channel, position)
    }

    /// Instance behind a handle
    pub fn get(&self, handle: SoundHandle) -> Option<&SoundInstance> {
        handle.key().and_then(|key| self.instances.get(key))
    }

    /// Whether the instance behind `handle` is still registered
    pub fn is_handle_playing(&self, handle: SoundHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Volume last applied to the instance behind `handle`
    pub fn effective_volume(&self, handle: SoundHandle) -> Option<f32> {
        self.get(handle).map(SoundInstance::effective_volume)
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::NullOutput;
    use crate::audio::mixer::VolumeGroup;
    use crate::audio::test_support::Harness;
    use approx::assert_relative_eq;

    const NPC: EntityId = EntityId(7);
    const HOME: RegionId = RegionId(1);

    fn setup() -> (Harness, ActiveSoundRegistry) {
        let harness = Harness::new(16);
        harness.world.add(NPC, Vec3::new(0.0, 0.0, -5.0), HOME);
        (harness, ActiveSoundRegistry::new(100.0, 3000.0))
    }

    fn tick(harness: &mut Harness, registry: &mut ActiveSoundRegistry, dt: f32) {
        harness.output.update(dt);
        registry.update_all(&mut harness.ctx(), dt);
    }

    #[test]
    fn test_play_then_stop() {
        let (mut h, mut registry) = setup();
        let handle = registry
            .play(&mut h.ctx(), Emitter::Entity(NPC), "hit", PlayParams::default())
            .unwrap();
        assert!(handle.is_valid());
        assert!(registry.is_playing(Some(NPC), "hit"));
        assert_eq!(h.cache.use_count("hit"), 1);

        registry.stop(Some(NPC), "hit", &mut h.output, &mut h.cache);
        registry.stop(Some(NPC), "hit", &mut h.output, &mut h.cache);
        assert!(!registry.is_playing(Some(NPC), "hit"));
        assert!(registry.is_empty());
        assert_eq!(h.cache.use_count("hit"), 0);
        assert_eq!(h.output.active_channels(), 0);
    }

    #[test]
    fn test_same_sound_restarts_unless_category_stacks() {
        let (mut h, mut registry) = setup();
        let movement = PlayParams::default().with_category(SoundCategory::Movement);

        let first = registry
            .play(&mut h.ctx(), Emitter::Entity(NPC), "hit", PlayParams::default())
            .unwrap();
        let second = registry
            .play(&mut h.ctx(), Emitter::Entity(NPC), "hit", PlayParams::default())
            .unwrap();
        assert!(!registry.is_handle_playing(first));
        assert!(registry.is_handle_playing(second));
        assert_eq!(registry.len(), 1);

        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "footstep", movement).unwrap();
        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "footstep", movement).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(h.cache.use_count("footstep"), 2);
    }

    #[test]
    fn test_output_failure_releases_buffer() {
        let (mut h, mut registry) = setup();
        h.output = NullOutput::new(1);

        registry
            .play(&mut h.ctx(), Emitter::Listener, "hit", PlayParams::default())
            .unwrap();
        let result = registry.play(&mut h.ctx(), Emitter::Listener, "wind", PlayParams::default());
        assert!(matches!(result, Err(AudioError::PlaybackUnavailable(_))));
        assert_eq!(h.cache.use_count("wind"), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_sound_is_not_registered() {
        let (mut h, mut registry) = setup();
        let result = registry.play(&mut h.ctx(), Emitter::Listener, "nope", PlayParams::default());
        assert!(matches!(result, Err(AudioError::ResourceNotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finished_instances_are_removed() {
        let (mut h, mut registry) = setup();
        registry
            .play(&mut h.ctx(), Emitter::Entity(NPC), "hit", PlayParams::default())
            .unwrap();
        let looping = registry
            .play(
                &mut h.ctx(),
                Emitter::Listener,
                "wind",
                PlayParams::default().with_mode(PlayMode::LOOP),
            )
            .unwrap();

        tick(&mut h, &mut registry, 0.25);
        assert!(registry.is_playing(Some(NPC), "hit"));
        tick(&mut h, &mut registry, 0.5);
        assert!(!registry.is_playing(Some(NPC), "hit"));
        assert_eq!(h.cache.use_count("hit"), 0);

        tick(&mut h, &mut registry, 5.0);
        assert!(registry.is_handle_playing(looping));
        assert!(registry.get(looping).unwrap().clock() < 1.0);
    }

    #[test]
    fn test_removed_entities_are_pruned() {
        let (mut h, mut registry) = setup();
        registry
            .play(
                &mut h.ctx(),
                Emitter::Entity(NPC),
                "wind",
                PlayParams::default().with_mode(PlayMode::LOOP),
            )
            .unwrap();

        h.world.remove(NPC);
        tick(&mut h, &mut registry, 0.1);
        assert!(registry.is_empty());
        assert_eq!(h.output.active_channels(), 0);
    }

    #[test]
    fn test_sounds_follow_their_entity() {
        let (mut h, mut registry) = setup();
        let tracked = registry
            .play(&mut h.ctx(), Emitter::Entity(NPC), "door", PlayParams::default())
            .unwrap();
        let fixed = registry
            .play(
                &mut h.ctx(),
                Emitter::Entity(NPC),
                "wind",
                PlayParams::default().with_mode(PlayMode::NO_TRACK),
            )
            .unwrap();

        let moved = Vec3::new(10.0, 0.0, 0.0);
        h.world.move_to(NPC, moved);
        tick(&mut h, &mut registry, 0.1);

        assert_eq!(registry.get(tracked).unwrap().position(), moved);
        assert_eq!(registry.get(fixed).unwrap().position(), Vec3::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn test_remove_at_distance() {
        let (mut h, mut registry) = setup();
        let params = PlayParams::default().with_mode(PlayMode::REMOVE_AT_DISTANCE | PlayMode::LOOP);

        let far = EntityId(8);
        h.world.add(far, Vec3::new(2500.0, 0.0, 0.0), HOME);
        let skipped = registry.play(&mut h.ctx(), Emitter::Entity(far), "wind", params).unwrap();
        assert!(!skipped.is_valid());
        assert_eq!(h.cache.use_count("wind"), 0);

        let handle = registry.play(&mut h.ctx(), Emitter::Entity(NPC), "wind", params).unwrap();
        h.world.move_to(NPC, Vec3::new(0.0, 0.0, -2100.0));
        tick(&mut h, &mut registry, 0.1);
        assert!(!registry.is_handle_playing(handle));
    }

    #[test]
    fn test_fade_out_ramps_then_stops() {
        let (mut h, mut registry) = setup();
        let handle = registry
            .play(
                &mut h.ctx(),
                Emitter::Listener,
                "wind",
                PlayParams::default().with_mode(PlayMode::LOOP),
            )
            .unwrap();
        // Free sounds are not faded through the entity path
        registry.fade_out(NPC, "wind", 1.0, &mut h.output, &mut h.cache);
        tick(&mut h, &mut registry, 0.5);
        assert_relative_eq!(registry.effective_volume(handle).unwrap(), 1.0);

        let owned = registry
            .play(
                &mut h.ctx(),
                Emitter::Entity(NPC),
                "wind",
                PlayParams::default().with_mode(PlayMode::LOOP),
            )
            .unwrap();
        registry.fade_out(NPC, "wind", 1.0, &mut h.output, &mut h.cache);
        tick(&mut h, &mut registry, 0.5);
        // Half faded, slightly attenuated by the 5 unit distance
        assert_relative_eq!(registry.effective_volume(owned).unwrap(), 0.5, epsilon = 1e-2);
        tick(&mut h, &mut registry, 0.6);
        assert!(!registry.is_handle_playing(owned));
        assert!(registry.is_handle_playing(handle));
    }

    #[test]
    fn test_pause_and_resume_by_category() {
        let (mut h, mut registry) = setup();
        let effect = registry
            .play(&mut h.ctx(), Emitter::Listener, "door", PlayParams::default())
            .unwrap();
        registry.pause(SoundCategories::EFFECT, &mut h.output);
        assert!(registry.get(effect).unwrap().is_paused());

        // Paused instances stay registered and do not advance
        tick(&mut h, &mut registry, 5.0);
        assert!(registry.is_handle_playing(effect));
        assert_eq!(registry.get(effect).unwrap().clock(), 0.0);

        let late = registry
            .play(&mut h.ctx(), Emitter::Listener, "hit", PlayParams::default())
            .unwrap();
        assert!(registry.get(late).unwrap().is_paused());

        registry.resume(SoundCategories::EFFECT, &mut h.output);
        assert!(!registry.get(effect).unwrap().is_paused());
        assert!(!registry.get(late).unwrap().is_paused());
        assert!(registry.paused_categories().is_empty());
    }

    #[test]
    fn test_one_speech_per_entity() {
        let (mut h, mut registry) = setup();
        registry.say(&mut h.ctx(), Some(NPC), "vo/greeting.wav").unwrap();
        registry.say(&mut h.ctx(), Some(NPC), "vo/farewell.wav").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.say_done(Some(NPC)));

        tick(&mut h, &mut registry, 0.1);
        assert!(registry.say_loudness(Some(NPC), &h.loudness) > 0.0);
        assert!(h.loudness.contains("vo/farewell.wav"));

        registry.stop_say(Some(NPC), &mut h.output, &mut h.cache);
        assert!(registry.say_done(Some(NPC)));
        assert_eq!(registry.say_loudness(Some(NPC), &h.loudness), 0.0);
    }

    #[test]
    fn test_speech_finishes_on_its_own() {
        let (mut h, mut registry) = setup();
        registry.say(&mut h.ctx(), None, "vo/greeting.wav").unwrap();
        for _ in 0..12 {
            tick(&mut h, &mut registry, 0.1);
        }
        assert!(registry.say_done(None));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_region_and_category() {
        let (mut h, mut registry) = setup();
        let elsewhere = EntityId(9);
        h.world.add(elsewhere, Vec3::zeros(), RegionId(2));

        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "door", PlayParams::default()).unwrap();
        registry.play(&mut h.ctx(), Emitter::Entity(elsewhere), "door", PlayParams::default()).unwrap();
        registry.play(&mut h.ctx(), Emitter::Listener, "hit", PlayParams::default()).unwrap();

        registry.stop_region(HOME, &h.world, &mut h.output, &mut h.cache);
        assert!(!registry.is_playing(Some(NPC), "door"));
        assert!(registry.is_playing(Some(elsewhere), "door"));
        assert!(registry.is_playing(None, "hit"));

        registry.stop_category(SoundCategories::EFFECT, &mut h.output, &mut h.cache);
        assert!(registry.is_empty());
        assert_eq!(h.cache.use_count("door"), 0);
    }

    #[test]
    fn test_rename_entity_moves_sounds() {
        let (mut h, mut registry) = setup();
        let renamed = EntityId(70);
        h.world.add(renamed, Vec3::zeros(), HOME);

        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "door", PlayParams::default()).unwrap();
        registry.say(&mut h.ctx(), Some(NPC), "vo/greeting.wav").unwrap();
        registry.rename_entity(NPC, renamed, &mut h.output, &mut h.cache);

        assert!(!registry.is_playing(Some(NPC), "door"));
        assert!(registry.is_playing(Some(renamed), "door"));
        assert!(!registry.say_done(Some(renamed)));
        assert!(registry.say_done(Some(NPC)));
    }

    #[test]
    fn test_rename_onto_speaking_entity_keeps_one_speech() {
        let (mut h, mut registry) = setup();
        let other = EntityId(8);
        h.world.add(other, Vec3::zeros(), HOME);
        let movement = PlayParams::default().with_category(SoundCategory::Movement);

        registry.say(&mut h.ctx(), Some(NPC), "vo/greeting.wav").unwrap();
        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "door", PlayParams::default()).unwrap();
        registry.play(&mut h.ctx(), Emitter::Entity(NPC), "footstep", movement).unwrap();
        registry.say(&mut h.ctx(), Some(other), "vo/farewell.wav").unwrap();
        let old_door = registry
            .play(&mut h.ctx(), Emitter::Entity(other), "door", PlayParams::default())
            .unwrap();
        registry.play(&mut h.ctx(), Emitter::Entity(other), "footstep", movement).unwrap();

        registry.rename_entity(NPC, other, &mut h.output, &mut h.cache);

        // One speech, one door; footsteps stack
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_handle_playing(old_door));
        assert_eq!(h.output.active_channels(), 4);
        assert!(registry.is_playing(Some(other), "door"));
        assert_eq!(h.cache.use_count("door"), 1);
        assert_eq!(h.cache.use_count("footstep"), 2);

        registry.stop_say(Some(other), &mut h.output, &mut h.cache);
        assert!(registry.say_done(Some(other)));
        assert_eq!(registry.len(), 3);

        registry.stop_entity(other, &mut h.output, &mut h.cache);
        assert!(registry.is_empty());
        assert_eq!(h.output.active_channels(), 0);
    }

    #[test]
    fn test_rescan_leaves_paused_instances_alone() {
        let (mut h, mut registry) = setup();
        let effect = registry
            .play(&mut h.ctx(), Emitter::Listener, "hit", PlayParams::default())
            .unwrap();
        let speech = registry
            .play(
                &mut h.ctx(),
                Emitter::Listener,
                "wind",
                PlayParams::default().with_category(SoundCategory::Voice),
            )
            .unwrap();
        registry.pause(SoundCategories::EFFECT, &mut h.output);
        let paused_level = registry.effective_volume(effect).unwrap();

        h.volumes.set_group_volume(VolumeGroup::Master, 0.5);
        registry.rescan(&mut h.ctx());
        assert_relative_eq!(registry.effective_volume(effect).unwrap(), paused_level);
        let voice = registry.effective_volume(speech).unwrap();
        assert_relative_eq!(voice, 0.5 * h.volumes.group_volume(VolumeGroup::Voice));

        registry.resume(SoundCategories::EFFECT, &mut h.output);
        tick(&mut h, &mut registry, 0.01);
        assert_relative_eq!(registry.effective_volume(effect).unwrap(), 0.5 * paused_level);
    }

    #[test]
    fn test_offset_seeks_into_sound() {
        let (mut h, mut registry) = setup();
        let handle = registry
            .play(
                &mut h.ctx(),
                Emitter::Listener,
                "door",
                PlayParams::default().with_offset(0.5),
            )
            .unwrap();
        assert_relative_eq!(registry.get(handle).unwrap().clock(), 1.0, epsilon = 1e-3);

        // The remaining second finishes the sound
        tick(&mut h, &mut registry, 1.1);
        assert!(!registry.is_handle_playing(handle));
    }

    #[test]
    fn test_free_sound_position_and_clear() {
        let (mut h, mut registry) = setup();
        let handle = registry
            .play(
                &mut h.ctx(),
                Emitter::Fixed(Vec3::new(1.0, 2.0, 3.0)),
                "door",
                PlayParams::default(),
            )
            .unwrap();
        let target = Vec3::new(4.0, 5.0, 6.0);
        registry.set_handle_position(handle, target, &mut h.output).unwrap();
        assert_eq!(registry.get(handle).unwrap().position(), target);
        assert!(matches!(
            registry.set_handle_position(SoundHandle::invalid(), target, &mut h.output),
            Err(AudioError::InvalidHandle)
        ));

        registry.clear(&mut h.output, &mut h.cache);
        assert!(registry.is_empty());
        assert_eq!(h.output.active_channels(), 0);
    }
}
