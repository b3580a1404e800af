//! Loudness envelopes for lip-sync
//!
//! Speech files are analyzed once into a fixed-rate RMS envelope; the
//! animation side samples it at the speech instance's playback clock.

use crate::audio::decoder::{decode_all, Decoder};
use crate::audio::format::PcmData;
use crate::foundation::math::utils;
use std::collections::HashMap;

/// Envelope values per second of audio
pub const ENVELOPE_RATE: f32 = 20.0;

/// RMS amplitude envelope in `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoudnessEnvelope {
    samples: Vec<f32>,
    samples_per_sec: f32,
}

impl LoudnessEnvelope {
    /// Analyze `pcm` into `samples_per_sec` RMS values per second
    pub fn analyze(pcm: &PcmData, samples_per_sec: f32) -> Self {
        let channels = usize::from(pcm.format.channels.max(1));
        let frames_per_value =
            ((pcm.format.sample_rate as f32 / samples_per_sec).round() as usize).max(1);
        let window = frames_per_value * channels;

        let samples = pcm
            .samples
            .chunks(window)
            .map(|chunk| {
                let sum: f32 = chunk
                    .iter()
                    .map(|s| {
                        let v = f32::from(*s) / 32768.0;
                        v * v
                    })
                    .sum();
                (sum / chunk.len() as f32).sqrt().clamp(0.0, 1.0)
            })
            .collect();

        Self {
            samples,
            samples_per_sec,
        }
    }

    /// Loudness at `time` seconds, linearly interpolated
    ///
    /// Returns 0 before the start, past the end, or for an empty envelope.
    pub fn sample(&self, time: f32) -> f32 {
        if self.samples.is_empty() || time < 0.0 {
            return 0.0;
        }
        let position = time * self.samples_per_sec;
        let index = position.floor() as usize;
        if index >= self.samples.len() {
            return 0.0;
        }

        let current = self.samples[index];
        let next = self.samples.get(index + 1).copied().unwrap_or(current);
        let t = position - index as f32;
        utils::lerp(current, next, t)
    }

    /// Number of envelope values
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the envelope has no values
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Cache of envelopes keyed by resource file
#[derive(Debug, Default)]
pub struct LoudnessIndex {
    envelopes: HashMap<String, LoudnessEnvelope>,
}

impl LoudnessIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze `file` unless it is already indexed
    ///
    /// Decode failures are logged and leave nothing cached. Returns whether
    /// an envelope is available afterwards.
    pub fn ensure_loaded(&mut self, file: &str, decoder: &dyn Decoder) -> bool {
        if self.envelopes.contains_key(file) {
            return true;
        }

        let decoded = decoder
            .open(file)
            .and_then(|mut stream| decode_all(stream.as_mut()));
        match decoded {
            Ok(pcm) => {
                let envelope = LoudnessEnvelope::analyze(&pcm, ENVELOPE_RATE);
                log::debug!("Indexed loudness of '{}' ({} values)", file, envelope.len());
                self.envelopes.insert(file.to_string(), envelope);
                true
            }
            Err(e) => {
                log::warn!("Failed to analyze loudness of '{}': {}", file, e);
                false
            }
        }
    }

    /// Loudness of `file` at `time`; 0 for unknown files
    pub fn sample(&self, file: &str, time: f32) -> f32 {
        self.envelopes
            .get(file)
            .map_or(0.0, |envelope| envelope.sample(time))
    }

    /// Whether `file` has been indexed
    pub fn contains(&self, file: &str) -> bool {
        self.envelopes.contains_key(file)
    }

    /// Number of indexed files
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Whether nothing has been indexed
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}
