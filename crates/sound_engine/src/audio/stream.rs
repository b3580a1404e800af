//! Chunked streaming into an output channel
//!
//! Music and speech are never decoded in full. A [`StreamPump`] keeps a few
//! short chunks queued on the channel and refills as they drain.

use crate::audio::backend::{AudioOutput, ChannelId};
use crate::audio::decoder::DecoderStream;
use crate::audio::format::AudioFormat;
use crate::audio::AudioError;

/// Length of one queued chunk in seconds
const CHUNK_SECONDS: f32 = 0.25;

/// Chunks kept queued ahead of playback
const QUEUE_DEPTH: usize = 3;

/// Feeds a decoder stream into an output channel
pub struct StreamPump {
    stream: Box<dyn DecoderStream>,
    format: AudioFormat,
    chunk_frames: usize,
    scratch: Vec<i16>,
    exhausted: bool,
}

impl StreamPump {
    /// Wrap an open decoder stream
    pub fn new(stream: Box<dyn DecoderStream>) -> Self {
        let format = stream.format();
        let chunk_frames = format.seconds_to_frames(CHUNK_SECONDS).max(1);
        Self {
            stream,
            format,
            chunk_frames,
            scratch: Vec::with_capacity(chunk_frames * usize::from(format.channels.max(1))),
            exhausted: false,
        }
    }

    /// Top up the channel's queue
    ///
    /// Returns the number of frames submitted. Read errors end the stream.
    pub fn pump(&mut self, output: &mut dyn AudioOutput, channel: ChannelId) -> Result<usize, AudioError> {
        let mut submitted = 0;
        while !self.exhausted && output.queued_chunks(channel) < QUEUE_DEPTH {
            self.scratch.clear();
            let frames = match self.stream.read(&mut self.scratch, self.chunk_frames) {
                Ok(frames) => frames,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            };
            if frames == 0 {
                self.exhausted = true;
                break;
            }
            output.queue_stream(channel, self.format, &self.scratch)?;
            submitted += frames;
        }
        Ok(submitted)
    }

    /// Whether the decoder has no more data
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Stop pulling from the decoder
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    /// Total duration reported by the decoder
    pub fn duration(&self) -> Option<f32> {
        self.stream.duration()
    }

    /// Sample layout of the stream
    pub fn format(&self) -> AudioFormat {
        self.format
    }
}
