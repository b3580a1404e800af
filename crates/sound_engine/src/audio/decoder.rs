//! Decoder capability
//!
//! A [`Decoder`] opens a resource path and hands back a pull-based
//! [`DecoderStream`]. One-shot sounds are decoded in full by the buffer cache;
//! music and speech are pulled chunk by chunk while they play.

use crate::audio::format::{AudioFormat, PcmData};
use crate::audio::AudioError;

/// An open, pull-based PCM stream
pub trait DecoderStream {
    /// Sample layout of the stream
    fn format(&self) -> AudioFormat;

    /// Total duration in seconds, if known up front
    fn duration(&self) -> Option<f32>;

    /// Append up to `max_frames` frames of interleaved samples to `out`.
    /// Returns the number of frames appended; 0 means end of stream.
    fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError>;
}

/// Opens resources for decoding
pub trait Decoder {
    /// Open `path`; fails with `ResourceNotFound` or `UnsupportedFormat`
    fn open(&self, path: &str) -> Result<Box<dyn DecoderStream>, AudioError>;
}

impl<T: Decoder + ?Sized> Decoder for std::rc::Rc<T> {
    fn open(&self, path: &str) -> Result<Box<dyn DecoderStream>, AudioError> {
        (**self).open(path)
    }
}

const DECODE_CHUNK_FRAMES: usize = 4096;

/// Drain a stream into a single PCM buffer
pub fn decode_all(stream: &mut dyn DecoderStream) -> Result<PcmData, AudioError> {
    let format = stream.format();
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} channels at {} Hz",
            format.channels, format.sample_rate
        )));
    }

    let mut samples = Vec::new();
    if let Some(duration) = stream.duration() {
        samples.reserve(format.seconds_to_frames(duration) * usize::from(format.channels));
    }
    while stream.read(&mut samples, DECODE_CHUNK_FRAMES)? > 0 {}

    Ok(PcmData::new(format, samples))
}

/// Stream over PCM data already in memory
pub struct PcmStream {
    pcm: PcmData,
    cursor: usize,
}

impl PcmStream {
    /// Stream `pcm` from the beginning
    pub fn new(pcm: PcmData) -> Self {
        Self { pcm, cursor: 0 }
    }
}

impl DecoderStream for PcmStream {
    fn format(&self) -> AudioFormat {
        self.pcm.format
    }

    fn duration(&self) -> Option<f32> {
        Some(self.pcm.duration())
    }

    fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError> {
        let channels = usize::from(self.pcm.format.channels.max(1));
        let remaining = self.pcm.samples.len() - self.cursor;
        let take = (max_frames * channels).min(remaining);
        out.extend_from_slice(&self.pcm.samples[self.cursor..self.cursor + take]);
        self.cursor += take;
        Ok(take / channels)
    }
}

#[cfg(feature = "rodio")]
pub use self::rodio_decoder::RodioDecoder;

#[cfg(feature = "rodio")]
mod rodio_decoder {
    use super::{Decoder, DecoderStream};
    use crate::audio::format::{AudioFormat, FileFormat};
    use crate::audio::AudioError;
    use rodio::Source;
    use std::fs::File;
    use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
    use std::path::PathBuf;

    /// Decodes WAV, OGG Vorbis, MP3 and FLAC files below a root directory
    pub struct RodioDecoder {
        root: PathBuf,
    }

    impl RodioDecoder {
        /// Create a decoder resolving paths relative to `root`
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }
    }

    struct RodioStream {
        decoder: rodio::Decoder<BufReader<File>>,
        format: AudioFormat,
        duration: Option<f32>,
    }

    impl Decoder for RodioDecoder {
        fn open(&self, path: &str) -> Result<Box<dyn DecoderStream>, AudioError> {
            let full_path = self.root.join(path);
            let mut file = File::open(&full_path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => AudioError::ResourceNotFound(path.to_string()),
                _ => AudioError::DecodeError {
                    resource: path.to_string(),
                    reason: e.to_string(),
                },
            })?;

            let mut magic = [0u8; 4];
            let read = file.read(&mut magic).unwrap_or(0);
            if FileFormat::detect(&magic[..read]) == FileFormat::Unknown {
                return Err(AudioError::UnsupportedFormat(path.to_string()));
            }
            file.seek(SeekFrom::Start(0)).map_err(|e| AudioError::DecodeError {
                resource: path.to_string(),
                reason: e.to_string(),
            })?;

            let decoder = rodio::Decoder::new(BufReader::new(file))
                .map_err(|e| AudioError::UnsupportedFormat(format!("{path}: {e}")))?;
            let format = AudioFormat::new(decoder.sample_rate(), decoder.channels());
            let duration = decoder.total_duration().map(|d| d.as_secs_f32());

            Ok(Box::new(RodioStream {
                decoder,
                format,
                duration,
            }))
        }
    }

    impl DecoderStream for RodioStream {
        fn format(&self) -> AudioFormat {
            self.format
        }

        fn duration(&self) -> Option<f32> {
            self.duration
        }

        fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError> {
            let channels = usize::from(self.format.channels.max(1));
            let before = out.len();
            out.extend(self.decoder.by_ref().take(max_frames * channels));
            Ok((out.len() - before) / channels)
        }
    }
}
