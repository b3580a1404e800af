//! PCM data and audio format types
//!
//! Decoded audio is kept as interleaved signed 16-bit samples. [`FileFormat`]
//! sniffs encoded files so unsupported data is rejected before it reaches a
//! decoder.

/// Sample layout of decoded PCM data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Bits per sample (always 16 for decoded data)
    pub bit_depth: u16,
}

impl AudioFormat {
    /// 16-bit format with the given rate and channel count
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: 16,
        }
    }

    /// Size of one frame in bytes
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bit_depth / 8)
    }

    /// Duration of `frames` frames in seconds
    pub fn frames_to_seconds(&self, frames: usize) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f32 / self.sample_rate as f32
    }

    /// Number of whole frames in `seconds`
    pub fn seconds_to_frames(&self, seconds: f32) -> usize {
        (seconds.max(0.0) * self.sample_rate as f32) as usize
    }
}

/// Fully decoded audio for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct PcmData {
    /// Sample layout
    pub format: AudioFormat,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl PcmData {
    /// Wrap decoded samples
    pub fn new(format: AudioFormat, samples: Vec<i16>) -> Self {
        Self { format, samples }
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        let channels = usize::from(self.format.channels.max(1));
        self.samples.len() / channels
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.format.frames_to_seconds(self.frames())
    }

    /// Memory footprint of the samples in bytes
    pub fn size_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    /// Samples starting at `frame`, clamped to the end of the data
    pub fn samples_from(&self, frame: usize) -> &[i16] {
        let start = (frame * usize::from(self.format.channels)).min(self.samples.len());
        &self.samples[start..]
    }

    /// Mono sine tone, used by tools and the demo to synthesize resources
    pub fn tone(frequency: f32, seconds: f32, sample_rate: u32, amplitude: f32) -> Self {
        let format = AudioFormat::new(sample_rate, 1);
        let frames = format.seconds_to_frames(seconds);
        let amplitude = amplitude.clamp(0.0, 1.0) * f32::from(i16::MAX);
        let samples = (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (amplitude * (std::f32::consts::TAU * frequency * t).sin()) as i16
            })
            .collect();
        Self::new(format, samples)
    }

    /// Mono silence of the given length
    pub fn silence(seconds: f32, sample_rate: u32) -> Self {
        let format = AudioFormat::new(sample_rate, 1);
        Self::new(format, vec![0; format.seconds_to_frames(seconds)])
    }
}

/// Encoded container formats recognized by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// WAV uncompressed
    Wav,
    /// OGG Vorbis compressed
    Ogg,
    /// MP3 compressed
    Mp3,
    /// FLAC lossless
    Flac,
    /// Unknown format
    Unknown,
}

impl FileFormat {
    /// Detect the container format from the first bytes of a file
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unknown;
        }

        match &bytes[0..4] {
            b"RIFF" => Self::Wav,
            b"OggS" => Self::Ogg,
            b"fLaC" => Self::Flac,
            // MP3 can start with ID3 tag or frame sync
            [0xFF, 0xFB, _, _] | [0xFF, 0xFA, _, _] | [0xFF, 0xF3, _, _] => Self::Mp3,
            [b'I', b'D', b'3', _] => Self::Mp3,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::detect(b"RIFF....WAVE"), FileFormat::Wav);
        assert_eq!(FileFormat::detect(b"OggS...."), FileFormat::Ogg);
        assert_eq!(FileFormat::detect(b"fLaC...."), FileFormat::Flac);
        assert_eq!(FileFormat::detect(b"ID3\x03"), FileFormat::Mp3);
        assert_eq!(FileFormat::detect(b"ABCD"), FileFormat::Unknown);
        assert_eq!(FileFormat::detect(b"RI"), FileFormat::Unknown);
    }

    #[test]
    fn test_pcm_sizes() {
        let pcm = PcmData::new(AudioFormat::new(8000, 2), vec![0; 16000]);
        assert_eq!(pcm.frames(), 8000);
        assert_relative_eq!(pcm.duration(), 1.0);
        assert_eq!(pcm.size_bytes(), 32000);
        assert_eq!(pcm.format.bytes_per_frame(), 4);
    }

    #[test]
    fn test_samples_from_clamps() {
        let pcm = PcmData::new(AudioFormat::new(10, 2), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(pcm.samples_from(1), &[3, 4, 5, 6]);
        assert!(pcm.samples_from(10).is_empty());
    }

    #[test]
    fn test_tone_length_and_peak() {
        let pcm = PcmData::tone(440.0, 0.5, 22050, 0.5);
        assert_eq!(pcm.frames(), 11025);
        let peak = pcm.samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 16000 && peak <= 16384);
    }
}
