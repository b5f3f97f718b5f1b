//! Track decoding via Symphonia.
//!
//! Decodes a whole audio file (MP3, FLAC, WAV, AAC) into normalized f32 PCM
//! up front; the player then serves its clock, spectrum and recording stream
//! from the decoded buffer.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use thiserror::Error;

/// Errors that can occur while decoding a track.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("No playable audio track found in file")]
    NoPlayableTrack,

    #[error("Track does not declare a sample rate")]
    MissingSampleRate,

    #[error("Track decoded to zero samples")]
    EmptyTrack,
}

/// A fully decoded track.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples, normalized to -1.0..1.0.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: usize,
}

impl AudioData {
    /// Track length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Downmix to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Decode an audio file into [`AudioData`].
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoPlayableTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::MissingSampleRate)?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Malformed packets are skipped, not fatal.
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            let spec = *decoded.spec();
            SampleBuffer::new(decoded.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(AudioError::EmptyTrack);
    }

    log::debug!(
        "decoded {} samples, {} Hz, {} channel(s)",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}
