//! Playback clock and track state — the audio collaborator.
//!
//! The render loop and the capture controller never touch decoded PCM
//! directly; they talk to a [`TrackSource`]: current position, duration, an
//! edge-triggered ended notification, an in-place spectrum refresh, and the
//! transport operations (play, pause, rewind). [`AudioPlayer`] implements the
//! trait over a decoded [`AudioData`], advancing its clock from the
//! host-supplied frame delta so nothing here ever blocks.

use std::path::Path;

use super::loader::{load_audio, AudioData, AudioError};
use super::spectrum::{SpectrumConfig, SpectrumSample, SpectrumTap};

/// Capabilities the core reads from the audio side.
pub trait TrackSource {
    /// Whether a track is loaded at all.
    fn is_loaded(&self) -> bool;

    /// Current playback position in seconds. 0 when nothing is loaded.
    fn position(&self) -> f64;

    /// Track duration in seconds. 0 when nothing is loaded.
    fn duration(&self) -> f64;

    /// Sample rate of the playing track, for the recording audio stream.
    fn sample_rate(&self) -> u32;

    fn is_playing(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    /// Seek back to the start of the track.
    fn rewind(&mut self);

    /// Advance the playback clock by `dt` seconds of host time.
    fn advance(&mut self, dt: f64);

    /// Edge-triggered end-of-track notification: returns true exactly once
    /// after playback crosses the end.
    fn take_ended(&mut self) -> bool;

    /// Refresh `out` in place with the byte spectrum at the playback cursor.
    /// Returns false (leaving `out` alone) when no track is loaded.
    fn refresh_spectrum(&mut self, out: &mut SpectrumSample) -> bool;

    /// Append the mono samples played since the previous call to `out`.
    /// This is the recorder's audio stream; the cursor resets on rewind.
    fn take_played_samples(&mut self, out: &mut Vec<f32>);
}

/// Deterministic track player over decoded PCM.
pub struct AudioPlayer {
    mono: Vec<f32>,
    sample_rate: u32,
    duration: f64,
    position: f64,
    playing: bool,
    ended: bool,
    record_cursor: usize,
    tap: SpectrumTap,
}

impl AudioPlayer {
    /// Wrap already-decoded audio.
    pub fn from_data(data: AudioData, spectrum: SpectrumConfig) -> Self {
        let duration = data.duration();
        Self {
            mono: data.to_mono(),
            sample_rate: data.sample_rate,
            duration,
            position: 0.0,
            playing: false,
            ended: false,
            record_cursor: 0,
            tap: SpectrumTap::new(spectrum),
        }
    }

    /// Decode a file and wrap it.
    pub fn load(path: &Path, spectrum: SpectrumConfig) -> Result<Self, AudioError> {
        let data = load_audio(path)?;
        log::info!(
            "loaded track {:?}: {:.2}s at {} Hz",
            path.file_name().unwrap_or_default(),
            data.duration(),
            data.sample_rate
        );
        Ok(Self::from_data(data, spectrum))
    }

    fn cursor_sample(&self) -> usize {
        ((self.position * self.sample_rate as f64) as usize).min(self.mono.len())
    }
}

impl TrackSource for AudioPlayer {
    fn is_loaded(&self) -> bool {
        !self.mono.is_empty()
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        if self.is_loaded() {
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn rewind(&mut self) {
        self.position = 0.0;
        self.ended = false;
        self.record_cursor = 0;
        self.tap.reset();
    }

    fn advance(&mut self, dt: f64) {
        if !self.playing || dt <= 0.0 {
            return;
        }
        self.position += dt;
        if self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
            self.ended = true;
        }
    }

    fn take_ended(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }

    fn refresh_spectrum(&mut self, out: &mut SpectrumSample) -> bool {
        if !self.is_loaded() {
            return false;
        }
        let cursor = self.cursor_sample();
        self.tap
            .write_byte_spectrum(&self.mono[cursor..], out);
        true
    }

    fn take_played_samples(&mut self, out: &mut Vec<f32>) {
        let cursor = self.cursor_sample();
        if cursor > self.record_cursor {
            out.extend_from_slice(&self.mono[self.record_cursor..cursor]);
            self.record_cursor = cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::generate_sine;

    fn player(duration: f32) -> AudioPlayer {
        let data = AudioData {
            samples: generate_sine(440.0, 44100, duration, 0.8),
            sample_rate: 44100,
            channels: 1,
        };
        AudioPlayer::from_data(data, SpectrumConfig::default())
    }

    #[test]
    fn test_clock_advances_only_while_playing() {
        let mut p = player(2.0);
        p.advance(0.5);
        assert_eq!(p.position(), 0.0);

        p.play();
        p.advance(0.5);
        assert!((p.position() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ended_fires_once() {
        let mut p = player(1.0);
        p.play();
        p.advance(2.0);
        assert!((p.position() - p.duration()).abs() < 1e-9);
        assert!(!p.is_playing());
        assert!(p.take_ended());
        assert!(!p.take_ended(), "ended must be edge-triggered");
    }

    #[test]
    fn test_rewind_clears_ended_and_cursor() {
        let mut p = player(1.0);
        p.play();
        p.advance(2.0);
        let mut sink = Vec::new();
        p.take_played_samples(&mut sink);
        assert!(!sink.is_empty());

        p.rewind();
        assert_eq!(p.position(), 0.0);
        assert!(!p.take_ended());

        sink.clear();
        p.take_played_samples(&mut sink);
        assert!(sink.is_empty(), "record cursor must reset on rewind");
    }

    #[test]
    fn test_played_samples_accumulate_monotonically() {
        let mut p = player(1.0);
        p.play();

        let mut sink = Vec::new();
        p.advance(0.25);
        p.take_played_samples(&mut sink);
        let quarter = sink.len();
        p.advance(0.25);
        p.take_played_samples(&mut sink);

        assert!(quarter > 0);
        assert!((sink.len() as f64 / 44100.0 - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_spectrum_refresh_reports_load_state() {
        let mut p = player(1.0);
        let mut sample = SpectrumSample::default();
        assert!(p.refresh_spectrum(&mut sample));
        assert_eq!(sample.len(), 256);

        let mut empty = AudioPlayer::from_data(
            AudioData {
                samples: vec![],
                sample_rate: 44100,
                channels: 1,
            },
            SpectrumConfig::default(),
        );
        assert!(!empty.refresh_spectrum(&mut sample));
    }

    #[test]
    fn test_spectrum_at_track_tail_does_not_panic() {
        let mut p = player(1.0);
        p.play();
        p.advance(1.0);
        let mut sample = SpectrumSample::default();
        assert!(p.refresh_spectrum(&mut sample));
    }
}
