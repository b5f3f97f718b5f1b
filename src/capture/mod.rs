//! Capture & mux control.
//!
//! Turns the live render target plus the playing track into one downloadable
//! media artifact. The controller owns the recording state machine
//! (`Idle → Recording → Finalizing → Idle`) and the accumulated chunk
//! sequence; the actual encoding is behind the [`EncodingService`] seam,
//! implemented for FFmpeg in [`muxer`].

pub mod muxer;

pub use muxer::{ContainerFormat, FfmpegMuxer};

use std::path::Path;

use crate::audio::TrackSource;
use crate::render::Resolution;

/// Errors produced by an encoding service.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] rsmpeg::error::RsmpegError),
    #[error("Codec not found: {0}")]
    CodecNotFound(String),
    #[error("Encoder used before begin()")]
    NotStarted,
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding failed: {0}")]
    Other(String),
}

/// Video side of a capture stream.
#[derive(Debug, Clone, Copy)]
pub struct VideoStreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Audio side of a capture stream. Samples arrive as mono f32.
#[derive(Debug, Clone, Copy)]
pub struct AudioStreamConfig {
    pub sample_rate: u32,
}

/// Platform encoding collaborator: consumes the combined frame + audio
/// stream, emits incremental encoded chunks.
pub trait EncodingService {
    fn begin(
        &mut self,
        video: VideoStreamConfig,
        audio: AudioStreamConfig,
    ) -> Result<(), EncodeError>;

    /// Encode one RGBA frame (`width * height * 4` bytes).
    fn push_video_frame(&mut self, rgba: &[u8]) -> Result<(), EncodeError>;

    /// Encode a run of mono samples.
    fn push_audio_samples(&mut self, samples: &[f32]) -> Result<(), EncodeError>;

    /// Append any bytes encoded since the previous drain to `out`.
    fn drain_chunks(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), EncodeError>;

    /// Flush the encoders, close the container, return the remaining chunks.
    fn finish(&mut self) -> Result<Vec<Vec<u8>>, EncodeError>;

    fn mime_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// One finished recording, ready to hand to the user.
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    /// The complete container file.
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub suggested_name: String,
}

impl MediaArtifact {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, &self.data)
    }
}

/// Recording state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Finalizing,
}

/// Capture configuration.
///
/// The two deployment variants seen in the wild (30 vs 60 fps capture,
/// stop-on-track-end vs manual stop only) are expressed here rather than as
/// separate code paths.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CaptureConfig {
    /// Target capture rate for the rendered surface.
    pub fps: u32,
    /// Finalize automatically when the track signals end-of-track.
    pub stop_on_ended: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            stop_on_ended: true,
        }
    }
}

/// Owns the one recording session.
///
/// Exactly one session may be in `Recording` state; a second `start` while
/// recording is a no-op, as is `stop` while idle. An encoder failure at any
/// point lands back in `Idle` with no artifact and without disturbing the
/// render loop.
pub struct CaptureController {
    config: CaptureConfig,
    state: RecordingState,
    encoder: Option<Box<dyn EncodingService>>,
    chunks: Vec<Vec<u8>>,
    frames_captured: u64,
    internal_stops: u64,
    artifact: Option<MediaArtifact>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: RecordingState::Idle,
            encoder: None,
            chunks: Vec::new(),
            frames_captured: 0,
            internal_stops: 0,
            artifact: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Times the controller finalized on its own (end-of-track).
    pub fn internal_stop_count(&self) -> u64 {
        self.internal_stops
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Chunks accumulated for the current/last session.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Begin a recording session.
    ///
    /// No-ops (returning false) when a session is already recording, when no
    /// track is loaded, or when there is no render surface. On success the
    /// track is rewound to zero and playing, and the previous session's
    /// chunks are discarded.
    pub fn start(
        &mut self,
        mut encoder: Box<dyn EncodingService>,
        track: &mut dyn TrackSource,
        surface: Option<Resolution>,
    ) -> bool {
        if self.state != RecordingState::Idle {
            log::warn!("recording already active, ignoring start");
            return false;
        }
        let Some(resolution) = surface else {
            log::debug!("no render surface, ignoring start");
            return false;
        };
        if !track.is_loaded() {
            log::debug!("no track loaded, ignoring start");
            return false;
        }

        self.chunks.clear();
        self.artifact = None;
        self.frames_captured = 0;

        track.rewind();
        let video = VideoStreamConfig {
            width: resolution.width,
            height: resolution.height,
            fps: self.config.fps,
        };
        let audio = AudioStreamConfig {
            sample_rate: track.sample_rate(),
        };
        if let Err(e) = encoder.begin(video, audio) {
            log::warn!("failed to start encoder: {e}");
            return false;
        }

        track.play();
        self.encoder = Some(encoder);
        self.state = RecordingState::Recording;
        log::info!(
            "recording started: {}x{} at {} fps",
            video.width,
            video.height,
            video.fps
        );
        true
    }

    /// Whether the fixed-rate frame gate is open at the given clock position.
    pub fn frame_due(&self, position: f64) -> bool {
        self.state == RecordingState::Recording
            && self.frames_captured as f64 / self.config.fps as f64 <= position
    }

    /// Feed one captured RGBA frame to the encoder.
    pub fn push_frame(&mut self, rgba: &[u8]) {
        if self.state != RecordingState::Recording {
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        match encoder.push_video_frame(rgba) {
            Ok(()) => self.frames_captured += 1,
            Err(e) => self.abort(e),
        }
    }

    /// Feed played-back audio samples to the encoder.
    pub fn push_audio(&mut self, samples: &[f32]) {
        if self.state != RecordingState::Recording || samples.is_empty() {
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        if let Err(e) = encoder.push_audio_samples(samples) {
            self.abort(e);
        }
    }

    /// Collect chunks the encoder has produced so far.
    pub fn drain(&mut self) {
        if self.state != RecordingState::Recording {
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let mut fresh = Vec::new();
        match encoder.drain_chunks(&mut fresh) {
            Ok(()) => self.chunks.extend(fresh.into_iter().filter(|c| !c.is_empty())),
            Err(e) => self.abort(e),
        }
    }

    /// End-of-track notification from the audio collaborator.
    pub fn notify_track_ended(&mut self, track: &mut dyn TrackSource) {
        if self.state == RecordingState::Recording && self.config.stop_on_ended {
            self.internal_stops += 1;
            self.finalize(track);
        }
    }

    /// Explicit stop. No-op (returning false) unless currently recording.
    pub fn stop(&mut self, track: &mut dyn TrackSource) -> bool {
        if self.state != RecordingState::Recording {
            return false;
        }
        self.finalize(track);
        true
    }

    /// The artifact from the most recent finalized session, if any.
    pub fn take_artifact(&mut self) -> Option<MediaArtifact> {
        self.artifact.take()
    }

    /// Both stop paths converge here: flush, pause playback, concatenate the
    /// chunk sequence into one artifact, return to idle.
    fn finalize(&mut self, track: &mut dyn TrackSource) {
        self.state = RecordingState::Finalizing;
        track.pause();

        let Some(mut encoder) = self.encoder.take() else {
            self.state = RecordingState::Idle;
            return;
        };

        match encoder.finish() {
            Ok(rest) => {
                self.chunks.extend(rest.into_iter().filter(|c| !c.is_empty()));
                let data = self.chunks.concat();
                log::info!(
                    "recording finalized: {} frames, {} chunks, {} bytes",
                    self.frames_captured,
                    self.chunks.len(),
                    data.len()
                );
                self.artifact = Some(MediaArtifact {
                    data,
                    mime_type: encoder.mime_type(),
                    suggested_name: format!("visualizer.{}", encoder.file_extension()),
                });
            }
            Err(e) => {
                log::warn!("finalize failed, discarding recording: {e}");
                self.chunks.clear();
                self.artifact = None;
            }
        }
        self.state = RecordingState::Idle;
    }

    /// Mid-stream encoder failure: back to idle, nothing produced, the render
    /// loop never sees an error.
    fn abort(&mut self, error: EncodeError) {
        log::warn!("encoding failed mid-stream, discarding recording: {error}");
        self.encoder = None;
        self.chunks.clear();
        self.artifact = None;
        self.state = RecordingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_while_idle_is_noop() {
        let mut controller = CaptureController::new(CaptureConfig::default());
        struct NoTrack;
        impl TrackSource for NoTrack {
            fn is_loaded(&self) -> bool {
                false
            }
            fn position(&self) -> f64 {
                0.0
            }
            fn duration(&self) -> f64 {
                0.0
            }
            fn sample_rate(&self) -> u32 {
                44100
            }
            fn is_playing(&self) -> bool {
                false
            }
            fn play(&mut self) {}
            fn pause(&mut self) {}
            fn rewind(&mut self) {}
            fn advance(&mut self, _dt: f64) {}
            fn take_ended(&mut self) -> bool {
                false
            }
            fn refresh_spectrum(&mut self, _out: &mut crate::audio::SpectrumSample) -> bool {
                false
            }
            fn take_played_samples(&mut self, _out: &mut Vec<f32>) {}
        }

        assert!(!controller.stop(&mut NoTrack));
        assert_eq!(controller.state(), RecordingState::Idle);
        assert!(controller.take_artifact().is_none());
    }

    #[test]
    fn test_frame_gate_follows_clock() {
        let mut controller = CaptureController::new(CaptureConfig {
            fps: 30,
            stop_on_ended: true,
        });
        // Not recording: gate closed regardless of clock.
        assert!(!controller.frame_due(10.0));

        controller.state = RecordingState::Recording;
        assert!(controller.frame_due(0.0));
        controller.frames_captured = 30;
        assert!(!controller.frame_due(0.5));
        assert!(controller.frame_due(1.0));
    }
}
