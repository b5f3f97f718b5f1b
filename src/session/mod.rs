//! Session orchestration: the per-frame render callback and the wiring
//! between audio, loudness, shader program, and capture.
//!
//! A [`VisualizerSession`] owns every subsystem for one visual: the scoped
//! GPU context, the one live shader program, the render target, the playback
//! clock, the loudness filter state, and the recording session. The host
//! drives it by calling [`tick`](VisualizerSession::tick) once per display
//! refresh with the elapsed time.

use std::path::Path;

use crate::audio::{
    AudioData, AudioError, AudioPlayer, SpectrumConfig, SpectrumSample, TrackSource,
};
use crate::capture::{
    CaptureConfig, CaptureController, ContainerFormat, FfmpegMuxer, MediaArtifact, RecordingState,
};
use crate::gpu::{
    GpuContext, GpuError, ProgramState, RenderTarget, ShaderProgramManager, ShaderSource,
    VisualUniforms,
};
use crate::loudness::{LoudnessConfig, LoudnessExtractor, LoudnessState};
use crate::render::{FrameLoop, Resolution, ResolutionPreset};

/// Format of the offscreen surface and the capture stream.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Everything tunable about a session, with the defaults the visual ships
/// with.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    pub resolution: Resolution,
    pub loudness: LoudnessConfig,
    pub spectrum: SpectrumConfig,
    pub capture: CaptureConfig,
    pub container: ContainerFormat,
}

/// Errors surfaced to the host. Shader build failures are deliberately not
/// here — they degrade the visual, they don't fail the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

/// One live visualizer.
pub struct VisualizerSession {
    config: SessionConfig,
    gpu: GpuContext,
    shader: ShaderSource,
    resolution: Resolution,
    programs: ShaderProgramManager,
    target: RenderTarget,
    frame_loop: FrameLoop,
    player: Option<AudioPlayer>,
    spectrum: SpectrumSample,
    loudness: LoudnessExtractor,
    last_loudness: LoudnessState,
    capture: CaptureController,
    audio_scratch: Vec<f32>,
}

impl VisualizerSession {
    /// Acquire a GPU context and build the session around it, with the
    /// built-in shader compiled and the render loop armed.
    pub async fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let gpu = GpuContext::new().await?;
        Ok(Self::with_context(gpu, config))
    }

    /// Build the session on an already-acquired context.
    pub fn with_context(gpu: GpuContext, config: SessionConfig) -> Self {
        let resolution = config.resolution;
        let shader = ShaderSource::builtin();
        let mut programs = ShaderProgramManager::new(TARGET_FORMAT);
        let target = RenderTarget::new(&gpu, resolution, TARGET_FORMAT);
        programs.rebuild(&gpu, &shader, resolution);

        let mut frame_loop = FrameLoop::new();
        frame_loop.start();

        Self {
            shader,
            resolution,
            programs,
            target,
            frame_loop,
            player: None,
            spectrum: SpectrumSample::default(),
            loudness: LoudnessExtractor::new(config.loudness),
            last_loudness: LoudnessState::default(),
            capture: CaptureController::new(config.capture),
            audio_scratch: Vec::new(),
            gpu,
            config,
        }
    }

    /// Decode a track file and make it the session's audio source.
    pub fn load_track(&mut self, path: &Path) -> Result<(), SessionError> {
        self.player = Some(AudioPlayer::load(path, self.config.spectrum)?);
        Ok(())
    }

    /// Use already-decoded audio as the session's track.
    pub fn load_track_data(&mut self, data: AudioData) {
        self.player = Some(AudioPlayer::from_data(data, self.config.spectrum));
    }

    /// Replace the fragment shader. Cancels the pending frame callback,
    /// rebuilds the program, and restarts the loop against the result.
    pub fn set_shader_source(&mut self, source: ShaderSource) {
        self.frame_loop.cancel();
        self.shader = source;
        self.programs.rebuild(&self.gpu, &self.shader, self.resolution);
        self.frame_loop.start();
    }

    /// Change the render surface size. Same cancel/rebuild/restart dance as
    /// a shader change, plus a new render target.
    pub fn set_resolution(&mut self, resolution: Resolution) {
        if resolution == self.resolution {
            return;
        }
        self.frame_loop.cancel();
        self.resolution = resolution;
        self.target = RenderTarget::new(&self.gpu, resolution, TARGET_FORMAT);
        self.programs.rebuild(&self.gpu, &self.shader, resolution);
        self.frame_loop.start();
    }

    pub fn set_resolution_preset(&mut self, preset: ResolutionPreset) {
        self.set_resolution(preset.resolution());
    }

    /// One render callback invocation, `dt` seconds after the previous one.
    ///
    /// Returns false when no callback was scheduled (loop cancelled and not
    /// restarted). Uniform values always reflect the audio state visible at
    /// the moment this runs; nothing is queued across frames.
    pub fn tick(&mut self, dt: f64) -> bool {
        if let Some(player) = self.player.as_mut() {
            player.advance(dt);
        }

        if !self.frame_loop.take_pending() {
            return false;
        }

        let time = self.player.as_ref().map(|p| p.position()).unwrap_or(0.0);

        // The one spectrum snapshot for this frame; every derived uniform
        // uses it. No re-reads below this point.
        let loudness = match self.player.as_mut() {
            Some(player) if player.refresh_spectrum(&mut self.spectrum) => {
                self.loudness.process(self.spectrum.bins())
            }
            _ => self.loudness.process(&[]),
        };
        self.last_loudness = loudness;

        let uniforms = VisualUniforms {
            u_time: time as f32,
            u_volume: loudness.amplified_clamped,
            u_resolution: [self.resolution.width as f32, self.resolution.height as f32],
        };
        self.programs.render(&self.gpu, &self.target, &uniforms);

        if self.capture.is_recording() {
            while self.capture.is_recording() && self.capture.frame_due(time) {
                let pixels = self.target.read_pixels(&self.gpu);
                self.capture.push_frame(&pixels);
            }
            self.audio_scratch.clear();
            if let Some(player) = self.player.as_mut() {
                player.take_played_samples(&mut self.audio_scratch);
            }
            self.capture.push_audio(&self.audio_scratch);
            self.capture.drain();
        }

        if let Some(player) = self.player.as_mut() {
            if player.take_ended() {
                log::info!("track ended");
                self.capture.notify_track_ended(player);
            }
        }

        self.frame_loop.reschedule();
        true
    }

    /// Begin recording the rendered surface plus the track audio.
    ///
    /// No-op (false) when no track is loaded or a recording is active.
    pub fn start_recording(&mut self) -> bool {
        let Some(player) = self.player.as_mut() else {
            log::debug!("no track loaded, ignoring recording start");
            return false;
        };
        let encoder = Box::new(FfmpegMuxer::new(self.config.container));
        self.capture.start(encoder, player, Some(self.resolution))
    }

    /// Stop and finalize the active recording. No-op (false) when idle.
    pub fn stop_recording(&mut self) -> bool {
        match self.player.as_mut() {
            Some(player) => self.capture.stop(player),
            None => false,
        }
    }

    /// The finished recording, if one is waiting to be collected.
    pub fn take_artifact(&mut self) -> Option<MediaArtifact> {
        self.capture.take_artifact()
    }

    pub fn play(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
    }

    pub fn position(&self) -> f64 {
        self.player.as_ref().map(|p| p.position()).unwrap_or(0.0)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn shader_state(&self) -> ProgramState {
        self.programs.state()
    }

    /// Diagnostic from the most recent failed shader build.
    pub fn shader_error(&self) -> Option<&str> {
        self.programs.last_error()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.capture.state()
    }

    /// Loudness values computed by the last frame.
    pub fn last_loudness(&self) -> LoudnessState {
        self.last_loudness
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_loop.frames_rendered()
    }

    /// Lifecycle counters of the program manager, for hosts that track
    /// resource churn.
    pub fn program_counters(&self) -> (u64, u64) {
        (self.programs.build_count(), self.programs.release_count())
    }

    /// Read the current frame back as tightly packed RGBA bytes.
    pub fn read_frame(&self) -> Vec<u8> {
        self.target.read_pixels(&self.gpu)
    }
}
