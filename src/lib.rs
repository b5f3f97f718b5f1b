//! Shaderwave Core
//!
//! Audio-reactive fragment-shader rendering with capture.
//!
//! # Features
//!
//! - Track decoding (WAV, MP3, FLAC, AAC) via Symphonia
//! - Analyser-style byte spectrum via RustFFT, feeding a tunable loudness
//!   extractor (band window, linear/perceptual normalization, smoothing,
//!   amplification)
//! - Runtime-compiled fragment shaders via wgpu, with a solid-clear fallback
//!   on compile or link failure
//! - A cooperative render loop synchronized to the playback clock
//! - Recording of the rendered surface plus the source audio into MP4 or
//!   WebM via FFmpeg

pub mod audio;
pub mod capture;
pub mod gpu;
pub mod loudness;
pub mod render;
pub mod session;

// Re-export commonly used types
pub use audio::{load_audio, AudioData, AudioError, AudioPlayer, SpectrumConfig, SpectrumSample, TrackSource};
pub use capture::{
    CaptureConfig, CaptureController, ContainerFormat, EncodeError, EncodingService, FfmpegMuxer,
    MediaArtifact, RecordingState,
};
pub use gpu::{
    GpuContext, GpuError, ProgramState, RenderTarget, ShaderOrigin, ShaderProgramManager,
    ShaderSource, VisualUniforms,
};
pub use loudness::{LoudnessConfig, LoudnessExtractor, LoudnessState, NormalizationPolicy};
pub use render::{FrameLoop, Resolution, ResolutionPreset};
pub use session::{SessionConfig, SessionError, VisualizerSession, TARGET_FORMAT};
