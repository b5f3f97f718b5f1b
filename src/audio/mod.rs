//! Audio decode, playback clock, and spectrum analysis.
//!
//! This module provides:
//! - Track decoding via Symphonia (WAV, MP3, FLAC, AAC)
//! - A deterministic playback clock with an edge-triggered ended event
//! - An analyser-style byte-magnitude spectrum via RustFFT
//! - Synthetic test signals

pub mod loader;
pub mod player;
pub mod spectrum;
pub mod synth;

// Re-export commonly used types
pub use loader::{load_audio, AudioData, AudioError};
pub use player::{AudioPlayer, TrackSource};
pub use spectrum::{SpectrumConfig, SpectrumSample, SpectrumTap};
pub use synth::{generate_sine, generate_sweep, generate_white_noise};
