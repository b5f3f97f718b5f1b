//! Loudness extraction from a frequency-magnitude spectrum.
//!
//! Turns the analyser's byte spectrum into the single `u_volume` scalar the
//! shader consumes: band-windowed mean, normalization, exponential smoothing,
//! then amplification with a hard clamp to `[0, 1]`.

use serde::{Deserialize, Serialize};

/// How the in-band mean magnitude is mapped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationPolicy {
    /// `v = mean / 255`
    Linear,
    /// `v = sqrt(mean / 255)` — lifts quiet passages, closer to perceived loudness.
    Perceptual,
}

/// Configuration for the loudness extractor.
///
/// The reference values match the visual this crate ships by default:
/// full-band window, perceptual normalization, smoothing 0.85, gain 2.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoudnessConfig {
    /// Start of the frequency sub-band window, as a fraction of the bin count.
    pub band_start: f32,
    /// End of the sub-band window (exclusive), as a fraction of the bin count.
    pub band_end: f32,
    pub normalization: NormalizationPolicy,
    /// Exponential smoothing factor. 0 disables smoothing, values near 1
    /// respond slowly.
    pub smoothing: f32,
    /// Gain applied after smoothing, before the final clamp.
    pub amplification: f32,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            band_start: 0.0,
            band_end: 1.0,
            normalization: NormalizationPolicy::Perceptual,
            smoothing: 0.85,
            amplification: 2.0,
        }
    }
}

impl LoudnessConfig {
    /// Clamp all fields into their valid ranges.
    ///
    /// Smoothing is kept strictly below 1.0 so the filter always admits new
    /// input; the band window is forced to a well-ordered sub-range of [0, 1].
    pub fn sanitized(mut self) -> Self {
        self.band_start = self.band_start.clamp(0.0, 1.0);
        self.band_end = self.band_end.clamp(self.band_start, 1.0);
        self.smoothing = self.smoothing.clamp(0.0, 0.999);
        self.amplification = self.amplification.max(0.0);
        self
    }
}

/// Per-frame loudness values.
///
/// `smoothed` is the filter state carried across frames; `amplified_clamped`
/// is derived fresh each frame and is what reaches the shader. It is never
/// fed back into the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoudnessState {
    /// Normalized in-band value for this frame, before smoothing.
    pub raw_band: f32,
    /// Exponentially smoothed value.
    pub smoothed: f32,
    /// `clamp(smoothed * amplification, 0, 1)` — the `u_volume` uniform.
    pub amplified_clamped: f32,
}

/// Stateful loudness extractor.
///
/// Owns its smoothing state exclusively: the state is read and written inside
/// a single [`process`](Self::process) call, survives across frames, and is
/// not touched by shader or resolution changes.
#[derive(Debug, Clone)]
pub struct LoudnessExtractor {
    config: LoudnessConfig,
    smoothed: f32,
}

impl LoudnessExtractor {
    pub fn new(config: LoudnessConfig) -> Self {
        Self {
            config: config.sanitized(),
            smoothed: 0.0,
        }
    }

    pub fn config(&self) -> &LoudnessConfig {
        &self.config
    }

    /// Consume one spectrum snapshot and produce this frame's loudness.
    ///
    /// An empty spectrum (no audio loaded) yields a zero output and leaves
    /// the smoothing state untouched.
    pub fn process(&mut self, spectrum: &[u8]) -> LoudnessState {
        if spectrum.is_empty() {
            return LoudnessState {
                raw_band: 0.0,
                smoothed: self.smoothed,
                amplified_clamped: 0.0,
            };
        }

        let n = spectrum.len();
        let start = (n as f32 * self.config.band_start).floor() as usize;
        let end = ((n as f32 * self.config.band_end).floor() as usize).min(n);

        let raw_band = if end > start {
            let sum: u32 = spectrum[start..end].iter().map(|&m| m as u32).sum();
            let mean = sum as f32 / (end - start) as f32;
            match self.config.normalization {
                NormalizationPolicy::Linear => mean / 255.0,
                NormalizationPolicy::Perceptual => (mean / 255.0).sqrt(),
            }
        } else {
            0.0
        };

        let alpha = self.config.smoothing;
        self.smoothed = alpha * self.smoothed + (1.0 - alpha) * raw_band;

        LoudnessState {
            raw_band,
            smoothed: self.smoothed,
            amplified_clamped: (self.smoothed * self.config.amplification).clamp(0.0, 1.0),
        }
    }

    /// Current filter state.
    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Drop the filter state back to silence.
    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}
