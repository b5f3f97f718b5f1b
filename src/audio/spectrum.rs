//! Real-time byte-magnitude spectrum, analyser style.
//!
//! Converts a window of PCM samples into the 0–255 frequency-magnitude array
//! the loudness extractor reads each frame: Hann window, FFT, per-bin
//! time-constant smoothing over linear magnitudes, then a decibel mapping
//! onto the byte range.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

/// Spectrum tap configuration.
///
/// Defaults reproduce the analyser settings this visual was tuned against:
/// FFT size 512 (256 bins), time smoothing 0.85, −100..−30 dB byte range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// FFT size; must be a power of two. Bin count is half this.
    pub fft_size: usize,
    /// Per-bin exponential smoothing applied to linear magnitudes over time.
    pub smoothing_time_constant: f32,
    /// Magnitudes at or below this level map to byte 0.
    pub min_decibels: f32,
    /// Magnitudes at or above this level map to byte 255.
    pub max_decibels: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// The most recent frequency-magnitude snapshot.
///
/// One instance lives for the whole session and is refreshed in place every
/// frame; no history is kept.
#[derive(Debug, Clone, Default)]
pub struct SpectrumSample {
    bins: Vec<u8>,
}

impl SpectrumSample {
    pub fn with_bin_count(bins: usize) -> Self {
        Self {
            bins: vec![0; bins],
        }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub(crate) fn resize(&mut self, bins: usize) {
        self.bins.resize(bins, 0);
    }

    pub(crate) fn bins_mut(&mut self) -> &mut [u8] {
        &mut self.bins
    }
}

/// Streaming spectrum analyser over a playing track.
///
/// Owns the FFT plan, the window, and the smoothed per-bin magnitudes.
pub struct SpectrumTap {
    planner: FftPlanner<f32>,
    config: SpectrumConfig,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumTap {
    /// # Panics
    ///
    /// Panics if `config.fft_size` is not a power of two.
    pub fn new(config: SpectrumConfig) -> Self {
        assert!(
            config.fft_size.is_power_of_two(),
            "FFT size must be a power of 2"
        );

        let fft_size = config.fft_size;
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        Self {
            planner: FftPlanner::new(),
            window,
            smoothed: vec![0.0; fft_size / 2],
            scratch: Vec::with_capacity(fft_size),
            config,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Number of frequency bins in the output (FFT size / 2).
    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Analyse the window of samples at the playback cursor and refresh
    /// `out` in place with byte magnitudes.
    ///
    /// Fewer than `fft_size` samples (track tail) are zero-padded.
    pub fn write_byte_spectrum(&mut self, samples: &[f32], out: &mut SpectrumSample) {
        let fft_size = self.config.fft_size;
        out.resize(self.bin_count());

        self.scratch.clear();
        let take = samples.len().min(fft_size);
        self.scratch.extend(
            samples[..take]
                .iter()
                .zip(&self.window)
                .map(|(s, w)| Complex::new(s * w, 0.0)),
        );
        self.scratch
            .resize(fft_size, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(fft_size);
        fft.process(&mut self.scratch);

        let tau = self
            .config
            .smoothing_time_constant
            .clamp(0.0, 0.999);
        let min_db = self.config.min_decibels;
        let range = (self.config.max_decibels - min_db).max(1e-3);

        for (bin, (c, prev)) in self.scratch[..fft_size / 2]
            .iter()
            .zip(self.smoothed.iter_mut())
            .enumerate()
        {
            let magnitude = c.norm() / fft_size as f32;
            *prev = tau * *prev + (1.0 - tau) * magnitude;

            let db = 20.0 * prev.max(1e-10).log10();
            let scaled = (db - min_db) / range;
            out.bins_mut()[bin] = (scaled.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }

    /// Forget accumulated magnitudes, e.g. when a new track is loaded.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}
