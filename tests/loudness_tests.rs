//! Integration tests for the loudness extractor.

use shaderwave::loudness::{LoudnessConfig, LoudnessExtractor, NormalizationPolicy};

fn normalize(policy: NormalizationPolicy, magnitude: u8) -> f32 {
    let v = magnitude as f32 / 255.0;
    match policy {
        NormalizationPolicy::Linear => v,
        NormalizationPolicy::Perceptual => v.sqrt(),
    }
}

#[test]
fn test_constant_spectrum_converges_monotonically() {
    let magnitude = 200u8;
    let spectrum = vec![magnitude; 256];

    for &alpha in &[0.1f32, 0.5, 0.85, 0.99] {
        for &policy in &[NormalizationPolicy::Linear, NormalizationPolicy::Perceptual] {
            let config = LoudnessConfig {
                normalization: policy,
                smoothing: alpha,
                amplification: 0.5,
                ..Default::default()
            };
            let target = (normalize(policy, magnitude) * 0.5).clamp(0.0, 1.0);

            let mut extractor = LoudnessExtractor::new(config);
            let mut previous = 0.0f32;
            let mut last = 0.0f32;
            for frame in 0..2000 {
                let state = extractor.process(&spectrum);
                assert!(
                    state.amplified_clamped >= previous - 1e-6,
                    "output regressed at frame {} for alpha {}",
                    frame,
                    alpha
                );
                previous = state.amplified_clamped;
                last = state.amplified_clamped;
            }

            assert!(
                (last - target).abs() < 1e-3,
                "alpha {} {:?}: expected convergence to {}, got {}",
                alpha,
                policy,
                target,
                last
            );
        }
    }
}

#[test]
fn test_output_bounded_for_any_input() {
    // Deterministic pseudo-random spectra.
    let mut state = 0x9e3779b97f4a7c15u64;
    let mut next_byte = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 56) as u8
    };

    let spectra: Vec<Vec<u8>> = (0..16)
        .map(|i| (0..64 + i * 13).map(|_| next_byte()).collect())
        .collect();

    for &alpha in &[0.01f32, 0.5, 0.98] {
        for &amplification in &[0.0f32, 0.5, 1.0, 2.0, 100.0] {
            let config = LoudnessConfig {
                smoothing: alpha,
                amplification,
                ..Default::default()
            };
            let mut extractor = LoudnessExtractor::new(config);
            for spectrum in &spectra {
                let out = extractor.process(spectrum);
                assert!(
                    (0.0..=1.0).contains(&out.amplified_clamped),
                    "output {} out of range for alpha {} amp {}",
                    out.amplified_clamped,
                    alpha,
                    amplification
                );
                assert!((0.0..=1.0).contains(&out.smoothed));
            }
        }
    }
}

#[test]
fn test_perceptual_reads_louder_than_linear() {
    let spectrum = vec![64u8; 128];
    let base = LoudnessConfig {
        smoothing: 0.0,
        amplification: 1.0,
        ..Default::default()
    };

    let mut linear = LoudnessExtractor::new(LoudnessConfig {
        normalization: NormalizationPolicy::Linear,
        ..base
    });
    let mut perceptual = LoudnessExtractor::new(LoudnessConfig {
        normalization: NormalizationPolicy::Perceptual,
        ..base
    });

    let l = linear.process(&spectrum).raw_band;
    let p = perceptual.process(&spectrum).raw_band;
    assert!(p > l, "sqrt normalization should lift sub-full-scale input");
}

#[test]
fn test_band_window_variants_are_configuration() {
    // Bass-heavy spectrum: energy in the low quarter only.
    let mut spectrum = vec![0u8; 256];
    spectrum[..64].fill(255);

    let full_band = LoudnessConfig {
        band_start: 0.0,
        band_end: 1.0,
        normalization: NormalizationPolicy::Linear,
        smoothing: 0.0,
        amplification: 1.0,
    };
    let bass_band = LoudnessConfig {
        band_start: 0.0,
        band_end: 0.25,
        ..full_band
    };

    let full = LoudnessExtractor::new(full_band).process(&spectrum).raw_band;
    let bass = LoudnessExtractor::new(bass_band).process(&spectrum).raw_band;

    assert!((full - 0.25).abs() < 0.01);
    assert!((bass - 1.0).abs() < 0.01);
}

#[test]
fn test_silence_after_signal_decays_toward_zero() {
    let mut extractor = LoudnessExtractor::new(LoudnessConfig::default());
    for _ in 0..100 {
        extractor.process(&[255; 64]);
    }
    let loud = extractor.smoothed();

    let mut last = loud;
    for _ in 0..100 {
        let state = extractor.process(&[0; 64]);
        assert!(state.smoothed <= last + 1e-6);
        last = state.smoothed;
    }
    assert!(last < 0.01, "silence should drain the filter, got {}", last);
}

#[test]
fn test_config_serde_round_trip() {
    let config = LoudnessConfig {
        band_start: 0.1,
        band_end: 0.6,
        normalization: NormalizationPolicy::Linear,
        smoothing: 0.7,
        amplification: 1.5,
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: LoudnessConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.normalization, NormalizationPolicy::Linear);
    assert!((back.band_end - 0.6).abs() < 1e-6);

    // The session-level config aggregates and must round-trip too.
    let session = shaderwave::SessionConfig::default();
    let json = serde_json::to_string(&session).unwrap();
    let back: shaderwave::SessionConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.capture.fps, 30);
    assert_eq!(back.resolution, shaderwave::Resolution::new(1920, 1080));
}
