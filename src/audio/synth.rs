//! Synthetic audio generation for tests and benches.

use std::f32::consts::PI;

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `duration` - Duration in seconds
/// * `amplitude` - Amplitude (0.0 to 1.0)
pub fn generate_sine(frequency: f32, sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Generate white noise from a seeded linear congruential generator, so runs
/// are reproducible.
pub fn generate_white_noise(
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
    seed: u64,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;

    let mut state = seed;
    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(a).wrapping_add(c);
            let normalized = (state as f32 / u64::MAX as f32) * 2.0 - 1.0;
            amplitude * normalized
        })
        .collect()
}

/// Generate a linear frequency sweep, useful for exercising every spectrum
/// band over a short clip.
pub fn generate_sweep(
    start_freq: f32,
    end_freq: f32,
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let mut phase = 0.0f32;

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / num_samples.max(1) as f32;
            let freq = start_freq + (end_freq - start_freq) * t;
            phase += 2.0 * PI * freq / sample_rate as f32;
            amplitude * phase.sin()
        })
        .collect()
}
