//! Integration tests for the capture controller, driven by a scripted
//! encoding service so no FFmpeg or GPU is required.

use std::cell::RefCell;
use std::rc::Rc;

use shaderwave::audio::{synth::generate_sine, AudioData, AudioPlayer, SpectrumConfig, TrackSource};
use shaderwave::capture::{
    AudioStreamConfig, CaptureConfig, CaptureController, EncodeError, EncodingService,
    RecordingState, VideoStreamConfig,
};
use shaderwave::render::Resolution;

const SAMPLE_RATE: u32 = 44100;

#[derive(Default)]
struct MockStats {
    begun: u32,
    frames: usize,
    audio_samples: usize,
    finished: u32,
}

/// Scripted encoding service: emits one 8-byte chunk per frame on drain and
/// a fixed tail on finish, with optional injected failures.
struct MockEncoder {
    stats: Rc<RefCell<MockStats>>,
    undrained_frames: usize,
    fail_on_frame: Option<usize>,
    fail_finish: bool,
}

impl MockEncoder {
    fn new(stats: Rc<RefCell<MockStats>>) -> Self {
        Self {
            stats,
            undrained_frames: 0,
            fail_on_frame: None,
            fail_finish: false,
        }
    }
}

impl EncodingService for MockEncoder {
    fn begin(
        &mut self,
        _video: VideoStreamConfig,
        _audio: AudioStreamConfig,
    ) -> Result<(), EncodeError> {
        self.stats.borrow_mut().begun += 1;
        Ok(())
    }

    fn push_video_frame(&mut self, _rgba: &[u8]) -> Result<(), EncodeError> {
        let mut stats = self.stats.borrow_mut();
        stats.frames += 1;
        if self.fail_on_frame == Some(stats.frames) {
            return Err(EncodeError::Other("scripted frame failure".into()));
        }
        self.undrained_frames += 1;
        Ok(())
    }

    fn push_audio_samples(&mut self, samples: &[f32]) -> Result<(), EncodeError> {
        self.stats.borrow_mut().audio_samples += samples.len();
        Ok(())
    }

    fn drain_chunks(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), EncodeError> {
        if self.undrained_frames > 0 {
            out.push(vec![0xAB; self.undrained_frames * 8]);
            self.undrained_frames = 0;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<Vec<u8>>, EncodeError> {
        if self.fail_finish {
            return Err(EncodeError::Other("scripted finish failure".into()));
        }
        self.stats.borrow_mut().finished += 1;
        Ok(vec![b"TAIL".to_vec()])
    }

    fn mime_type(&self) -> &'static str {
        "video/mp4"
    }

    fn file_extension(&self) -> &'static str {
        "mp4"
    }
}

fn test_track(duration_secs: f32) -> AudioPlayer {
    let data = AudioData {
        samples: generate_sine(440.0, SAMPLE_RATE, duration_secs, 0.8),
        sample_rate: SAMPLE_RATE,
        channels: 1,
    };
    AudioPlayer::from_data(data, SpectrumConfig::default())
}

fn surface() -> Option<Resolution> {
    Some(Resolution::new(320, 180))
}

/// Drive the controller the way the session's tick does, until the track
/// ends or `max_seconds` of simulated time elapse.
fn run_to_end(
    controller: &mut CaptureController,
    track: &mut AudioPlayer,
    max_seconds: f64,
) {
    let dt = 1.0 / 60.0;
    let frame = vec![0u8; 320 * 180 * 4];
    let mut audio = Vec::new();
    let mut elapsed = 0.0;

    while elapsed < max_seconds {
        track.advance(dt);
        elapsed += dt;

        if controller.is_recording() {
            while controller.is_recording() && controller.frame_due(track.position()) {
                controller.push_frame(&frame);
            }
            audio.clear();
            track.take_played_samples(&mut audio);
            controller.push_audio(&audio);
            controller.drain();
        }

        if track.take_ended() {
            controller.notify_track_ended(track);
            break;
        }
    }
}

#[test]
fn test_double_start_leaves_one_session() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(2.0);

    assert!(controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    assert_eq!(controller.state(), RecordingState::Recording);

    // Second start while recording: rejected, nothing observable changes.
    let frames_before = controller.frames_captured();
    assert!(!controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    assert_eq!(controller.state(), RecordingState::Recording);
    assert_eq!(controller.frames_captured(), frames_before);
    assert_eq!(stats.borrow().begun, 1, "second encoder must never start");
    assert!(track.is_playing(), "playback undisturbed by rejected start");
}

#[test]
fn test_start_requires_track_and_surface() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut controller = CaptureController::new(CaptureConfig::default());

    let mut track = test_track(1.0);
    assert!(!controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        None
    ));

    let mut unloaded = AudioPlayer::from_data(
        AudioData {
            samples: vec![],
            sample_rate: SAMPLE_RATE,
            channels: 1,
        },
        SpectrumConfig::default(),
    );
    assert!(!controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut unloaded,
        surface()
    ));

    assert_eq!(controller.state(), RecordingState::Idle);
    assert_eq!(stats.borrow().begun, 0);
}

#[test]
fn test_start_resets_playback_to_zero() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(5.0);

    track.play();
    track.advance(3.0);
    assert!(track.position() > 2.9);

    assert!(controller.start(
        Box::new(MockEncoder::new(stats)),
        &mut track,
        surface()
    ));
    assert_eq!(track.position(), 0.0);
    assert!(track.is_playing());
}

#[test]
fn test_track_end_finalizes_with_one_artifact() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(10.0);

    assert!(controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    run_to_end(&mut controller, &mut track, 15.0);

    assert_eq!(controller.state(), RecordingState::Idle);
    assert_eq!(
        controller.internal_stop_count(),
        1,
        "exactly one internal stop"
    );
    assert_eq!(stats.borrow().finished, 1);
    assert!(!track.is_playing(), "finalize pauses playback");

    let artifact = controller.take_artifact().expect("one artifact produced");
    assert!(controller.take_artifact().is_none(), "artifact taken once");
    assert_eq!(artifact.suggested_name, "visualizer.mp4");
    assert!(artifact.data.ends_with(b"TAIL"));

    // 10 seconds at 30 fps, give or take the last tick.
    let frames = controller.frames_captured();
    assert!(
        (295..=305).contains(&frames),
        "expected ~300 captured frames, got {}",
        frames
    );

    // All played audio reached the encoder.
    let expected_samples = (10.0 * SAMPLE_RATE as f64) as usize;
    let delivered = stats.borrow().audio_samples;
    assert!(
        (delivered as i64 - expected_samples as i64).abs() < SAMPLE_RATE as i64 / 10,
        "expected ~{} audio samples, got {}",
        expected_samples,
        delivered
    );
}

#[test]
fn test_manual_stop_variant() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let config = CaptureConfig {
        fps: 60,
        stop_on_ended: false,
    };
    let mut controller = CaptureController::new(config);
    let mut track = test_track(1.0);

    assert!(controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    run_to_end(&mut controller, &mut track, 2.0);

    // stop_on_ended is off: the session is still live after the track ends.
    assert_eq!(controller.state(), RecordingState::Recording);
    assert_eq!(controller.internal_stop_count(), 0);

    assert!(controller.stop(&mut track));
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(controller.take_artifact().is_some());

    // Stop again while idle: no-op.
    assert!(!controller.stop(&mut track));
}

#[test]
fn test_restart_discards_previous_session_chunks() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(1.0);

    assert!(controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    run_to_end(&mut controller, &mut track, 2.0);
    assert!(controller.chunk_count() > 0);
    let first = controller.take_artifact().expect("first artifact");

    assert!(controller.start(
        Box::new(MockEncoder::new(stats.clone())),
        &mut track,
        surface()
    ));
    assert_eq!(controller.chunk_count(), 0, "chunks cleared on new session");
    run_to_end(&mut controller, &mut track, 2.0);
    let second = controller.take_artifact().expect("second artifact");

    assert!(second.data.len() <= first.data.len() + b"TAIL".len() * 2);
}

#[test]
fn test_encoder_failure_mid_stream_aborts_to_idle() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut encoder = MockEncoder::new(stats.clone());
    encoder.fail_on_frame = Some(5);

    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(10.0);

    assert!(controller.start(Box::new(encoder), &mut track, surface()));
    run_to_end(&mut controller, &mut track, 1.0);

    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(controller.take_artifact().is_none(), "no artifact on failure");
    assert_eq!(stats.borrow().finished, 0);
}

#[test]
fn test_finalize_failure_produces_no_artifact() {
    let stats = Rc::new(RefCell::new(MockStats::default()));
    let mut encoder = MockEncoder::new(stats.clone());
    encoder.fail_finish = true;

    let mut controller = CaptureController::new(CaptureConfig::default());
    let mut track = test_track(1.0);

    assert!(controller.start(Box::new(encoder), &mut track, surface()));
    run_to_end(&mut controller, &mut track, 2.0);

    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(controller.take_artifact().is_none());
    // The UI can immediately retry.
    let retry = MockEncoder::new(stats.clone());
    assert!(controller.start(Box::new(retry), &mut track, surface()));
}
