//! Resolution presets and the cooperative frame scheduler.
//!
//! The host owns the actual refresh callback (~60 Hz, rate and pauses are its
//! business); [`FrameLoop`] models the single pending callback slot so that
//! teardown can cancel it synchronously before a program rebuild and never
//! leave an orphaned invocation pointing at a released program.

use serde::{Deserialize, Serialize};

/// Render surface dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Default for Resolution {
    fn default() -> Self {
        ResolutionPreset::FullHd.resolution()
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The fixed preset set offered to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    Hd,
    FullHd,
    Qhd,
    Uhd4k,
    Uhd8k,
}

impl ResolutionPreset {
    pub fn all() -> &'static [ResolutionPreset] {
        &[
            Self::Hd,
            Self::FullHd,
            Self::Qhd,
            Self::Uhd4k,
            Self::Uhd8k,
        ]
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "720p" | "hd" => Some(Self::Hd),
            "1080p" | "fullhd" | "full-hd" => Some(Self::FullHd),
            "1440p" | "qhd" => Some(Self::Qhd),
            "4k" | "2160p" | "uhd" => Some(Self::Uhd4k),
            "8k" | "4320p" => Some(Self::Uhd8k),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
            Self::Qhd => "1440p",
            Self::Uhd4k => "4K",
            Self::Uhd8k => "8K",
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Hd => Resolution::new(1280, 720),
            Self::FullHd => Resolution::new(1920, 1080),
            Self::Qhd => Resolution::new(2560, 1440),
            Self::Uhd4k => Resolution::new(3840, 2160),
            Self::Uhd8k => Resolution::new(7680, 4320),
        }
    }
}

/// The one pending render callback.
///
/// `take_pending` consumes the slot at the top of a tick; `reschedule` arms
/// it again at the end. `cancel` clears it synchronously, which is the whole
/// point: a rebuild cancels first, so no stale invocation can draw with a
/// released program.
#[derive(Debug, Default)]
pub struct FrameLoop {
    pending: bool,
    frames: u64,
    cancellations: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the first callback of a fresh loop.
    pub fn start(&mut self) {
        self.pending = true;
    }

    /// Synchronously clear the pending callback, if any.
    pub fn cancel(&mut self) {
        if self.pending {
            self.pending = false;
            self.cancellations += 1;
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending
    }

    /// Consume the pending slot. Returns false when no callback is due
    /// (loop never started, or cancelled).
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Arm the next invocation and count the frame that just ran.
    pub fn reschedule(&mut self) {
        self.pending = true;
        self.frames += 1;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn cancellation_count(&self) -> u64 {
        self.cancellations
    }
}
