//! GPU rendering via wgpu.
//!
//! Provides:
//! - Headless context acquisition (Metal on macOS, Vulkan on Linux)
//! - The shader program lifecycle with solid-clear fallback on build failure
//! - The offscreen render target the capture path reads back from

pub mod context;
pub mod program;
pub mod target;

pub use context::{GpuContext, GpuError};
pub use program::{
    ProgramState, ShaderOrigin, ShaderProgramManager, ShaderSource, VisualUniforms,
};
pub use target::RenderTarget;
