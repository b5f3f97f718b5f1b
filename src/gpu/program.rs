//! Shader program lifecycle: compile, link, bind, teardown.
//!
//! User-supplied fragment source is composed with a fixed full-screen-quad
//! vertex stage and a uniform preamble into a single WGSL module. Builds run
//! inside a validation error scope, so a broken shader produces a diagnostic
//! string and the `Failed` state instead of an unwound stack; the render step
//! then degrades to a solid clear. At most one program is ever live — the
//! previous one is released before its replacement is installed.

use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::target::RenderTarget;
use crate::render::Resolution;

/// Uniform block exposed to every fragment shader.
///
/// WGSL side (declared by the preamble, bound at group 0, binding 0):
/// `u.u_time` seconds, `u.u_volume` in [0, 1], `u.u_resolution` pixels.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VisualUniforms {
    pub u_time: f32,
    pub u_volume: f32,
    pub u_resolution: [f32; 2],
}

/// Where a fragment source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderOrigin {
    BuiltIn,
    User,
}

/// Immutable fragment-shader text plus provenance.
///
/// Any change to the source is a full pipeline rebuild, never a partial
/// patch. The fragment entry point is
/// `fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32>`, with
/// `uv` derived from clip position as `pos * 0.5 + 0.5`.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    text: String,
    origin: ShaderOrigin,
}

impl ShaderSource {
    /// The built-in pink/cyan waves visual.
    pub fn builtin() -> Self {
        Self {
            text: DEFAULT_FRAGMENT.to_string(),
            origin: ShaderOrigin::BuiltIn,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ShaderOrigin::User,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> ShaderOrigin {
        self.origin
    }
}

impl Default for ShaderSource {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Observable lifecycle state of the program manager.
///
/// The compile step is synchronous, so the transient `Compiling` phase is
/// never observable between calls; a build lands in `Active` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Uninitialized,
    Active,
    Failed,
}

/// GPU resources of one linked program. Owned exclusively by the manager.
struct ShaderProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
}

/// Builds, owns and draws the one live shader program.
pub struct ShaderProgramManager {
    format: wgpu::TextureFormat,
    program: Option<ShaderProgram>,
    last_error: Option<String>,
    builds: u64,
    releases: u64,
}

impl ShaderProgramManager {
    pub fn new(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            program: None,
            last_error: None,
            builds: 0,
            releases: 0,
        }
    }

    pub fn state(&self) -> ProgramState {
        if self.program.is_some() {
            ProgramState::Active
        } else if self.last_error.is_some() {
            ProgramState::Failed
        } else {
            ProgramState::Uninitialized
        }
    }

    /// Diagnostic from the most recent failed build.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Successful builds so far.
    pub fn build_count(&self) -> u64 {
        self.builds
    }

    /// Programs released so far.
    pub fn release_count(&self) -> u64 {
        self.releases
    }

    /// Tear down the current program (if any) and build a replacement from
    /// `source`. Called for every ShaderSource or Resolution change.
    ///
    /// Never returns an error: a failed compile or link leaves the manager
    /// in `Failed` with a diagnostic, and rendering falls back to a clear.
    pub fn rebuild(&mut self, ctx: &GpuContext, source: &ShaderSource, resolution: Resolution) {
        // Release before replacement; two live programs must never overlap.
        if self.program.take().is_some() {
            self.releases += 1;
        }
        self.last_error = None;

        let composed = format!("{UNIFORM_PREAMBLE}\n{VERTEX_STAGE}\n{}", source.text());

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("visual_shader"),
                source: wgpu::ShaderSource::Wgsl(composed.into()),
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("visual_bind_group_layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("visual_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("visual_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: (std::mem::size_of::<f32>() * 2) as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        }],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visual_uniforms"),
            size: std::mem::size_of::<VisualUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vertex_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("visual_quad"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("visual_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        if let Some(error) = pollster::block_on(ctx.device.pop_error_scope()) {
            let diagnostic = error.to_string();
            log::warn!("shader build failed, rendering solid clear: {diagnostic}");
            self.last_error = Some(diagnostic);
            return;
        }

        self.program = Some(ShaderProgram {
            pipeline,
            bind_group,
            uniform_buffer,
            vertex_buffer,
        });
        self.builds += 1;
        log::debug!(
            "shader program linked ({:?} source, {}x{})",
            source.origin(),
            resolution.width,
            resolution.height
        );
    }

    /// Draw one frame into `target`.
    ///
    /// Active: upload uniforms, clear, draw the quad. Failed or
    /// uninitialized: clear to the fallback color only.
    pub fn render(&self, ctx: &GpuContext, target: &RenderTarget, uniforms: &VisualUniforms) {
        if let Some(program) = &self.program {
            ctx.queue
                .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("visual_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("visual_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(FALLBACK_CLEAR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(program) = &self.program {
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &program.bind_group, &[]);
                pass.set_vertex_buffer(0, program.vertex_buffer.slice(..));
                pass.set_viewport(
                    0.0,
                    0.0,
                    target.width() as f32,
                    target.height() as f32,
                    0.0,
                    1.0,
                );
                pass.draw(0..QUAD_VERTICES.len() as u32 / 2, 0..1);
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Solid color shown while no program is bound.
const FALLBACK_CLEAR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

/// Two-triangle strip covering the full clip-space square.
const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

const UNIFORM_PREAMBLE: &str = r#"
struct VisualUniforms {
    u_time: f32,
    u_volume: f32,
    u_resolution: vec2<f32>,
}

@group(0) @binding(0) var<uniform> u: VisualUniforms;
"#;

const VERTEX_STAGE: &str = r#"
struct VertexOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.uv = position * 0.5 + vec2<f32>(0.5, 0.5);
    out.clip_position = vec4<f32>(position, 0.0, 1.0);
    return out;
}
"#;

/// Default visual: two loudness-driven wave ridges, pink over cyan.
const DEFAULT_FRAGMENT: &str = r#"
fn ridge(dist: f32, width: f32) -> f32 {
    return 1.0 - smoothstep(0.0, width, dist);
}

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let aspect = u.u_resolution.x / max(u.u_resolution.y, 1.0);
    let p = vec2<f32>((uv.x - 0.5) * 2.0 * aspect, (uv.y - 0.5) * 2.0);
    let boost = 0.35 + 0.65 * u.u_volume;

    let w1 = 0.45 * boost * sin(p.x * 3.0 + u.u_time * 1.3);
    let w2 = 0.30 * boost * sin(p.x * 5.0 - u.u_time * 0.7 + 1.7);

    let pink = vec3<f32>(1.0, 0.2, 0.6);
    let cyan = vec3<f32>(0.15, 0.9, 1.0);

    var color = vec3<f32>(0.02, 0.01, 0.04);
    color += pink * ridge(abs(p.y - w1), 0.25 * boost);
    color += cyan * ridge(abs(p.y + 0.3 - w2), 0.3 * boost);

    return vec4<f32>(color, 1.0);
}
"#;
