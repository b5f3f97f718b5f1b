//! Offscreen render target with pixel readback.
//!
//! The session renders into an `Rgba8Unorm` texture sized to the configured
//! resolution; the capture controller taps it through [`RenderTarget::read_pixels`].

use super::context::GpuContext;
use crate::render::Resolution;

/// Render surface for one resolution. Recreated whenever the resolution
/// changes.
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new(ctx: &GpuContext, resolution: Resolution, format: wgpu::TextureFormat) -> Self {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("visual_target"),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            format,
            width: resolution.width,
            height: resolution.height,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read the current contents back as tightly packed RGBA bytes.
    ///
    /// Blocks on the GPU; only the capture path calls this, at the capture
    /// frame rate.
    pub fn read_pixels(&self, ctx: &GpuContext) -> Vec<u8> {
        let bytes_per_pixel = 4u32;
        let unpadded_row_bytes = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = unpadded_row_bytes.div_ceil(align) * align;
        let buffer_size = (padded_row_bytes * self.height) as u64;

        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visual_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("visual_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        ctx.device
            .poll(wgpu::PollType::wait_indefinitely())
            .expect("device lost during readback");
        receiver
            .recv()
            .expect("readback callback dropped")
            .expect("readback mapping failed");

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((self.width * self.height * 4) as usize);
        for row in 0..self.height {
            let start = (row * padded_row_bytes) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_row_bytes as usize]);
        }
        pixels
    }
}
