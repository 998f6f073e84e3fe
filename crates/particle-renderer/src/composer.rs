//! Scene composition: background shell, particles and links into the HDR
//! target, then bloom and tone mapping into the surface.

use crate::{
    BackgroundRenderer, BloomCompositor, BloomSettings, Camera, CameraUniform, FrameUniforms,
    LinkBuffers, LinkRenderer, ParticleRenderer,
};
use particle_kernel::hex_to_linear;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Scene clear colour, `#14171a`
pub const CLEAR_COLOR: u32 = 0x14171a;

/// Current render target size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Returns whether the size changed. Zero-sized requests are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        true
    }
}

/// GPU buffers the scene reads from the simulation each frame
#[derive(Clone, Copy)]
pub struct SceneBuffers<'a> {
    pub positions: &'a wgpu::Buffer,
    pub velocities: &'a wgpu::Buffer,
    pub particle_count: u32,
    pub links: LinkBuffers<'a>,
}

fn create_depth_texture(device: &wgpu::Device, viewport: Viewport) -> wgpu::TextureView {
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: viewport.width,
            height: viewport.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
}

pub struct SceneComposer {
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    depth_texture: wgpu::TextureView,
    viewport: Viewport,
    clear_color: wgpu::Color,

    background: BackgroundRenderer,
    particles: ParticleRenderer,
    links: LinkRenderer,
    bloom: BloomCompositor,
}

impl SceneComposer {
    pub fn new(device: &wgpu::Device, surface_config: &wgpu::SurfaceConfiguration) -> Self {
        log::info!("Initializing SceneComposer...");
        let viewport = Viewport::new(surface_config.width, surface_config.height);

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
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

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let clear = hex_to_linear(CLEAR_COLOR);

        let composer = Self {
            camera_buffer,
            camera_bind_group,
            depth_texture: create_depth_texture(device, viewport),
            viewport,
            clear_color: wgpu::Color {
                r: clear.x as f64,
                g: clear.y as f64,
                b: clear.z as f64,
                a: 1.0,
            },
            background: BackgroundRenderer::new(device, &camera_layout),
            particles: ParticleRenderer::new(device, &camera_layout),
            links: LinkRenderer::new(device, &camera_layout),
            bloom: BloomCompositor::new(
                device,
                surface_config.format,
                viewport.width,
                viewport.height,
            ),
        };
        log::info!("Render pipelines created");
        composer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Recreate the size-dependent targets. Returns whether anything changed.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        if !self.viewport.resize(width, height) {
            return false;
        }
        self.depth_texture = create_depth_texture(device, self.viewport);
        self.bloom.resize(device, width, height);
        true
    }

    /// Record every render pass of the frame into `encoder`
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        camera: &Camera,
        frame: &FrameUniforms,
        bloom: &BloomSettings,
        buffers: SceneBuffers<'_>,
    ) {
        queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[camera.to_uniform(frame)]),
        );

        let particle_bind_group = self
            .particles
            .bind(device, buffers.positions, buffers.velocities);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.bloom.hdr_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.background.draw(&mut render_pass, &self.camera_bind_group);
            self.particles.draw(
                &mut render_pass,
                &self.camera_bind_group,
                &particle_bind_group,
                buffers.particle_count,
            );
            self.links
                .draw(&mut render_pass, &self.camera_bind_group, buffers.links);
        }

        self.bloom.encode(queue, encoder, bloom, surface_view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_resize_is_idempotent() {
        let mut viewport = Viewport::new(800, 600);
        assert!(viewport.resize(1024, 768));
        assert!(!viewport.resize(1024, 768));
        assert_eq!(viewport, Viewport::new(1024, 768));
    }

    #[test]
    fn test_viewport_ignores_zero_size() {
        let mut viewport = Viewport::new(800, 600);
        assert!(!viewport.resize(0, 600));
        assert!(!viewport.resize(800, 0));
        assert_eq!(viewport, Viewport::new(800, 600));
    }

    #[test]
    fn test_clear_color_is_dark_linear() {
        let clear = hex_to_linear(CLEAR_COLOR);
        assert!(clear.max_element() < 0.02);
        assert!(clear.z > clear.x);
    }
}
