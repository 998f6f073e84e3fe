//! Bloom post-processing: HDR scene target, bright-pass mip chain, composite
//!
//! The scene is rendered into an `Rgba16Float` target. A bright-pass writes
//! the pixels above the luminance threshold into a half-resolution mip, which
//! is filtered down four more times. The composite pass adds the weighted
//! mips back onto the scene and tone maps into the surface.

use bytemuck::{Pod, Zeroable};

/// Number of levels in the bloom mip chain
pub const BLOOM_MIP_COUNT: usize = 5;

/// HDR texture format used for the scene target and the bloom chain
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Width of the soft knee above the luminance threshold
pub const BLOOM_SMOOTH_WIDTH: f32 = 0.01;

const BLOOM_FACTORS: [f32; BLOOM_MIP_COUNT] = [1.0, 0.8, 0.6, 0.4, 0.2];

const FULLSCREEN_WGSL: &str = include_str!("shaders/fullscreen.wgsl");

fn fullscreen_shader(body: &str) -> String {
    format!("{FULLSCREEN_WGSL}\n{body}")
}

/// Runtime bloom parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomSettings {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            strength: 0.75,
            radius: 0.1,
            threshold: 0.5,
        }
    }
}

/// Per-level composite weights. `radius` 0 favours the sharp levels, 1 the wide ones.
pub fn bloom_weights(radius: f32) -> [f32; BLOOM_MIP_COUNT] {
    BLOOM_FACTORS.map(|f| f + (1.2 - f - f) * radius)
}

/// Sizes of the mip chain for a `width` x `height` scene, starting at half resolution
pub fn bloom_mip_sizes(width: u32, height: u32) -> [(u32, u32); BLOOM_MIP_COUNT] {
    let mut size = ((width / 2).max(1), (height / 2).max(1));
    std::array::from_fn(|_| {
        let level = size;
        size = ((size.0 / 2).max(1), (size.1 / 2).max(1));
        level
    })
}

/// Uniform data for the bright-pass and downsample passes
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct BloomUniforms {
    pub texel_size: [f32; 2],
    pub threshold: f32,
    pub smooth_width: f32,
}

/// Uniform data for the composite pass: per-mip weights with the bloom
/// strength already applied. Levels 0-3 in `weights`, level 4 in `weights_tail.x`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub weights: [f32; 4],
    pub weights_tail: [f32; 4],
}

impl CompositeUniforms {
    pub fn new(settings: &BloomSettings) -> Self {
        let w = bloom_weights(settings.radius).map(|w| w * settings.strength);
        Self {
            weights: [w[0], w[1], w[2], w[3]],
            weights_tail: [w[4], 0.0, 0.0, 0.0],
        }
    }

    pub fn mip_weight(&self, level: usize) -> f32 {
        match level {
            0..=3 => self.weights[level],
            4 => self.weights_tail[0],
            _ => 0.0,
        }
    }
}

/// A single level in the bloom mip chain
pub struct BloomMip {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// Size-dependent textures and the bind groups that reference them. Recreated on resize.
struct BloomTargets {
    hdr_view: wgpu::TextureView,
    mips: Vec<BloomMip>,
    // source_bind_groups[0] samples the scene, [k] samples mips[k - 1]
    source_bind_groups: Vec<wgpu::BindGroup>,
    scene_bind_group: wgpu::BindGroup,
    mip_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

fn render_texture(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Bloom pipelines plus the HDR scene target they read from
pub struct BloomCompositor {
    threshold_pipeline: wgpu::RenderPipeline,
    downsample_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    texture_bgl: wgpu::BindGroupLayout,
    mip_bgl: wgpu::BindGroupLayout,
    linear_sampler: wgpu::Sampler,

    // One uniform buffer per chain pass, since all passes share an encoder
    pass_uniform_buffers: Vec<wgpu::Buffer>,
    pass_uniform_bind_groups: Vec<wgpu::BindGroup>,
    composite_uniform_buffer: wgpu::Buffer,
    composite_uniform_bind_group: wgpu::BindGroup,

    targets: BloomTargets,
}

impl BloomCompositor {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Linear Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        // Group 0 of every pass: its uniform block
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Uniform BGL"),
            entries: &[uniform_entry(0)],
        });

        // Group 1: source texture + sampler
        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Texture BGL"),
            entries: &[
                texture_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // Composite group 2: every mip level
        let mip_entries: Vec<_> = (0..BLOOM_MIP_COUNT as u32).map(texture_entry).collect();
        let mip_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Mip BGL"),
            entries: &mip_entries,
        });

        let bloom_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(
                fullscreen_shader(include_str!("shaders/bloom.wgsl")).into(),
            ),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(
                fullscreen_shader(include_str!("shaders/composite.wgsl")).into(),
            ),
        });

        let bloom_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Pipeline Layout"),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl, &mip_bgl],
            push_constant_ranges: &[],
        });

        let threshold_pipeline = fullscreen_pipeline(
            device,
            "Bloom Threshold Pipeline",
            &bloom_layout,
            &bloom_shader,
            "fs_threshold",
            HDR_FORMAT,
        );
        let downsample_pipeline = fullscreen_pipeline(
            device,
            "Bloom Downsample Pipeline",
            &bloom_layout,
            &bloom_shader,
            "fs_downsample",
            HDR_FORMAT,
        );
        let composite_pipeline = fullscreen_pipeline(
            device,
            "Composite Pipeline",
            &composite_layout,
            &composite_shader,
            "fs_composite",
            surface_format,
        );

        let pass_uniform_buffers: Vec<_> = (0..BLOOM_MIP_COUNT)
            .map(|k| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Bloom Pass {k} Uniform Buffer")),
                    size: std::mem::size_of::<BloomUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let pass_uniform_bind_groups = pass_uniform_buffers
            .iter()
            .enumerate()
            .map(|(k, buffer)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Bloom Pass {k} Uniform BG")),
                    layout: &uniform_bgl,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let composite_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Composite Uniform Buffer"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let composite_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Uniform BG"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: composite_uniform_buffer.as_entire_binding(),
            }],
        });

        let targets = BloomTargets::new(
            device,
            &texture_bgl,
            &mip_bgl,
            &linear_sampler,
            width,
            height,
        );

        log::info!("Bloom pipelines created");

        Self {
            threshold_pipeline,
            downsample_pipeline,
            composite_pipeline,
            texture_bgl,
            mip_bgl,
            linear_sampler,
            pass_uniform_buffers,
            pass_uniform_bind_groups,
            composite_uniform_buffer,
            composite_uniform_bind_group,
            targets,
        }
    }

    /// HDR target the scene passes render into
    pub fn hdr_view(&self) -> &wgpu::TextureView {
        &self.targets.hdr_view
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.targets = BloomTargets::new(
            device,
            &self.texture_bgl,
            &self.mip_bgl,
            &self.linear_sampler,
            width,
            height,
        );
        log::debug!("Bloom targets resized to {width}x{height}");
    }

    fn write_uniforms(&self, queue: &wgpu::Queue, settings: &BloomSettings) {
        let mut source_size = (self.targets.width.max(1), self.targets.height.max(1));
        for (k, buffer) in self.pass_uniform_buffers.iter().enumerate() {
            let uniforms = BloomUniforms {
                texel_size: [1.0 / source_size.0 as f32, 1.0 / source_size.1 as f32],
                threshold: settings.threshold,
                smooth_width: BLOOM_SMOOTH_WIDTH,
            };
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniforms]));
            let mip = &self.targets.mips[k];
            source_size = (mip.width, mip.height);
        }

        let composite = CompositeUniforms::new(settings);
        queue.write_buffer(
            &self.composite_uniform_buffer,
            0,
            bytemuck::cast_slice(&[composite]),
        );
    }

    /// Record the bloom chain and the composite into `target_view`.
    /// The scene must already be rendered into [`Self::hdr_view`].
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        settings: &BloomSettings,
        target_view: &wgpu::TextureView,
    ) {
        self.write_uniforms(queue, settings);

        // Threshold into mips[0], then each level filters the previous one
        for (k, mip) in self.targets.mips.iter().enumerate() {
            let (label, pipeline) = if k == 0 {
                ("Bloom Threshold Pass", &self.threshold_pipeline)
            } else {
                ("Bloom Downsample Pass", &self.downsample_pipeline)
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &mip.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.pass_uniform_bind_groups[k], &[]);
            pass.set_bind_group(1, &self.targets.source_bind_groups[k], &[]);
            pass.draw(0..3, 0..1);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.composite_pipeline);
        pass.set_bind_group(0, &self.composite_uniform_bind_group, &[]);
        pass.set_bind_group(1, &self.targets.scene_bind_group, &[]);
        pass.set_bind_group(2, &self.targets.mip_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

impl BloomTargets {
    fn new(
        device: &wgpu::Device,
        texture_bgl: &wgpu::BindGroupLayout,
        mip_bgl: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> Self {
        let hdr_texture = render_texture(device, "HDR Scene Texture", width, height);
        let hdr_view = hdr_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mips: Vec<BloomMip> = bloom_mip_sizes(width, height)
            .into_iter()
            .enumerate()
            .map(|(k, (mip_w, mip_h))| {
                let texture = render_texture(device, &format!("Bloom Mip {k}"), mip_w, mip_h);
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                BloomMip {
                    texture,
                    view,
                    width: mip_w,
                    height: mip_h,
                }
            })
            .collect();

        let sampled = |label: &str, view: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: texture_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        };

        let source_bind_groups = std::iter::once(sampled("Bloom Threshold Source BG", &hdr_view))
            .chain(
                mips[..BLOOM_MIP_COUNT - 1]
                    .iter()
                    .map(|mip| sampled("Bloom Downsample Source BG", &mip.view)),
            )
            .collect();
        let scene_bind_group = sampled("Composite Scene BG", &hdr_view);

        let mip_entries: Vec<_> = mips
            .iter()
            .enumerate()
            .map(|(k, mip)| wgpu::BindGroupEntry {
                binding: k as u32,
                resource: wgpu::BindingResource::TextureView(&mip.view),
            })
            .collect();
        let mip_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bloom BG"),
            layout: mip_bgl,
            entries: &mip_entries,
        });

        Self {
            hdr_view,
            mips,
            source_bind_groups,
            scene_bind_group,
            mip_bind_group,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts() {
        assert_eq!(std::mem::size_of::<BloomUniforms>(), 16);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 32);
    }

    #[test]
    fn test_mip_chain_halves() {
        let sizes = bloom_mip_sizes(1920, 1080);
        assert_eq!(sizes[0], (960, 540));
        assert_eq!(sizes[1], (480, 270));
        assert_eq!(sizes[4], (60, 33));
    }

    #[test]
    fn test_mip_chain_never_hits_zero() {
        for (w, h) in bloom_mip_sizes(3, 1) {
            assert!(w >= 1 && h >= 1);
        }
    }

    #[test]
    fn test_bloom_weights() {
        assert_eq!(bloom_weights(0.0), BLOOM_FACTORS);
        let wide = bloom_weights(1.0);
        for (w, f) in wide.iter().zip(BLOOM_FACTORS) {
            assert!((w - (1.2 - f)).abs() < 1e-6);
        }
        // Default radius leans toward the sharp levels
        let default = bloom_weights(BloomSettings::default().radius);
        assert!(default[0] > default[4]);
    }

    #[test]
    fn test_composite_uniforms_carry_scaled_weights() {
        let settings = BloomSettings {
            strength: 2.0,
            radius: 0.5,
            threshold: 0.5,
        };
        let uniforms = CompositeUniforms::new(&settings);
        // radius 0.5 flattens every level to 0.6
        for level in 0..BLOOM_MIP_COUNT {
            assert!((uniforms.mip_weight(level) - 1.2).abs() < 1e-6, "level {level}");
        }
        assert_eq!(&uniforms.weights_tail[1..], &[0.0, 0.0, 0.0]);

        let off = CompositeUniforms::new(&BloomSettings {
            strength: 0.0,
            ..settings
        });
        assert_eq!(off, CompositeUniforms::zeroed());
    }
}
