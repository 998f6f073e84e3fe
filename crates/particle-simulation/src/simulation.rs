//! GPU particle store, link buffer and the compute passes that advance them
//!
//! Positions are double-buffered: the update pass reads the start-of-frame
//! snapshot from one buffer and writes the other, so no lane ever observes a
//! neighbour that was already advanced this frame. The spawn pass then writes
//! into the freshly updated buffer, which is also what the renderer draws.

use crate::EffectParams;
use particle_kernel::{
    link_indices, LinkVertex, ParticleState, ParticleVelocity, COMMON_WGSL,
    LINK_INDICES_PER_PARTICLE, LINK_VERTICES_PER_PARTICLE,
};
use wgpu::util::DeviceExt;

const PARAMS_WGSL: &str = include_str!("shaders/params.wgsl");

/// Threads per workgroup in every compute shader here
const WORKGROUP_SIZE: u32 = 64;

/// Storage buffers the update shader binds at once
pub const REQUIRED_STORAGE_BUFFERS: u32 = 5;

fn shader_source(body: &str) -> String {
    format!("{COMMON_WGSL}\n{PARAMS_WGSL}\n{body}")
}

fn workgroups(invocations: u32) -> u32 {
    invocations.div_ceil(WORKGROUP_SIZE)
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    body: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source(body).into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Which of the two position buffers holds the latest particle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingPong {
    current: usize,
}

impl PingPong {
    /// Buffer holding the latest state (snapshot for the next update, source for rendering)
    pub fn current(&self) -> usize {
        self.current
    }

    /// Buffer the next update pass writes into
    pub fn next(&self) -> usize {
        1 - self.current
    }

    pub fn swap(&mut self) {
        self.current = self.next();
    }
}

/// GPU-resident particle population plus the passes that advance it
pub struct ParticleSimulation {
    device: wgpu::Device,
    queue: wgpu::Queue,

    // Buffers
    position_buffers: [wgpu::Buffer; 2],
    velocity_buffer: wgpu::Buffer,
    link_vertex_buffer: wgpu::Buffer,
    link_color_buffer: wgpu::Buffer,
    link_index_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,

    // Compute pipelines
    reset_pipeline: wgpu::ComputePipeline,
    update_pipeline: wgpu::ComputePipeline,
    spawn_pipeline: wgpu::ComputePipeline,

    // Bind groups, indexed by the buffer holding the latest state
    reset_bind_group: wgpu::BindGroup,
    update_bind_groups: [wgpu::BindGroup; 2],
    spawn_bind_groups: [wgpu::BindGroup; 2],

    ping_pong: PingPong,
    params: EffectParams,
    particle_count: u32,
}

impl ParticleSimulation {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, particle_count: u32) -> Self {
        log::info!("Initializing ParticleSimulation with {particle_count} particles...");
        let particle_count = particle_count.max(1);

        // Filled with the inert sentinel by the reset pass at the end of construction
        let particle_buffer_size =
            particle_count as u64 * std::mem::size_of::<ParticleState>() as u64;
        let position_buffers = [0, 1].map(|k| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Particle Position Buffer {k}")),
                size: particle_buffer_size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let velocity_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Velocity Buffer"),
            size: particle_count as u64 * std::mem::size_of::<ParticleVelocity>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Link buffers double as vertex buffers for the link mesh.
        // Zero-initialised, so every link starts fully transparent.
        let link_buffer_size = particle_count as u64
            * LINK_VERTICES_PER_PARTICLE as u64
            * std::mem::size_of::<LinkVertex>() as u64;
        let link_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Vertex Buffer"),
            size: link_buffer_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let link_color_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Color Buffer"),
            size: link_buffer_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let link_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Link Index Buffer"),
            contents: bytemuck::cast_slice(&link_indices(particle_count)),
            usage: wgpu::BufferUsages::INDEX,
        });

        let params = EffectParams {
            counts: [particle_count, 0, 0, 0],
            ..Default::default()
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Effect Params Buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        log::info!("Buffers created");

        let reset_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Reset Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, false),
            ],
        });

        // 0: params, 1: snapshot (read), 2: output positions,
        // 3: velocities, 4: link vertices, 5: link colours
        let update_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Update Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let spawn_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Spawn Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let reset_pipeline = compute_pipeline(
            device,
            "Reset Pipeline",
            include_str!("shaders/reset.wgsl"),
            &reset_layout,
        );
        let update_pipeline = compute_pipeline(
            device,
            "Update Pipeline",
            include_str!("shaders/update.wgsl"),
            &update_layout,
        );
        let spawn_pipeline = compute_pipeline(
            device,
            "Spawn Pipeline",
            include_str!("shaders/spawn.wgsl"),
            &spawn_layout,
        );

        log::info!("Compute pipelines created");

        let reset_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Reset Bind Group"),
            layout: &reset_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: position_buffers[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: position_buffers[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: velocity_buffer.as_entire_binding(),
                },
            ],
        });

        // update_bind_groups[k] reads positions[k] and writes positions[1 - k]
        let update_bind_groups = [0usize, 1].map(|k| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Update Bind Group {k}")),
                layout: &update_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: position_buffers[k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: position_buffers[1 - k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: velocity_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: link_vertex_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: link_color_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        // spawn_bind_groups[k] writes positions[k]
        let spawn_bind_groups = [0usize, 1].map(|k| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Spawn Bind Group {k}")),
                layout: &spawn_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: position_buffers[k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: velocity_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        log::info!("Bind groups created");

        let mut simulation = Self {
            device: device.clone(),
            queue: queue.clone(),
            position_buffers,
            velocity_buffer,
            link_vertex_buffer,
            link_color_buffer,
            link_index_buffer,
            params_buffer,
            reset_pipeline,
            update_pipeline,
            spawn_pipeline,
            reset_bind_group,
            update_bind_groups,
            spawn_bind_groups,
            ping_pong: PingPong::default(),
            params,
            particle_count,
        };
        simulation.reset();
        simulation
    }

    /// Park every particle at the inert sentinel and clear all links
    pub fn reset(&mut self) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Reset Encoder"),
            });

        encoder.clear_buffer(&self.link_vertex_buffer, 0, None);
        encoder.clear_buffer(&self.link_color_buffer, 0, None);
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Reset Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.reset_pipeline);
            compute_pass.set_bind_group(0, &self.reset_bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups(self.particle_count), 1, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.ping_pong = PingPong::default();
        log::debug!("Particle store reset");
    }

    /// Upload this frame's uniform. Must happen before the frame's passes are submitted.
    pub fn update_params(&mut self, params: &EffectParams) {
        self.params = EffectParams {
            counts: [
                self.particle_count,
                params.counts[1] % self.particle_count,
                params.counts[2].min(self.particle_count),
                params.counts[3],
            ],
            ..*params
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[self.params]));
    }

    /// Record the update pass and flip the ping-pong buffers
    pub fn encode_update(&mut self, encoder: &mut wgpu::CommandEncoder) {
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Update Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.update_pipeline);
            compute_pass.set_bind_group(0, &self.update_bind_groups[self.ping_pong.current()], &[]);
            compute_pass.dispatch_workgroups(workgroups(self.particle_count), 1, 1);
        }
        self.ping_pong.swap();
    }

    /// Record the spawn pass into the buffer the last update wrote
    pub fn encode_spawn(&self, encoder: &mut wgpu::CommandEncoder) {
        let batch = self.params.spawn_batch();
        if batch == 0 {
            return;
        }

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Spawn Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.spawn_pipeline);
        compute_pass.set_bind_group(0, &self.spawn_bind_groups[self.ping_pong.current()], &[]);
        compute_pass.dispatch_workgroups(workgroups(batch), 1, 1);
    }

    /// Latest particle positions, as read by the renderer
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        &self.position_buffers[self.ping_pong.current()]
    }

    pub fn velocity_buffer(&self) -> &wgpu::Buffer {
        &self.velocity_buffer
    }

    pub fn link_vertex_buffer(&self) -> &wgpu::Buffer {
        &self.link_vertex_buffer
    }

    pub fn link_color_buffer(&self) -> &wgpu::Buffer {
        &self.link_color_buffer
    }

    pub fn link_index_buffer(&self) -> &wgpu::Buffer {
        &self.link_index_buffer
    }

    /// Number of indices in [`Self::link_index_buffer`]
    pub fn link_index_count(&self) -> u32 {
        self.particle_count * LINK_INDICES_PER_PARTICLE
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_alternates() {
        let mut pp = PingPong::default();
        assert_eq!((pp.current(), pp.next()), (0, 1));
        pp.swap();
        assert_eq!((pp.current(), pp.next()), (1, 0));
        pp.swap();
        assert_eq!(pp.current(), 0);
    }

    #[test]
    fn test_workgroups_cover_population() {
        assert_eq!(workgroups(1), 1);
        assert_eq!(workgroups(64), 1);
        assert_eq!(workgroups(65), 2);
        assert_eq!(workgroups(1 << 13), 128);
    }

    #[test]
    fn test_shader_source_includes_helpers() {
        let source = shader_source(include_str!("shaders/update.wgsl"));
        assert!(source.contains("fn fractal_noise_vec3"));
        assert!(source.contains("struct EffectParams"));
        assert!(source.contains("@compute @workgroup_size(64)"));
    }

    #[test]
    fn compute_shaders_wgsl_parse() {
        for body in [
            include_str!("shaders/reset.wgsl"),
            include_str!("shaders/update.wgsl"),
            include_str!("shaders/spawn.wgsl"),
        ] {
            let source = shader_source(body);
            if let Err(error) = naga::front::wgsl::parse_str(&source) {
                panic!("{}", error.emit_to_string(&source));
            }
        }
    }
}
