use egui::Context;
use egui_wgpu::Renderer;
use egui_winit::State;
use particle_effect::{FrameOverlay, FrameStats, OverlayFrame};
use particle_simulation::EffectSettings;
use wgpu::{Device, TextureFormat};
use winit::{event::WindowEvent, window::Window};

/// Debug control panel drawn over the effect
pub struct Gui {
    context: Context,
    state: State,
    renderer: Renderer,
    pub visible: bool,
}

impl Gui {
    pub fn new(device: &Device, output_color_format: TextureFormat, window: &Window) -> Self {
        let context = Context::default();
        let id = context.viewport_id();

        let state = State::new(
            context.clone(),
            id,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(device.limits().max_texture_dimension_2d as usize),
        );

        let renderer = Renderer::new(
            device,
            output_color_format,
            egui_wgpu::RendererOptions::default(),
        );

        Self {
            context,
            state,
            renderer,
            visible: true,
        }
    }

    /// Returns whether egui consumed the event
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        if !self.visible {
            return false;
        }
        let response = self.state.on_window_event(window, event);
        response.consumed
    }

    /// Whether the pointer is over a panel, so drags should not orbit the camera
    pub fn wants_pointer(&self) -> bool {
        self.visible && self.context.wants_pointer_input()
    }

    fn ui(ctx: &Context, settings: &mut EffectSettings, stats: &FrameStats) {
        egui::Window::new("Diagnostics")
            .anchor(egui::Align2::LEFT_TOP, [10.0, 10.0])
            .resizable(false)
            .collapsible(true)
            .show(ctx, |ui| {
                ui.label(format!("FPS: {:.1}", stats.fps));
                ui.label(format!("Frame Time: {:.2} ms", stats.frame_time * 1000.0));
                ui.label(format!("Particles: {}", stats.particle_count));
                ui.label(format!("Spawn Index: {}", stats.spawn_index));
            });

        egui::Window::new("Particle Field")
            .anchor(egui::Align2::RIGHT_TOP, [-10.0, 10.0])
            .resizable(false)
            .collapsible(true)
            .show(ctx, |ui| {
                ui.heading("Particles");
                ui.add(egui::Slider::new(&mut settings.time_scale, 0.0..=5.0).text("Time Scale"));
                ui.add(
                    egui::Slider::new(&mut settings.particle_lifetime, 0.0..=2.0).text("Lifetime"),
                );
                ui.add(egui::Slider::new(&mut settings.particle_size, 0.0..=2.0).text("Size"));
                ui.add(
                    egui::Slider::new(&mut settings.nb_to_spawn, 1..=64).text("Spawn per Frame"),
                );
                ui.add(
                    egui::Slider::new(&mut settings.spawn_radius, 0.0..=0.1).text("Spawn Radius"),
                );
                ui.add(
                    egui::Slider::new(&mut settings.spawn_speed, 0.0..=10.0).text("Spawn Speed"),
                );

                ui.separator();
                ui.heading("Links");
                ui.add(
                    egui::Slider::new(&mut settings.links_width, 0.0..=0.02)
                        .text("Width")
                        .max_decimals(4),
                );

                ui.separator();
                ui.heading("Color");
                ui.add(egui::Slider::new(&mut settings.color_offset, 0.0..=5.0).text("Offset"));
                ui.add(
                    egui::Slider::new(&mut settings.color_variance, 0.0..=5.0).text("Variance"),
                );
                ui.add(
                    egui::Slider::new(&mut settings.color_rotation_speed, 0.0..=5.0)
                        .text("Rotation Speed"),
                );

                ui.separator();
                ui.heading("Turbulence");
                ui.add(
                    egui::Slider::new(&mut settings.turb_frequency, 0.0..=1.0).text("Frequency"),
                );
                ui.add(
                    egui::Slider::new(&mut settings.turb_amplitude, 0.0..=1.0).text("Amplitude"),
                );
                ui.add(egui::Slider::new(&mut settings.turb_octaves, 0..=5).text("Octaves"));
                ui.add(
                    egui::Slider::new(&mut settings.turb_lacunarity, 0.0..=5.0).text("Lacunarity"),
                );
                ui.add(egui::Slider::new(&mut settings.turb_gain, 0.0..=1.0).text("Gain"));
                ui.add(
                    egui::Slider::new(&mut settings.turb_friction, 0.0..=0.1).text("Friction"),
                );

                ui.separator();
                ui.heading("Bloom");
                ui.add(
                    egui::Slider::new(&mut settings.bloom_strength, 0.0..=3.0).text("Strength"),
                );
                ui.add(egui::Slider::new(&mut settings.bloom_radius, 0.0..=1.0).text("Radius"));
                ui.add(
                    egui::Slider::new(&mut settings.bloom_threshold, 0.0..=2.0).text("Threshold"),
                );

                ui.separator();
                if ui.button("Reset to defaults").clicked() {
                    *settings = EffectSettings {
                        color_offset: settings.color_offset,
                        ..Default::default()
                    };
                }
            });
    }
}

impl FrameOverlay for Gui {
    fn draw(&mut self, frame: OverlayFrame<'_>) {
        if !self.visible {
            return;
        }

        let OverlayFrame {
            device,
            queue,
            encoder,
            view,
            window,
            surface_size,
            settings,
            stats,
        } = frame;

        let before = *settings;
        let raw_input = self.state.take_egui_input(window);
        let full_output = self.context.run(raw_input, |ctx| {
            Self::ui(ctx, settings, &stats);
        });
        if *settings != before {
            log::debug!("Effect settings changed: {settings:?}");
        }

        self.state
            .handle_platform_output(window, full_output.platform_output);

        let clipped_primitives = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: surface_size,
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.renderer.update_buffers(
            device,
            queue,
            encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}
