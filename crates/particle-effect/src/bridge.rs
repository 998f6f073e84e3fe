//! Host bridge: owns the window surface and GPU state, and turns window
//! events into simulation input one frame at a time.

use crate::driver::{bloom_settings, pointer_ndc, FrameClock, FrameDriver, FrameStats};
use crate::EffectError;
use glam::Vec2;
use particle_kernel::PARTICLE_COUNT;
use particle_renderer::{
    Camera, FrameUniforms, LinkBuffers, OrbitControls, SceneBuffers, SceneComposer,
};
use particle_simulation::{EffectSettings, ParticleSimulation, REQUIRED_STORAGE_BUFFERS};
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;

/// Shown in the window title when the GPU cannot run the effect
pub const FALLBACK_MESSAGE: &str =
    "Particle field unavailable: this GPU does not support compute shaders";

/// Lifecycle of a [`ParticleEffect`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    Uninitialized,
    Running,
    Unsupported,
    Released,
}

/// Something drawn on top of the composed frame, such as the debug panel
pub trait FrameOverlay {
    fn draw(&mut self, frame: OverlayFrame<'_>);
}

/// Everything an overlay needs to record into the current frame
pub struct OverlayFrame<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub view: &'a wgpu::TextureView,
    pub window: &'a Window,
    pub surface_size: [u32; 2],
    pub settings: &'a mut EffectSettings,
    pub stats: FrameStats,
}

/// Reject adapters that cannot run the compute passes or read storage
/// buffers from the vertex stage
pub fn check_capabilities(
    downlevel: &wgpu::DownlevelCapabilities,
    limits: &wgpu::Limits,
) -> Result<(), EffectError> {
    if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        return Err(EffectError::Unsupported("no compute shader support".into()));
    }
    if !downlevel.flags.contains(wgpu::DownlevelFlags::VERTEX_STORAGE) {
        return Err(EffectError::Unsupported(
            "no storage buffers in vertex shaders".into(),
        ));
    }
    if limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
        return Err(EffectError::Unsupported(format!(
            "{} storage buffers per stage, need {REQUIRED_STORAGE_BUFFERS}",
            limits.max_storage_buffers_per_shader_stage
        )));
    }
    Ok(())
}

/// Vsync'd surface setup. Spawning and trail smoothing are per frame, so the
/// loop has to run at the display's refresh rate.
fn surface_config(
    format: wgpu::TextureFormat,
    alpha_mode: wgpu::CompositeAlphaMode,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}

struct GpuState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    simulation: ParticleSimulation,
    composer: SceneComposer,
}

impl GpuState {
    async fn new(window: Arc<Window>) -> Result<Self, EffectError> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| EffectError::SurfaceCreation(e.to_string()))?;

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EffectError::Unsupported(e.to_string()))?;

        log::info!("Using GPU: {}", adapter.get_info().name);

        check_capabilities(&adapter.get_downlevel_capabilities(), &adapter.limits())?;

        // Create device and queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Particle Field Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| EffectError::DeviceCreation(e.to_string()))?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| EffectError::SurfaceCreation("no supported surface format".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = surface_config(surface_format, alpha_mode, size.width, size.height);
        surface.configure(&device, &config);

        let simulation = ParticleSimulation::new(&device, &queue, PARTICLE_COUNT);
        log::info!("Simulation initialized");

        let composer = SceneComposer::new(&device, &config);
        log::info!("Renderer initialized");

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            simulation,
            composer,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.composer.resize(&self.device, width, height);
        }
    }

    /// Next surface texture, or `None` when this frame has to be skipped
    fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>, EffectError> {
        match self.surface.get_current_texture() {
            Ok(output) => Ok(Some(output)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(EffectError::OutOfMemory),
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                Ok(None)
            }
        }
    }
}

/// The particle field effect, driven one frame at a time by the host window
pub struct ParticleEffect {
    settings: EffectSettings,
    lifecycle: Lifecycle,
    driver: FrameDriver,
    clock: FrameClock,
    camera: Camera,
    controls: OrbitControls,
    window_size: (u32, u32),
    pointer_ndc: Vec2,
    pending_resize: Option<(u32, u32)>,
    pending_pointer: Option<(f32, f32)>,
}

enum Lifecycle {
    Uninitialized,
    Running(Box<GpuState>),
    Unsupported,
    Released,
}

impl ParticleEffect {
    pub fn new(settings: EffectSettings) -> Self {
        Self {
            settings,
            lifecycle: Lifecycle::Uninitialized,
            driver: FrameDriver::new(PARTICLE_COUNT),
            clock: FrameClock::new(Instant::now()),
            camera: Camera::new(1, 1),
            controls: OrbitControls::default(),
            window_size: (1, 1),
            pointer_ndc: Vec2::ZERO,
            pending_resize: None,
            pending_pointer: None,
        }
    }

    pub fn state(&self) -> EffectState {
        match self.lifecycle {
            Lifecycle::Uninitialized => EffectState::Uninitialized,
            Lifecycle::Running(_) => EffectState::Running,
            Lifecycle::Unsupported => EffectState::Unsupported,
            Lifecycle::Released => EffectState::Released,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    /// Create the GPU state for `window`.
    ///
    /// Without compute support the effect switches to [`EffectState::Unsupported`]
    /// and puts [`FALLBACK_MESSAGE`] in the window title.
    pub fn init(&mut self, window: Arc<Window>) -> Result<(), EffectError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Running(_) => return Ok(()),
            Lifecycle::Unsupported => {
                return Err(EffectError::Unsupported(FALLBACK_MESSAGE.into()));
            }
            Lifecycle::Released => return Err(EffectError::Released),
        }

        match pollster::block_on(GpuState::new(window.clone())) {
            Ok(gpu) => {
                let size = window.inner_size();
                self.window_size = (size.width.max(1), size.height.max(1));
                self.camera.resize(self.window_size.0, self.window_size.1);
                self.clock = FrameClock::new(Instant::now());
                self.lifecycle = Lifecycle::Running(Box::new(gpu));
                log::info!("Particle effect running");
                Ok(())
            }
            Err(EffectError::Unsupported(reason)) => {
                log::error!("{FALLBACK_MESSAGE} ({reason})");
                window.set_title(FALLBACK_MESSAGE);
                self.lifecycle = Lifecycle::Unsupported;
                Err(EffectError::Unsupported(reason))
            }
            Err(e) => {
                log::error!("Failed to initialize particle effect: {e}");
                Err(e)
            }
        }
    }

    /// Buffered until the next frame; repeated sizes are no-ops
    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        if matches!(self.lifecycle, Lifecycle::Released) {
            return;
        }
        self.pending_resize = Some((width, height));
    }

    /// Pointer position in window pixels. Only the latest position per frame is used.
    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        if matches!(self.lifecycle, Lifecycle::Released) {
            return;
        }
        self.pending_pointer = Some((x, y));
    }

    /// Rotate the orbit camera by a pointer drag in pixels
    pub fn on_pointer_drag(&mut self, dx: f32, dy: f32) {
        if matches!(self.lifecycle, Lifecycle::Released) {
            return;
        }
        self.controls.drag(dx, dy, self.window_size.1 as f32);
    }

    /// Zoom the orbit camera; positive moves away from the target
    pub fn on_wheel(&mut self, notches: f32) {
        if matches!(self.lifecycle, Lifecycle::Released) {
            return;
        }
        self.controls.zoom(notches);
    }

    /// Apply buffered input. Returns the new size when the viewport changed.
    fn consume_input(&mut self) -> Option<(u32, u32)> {
        let mut resized = None;
        if let Some((width, height)) = self.pending_resize.take() {
            if width > 0 && height > 0 && (width, height) != self.window_size {
                self.window_size = (width, height);
                self.camera.resize(width, height);
                resized = Some((width, height));
            }
        }
        if let Some((x, y)) = self.pending_pointer.take() {
            self.pointer_ndc = pointer_ndc(x, y, self.window_size.0, self.window_size.1);
        }
        resized
    }

    /// Advance and present exactly one frame. No-op unless running.
    pub fn animate(&mut self) -> Result<(), EffectError> {
        self.frame(None)
    }

    /// Like [`Self::animate`], drawing `overlay` over the composed frame
    pub fn animate_with(&mut self, overlay: &mut dyn FrameOverlay) -> Result<(), EffectError> {
        self.frame(Some(overlay))
    }

    fn frame(&mut self, overlay: Option<&mut dyn FrameOverlay>) -> Result<(), EffectError> {
        if !self.is_running() {
            return Ok(());
        }
        let resized = self.consume_input();

        let Lifecycle::Running(gpu) = &mut self.lifecycle else {
            return Ok(());
        };
        if let Some((width, height)) = resized {
            gpu.resize(width, height);
        }
        let Some(output) = gpu.acquire()? else {
            return Ok(());
        };

        let (frame_delta, elapsed) = self.clock.tick();

        // 1-2: compute passes with the cursor as it stands
        let params = self.driver.compute_params(&self.settings, frame_delta);
        gpu.simulation.update_params(&params);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        gpu.simulation.encode_update(&mut encoder);
        gpu.simulation.encode_spawn(&mut encoder);

        // 3-7: cursor, pointer, palette, light
        let pointer_world = self.driver.project_pointer(&self.camera, self.pointer_ndc);
        let frame: FrameUniforms =
            self.driver.tick(frame_delta, elapsed, &mut self.settings, pointer_world);

        // 8: controls
        self.controls.update(&mut self.camera, frame_delta);

        // 9: render
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let simulation = &gpu.simulation;
        gpu.composer.render(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &view,
            &self.camera,
            &frame,
            &bloom_settings(&self.settings),
            SceneBuffers {
                positions: simulation.position_buffer(),
                velocities: simulation.velocity_buffer(),
                particle_count: simulation.particle_count(),
                links: LinkBuffers {
                    vertices: simulation.link_vertex_buffer(),
                    colors: simulation.link_color_buffer(),
                    indices: simulation.link_index_buffer(),
                    index_count: simulation.link_index_count(),
                },
            },
        );

        if let Some(overlay) = overlay {
            overlay.draw(OverlayFrame {
                device: &gpu.device,
                queue: &gpu.queue,
                encoder: &mut encoder,
                view: &view,
                window: &gpu.window,
                surface_size: [gpu.config.width, gpu.config.height],
                settings: &mut self.settings,
                stats: FrameStats {
                    fps: self.clock.fps(),
                    frame_time: self.clock.average_frame_time(),
                    spawn_index: self.driver.cursor().spawn_index,
                    particle_count: simulation.particle_count(),
                },
            });
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        gpu.window.pre_present_notify();
        output.present();
        Ok(())
    }

    /// Release every GPU resource. Later calls and input events are ignored.
    pub fn cleanup(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Released) {
            return;
        }
        if self.is_running() {
            log::info!("Releasing particle effect");
        }
        self.lifecycle = Lifecycle::Released;
        self.pending_resize = None;
        self.pending_pointer = None;
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.lifecycle {
            Lifecycle::Running(gpu) => Some(&gpu.window),
            _ => None,
        }
    }

    pub fn device(&self) -> Option<&wgpu::Device> {
        match &self.lifecycle {
            Lifecycle::Running(gpu) => Some(&gpu.device),
            _ => None,
        }
    }

    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        match &self.lifecycle {
            Lifecycle::Running(gpu) => Some(gpu.config.format),
            _ => None,
        }
    }
}

impl Drop for ParticleEffect {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_effect_is_idle() {
        let mut effect = ParticleEffect::new(EffectSettings::default());
        assert_eq!(effect.state(), EffectState::Uninitialized);
        assert!(!effect.is_running());
        assert_eq!(effect.animate(), Ok(()));
        assert!(effect.device().is_none());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut effect = ParticleEffect::new(EffectSettings::default());
        effect.cleanup();
        assert_eq!(effect.state(), EffectState::Released);
        effect.cleanup();
        assert_eq!(effect.state(), EffectState::Released);
        assert_eq!(effect.animate(), Ok(()));
    }

    #[test]
    fn test_input_ignored_after_cleanup() {
        let mut effect = ParticleEffect::new(EffectSettings::default());
        effect.cleanup();
        effect.on_window_resize(640, 480);
        effect.on_pointer_move(10.0, 10.0);
        effect.on_wheel(1.0);
        assert_eq!(effect.pending_resize, None);
        assert_eq!(effect.pending_pointer, None);
        assert_eq!(effect.consume_input(), None);
    }

    #[test]
    fn test_resize_is_buffered_last_value_wins() {
        let mut effect = ParticleEffect::new(EffectSettings::default());
        effect.on_window_resize(640, 480);
        effect.on_window_resize(1280, 720);
        assert_eq!(effect.consume_input(), Some((1280, 720)));
        assert!((effect.camera.aspect - 1280.0 / 720.0).abs() < 1e-6);

        // Same size again changes nothing
        let camera = effect.camera.clone();
        effect.on_window_resize(1280, 720);
        assert_eq!(effect.consume_input(), None);
        assert_eq!(effect.camera, camera);

        effect.on_window_resize(0, 720);
        assert_eq!(effect.consume_input(), None);
        assert_eq!(effect.window_size, (1280, 720));
    }

    #[test]
    fn test_pointer_converted_with_current_size() {
        let mut effect = ParticleEffect::new(EffectSettings::default());
        effect.on_window_resize(800, 600);
        effect.on_pointer_move(100.0, 100.0);
        effect.on_pointer_move(600.0, 150.0);
        effect.consume_input();
        assert_eq!(effect.pointer_ndc, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_surface_config_is_vsynced() {
        let config = surface_config(
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::CompositeAlphaMode::Opaque,
            0,
            720,
        );
        assert_eq!(config.present_mode, wgpu::PresentMode::AutoVsync);
        assert_eq!((config.width, config.height), (1, 720));
        assert_eq!(config.format, wgpu::TextureFormat::Bgra8UnormSrgb);
    }

    #[test]
    fn test_capability_check() {
        let full = wgpu::DownlevelCapabilities::default();
        assert_eq!(check_capabilities(&full, &wgpu::Limits::default()), Ok(()));

        let no_compute = wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::all() - wgpu::DownlevelFlags::COMPUTE_SHADERS,
            ..Default::default()
        };
        assert!(matches!(
            check_capabilities(&no_compute, &wgpu::Limits::default()),
            Err(EffectError::Unsupported(_))
        ));

        let limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 4,
            ..wgpu::Limits::default()
        };
        assert!(matches!(
            check_capabilities(&full, &limits),
            Err(EffectError::Unsupported(_))
        ));
    }
}
