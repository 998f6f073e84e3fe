mod gui;

use gui::Gui;
use particle_effect::{EffectState, ParticleEffect};
use particle_simulation::EffectSettings;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

struct App {
    effect: ParticleEffect,
    gui: Option<Gui>,
    left_mouse_pressed: bool,
    last_cursor_pos: Option<(f64, f64)>,
}

impl App {
    fn new() -> Self {
        Self {
            effect: ParticleEffect::new(EffectSettings::default()),
            gui: None,
            left_mouse_pressed: false,
            last_cursor_pos: None,
        }
    }

    /// The debug panel needs the device, so it is built once the effect runs
    fn ensure_gui(&mut self) {
        if self.gui.is_some() {
            return;
        }
        if let (Some(device), Some(format), Some(window)) = (
            self.effect.device(),
            self.effect.surface_format(),
            self.effect.window(),
        ) {
            self.gui = Some(Gui::new(device, format, window));
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.gui = None;
        self.effect.cleanup();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.effect.state() != EffectState::Uninitialized {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("Particle Field")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match self.effect.init(window.clone()) {
            Ok(()) => {
                self.ensure_gui();
                window.request_redraw();
            }
            // The window stays open showing the fallback title
            Err(e) => log::error!("{e}"),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Handle GUI events
        if let (Some(gui), Some(window)) = (&mut self.gui, self.effect.window()) {
            if gui.handle_event(window, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => self.shutdown(event_loop),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::F1),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(gui) = &mut self.gui {
                    gui.visible = !gui.visible;
                }
            }

            WindowEvent::Resized(physical_size) => {
                self.effect
                    .on_window_resize(physical_size.width, physical_size.height);
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    let over_gui = self.gui.as_ref().is_some_and(Gui::wants_pointer);
                    self.left_mouse_pressed = state == ElementState::Pressed && !over_gui;
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed {
                    if let Some(last_pos) = self.last_cursor_pos {
                        let delta_x = (position.x - last_pos.0) as f32;
                        let delta_y = (position.y - last_pos.1) as f32;
                        self.effect.on_pointer_drag(delta_x, delta_y);
                    }
                }
                self.last_cursor_pos = Some((position.x, position.y));
                self.effect
                    .on_pointer_move(position.x as f32, position.y as f32);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                // Scrolling up moves the camera in
                let notches = match delta {
                    MouseScrollDelta::LineDelta(_x, y) => -y,
                    MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
                };
                self.effect.on_wheel(notches);
            }

            WindowEvent::RedrawRequested => {
                let result = match &mut self.gui {
                    Some(gui) => self.effect.animate_with(gui),
                    None => self.effect.animate(),
                };
                if let Err(e) = result {
                    log::error!("Frame failed: {e}");
                    self.shutdown(event_loop);
                    return;
                }

                if let Some(window) = self.effect.window() {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}

fn main() {
    // Initialize logger (RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting particle field...");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
    }
}
