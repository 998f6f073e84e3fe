//! Orbit controls: damped spherical rotation around the camera target

use crate::camera::Camera;
use glam::Vec3;
use std::f32::consts::{PI, TAU};

/// Keeps the polar angle off the poles so `look_at` never degenerates
const POLAR_EPSILON: f32 = 1e-6;

/// Zoom factor applied per wheel notch
const ZOOM_STEP: f32 = 0.95;

/// Spherical coordinates around the target, Y up
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    /// Polar angle from +Y
    pub phi: f32,
    /// Azimuth around +Y, measured from +Z toward +X
    pub theta: f32,
}

impl Spherical {
    pub fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self::default();
        }
        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    pub fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

/// Orbit camera input with inertia.
///
/// Drag and wheel input accumulate into a pending delta that is bled into the
/// camera a fraction at a time by [`OrbitControls::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitControls {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    /// 2.0 is one revolution every 30 seconds
    pub auto_rotate_speed: f32,
    pub rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pending: Spherical,
    scale: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.05,
            auto_rotate: true,
            auto_rotate_speed: 2.0,
            rotate_speed: 1.0,
            min_distance: 0.5,
            max_distance: 75.0,
            pending: Spherical::default(),
            scale: 1.0,
        }
    }
}

impl OrbitControls {
    /// Pointer drag in pixels, relative to a viewport `viewport_height` pixels tall
    pub fn drag(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.rotate_left(TAU * dx / height * self.rotate_speed);
        self.rotate_up(TAU * dy / height * self.rotate_speed);
    }

    /// Wheel input; positive values move the camera away from the target
    pub fn zoom(&mut self, notches: f32) {
        if notches > 0.0 {
            self.scale /= ZOOM_STEP;
        } else if notches < 0.0 {
            self.scale *= ZOOM_STEP;
        }
    }

    fn rotate_left(&mut self, angle: f32) {
        self.pending.theta -= angle;
    }

    fn rotate_up(&mut self, angle: f32) {
        self.pending.phi -= angle;
    }

    /// Apply pending input and auto-rotation to the camera. Returns whether it moved.
    pub fn update(&mut self, camera: &mut Camera, delta: f32) -> bool {
        if self.auto_rotate {
            self.rotate_left(TAU / 60.0 * self.auto_rotate_speed * delta);
        }

        let offset = camera.position - camera.target;
        let mut spherical = Spherical::from_offset(offset);

        if self.enable_damping {
            spherical.theta += self.pending.theta * self.damping_factor;
            spherical.phi += self.pending.phi * self.damping_factor;
        } else {
            spherical.theta += self.pending.theta;
            spherical.phi += self.pending.phi;
        }

        spherical.phi = spherical.phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        spherical.radius =
            (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        let position = camera.target + spherical.to_offset();
        let moved = position.distance_squared(camera.position) > 1e-12;
        camera.position = position;

        if self.enable_damping {
            self.pending.theta *= 1.0 - self.damping_factor;
            self.pending.phi *= 1.0 - self.damping_factor;
        } else {
            self.pending = Spherical::default();
        }
        self.scale = 1.0;

        moved
    }
}
