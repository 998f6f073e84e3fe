//! Perspective camera and pointer picking against the spawn plane

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Camera uniform for GPU, shared by every scene pass (`scene.wgsl`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub time: f32,
    pub right: [f32; 3],
    pub particle_size: f32,
    pub up: [f32; 3],
    pub color_offset: f32,
    pub light_position: [f32; 3],
    pub light_intensity: f32,
    pub color_variance: f32,
    pub _padding: [f32; 3],
}

/// Per-frame values the scene shaders need besides the camera itself
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameUniforms {
    pub time: f32,
    pub particle_size: f32,
    pub color_offset: f32,
    pub color_variance: f32,
    pub light_position: Vec3,
    pub light_intensity: f32,
}

/// Half-line used for pointer picking
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Intersection with the plane through the origin with the given normal.
    ///
    /// `None` when the ray runs parallel to the plane or the plane lies behind it.
    pub fn intersect_origin_plane(&self, normal: Vec3) -> Option<Vec3> {
        let denom = normal.dot(self.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = -normal.dot(self.origin) / denom;
        if t < 0.0 {
            return None;
        }
        Some(self.origin + self.direction * t)
    }
}

/// Perspective camera looking at a target point
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: 60.0_f32.to_radians(),
            znear: 0.1,
            zfar: 200.0,
        }
    }

    /// Unit view direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or(Vec3::X)
    }

    /// Camera-space up, orthogonal to `forward` and `right`
    pub fn true_up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update the aspect ratio. Returns whether anything changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let aspect = width as f32 / height as f32;
        if aspect == self.aspect {
            return false;
        }
        self.aspect = aspect;
        true
    }

    /// Ray from the camera through a point in normalised device coordinates
    pub fn ray_through_ndc(&self, ndc: Vec2) -> Ray {
        let inverse = self.build_view_projection_matrix().inverse();
        let near = inverse.project_point3(ndc.extend(0.0));
        let far = inverse.project_point3(ndc.extend(1.0));
        Ray {
            origin: self.position,
            direction: (far - near).normalize_or(self.forward()),
        }
    }

    /// Project the pointer onto the camera-facing plane through the origin.
    ///
    /// Falls back to `previous` when the pointer ray misses the plane.
    pub fn project_pointer(&self, ndc: Vec2, previous: Vec3) -> Vec3 {
        self.ray_through_ndc(ndc)
            .intersect_origin_plane(self.forward())
            .unwrap_or(previous)
    }

    pub fn to_uniform(&self, frame: &FrameUniforms) -> CameraUniform {
        CameraUniform {
            view_proj: self.build_view_projection_matrix().to_cols_array_2d(),
            position: self.position.to_array(),
            time: frame.time,
            right: self.right().to_array(),
            particle_size: frame.particle_size,
            up: self.true_up().to_array(),
            color_offset: frame.color_offset,
            light_position: frame.light_position.to_array(),
            light_intensity: frame.light_intensity,
            color_variance: frame.color_variance,
            _padding: [0.0; 3],
        }
    }
}
