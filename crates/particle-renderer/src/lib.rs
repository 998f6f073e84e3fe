//! # Particle Renderer
//!
//! Scene composition for the particle field: camera and orbit controls,
//! the lit background shell, particle sprites, link ribbons and bloom.

pub mod background;
pub mod bloom;
pub mod camera;
pub mod composer;
pub mod controls;
pub mod link_renderer;
pub mod renderer;

pub use background::*;
pub use bloom::*;
pub use camera::*;
pub use composer::*;
pub use controls::*;
pub use link_renderer::*;
pub use renderer::*;

use particle_kernel::COMMON_WGSL;

const SCENE_WGSL: &str = include_str!("shaders/scene.wgsl");

/// `src · alpha + dst`, leaving the destination alpha untouched
pub const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Prefix a scene shader with the shared helpers and the camera block
fn scene_shader(body: &str) -> String {
    format!("{COMMON_WGSL}\n{SCENE_WGSL}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) {
        if let Err(error) = naga::front::wgsl::parse_str(source) {
            panic!("{}", error.emit_to_string(source));
        }
    }

    #[test]
    fn scene_shaders_wgsl_parse() {
        parse(&scene_shader(include_str!("shaders/background.wgsl")));
        parse(&scene_shader(include_str!("shaders/particle.wgsl")));
        parse(&scene_shader(include_str!("shaders/link.wgsl")));
    }

    #[test]
    fn bloom_shaders_wgsl_parse() {
        let fullscreen = include_str!("shaders/fullscreen.wgsl");
        parse(&format!("{fullscreen}\n{}", include_str!("shaders/bloom.wgsl")));
        parse(&format!("{fullscreen}\n{}", include_str!("shaders/composite.wgsl")));
    }
}
