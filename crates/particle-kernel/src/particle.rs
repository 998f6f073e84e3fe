//! GPU record types for the particle store and link buffer
//!
//! All records are one `vec4<f32>` wide so they line up with WGSL storage
//! arrays without padding rules getting in the way.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::constants::{SENTINEL_LIFE, SENTINEL_POSITION, SPAWN_LIFE};

/// Position and remaining life of one particle slot: `(x, y, z, life)`
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleState {
    pub position_life: [f32; 4],
}

impl ParticleState {
    /// Inert slot parked far outside the frustum
    pub const INERT: Self = Self {
        position_life: [
            SENTINEL_POSITION,
            SENTINEL_POSITION,
            SENTINEL_POSITION,
            SENTINEL_LIFE,
        ],
    };

    pub fn new(position: Vec3, life: f32) -> Self {
        Self {
            position_life: [position.x, position.y, position.z, life],
        }
    }

    /// A particle that was just emitted at `position`
    pub fn spawned(position: Vec3) -> Self {
        Self::new(position, SPAWN_LIFE)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.position_life[0],
            self.position_life[1],
            self.position_life[2],
        )
    }

    pub fn life(&self) -> f32 {
        self.position_life[3]
    }

    /// Slots with `life <= 0` are skipped by the update pass and the link search
    pub fn is_alive(&self) -> bool {
        self.life() > 0.0
    }
}

impl Default for ParticleState {
    fn default() -> Self {
        Self::INERT
    }
}

/// Velocity of one particle slot, 4th component unused
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVelocity {
    pub velocity: [f32; 4],
}

impl ParticleVelocity {
    pub fn new(velocity: Vec3) -> Self {
        Self {
            velocity: [velocity.x, velocity.y, velocity.z, 0.0],
        }
    }

    pub fn get(&self) -> Vec3 {
        Vec3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }
}

/// One corner of a link ribbon quad (w unused, kept at 1 for the vertex stage)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LinkVertex {
    pub position: [f32; 4],
}

impl LinkVertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position: [position.x, position.y, position.z, 1.0],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// Per-vertex link colour: rgb plus the quad's opacity in w
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LinkColor {
    pub color: [f32; 4],
}

impl LinkColor {
    pub fn new(rgb: Vec3, alpha: f32) -> Self {
        Self {
            color: Vec4::new(rgb.x, rgb.y, rgb.z, alpha).to_array(),
        }
    }

    pub fn rgb(&self) -> Vec3 {
        Vec3::new(self.color[0], self.color[1], self.color[2])
    }

    pub fn alpha(&self) -> f32 {
        self.color[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_match_vec4_stride() {
        assert_eq!(std::mem::size_of::<ParticleState>(), 16);
        assert_eq!(std::mem::size_of::<ParticleVelocity>(), 16);
        assert_eq!(std::mem::size_of::<LinkVertex>(), 16);
        assert_eq!(std::mem::size_of::<LinkColor>(), 16);
    }

    #[test]
    fn test_inert_sentinel() {
        let p = ParticleState::default();
        assert!(!p.is_alive());
        assert_eq!(p.position(), Vec3::splat(SENTINEL_POSITION));
        assert_eq!(p.life(), SENTINEL_LIFE);
    }

    #[test]
    fn test_spawned_is_alive() {
        let p = ParticleState::spawned(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.is_alive());
        assert_eq!(p.life(), 1.0);
        assert_eq!(p.position(), Vec3::new(1.0, 2.0, 3.0));
    }
}
