//! Effect settings for runtime tuning and their GPU uniform packing

use bytemuck::{Pod, Zeroable};
use particle_kernel::{spawn_batch, step_dt, Turbulence, UpdateParams, SPAWN_RADIUS, SPAWN_SPEED};

use crate::spawn::SpawnCursor;

/// Smallest lifetime the update pass will divide by
const MIN_LIFETIME: f32 = 1e-4;

/// Tunable parameters of the effect, edited from the debug panel between frames
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectSettings {
    pub time_scale: f32,
    pub particle_lifetime: f32,
    pub particle_size: f32,
    pub links_width: f32,
    pub color_offset: f32,
    pub color_variance: f32,
    pub color_rotation_speed: f32,
    pub nb_to_spawn: u32,
    pub spawn_radius: f32,
    pub spawn_speed: f32,
    pub turb_frequency: f32,
    pub turb_amplitude: f32,
    pub turb_octaves: u32,
    pub turb_lacunarity: f32,
    pub turb_gain: f32,
    pub turb_friction: f32,
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            particle_lifetime: 0.5,
            particle_size: 1.0,
            links_width: 0.005,
            color_offset: 0.0,
            color_variance: 2.0,
            color_rotation_speed: 1.0,
            nb_to_spawn: 5,
            spawn_radius: SPAWN_RADIUS,
            spawn_speed: SPAWN_SPEED,
            turb_frequency: 0.5,
            turb_amplitude: 0.5,
            turb_octaves: 2,
            turb_lacunarity: 2.0,
            turb_gain: 0.5,
            turb_friction: 0.01,
            bloom_strength: 0.75,
            bloom_radius: 0.1,
            bloom_threshold: 0.5,
        }
    }
}

impl EffectSettings {
    pub fn turbulence(&self) -> Turbulence {
        Turbulence {
            frequency: self.turb_frequency,
            amplitude: self.turb_amplitude,
            octaves: self.turb_octaves,
            lacunarity: self.turb_lacunarity,
            gain: self.turb_gain,
            friction: self.turb_friction,
        }
    }

    /// Update pass inputs for a frame of `frame_delta` seconds
    pub fn update_params(&self, frame_delta: f32) -> UpdateParams {
        UpdateParams {
            dt: step_dt(frame_delta, self.time_scale),
            lifetime: self.particle_lifetime.max(MIN_LIFETIME),
            links_width: self.links_width,
            color_offset: self.color_offset,
            color_variance: self.color_variance,
            turbulence: self.turbulence(),
        }
    }

    /// Advance the palette rotation by one frame
    pub fn rotate_colors(&mut self, frame_delta: f32) {
        self.color_offset += frame_delta * self.color_rotation_speed * self.time_scale;
    }

    /// Pack a per-frame snapshot into the compute uniform
    pub fn to_params(&self, frame_delta: f32, cursor: &SpawnCursor) -> EffectParams {
        let update = self.update_params(frame_delta);
        let turbulence = update.turbulence;

        EffectParams {
            timing: [update.dt, update.lifetime, update.links_width, 0.0],
            color: [self.color_offset, self.color_variance, 0.0, 0.0],
            turbulence: [
                turbulence.frequency,
                turbulence.amplitude,
                turbulence.lacunarity,
                turbulence.gain,
            ],
            motion: [
                turbulence.friction,
                self.spawn_radius,
                self.spawn_speed,
                0.0,
            ],
            spawn_from: cursor.previous_position.extend(0.0).to_array(),
            spawn_to: cursor.position.extend(0.0).to_array(),
            counts: [
                cursor.capacity(),
                cursor.spawn_index,
                spawn_batch(self.nb_to_spawn, cursor.capacity()),
                turbulence.octaves,
            ],
        }
    }
}

/// Per-frame uniform shared by the reset, update and spawn shaders (`params.wgsl`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EffectParams {
    // x: dt, y: lifetime, z: links_width, w: padding
    pub timing: [f32; 4],

    // x: color_offset, y: color_variance, zw: padding
    pub color: [f32; 4],

    // x: frequency, y: amplitude, z: lacunarity, w: gain
    pub turbulence: [f32; 4],

    // x: friction, y: spawn_radius, z: spawn_speed, w: padding
    pub motion: [f32; 4],

    // xyz: previous spawn cursor position
    pub spawn_from: [f32; 4],

    // xyz: current spawn cursor position
    pub spawn_to: [f32; 4],

    // x: particle_count, y: spawn_index, z: nb_to_spawn (clamped to capacity), w: octaves
    pub counts: [u32; 4],
}

impl EffectParams {
    pub fn particle_count(&self) -> u32 {
        self.counts[0]
    }

    pub fn spawn_batch(&self) -> u32 {
        self.counts[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<EffectParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<EffectParams>(), 7 * 16);
    }

    #[test]
    fn test_defaults() {
        let s = EffectSettings::default();
        assert_eq!(s.nb_to_spawn, 5);
        assert_eq!(s.particle_lifetime, 0.5);
        assert_eq!(s.links_width, 0.005);
        assert_eq!(s.turb_octaves, 2);
        assert_eq!(s.spawn_radius, 0.01);
        assert_eq!(s.spawn_speed, 5.0);
        assert_eq!(s.bloom_strength, 0.75);
    }

    #[test]
    fn test_to_params_packs_frame() {
        let settings = EffectSettings {
            time_scale: 2.0,
            ..Default::default()
        };
        let mut cursor = SpawnCursor::new(64);
        cursor.advance(10);
        cursor.follow(Vec3::new(1.0, 2.0, 3.0));

        let params = settings.to_params(0.05, &cursor);
        assert!((params.timing[0] - 0.01).abs() < 1e-7);
        assert_eq!(params.timing[3], 0.0);
        assert_eq!(&params.color[2..], &[0.0, 0.0]);
        assert_eq!(params.counts, [64, 10, 5, 2]);
        assert_eq!(params.spawn_from, [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&params.spawn_to[..3], &cursor.position.to_array());
        assert_eq!(params.motion[1], 0.01);
    }

    #[test]
    fn test_to_params_matches_update_params() {
        let settings = EffectSettings::default();
        let cursor = SpawnCursor::new(8);
        let params = settings.to_params(0.016, &cursor);
        let update = settings.update_params(0.016);
        assert_eq!(params.timing[0], update.dt);
        assert_eq!(params.timing[1], update.lifetime);
        assert_eq!(params.counts[3], update.turbulence.octaves);
    }

    #[test]
    fn test_zero_lifetime_is_clamped() {
        let settings = EffectSettings {
            particle_lifetime: 0.0,
            ..Default::default()
        };
        assert!(settings.update_params(0.016).lifetime > 0.0);
    }

    #[test]
    fn test_spawn_batch_clamped() {
        let settings = EffectSettings {
            nb_to_spawn: 100,
            ..Default::default()
        };
        let params = settings.to_params(0.016, &SpawnCursor::new(8));
        assert_eq!(params.spawn_batch(), 8);
    }

    #[test]
    fn test_rotate_colors() {
        let mut settings = EffectSettings {
            color_rotation_speed: 2.0,
            time_scale: 0.5,
            ..Default::default()
        };
        settings.rotate_colors(0.1);
        assert!((settings.color_offset - 0.1).abs() < 1e-7);
    }
}
