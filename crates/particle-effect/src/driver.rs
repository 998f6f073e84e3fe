//! Per-frame orchestration state: clock, spawn cursor, pointer target

use glam::{Vec2, Vec3};
use particle_kernel::{MAX_FRAME_DELTA, PARTICLE_QUAD_SIZE};
use particle_renderer::{light_position, BloomSettings, Camera, FrameUniforms, LIGHT_INTENSITY};
use particle_simulation::{EffectParams, EffectSettings, SpawnCursor};
use std::collections::VecDeque;
use std::time::Instant;

/// Frames averaged for the FPS readout
const FRAME_HISTORY: usize = 100;

/// Wall clock for the effect. Deltas are clamped so a stalled window
/// does not blow up the integration.
#[derive(Clone, Debug)]
pub struct FrameClock {
    start: Instant,
    last: Option<Instant>,
    frame_times: VecDeque<f32>,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last: None,
            frame_times: VecDeque::with_capacity(FRAME_HISTORY),
        }
    }

    pub fn tick(&mut self) -> (f32, f32) {
        self.tick_at(Instant::now())
    }

    /// Returns `(frame_delta, elapsed)` in seconds. The first tick has a zero delta.
    pub fn tick_at(&mut self, now: Instant) -> (f32, f32) {
        let raw = self
            .last
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last = Some(now);

        if self.frame_times.len() == FRAME_HISTORY {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(raw);

        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        (raw.min(MAX_FRAME_DELTA), elapsed)
    }

    /// Average frame time in seconds over the recent history (unclamped)
    pub fn average_frame_time(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32
    }

    pub fn fps(&self) -> f32 {
        let average = self.average_frame_time();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }
}

/// Snapshot handed to the debug panel each frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub frame_time: f32,
    pub spawn_index: u32,
    pub particle_count: u32,
}

/// CPU side of a frame: where particles spawn and what the scene shaders see
#[derive(Clone, Debug)]
pub struct FrameDriver {
    cursor: SpawnCursor,
    pointer_world: Vec3,
}

impl FrameDriver {
    pub fn new(capacity: u32) -> Self {
        Self {
            cursor: SpawnCursor::new(capacity),
            pointer_world: Vec3::ZERO,
        }
    }

    pub fn cursor(&self) -> &SpawnCursor {
        &self.cursor
    }

    pub fn pointer_world(&self) -> Vec3 {
        self.pointer_world
    }

    /// Compute uniform for this frame's update and spawn passes.
    /// Uses the cursor as it stands at the start of the tick.
    pub fn compute_params(&self, settings: &EffectSettings, frame_delta: f32) -> EffectParams {
        settings.to_params(frame_delta, &self.cursor)
    }

    /// Project the pointer onto the camera-facing plane through the origin,
    /// keeping the previous point when the ray misses it
    pub fn project_pointer(&mut self, camera: &Camera, pointer_ndc: Vec2) -> Vec3 {
        self.pointer_world = camera.project_pointer(pointer_ndc, self.pointer_world);
        self.pointer_world
    }

    /// Advance the CPU state after the compute passes have been recorded
    pub fn tick(
        &mut self,
        frame_delta: f32,
        elapsed: f32,
        settings: &mut EffectSettings,
        pointer_world: Vec3,
    ) -> FrameUniforms {
        self.cursor.advance(settings.nb_to_spawn);
        self.cursor.follow(pointer_world);
        settings.rotate_colors(frame_delta);

        FrameUniforms {
            time: elapsed,
            particle_size: settings.particle_size * PARTICLE_QUAD_SIZE,
            color_offset: settings.color_offset,
            color_variance: settings.color_variance,
            light_position: light_position(elapsed),
            light_intensity: LIGHT_INTENSITY,
        }
    }
}

pub fn bloom_settings(settings: &EffectSettings) -> BloomSettings {
    BloomSettings {
        strength: settings.bloom_strength,
        radius: settings.bloom_radius,
        threshold: settings.bloom_threshold,
    }
}

/// Window pixel coordinates to normalised device coordinates (+Y up)
pub fn pointer_ndc(x: f32, y: f32, width: u32, height: u32) -> Vec2 {
    let width = width.max(1) as f32;
    let height = height.max(1) as f32;
    Vec2::new(x / width * 2.0 - 1.0, -(y / height) * 2.0 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use particle_kernel::{spawn_particles, ParticleState, ParticleVelocity};
    use std::time::Duration;

    #[test]
    fn test_clock_clamps_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        assert_eq!(clock.tick_at(start).0, 0.0);

        let (delta, elapsed) = clock.tick_at(start + Duration::from_millis(16));
        assert!((delta - 0.016).abs() < 1e-4);
        assert!((elapsed - 0.016).abs() < 1e-4);

        let (delta, elapsed) = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(delta, MAX_FRAME_DELTA);
        assert!((elapsed - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_clock_fps() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        assert_eq!(clock.fps(), 0.0);
        for k in 0..=200u64 {
            clock.tick_at(start + Duration::from_millis(20 * k));
        }
        assert!((clock.fps() - 50.0).abs() < 0.5);
    }

    #[test]
    fn test_pointer_ndc() {
        assert_eq!(pointer_ndc(0.0, 0.0, 800, 600), Vec2::new(-1.0, 1.0));
        assert_eq!(pointer_ndc(400.0, 300.0, 800, 600), Vec2::ZERO);
        assert_eq!(pointer_ndc(800.0, 600.0, 800, 600), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn test_tick_order() {
        let mut driver = FrameDriver::new(16);
        let mut settings = EffectSettings::default();

        // Compute passes see the cursor as it was before the tick
        let params = driver.compute_params(&settings, 0.016);
        assert_eq!(params.counts[1], 0);

        let frame = driver.tick(0.016, 0.0, &mut settings, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(driver.cursor().spawn_index, 5);
        assert!((driver.cursor().position.x - 1.0).abs() < 1e-6);
        assert!((settings.color_offset - 0.016).abs() < 1e-7);
        assert_eq!(frame.color_offset, settings.color_offset);
        assert_eq!(frame.light_position, light_position(0.0));
        assert!((frame.particle_size - PARTICLE_QUAD_SIZE).abs() < 1e-7);

        let params = driver.compute_params(&settings, 0.016);
        assert_eq!(params.counts[1], 5);
    }

    #[test]
    fn test_spawn_index_after_k_ticks() {
        let capacity = 64;
        let mut driver = FrameDriver::new(capacity);
        let mut settings = EffectSettings {
            nb_to_spawn: 7,
            ..Default::default()
        };
        for k in 1..=50u32 {
            driver.tick(0.016, 0.0, &mut settings, Vec3::ZERO);
            assert_eq!(driver.cursor().spawn_index, (k * 7) % capacity);
        }
    }

    #[test]
    fn test_ring_coverage() {
        // N / nb spawn passes target every slot exactly once
        let capacity = 40u32;
        let mut driver = FrameDriver::new(capacity);
        let mut settings = EffectSettings::default();
        let mut positions = vec![ParticleState::INERT; capacity as usize];
        let mut velocities = vec![ParticleVelocity::default(); capacity as usize];
        let mut hits = vec![0u32; capacity as usize];

        for _ in 0..capacity / settings.nb_to_spawn {
            let spawn = driver.cursor().spawn_params(
                settings.nb_to_spawn,
                settings.spawn_radius,
                settings.spawn_speed,
            );
            for slot in spawn_particles(&mut positions, &mut velocities, &spawn) {
                hits[slot as usize] += 1;
            }
            driver.tick(0.016, 0.0, &mut settings, Vec3::ZERO);
        }

        assert!(hits.iter().all(|&h| h == 1));
        assert!(positions.iter().all(|p| p.is_alive()));
    }

    #[test]
    fn test_pointer_projection_keeps_previous_on_miss() {
        let mut driver = FrameDriver::new(8);
        let camera = Camera::new(800, 600);
        let hit = driver.project_pointer(&camera, Vec2::new(0.5, 0.5));
        assert!(hit.length() > 0.0);
        assert_eq!(driver.pointer_world(), hit);

        // Camera looking away from the origin plane: every ray misses
        let mut away = camera.clone();
        away.target = Vec3::new(0.0, 0.0, 20.0);
        assert_eq!(driver.project_pointer(&away, Vec2::ZERO), hit);
    }

    #[test]
    fn test_bloom_settings_follow_effect_settings() {
        let settings = EffectSettings {
            bloom_strength: 1.5,
            ..Default::default()
        };
        let bloom = bloom_settings(&settings);
        assert_eq!(bloom.strength, 1.5);
        assert_eq!(bloom.radius, settings.bloom_radius);
        assert_eq!(bloom.threshold, settings.bloom_threshold);
    }
}
