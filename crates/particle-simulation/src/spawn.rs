//! Spawn cursor: where the next batch of particles enters the ring buffer

use glam::Vec3;
use particle_kernel::{SpawnParams, SPAWN_FOLLOW_FACTOR};

/// Ring-buffer write head plus the smoothed pointer trail segment
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnCursor {
    pub spawn_index: u32,
    pub previous_position: Vec3,
    pub position: Vec3,
    capacity: u32,
}

impl SpawnCursor {
    pub fn new(capacity: u32) -> Self {
        Self {
            spawn_index: 0,
            previous_position: Vec3::ZERO,
            position: Vec3::ZERO,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Move the write head past a batch of `nb_to_spawn` slots
    pub fn advance(&mut self, nb_to_spawn: u32) {
        self.spawn_index = (self.spawn_index + nb_to_spawn % self.capacity) % self.capacity;
    }

    /// Ease toward `target`, keeping the old point as the start of the next segment
    pub fn follow(&mut self, target: Vec3) {
        self.previous_position = self.position;
        self.position = self.position.lerp(target, SPAWN_FOLLOW_FACTOR);
    }

    /// Spawn pass inputs for the current cursor state
    pub fn spawn_params(&self, nb_to_spawn: u32, radius: f32, speed: f32) -> SpawnParams {
        SpawnParams {
            spawn_index: self.spawn_index,
            nb_to_spawn,
            previous_position: self.previous_position,
            position: self.position,
            radius,
            speed,
        }
    }
}
