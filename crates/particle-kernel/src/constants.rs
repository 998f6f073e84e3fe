//! Fixed constants for the particle effect
//!
//! Values the simulation and renderer agree on. Runtime-tunable parameters
//! live in `particle_simulation::EffectSettings` instead.

/// Default particle population (2^13). Every buffer is sized from this at startup.
pub const PARTICLE_COUNT: u32 = 1 << 13;

/// Link quads emitted per particle (one per tracked nearest neighbour)
pub const LINKS_PER_PARTICLE: u32 = 2;

/// Vertices per link quad
pub const VERTICES_PER_LINK: u32 = 4;

/// Link vertices (and link colours) owned by each particle slot
pub const LINK_VERTICES_PER_PARTICLE: u32 = LINKS_PER_PARTICLE * VERTICES_PER_LINK;

/// Indices per particle in the static link index buffer (two quads, two triangles each)
pub const LINK_INDICES_PER_PARTICLE: u32 = LINKS_PER_PARTICLE * 6;

/// Position written into inert slots: far outside the camera frustum
pub const SENTINEL_POSITION: f32 = 10000.0;

/// Life written into inert slots at startup
pub const SENTINEL_LIFE: f32 = -1.0;

/// Life of a freshly spawned particle
pub const SPAWN_LIFE: f32 = 1.0;

/// Fixed slow-motion factor applied to the frame delta before integration
pub const SLOW_MOTION: f32 = 0.1;

/// Keeps fading particles slightly responsive to turbulence (`life + epsilon`)
pub const TURBULENCE_LIFE_EPSILON: f32 = 0.01;

/// Starting value of the streaming top-2 neighbour search
pub const NEIGHBOR_SEARCH_START: f32 = 10000.0;

/// Exponent applied to `min(own_life, neighbour_life)` for link opacity
pub const LINK_ALPHA_EXPONENT: f32 = 0.8;

/// Default jitter radius around the spawn segment
pub const SPAWN_RADIUS: f32 = 0.01;

/// Default initial speed along the jitter direction
pub const SPAWN_SPEED: f32 = 5.0;

/// Blend factor used to ease the spawn cursor toward the projected pointer
pub const SPAWN_FOLLOW_FACTOR: f32 = 0.1;

/// Side length of a particle sprite before `particle_size` scaling
pub const PARTICLE_QUAD_SIZE: f32 = 0.05;

/// Index multiplier for the per-particle colour noise lookup
pub const COLOR_NOISE_SCALE: f32 = 0.1;

/// Base palette colour (pure blue) before hue rotation
pub const BASE_COLOR: [f32; 3] = [0.0, 0.0, 1.0];

/// Upper bound on a frame delta fed to the simulation, in seconds
pub const MAX_FRAME_DELTA: f32 = 0.1;
