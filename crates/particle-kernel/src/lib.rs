//! # Particle Kernel
//!
//! Data layout and per-particle math for the particle/link effect: GPU record
//! types, the noise and colour utilities, and CPU reference implementations of
//! the update and spawn compute passes.

pub mod color;
pub mod constants;
pub mod kernel;
pub mod noise;
pub mod particle;

pub use color::*;
pub use constants::*;
pub use kernel::*;
pub use noise::*;
pub use particle::*;

/// WGSL twins of [`noise`] and [`color`], prepended to every shader that needs them
pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
