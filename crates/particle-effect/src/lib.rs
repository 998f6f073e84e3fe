//! # Particle Effect
//!
//! Host-facing bridge for the particle field: window surface, frame loop and
//! input buffering around the simulation and renderer crates.

pub mod bridge;
pub mod driver;
pub mod error;

pub use bridge::*;
pub use driver::*;
pub use error::*;
