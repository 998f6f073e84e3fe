//! # Particle Simulation
//!
//! GPU particle store and the update/spawn compute passes, plus the tunable
//! settings and spawn cursor that feed them each frame.

pub mod params;
pub mod simulation;
pub mod spawn;

pub use params::*;
pub use simulation::*;
pub use spawn::*;
