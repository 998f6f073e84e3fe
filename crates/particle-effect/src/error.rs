use thiserror::Error;

/// Errors surfaced by [`crate::ParticleEffect`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("GPU compute is not available: {0}")]
    Unsupported(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreation(String),
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),
    #[error("Surface is out of memory")]
    OutOfMemory,
    #[error("Effect has been released")]
    Released,
}
