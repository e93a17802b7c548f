//! Errors raised while setting up a simulation.
//!
//! The per-step pipeline itself returns no errors. Everything in here is
//! detected at construction time or by the driver (file access, parsing,
//! export, and a step that panicked).

use thiserror::Error;

use crate::floating_type_mod::FT;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid particle count: {0}")]
    InvalidParticleCount(String),

    #[error("invalid smoothing radius {0}: must be positive and finite")]
    InvalidSmoothingRadius(FT),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid collision plane normal [{0}, {1}, {2}]")]
    InvalidCollisionNormal(FT, FT, FT),

    #[error("simulation step {0} failed")]
    StepFailed(usize),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("VTK export error: {0}")]
    VtkError(#[from] vtkio::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
