pub mod collision;
pub mod concurrency;
pub mod error;
pub mod neighborhood_search;
pub mod particles;
pub mod scene;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod simulation;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type VI<const D: usize> = V<i32, D>;

pub type V3 = V<FT, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub fn vec3_from_array(a: [FT; 3]) -> V3 {
    a.into()
}

pub use error::{Result, SimulationError};
pub use particles::ParticleVec;
pub use scene::SceneConfig;
pub use simulation::*;
pub use simulation_parameters::SimulationParams;
