use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SimulationError},
    floating_type_mod::FT,
    vec3_from_array, V3,
};

fn default_min_density() -> FT {
    1.0e-6
}

/// Physical coefficients and step control of a simulation. Per-particle
/// quantities (rest density, mass) come from the scene instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    // pressure = max(0, stiffness * (density - rest_density))
    pub stiffness: FT,
    pub viscosity: FT,
    pub gravity: [FT; 3],
    pub collision_damping: FT,
    pub timestep_ms: FT,

    /// Densities below this value are replaced by the rest density when
    /// dividing by density during integration.
    #[serde(default = "default_min_density")]
    pub min_density: FT,

    /// Verify the neighbor lists against a brute-force search every step (slow).
    #[serde(default)]
    pub check_neighborhood: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            stiffness: 1000.,
            viscosity: 80.,
            gravity: [0., -9.81, 0.],
            collision_damping: 1.,
            timestep_ms: 7.,
            min_density: default_min_density(),
            check_neighborhood: false,
        }
    }
}

impl SimulationParams {
    pub fn gravity_vector(&self) -> V3 {
        vec3_from_array(self.gravity)
    }

    /** Timestep in seconds. */
    pub fn dt(&self) -> FT {
        self.timestep_ms / 1000.
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(SimulationError::InvalidParameter(msg()))
            }
        }

        check(self.stiffness.is_finite() && self.stiffness >= 0., || {
            format!("stiffness {} must be finite and non-negative", self.stiffness)
        })?;
        check(self.viscosity.is_finite() && self.viscosity >= 0., || {
            format!("viscosity {} must be finite and non-negative", self.viscosity)
        })?;
        check(self.gravity.iter().all(|g| g.is_finite()), || {
            format!("gravity {:?} must be finite", self.gravity)
        })?;
        check((0. ..=1.).contains(&self.collision_damping), || {
            format!("collision damping {} must be in [0, 1]", self.collision_damping)
        })?;
        check(self.timestep_ms.is_finite() && self.timestep_ms > 0., || {
            format!("timestep {}ms must be positive", self.timestep_ms)
        })?;
        check(self.min_density.is_finite() && self.min_density > 0., || {
            format!("min density {} must be positive", self.min_density)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ft_approx_eq;

    #[test]
    fn defaults_are_valid() {
        let params = SimulationParams::default();
        params.validate().unwrap();
        assert_ft_approx_eq(params.dt(), 0.007, 1.0e-5, || format!("dt"));
        assert_eq!(params.gravity_vector().y, -9.81);
    }

    #[test]
    fn rejects_invalid_coefficients() {
        let base = SimulationParams::default();
        let invalid = [
            SimulationParams { stiffness: -1., ..base },
            SimulationParams { viscosity: FT::NAN, ..base },
            SimulationParams { gravity: [0., FT::INFINITY, 0.], ..base },
            SimulationParams { collision_damping: 1.5, ..base },
            SimulationParams { timestep_ms: 0., ..base },
            SimulationParams { min_density: 0., ..base },
        ];
        for params in invalid {
            assert!(params.validate().is_err(), "{:?} should be rejected", params);
        }
    }

    #[test]
    fn optional_fields_have_defaults() {
        let yaml = "stiffness: 500.0\nviscosity: 10.0\ngravity: [0.0, -1.0, 0.0]\ncollision_damping: 0.5\ntimestep_ms: 5.0\n";
        let params: SimulationParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.min_density, default_min_density());
        assert!(!params.check_neighborhood);
        assert_eq!(params.stiffness, 500.);
        params.validate().unwrap();
    }
}
