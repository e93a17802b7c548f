use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SimulationError},
    floating_type_mod::FT,
    particles::{default_particle_color, ParticleVec},
    vec3_from_array, V3,
};

fn default_smoothing_radius_factor() -> FT {
    2.
}

fn default_axis_directions() -> [FT; 3] {
    [1., 1., 1.]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDomain {
    pub min: [FT; 3],
    pub max: [FT; 3],
}

impl SceneDomain {
    pub fn min(&self) -> V3 {
        vec3_from_array(self.min)
    }

    pub fn max(&self) -> V3 {
        vec3_from_array(self.max)
    }
}

/// A lattice of `counts[0] * counts[1] * counts[2]` particles starting at
/// `origin`, `spacing` apart and stepping along `axis_directions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub origin: [FT; 3],
    pub counts: [usize; 3],
    #[serde(default = "default_axis_directions")]
    pub axis_directions: [FT; 3],
    pub rest_density: FT,
    #[serde(default)]
    pub color: Option<[FT; 3]>,
    #[serde(default)]
    pub velocity: Option<[FT; 3]>,
}

impl SceneFluidBlock {
    pub fn num_particles(&self) -> usize {
        self.counts.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    // lattice spacing d, each particle represents a volume of d³
    pub spacing: FT,
    // h = smoothing_radius_factor * d
    #[serde(default = "default_smoothing_radius_factor")]
    pub smoothing_radius_factor: FT,
    pub domain: SceneDomain,
    pub blocks: Vec<SceneFluidBlock>,
}

impl SceneConfig {
    pub fn smoothing_radius(&self) -> FT {
        self.smoothing_radius_factor * self.spacing
    }

    pub fn unit_volume(&self) -> FT {
        self.spacing * self.spacing * self.spacing
    }

    pub fn num_particles(&self) -> usize {
        self.blocks.iter().map(|block| block.num_particles()).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.spacing.is_finite() || self.spacing <= 0. {
            return Err(SimulationError::InvalidParameter(format!(
                "particle spacing {} must be positive",
                self.spacing
            )));
        }

        let h = self.smoothing_radius();
        if !h.is_finite() || h <= 0. {
            return Err(SimulationError::InvalidSmoothingRadius(h));
        }

        for d in 0..3 {
            let (min, max) = (self.domain.min[d], self.domain.max[d]);
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(SimulationError::InvalidDomain(format!(
                    "axis {}: min {} must be smaller than max {}",
                    d, min, max
                )));
            }
        }

        if self.blocks.is_empty() {
            return Err(SimulationError::InvalidParticleCount(
                "scene does not contain any fluid block".into(),
            ));
        }

        for (block_idx, block) in self.blocks.iter().enumerate() {
            if block.counts.iter().any(|&c| c == 0) {
                return Err(SimulationError::InvalidParticleCount(format!(
                    "block {} has lattice counts {:?}, every axis needs at least one particle",
                    block_idx, block.counts
                )));
            }
            if !block.rest_density.is_finite() || block.rest_density <= 0. {
                return Err(SimulationError::InvalidParameter(format!(
                    "block {} has rest density {}, must be positive",
                    block_idx, block.rest_density
                )));
            }
            let all_finite = block
                .origin
                .iter()
                .chain(block.axis_directions.iter())
                .chain(block.color.iter().flatten())
                .chain(block.velocity.iter().flatten())
                .all(|x| x.is_finite());
            if !all_finite {
                return Err(SimulationError::InvalidParameter(format!(
                    "block {} contains non-finite values",
                    block_idx
                )));
            }
        }

        Ok(())
    }

    /** Fills the lattice of every block into a new particle container. */
    pub fn create_particles(&self) -> ParticleVec {
        let mut particles = ParticleVec::default(0);
        particles.reserve(self.num_particles());

        for block in &self.blocks {
            add_fluid_block(block, self.spacing, self.unit_volume(), &mut particles);
        }

        particles
    }
}

fn add_fluid_block(block: &SceneFluidBlock, spacing: FT, unit_volume: FT, particles: &mut ParticleVec) {
    let origin = vec3_from_array(block.origin);
    let step = vec3_from_array(block.axis_directions) * spacing;
    let color = block.color.map(vec3_from_array).unwrap_or_else(default_particle_color);
    let velocity = block.velocity.map(vec3_from_array).unwrap_or_else(V3::zeros);

    for x in 0..block.counts[0] {
        for y in 0..block.counts[1] {
            for z in 0..block.counts[2] {
                let position = origin + step.component_mul(&V3::new(x as FT, y as FT, z as FT));
                particles.add_fluid_particle(position, velocity, block.rest_density, unit_volume, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, vec3f};

    fn small_scene() -> SceneConfig {
        SceneConfig {
            spacing: 0.1,
            smoothing_radius_factor: 2.,
            domain: SceneDomain {
                min: [-0.5, -0.5, -0.5],
                max: [0.5, 0.5, 0.5],
            },
            blocks: vec![SceneFluidBlock {
                origin: [-0.5, -0.5, 0.5],
                counts: [2, 3, 4],
                axis_directions: [1., 1., -1.],
                rest_density: 1000.,
                color: None,
                velocity: None,
            }],
        }
    }

    #[test]
    fn lattice_positions_and_masses() {
        let scene = small_scene();
        scene.validate().unwrap();
        assert_ft_approx_eq(scene.smoothing_radius(), 0.2, 1.0e-5, || format!("h"));

        let particles = scene.create_particles();
        assert_eq!(particles.len(), 24);
        assert_eq!(scene.num_particles(), 24);

        // z is the innermost loop and steps towards -z
        assert_eq!(particles.position[0], vec3f(-0.5, -0.5, 0.5));
        assert_ft_approx_eq(particles.position[1].z, 0.4, 1.0e-5, || format!("z step"));
        let last = particles.position[23];
        assert_ft_approx_eq(last.x, -0.4, 1.0e-5, || format!("last x"));
        assert_ft_approx_eq(last.y, -0.3, 1.0e-5, || format!("last y"));
        assert_ft_approx_eq(last.z, 0.2, 1.0e-5, || format!("last z"));

        for i in 0..particles.len() {
            assert_ft_approx_eq(particles.mass[i], 1., 1.0e-6, || format!("mass = rho0 * d^3"));
            assert_eq!(particles.rest_density[i], 1000.);
            assert_eq!(particles.color[i], default_particle_color());
            assert_eq!(particles.velocity[i], V3::zeros());
        }
    }

    #[test]
    fn blocks_carry_their_own_fluid() {
        let mut scene = small_scene();
        scene.blocks.push(SceneFluidBlock {
            origin: [0., 0., 0.],
            counts: [1, 1, 1],
            axis_directions: [1., 1., 1.],
            rest_density: 1500.,
            color: Some([0., 1., 0.]),
            velocity: Some([0., -1., 0.]),
        });
        scene.validate().unwrap();

        let particles = scene.create_particles();
        assert_eq!(particles.len(), 25);
        assert_eq!(particles.rest_density[24], 1500.);
        assert_ft_approx_eq(particles.mass[24], 1.5, 1.0e-6, || format!("heavier fluid mass"));
        assert_eq!(particles.color[24], vec3f(0., 1., 0.));
        assert_eq!(particles.velocity[24], vec3f(0., -1., 0.));
    }

    #[test]
    fn rejects_degenerate_scenes() {
        let mut no_particles = small_scene();
        no_particles.blocks[0].counts = [10, 0, 10];
        assert!(matches!(
            no_particles.validate(),
            Err(SimulationError::InvalidParticleCount(_))
        ));

        let mut no_blocks = small_scene();
        no_blocks.blocks.clear();
        assert!(no_blocks.validate().is_err());

        let mut zero_radius = small_scene();
        zero_radius.smoothing_radius_factor = 0.;
        assert!(matches!(
            zero_radius.validate(),
            Err(SimulationError::InvalidSmoothingRadius(_))
        ));

        let mut negative_spacing = small_scene();
        negative_spacing.spacing = -0.1;
        assert!(negative_spacing.validate().is_err());

        let mut flat_domain = small_scene();
        flat_domain.domain.max[1] = flat_domain.domain.min[1];
        assert!(matches!(flat_domain.validate(), Err(SimulationError::InvalidDomain(_))));

        let mut no_density = small_scene();
        no_density.blocks[0].rest_density = 0.;
        assert!(no_density.validate().is_err());
    }
}
