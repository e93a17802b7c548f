use nalgebra::zero;

use crate::{floating_type_mod::FT, vec3f, V3};

/// Stable index of a particle inside `ParticleVec`. Particles are never
/// removed, so an id stays valid for the whole run.
pub type ParticleId = usize;

pub type Color = V3;

pub fn default_particle_color() -> Color {
    vec3f(0.2, 0.2, 1.)
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }

            pub fn reserve(&mut self, additional: usize) {
                $(
                    self.$field_name.reserve(additional);
                )*
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        // fixed at construction
        pub mass: Vec<FT> | 0.,
        pub rest_density: Vec<FT> | 0.,
        pub color: Vec<Color> | default_particle_color(),

        // integrated state
        pub position: Vec<V3> | zero(),
        pub velocity: Vec<V3> | zero(),

        // recomputed every step
        pub force: Vec<V3> | zero(),
        pub density: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
    }
}

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /**
     * Appends a particle at rest state (zero force, density and pressure) and
     * returns its id.
     */
    pub fn add_particle(
        &mut self,
        position: V3,
        velocity: V3,
        mass: FT,
        rest_density: FT,
        color: Color,
    ) -> ParticleId {
        let id = self.len();
        self.mass.push(mass);
        self.rest_density.push(rest_density);
        self.color.push(color);
        self.position.push(position);
        self.velocity.push(velocity);
        self.force.push(zero());
        self.density.push(0.);
        self.pressure.push(0.);
        id
    }

    /** Adds a particle with `mass = rest_density * unit_volume`. */
    pub fn add_fluid_particle(
        &mut self,
        position: V3,
        velocity: V3,
        rest_density: FT,
        unit_volume: FT,
        color: Color,
    ) -> ParticleId {
        self.add_particle(position, velocity, rest_density * unit_volume, rest_density, color)
    }
}
