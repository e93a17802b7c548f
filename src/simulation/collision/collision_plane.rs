use crate::{
    error::{Result, SimulationError},
    floating_type_mod::FT,
    vec3f, V3,
};

use super::{CollisionObjectTrait, ParticleState};

/**
 * Infinite plane. `dir` is the unit normal pointing to the side where the
 * fluid is allowed to be, so `dir·x + delta` is the signed distance of `x`.
 *
 * `damping` scales the reflected normal velocity: 1 is perfectly elastic,
 * 0 removes the normal component completely.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionPlane {
    dir: V3,
    delta: FT,
    damping: FT,
}

impl CollisionPlane {
    pub fn new(point: V3, normal: V3, damping: FT) -> Result<CollisionPlane> {
        let length = normal.norm();
        if !length.is_finite() || length == 0. {
            return Err(SimulationError::InvalidCollisionNormal(normal.x, normal.y, normal.z));
        }
        if !point.iter().all(|x| x.is_finite()) {
            return Err(SimulationError::InvalidParameter(format!(
                "collision plane point {:?} is not finite",
                point
            )));
        }
        if !(0. ..=1.).contains(&damping) {
            return Err(SimulationError::InvalidParameter(format!(
                "collision damping {} is outside of [0, 1]",
                damping
            )));
        }

        let dir = normal / length;
        Ok(CollisionPlane {
            dir,
            delta: -dir.dot(&point),
            damping,
        })
    }

    /**
     * The six walls of an axis aligned box with all normals pointing inwards.
     *
     * Order: bottom, top, left, right, front (max z), back (min z).
     */
    pub fn new_boundary_box(min: V3, max: V3, damping: FT) -> Result<Vec<CollisionPlane>> {
        Ok(vec![
            CollisionPlane::new(vec3f(min.x, min.y, max.z), vec3f(0., 1., 0.), damping)?,
            CollisionPlane::new(vec3f(min.x, max.y, max.z), vec3f(0., -1., 0.), damping)?,
            CollisionPlane::new(vec3f(min.x, min.y, max.z), vec3f(1., 0., 0.), damping)?,
            CollisionPlane::new(vec3f(max.x, min.y, max.z), vec3f(-1., 0., 0.), damping)?,
            CollisionPlane::new(vec3f(min.x, min.y, max.z), vec3f(0., 0., -1.), damping)?,
            CollisionPlane::new(vec3f(min.x, min.y, min.z), vec3f(0., 0., 1.), damping)?,
        ])
    }

    pub fn normal(&self) -> V3 {
        self.dir
    }

    pub fn probe(&self, x: V3) -> FT {
        self.dir.dot(&x) + self.delta
    }
}

impl CollisionObjectTrait for CollisionPlane {
    fn signed_distance(&self, position: V3) -> FT {
        self.probe(position)
    }

    fn resolve(&self, state: ParticleState) -> ParticleState {
        let distance = self.probe(state.position);
        if !(distance <= 0.) {
            return state;
        }

        let mut position = state.position;
        if distance < 0. {
            position -= self.dir * distance;
        }

        // only a particle moving into the wall is reflected
        let mut velocity = state.velocity;
        let normal_speed = self.dir.dot(&velocity);
        if normal_speed < 0. {
            velocity -= self.dir * ((1. + self.damping) * normal_speed);
        }

        ParticleState { position, velocity }
    }
}
