//! Static boundary geometry the fluid particles cannot penetrate.

use enum_dispatch::enum_dispatch;

use crate::{floating_type_mod::FT, V3};

mod collision_plane;

pub use collision_plane::CollisionPlane;

/// The part of a particle's state a collision object is allowed to correct.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    pub position: V3,
    pub velocity: V3,
}

#[enum_dispatch]
pub trait CollisionObjectTrait {
    /** Signed distance to the boundary, negative inside the solid. */
    fn signed_distance(&self, position: V3) -> FT;

    /** Returns the corrected state, or `state` unchanged if there is no contact. */
    fn resolve(&self, state: ParticleState) -> ParticleState;
}

/// Immutable collision shapes. They hold no per-particle state and can be
/// read from any number of threads.
#[enum_dispatch(CollisionObjectTrait)]
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionObject {
    CollisionPlane(CollisionPlane),
}

/**
 * Applies every object in registration order. Each object sees the state as
 * corrected by the objects before it, which matters in corners.
 */
pub fn resolve_collisions(collision_objects: &[CollisionObject], state: ParticleState) -> ParticleState {
    collision_objects
        .iter()
        .fold(state, |state, collision_object| collision_object.resolve(state))
}
