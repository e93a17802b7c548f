use crate::collision::{resolve_collisions, CollisionObject, CollisionPlane, ParticleState};
use crate::simulation::concurrency::{par_iter_mut1, par_iter_mut2};
use crate::simulation::neighborhood_search::{NeighborhoodCache, SpatialGrid};
use crate::simulation::particles::ParticleVec;
use crate::simulation::scene::SceneConfig;
use crate::simulation::simulation_parameters::SimulationParams;
use crate::simulation::sph_kernels::SphKernels;
use crate::{
    error::{Result, SimulationError},
    floating_type_mod::FT,
    V3,
};

use log::{debug, info, log_enabled, trace, Level};
use num_traits::Float;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::{Duration, Instant};

struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}
impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }
    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
}
impl Counter<FT> {
    fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len().max(1) as FT
    }
    fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::INFINITY, FT::min)
    }
    fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::NEG_INFINITY, FT::max)
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    fn last(&self) -> Option<Duration> {
        self.values.last().cloned()
    }

    fn avg(&self) -> Duration {
        self.sum() / self.values.len().max(1) as u32
    }

    fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }

    fn last(&self, id: &str) -> Option<Duration> {
        self.counters.get(id).and_then(|counter| counter.last())
    }
}

const STEP_PHASES: [&str; 5] = ["neighborhood", "density-pressure", "forces", "integration", "collisions"];

/// The two external states of a simulation. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
}

/// Divisor used wherever a particle's density appears in a denominator.
#[inline(always)]
fn effective_density(density: FT, rest_density: FT, min_density: FT) -> FT {
    if density < min_density {
        rest_density
    } else {
        density
    }
}

pub struct FluidSimulation {
    pub particles: ParticleVec,
    pub neighs: NeighborhoodCache,
    pub time: FT,

    grid: SpatialGrid,
    collision_objects: Vec<CollisionObject>,
    simulation_params: SimulationParams,
    kernels: SphKernels,
    run_state: RunState,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,

    step_number: usize,
}

impl FluidSimulation {
    /**
     * Takes ownership of the particles and indexes all of them in a grid over
     * `[domain_min, domain_max]` with cell size `h`.
     */
    pub fn new(
        simulation_params: SimulationParams,
        kernels: SphKernels,
        particles: ParticleVec,
        collision_objects: Vec<CollisionObject>,
        domain_min: V3,
        domain_max: V3,
    ) -> Result<Self> {
        simulation_params.validate()?;

        if particles.is_empty() {
            return Err(SimulationError::InvalidParticleCount(
                "a simulation needs at least one particle".into(),
            ));
        }

        let mut grid = SpatialGrid::new(domain_min, domain_max, kernels.h())?;
        grid.rebuild(&particles.position);

        Ok(FluidSimulation {
            neighs: NeighborhoodCache::new(particles.len()),
            particles,
            time: 0.,
            grid,
            collision_objects,
            simulation_params,
            kernels,
            run_state: RunState::Running,
            pcounters: PerformanceCounters::new(false),
            vcounters: ValueCounters::new(false),
            step_number: 0,
        })
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn kernels(&self) -> &SphKernels {
        &self.kernels
    }

    pub fn simulation_params(&self) -> SimulationParams {
        self.simulation_params
    }

    pub fn collision_objects(&self) -> &[CollisionObject] {
        &self.collision_objects
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_paused(&self) -> bool {
        self.run_state == RunState::Paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.run_state = if paused { RunState::Paused } else { RunState::Running };
    }

    /** Switches between running and paused and returns the new state. */
    pub fn toggle_pause(&mut self) -> RunState {
        self.set_paused(!self.is_paused());
        info!("simulation {:?} at step {}", self.run_state, self.step_number);
        self.run_state
    }

    /** Collects per-phase timings (and a few values) for `write_statistics`. */
    pub fn enable_statistics(&mut self, enabled: bool) {
        self.pcounters.enabled = enabled;
        self.vcounters.enabled = enabled;
    }

    /// `density = Σ_j m_j W_poly6(|x_i - x_j|)` over the cached neighbors of `i`.
    pub fn calculate_particle_density(
        i: usize,
        position: &[V3],
        mass: &[FT],
        neighs: &NeighborhoodCache,
        kernels: &SphKernels,
    ) -> FT {
        let mut density_acc = 0.;
        for j in neighs.iter(i) {
            let r = (position[i] - position[j]).norm();
            density_acc += mass[j] * kernels.poly6(r);
        }
        density_acc
    }

    /// Penalty pressure, clamped so that particles never attract each other.
    pub fn pressure_from_density(density: FT, rest_density: FT, stiffness: FT) -> FT {
        FT::max(0., stiffness * (density - rest_density))
    }

    #[inline(always)]
    pub fn calculate_particle_force(
        i: usize,
        position: &[V3],
        velocity: &[V3],
        mass: &[FT],
        density: &[FT],
        rest_density: &[FT],
        pressure: &[FT],
        neighs: &NeighborhoodCache,
        kernels: &SphKernels,
        simulation_params: SimulationParams,
    ) -> V3 {
        let mut pressure_force = V3::zeros();
        let mut viscosity_force = V3::zeros();

        for j in neighs.iter(i) {
            let x_ij = position[i] - position[j];
            let r = x_ij.norm();
            let volume_j = mass[j] / effective_density(density[j], rest_density[j], simulation_params.min_density);

            // the direction is undefined for coinciding particles (including i itself)
            if r > 0. {
                let mean_pressure = (pressure[i] + pressure[j]) * 0.5;
                pressure_force -= (x_ij / r) * (volume_j * mean_pressure * kernels.spiky_gradient(r));
            }

            viscosity_force += (velocity[j] - velocity[i]) * (volume_j * kernels.viscosity_laplacian(r));
        }

        pressure_force
            + viscosity_force * simulation_params.viscosity
            + simulation_params.gravity_vector() * density[i]
    }

    /**
     * Semi-implicit Euler: the velocity is updated first and the new velocity
     * moves the particle. The force is divided by density, not by mass.
     */
    pub fn integrate_particle(
        state: ParticleState,
        force: V3,
        density: FT,
        rest_density: FT,
        min_density: FT,
        dt: FT,
    ) -> ParticleState {
        let velocity = state.velocity + force * (dt / effective_density(density, rest_density, min_density));
        ParticleState {
            position: state.position + velocity * dt,
            velocity,
        }
    }

    /**
     * Advances the simulation by one timestep. Returns `false` without
     * touching any state when the simulation is paused.
     */
    pub fn single_step(&mut self) -> bool {
        if self.run_state == RunState::Paused {
            return false;
        }

        let simulation_params = self.simulation_params;
        let kernels = self.kernels;
        let dt = simulation_params.dt();

        self.pcounters.begin("simulation-step");

        // 1. neighbor lists, filtered once and reused by the next two phases
        self.pcounters.begin("neighborhood");
        self.neighs
            .build_neighborhood_list(&self.grid, &self.particles.position, kernels.h());
        if simulation_params.check_neighborhood {
            self.neighs
                .check_against_brute_force(&self.particles.position, kernels.h());
        }
        self.pcounters.end("neighborhood");

        let particles = &mut self.particles;
        let neighs = &self.neighs;

        // 2. density and pressure
        self.pcounters.begin("density-pressure");
        {
            let position: &[V3] = &particles.position;
            let mass: &[FT] = &particles.mass;
            let rest_density: &[FT] = &particles.rest_density;
            par_iter_mut2(
                &mut particles.density,
                &mut particles.pressure,
                |i, p_density, p_pressure| {
                    *p_density = Self::calculate_particle_density(i, position, mass, neighs, &kernels);
                    *p_pressure =
                        Self::pressure_from_density(*p_density, rest_density[i], simulation_params.stiffness);
                },
            );
        }
        self.pcounters.end("density-pressure");

        // 3. forces
        self.pcounters.begin("forces");
        {
            let position: &[V3] = &particles.position;
            let velocity: &[V3] = &particles.velocity;
            let mass: &[FT] = &particles.mass;
            let density: &[FT] = &particles.density;
            let rest_density: &[FT] = &particles.rest_density;
            let pressure: &[FT] = &particles.pressure;
            par_iter_mut1(&mut particles.force, |i, p_force| {
                *p_force = Self::calculate_particle_force(
                    i,
                    position,
                    velocity,
                    mass,
                    density,
                    rest_density,
                    pressure,
                    neighs,
                    &kernels,
                    simulation_params,
                );
            });
        }
        self.pcounters.end("forces");

        // 4. integration
        self.pcounters.begin("integration");
        {
            let force: &[V3] = &particles.force;
            let density: &[FT] = &particles.density;
            let rest_density: &[FT] = &particles.rest_density;
            par_iter_mut2(
                &mut particles.position,
                &mut particles.velocity,
                |i, p_position, p_velocity| {
                    let state = Self::integrate_particle(
                        ParticleState {
                            position: *p_position,
                            velocity: *p_velocity,
                        },
                        force[i],
                        density[i],
                        rest_density[i],
                        simulation_params.min_density,
                        dt,
                    );
                    *p_position = state.position;
                    *p_velocity = state.velocity;
                },
            );
        }
        self.pcounters.end("integration");

        // 5. collisions, then re-index the grid at the final positions
        self.pcounters.begin("collisions");
        {
            let collision_objects: &[CollisionObject] = &self.collision_objects;
            par_iter_mut2(
                &mut particles.position,
                &mut particles.velocity,
                |_i, p_position, p_velocity| {
                    let state = resolve_collisions(
                        collision_objects,
                        ParticleState {
                            position: *p_position,
                            velocity: *p_velocity,
                        },
                    );
                    *p_position = state.position;
                    *p_velocity = state.velocity;
                },
            );
        }
        self.grid.rebuild(&particles.position);
        self.pcounters.end("collisions");

        self.pcounters.end("simulation-step");

        self.time += dt;
        self.step_number += 1;

        if self.vcounters.enabled || log_enabled!(Level::Debug) {
            let avg_neighbor_count = self.neighs.average_neighbor_count();
            let (min_density, max_density) = self.density_range();
            self.vcounters.add_value("avg-neighbor-count", avg_neighbor_count);
            self.vcounters.add_value("max-density", max_density);

            debug!(
                "step {} t={:.4}s: avg neighbors {:.2}, density [{:.3}, {:.3}]",
                self.step_number, self.time, avg_neighbor_count, min_density, max_density
            );
        }

        if self.pcounters.enabled && log_enabled!(Level::Trace) {
            for phase in STEP_PHASES {
                if let Some(duration) = self.pcounters.last(phase) {
                    trace!("{}: {:.3}ms", phase, duration.as_secs_f64() * 1000.);
                }
            }
        }

        true
    }

    fn density_range(&self) -> (FT, FT) {
        self.particles
            .density
            .iter()
            .fold((FT::INFINITY, FT::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)))
    }
}

/**
 * Builds a ready-to-run simulation from a scene: fills the fluid lattices,
 * derives the smoothing radius from the particle spacing and encloses the
 * domain with six planes.
 */
pub fn init_fluid_sim(simulation_params: SimulationParams, scene_config: &SceneConfig) -> Result<FluidSimulation> {
    simulation_params.validate()?;
    scene_config.validate()?;

    let kernels = SphKernels::new(scene_config.smoothing_radius())?;
    let particles = scene_config.create_particles();

    let domain_min = scene_config.domain.min();
    let domain_max = scene_config.domain.max();
    let collision_objects: Vec<CollisionObject> =
        CollisionPlane::new_boundary_box(domain_min, domain_max, simulation_params.collision_damping)?
            .into_iter()
            .map(CollisionObject::from)
            .collect();

    let fluid_simulation = FluidSimulation::new(
        simulation_params,
        kernels,
        particles,
        collision_objects,
        domain_min,
        domain_max,
    )?;

    let grid_size = fluid_simulation.grid().size();
    info!(
        "initialized {} fluid particles: h={} dt={}s grid {}x{}x{} cells, {} collision planes",
        fluid_simulation.num_fluid_particles(),
        kernels.h(),
        simulation_params.dt(),
        grid_size.x,
        grid_size.y,
        grid_size.z,
        fluid_simulation.collision_objects().len(),
    );

    Ok(fluid_simulation)
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

/// Human readable summary of the counters collected since `enable_statistics`.
pub fn write_statistics(fluid_simulation: &FluidSimulation) -> String {
    let mut s = String::new();

    let simulation_time = fluid_simulation
        .pcounters
        .counters
        .get("simulation-step")
        .map(|counter| counter.sum())
        .unwrap_or_default();

    s += &format!(
        "steps: {}\nsimulated-time: {}s\nparticles: {}\nsimulation-time: {}ms\n\n",
        fluid_simulation.step_number,
        fluid_simulation.time,
        fluid_simulation.num_fluid_particles(),
        simulation_time.as_secs_f64() * 1000.
    );

    let mut v = fluid_simulation.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        s += &format!("{}: avg:{}ms\n", label, pcounter.avg().as_secs_f64() * 1000.);
    }
    s += "\n";

    let mut v = fluid_simulation.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        s += &format!(
            "{}: min:{} max:{} avg:{}\n",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        );
    }

    s
}
