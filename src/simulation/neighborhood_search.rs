use crate::{
    concurrency::par_iter_mut1,
    error::{Result, SimulationError},
    floating_type_mod::FT,
    particles::ParticleId,
    V, V3, VI,
};

/// Calls `f` with every cell offset of the `(2 * dist + 1)³` block around a cell.
pub fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<3>)) {
    for z in -dist..=dist {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y, z].into());
            }
        }
    }
}

/// Upper bound for the number of grid cells, every cell owns a `Vec`.
pub const MAX_NUM_CELLS: usize = 1 << 24;

struct Cell {
    particle_ids: Vec<ParticleId>,
}

impl Cell {
    fn new() -> Cell {
        Cell {
            particle_ids: Vec::new(),
        }
    }
}

/**
 * Uniform bucket grid over a fixed box.
 *
 * The cell edge length equals the kernel support radius, so every particle
 * closer than that to a query position sits in the query cell or one of its
 * 26 neighbors. The grid only stores particle ids; the particles themselves
 * live in `ParticleVec`.
 *
 * Positions outside the box are clamped to the nearest border cell, so each
 * added particle is a member of exactly one cell.
 */
pub struct SpatialGrid {
    grid_min: V3,
    cell_size: FT,
    size: V<usize, 3>,
    cells: Vec<Cell>,
    num_particles: usize,
}

impl SpatialGrid {
    pub fn new(domain_min: V3, domain_max: V3, cell_size: FT) -> Result<SpatialGrid> {
        if !cell_size.is_finite() || cell_size <= 0. {
            return Err(SimulationError::InvalidSmoothingRadius(cell_size));
        }

        for d in 0..3 {
            if !domain_min[d].is_finite() || !domain_max[d].is_finite() || domain_min[d] >= domain_max[d] {
                return Err(SimulationError::InvalidDomain(format!(
                    "axis {}: min {} must be smaller than max {}",
                    d, domain_min[d], domain_max[d]
                )));
            }
        }

        let extent = domain_max - domain_min;
        let too_large = || {
            SimulationError::InvalidDomain(format!(
                "cell size {} over extent {:?} needs more than {} cells",
                cell_size,
                extent.as_slice(),
                MAX_NUM_CELLS
            ))
        };

        let mut size: V<usize, 3> = V::<usize, 3>::zeros();
        let mut num_cells: usize = 1;
        for d in 0..3 {
            let cells_on_axis = (extent[d] / cell_size).ceil().max(1.);
            // also catches an infinite quotient
            if !(cells_on_axis <= MAX_NUM_CELLS as FT) {
                return Err(too_large());
            }
            size[d] = cells_on_axis as usize;
            num_cells = num_cells
                .checked_mul(size[d])
                .filter(|&n| n <= MAX_NUM_CELLS)
                .ok_or_else(too_large)?;
        }

        Ok(SpatialGrid {
            grid_min: domain_min,
            cell_size,
            size,
            cells: (0..num_cells).map(|_| Cell::new()).collect(),
            num_particles: 0,
        })
    }

    pub fn size(&self) -> V<usize, 3> {
        self.size
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /** Number of particle memberships currently stored. */
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn particle_to_cell_pos(&self, position: V3) -> VI<3> {
        let mut cell_pos: VI<3> = ((position - self.grid_min) / self.cell_size).map(|x| x.floor() as i32);
        for d in 0..3 {
            cell_pos[d] = cell_pos[d].clamp(0, self.size[d] as i32 - 1);
        }
        cell_pos
    }

    fn contains_cell(&self, cell_pos: VI<3>) -> bool {
        (0..3).all(|d| cell_pos[d] >= 0 && (cell_pos[d] as usize) < self.size[d])
    }

    fn pos_to_idx(&self, cell_pos: VI<3>) -> usize {
        debug_assert!(self.contains_cell(cell_pos));

        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..3 {
            idx += multiplier * cell_pos[d] as usize;
            multiplier *= self.size[d];
        }
        idx
    }

    /** Particle ids of a single cell. Panics for cells outside the grid. */
    pub fn cell_particles(&self, cell_pos: VI<3>) -> &[ParticleId] {
        assert!(self.contains_cell(cell_pos), "cell {:?} is outside of the grid", cell_pos);
        &self.cells[self.pos_to_idx(cell_pos)].particle_ids
    }

    /** Inserts `id` into the cell that contains `position`. */
    pub fn add_particle(&mut self, id: ParticleId, position: V3) {
        let idx = self.pos_to_idx(self.particle_to_cell_pos(position));
        self.cells[idx].particle_ids.push(id);
        self.num_particles += 1;
    }

    /** Clears every cell membership. The particles are not touched. */
    pub fn remove_particles(&mut self) {
        for cell in &mut self.cells {
            cell.particle_ids.clear();
        }
        self.num_particles = 0;
    }

    /** Clears the grid and re-adds every particle at its current position. */
    pub fn rebuild(&mut self, positions: &[V3]) {
        self.remove_particles();
        for (id, position) in positions.iter().enumerate() {
            self.add_particle(id, *position);
        }
    }

    /**
     * Calls `f` with every particle in the cell of `position` and in the 26
     * adjacent cells. This is a superset of the true neighbors, no distance
     * test is done here.
     */
    pub fn for_each_candidate(&self, position: V3, mut f: impl FnMut(ParticleId)) {
        let particle_cell_pos = self.particle_to_cell_pos(position);

        iterate_grid_neighbors(1, |offset| {
            let cell_pos = particle_cell_pos + offset;
            if !self.contains_cell(cell_pos) {
                return;
            }

            for &id in &self.cells[self.pos_to_idx(cell_pos)].particle_ids {
                f(id);
            }
        });
    }

    pub fn candidates(&self, position: V3) -> Vec<ParticleId> {
        let mut result = Vec::new();
        self.for_each_candidate(position, |id| result.push(id));
        result
    }
}

/**
 * Exact neighbor lists for every particle, built once per step from the grid
 * candidates and then shared by the density and the force pass.
 */
pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = usize> + 'a {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighs.is_empty()
    }

    pub fn average_neighbor_count(&self) -> FT {
        if self.neighs.is_empty() {
            return 0.;
        }
        self.neighs.iter().map(|n| n.len()).sum::<usize>() as FT / self.neighs.len() as FT
    }

    /**
     * Keeps every grid candidate `j` of particle `i` with
     * `|x_i - x_j| <= support_radius`. The particle itself is always part of its
     * own list.
     */
    pub fn build_neighborhood_list(&mut self, grid: &SpatialGrid, positions: &[V3], support_radius: FT) {
        if self.neighs.len() != positions.len() {
            self.neighs.resize_with(positions.len(), Vec::new);
        }

        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();

            let this_particle_position = positions[i];

            grid.for_each_candidate(this_particle_position, |j| {
                if (this_particle_position - positions[j]).norm() <= support_radius {
                    p_neighs.push(j as u32);
                }
            });
        });
    }

    /**
     * Compares the lists with an O(n²) search. This is very slow and only meant
     * for debugging; a mismatch is a bug in the grid and panics.
     */
    pub fn check_against_brute_force(&self, positions: &[V3], support_radius: FT) {
        assert_eq!(self.neighs.len(), positions.len(), "neighborhood cache has wrong size");

        for i in 0..positions.len() {
            let mut expected: Vec<usize> = (0..positions.len())
                .filter(|&j| (positions[i] - positions[j]).norm() <= support_radius)
                .collect();
            let mut found: Vec<usize> = self.iter(i).collect();
            expected.sort_unstable();
            found.sort_unstable();

            assert_eq!(
                found, expected,
                "neighbor search bug: wrong neighbors for particle {} at {:?}",
                i, positions[i]
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_positions(num: usize, min: V3, max: V3, seed: u64) -> Vec<V3> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..num)
            .map(|_| {
                vec3f(
                    rng.gen_range(min.x..max.x),
                    rng.gen_range(min.y..max.y),
                    rng.gen_range(min.z..max.z),
                )
            })
            .collect()
    }

    #[test]
    fn rejects_degenerate_grids() {
        let min = vec3f(-1., -1., -1.);
        let max = vec3f(1., 1., 1.);
        assert!(SpatialGrid::new(min, max, 0.).is_err());
        assert!(SpatialGrid::new(min, max, -0.1).is_err());
        assert!(SpatialGrid::new(max, min, 0.1).is_err());
        assert!(SpatialGrid::new(min, vec3f(1., -1., 1.), 0.1).is_err());
        assert!(SpatialGrid::new(min, max, 0.1).is_ok());
    }

    #[test]
    fn rejects_grids_with_too_many_cells() {
        let result = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(1.0e6, 1.0e6, 1.0e6), 1.0e-3);
        assert!(matches!(result, Err(SimulationError::InvalidDomain(_))));

        // each axis is small enough, the product is not
        let result = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(1000., 1000., 1000.), 0.1);
        assert!(matches!(result, Err(SimulationError::InvalidDomain(_))));

        let result = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(FT::MAX, 1., 1.), 1.0e-3);
        assert!(matches!(result, Err(SimulationError::InvalidDomain(_))));

        let grid = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(10., 10., 10.), 0.125).unwrap();
        assert_eq!(grid.num_cells(), 80 * 80 * 80);
    }

    #[test]
    fn grid_size_covers_domain() {
        let grid = SpatialGrid::new(vec3f(-1.5, -1.5, -11.), vec3f(1.5, 1.5, -10.), 0.2).unwrap();
        assert_eq!(grid.size(), V::<usize, 3>::new(15, 15, 5));
        assert_eq!(grid.num_cells(), 15 * 15 * 5);
    }

    #[test]
    fn positions_map_to_clamped_cells() {
        let grid = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.), 0.25).unwrap();

        assert_eq!(grid.particle_to_cell_pos(vec3f(0., 0., 0.)), VI::<3>::new(0, 0, 0));
        assert_eq!(grid.particle_to_cell_pos(vec3f(0.3, 0.6, 0.9)), VI::<3>::new(1, 2, 3));
        // the upper walls belong to the last cell
        assert_eq!(grid.particle_to_cell_pos(vec3f(1., 1., 1.)), VI::<3>::new(3, 3, 3));
        // escaped particles are kept in the border cells
        assert_eq!(grid.particle_to_cell_pos(vec3f(-5., 0.5, 7.)), VI::<3>::new(0, 2, 3));
    }

    #[test]
    fn add_and_remove_particles() {
        let mut grid = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.), 0.25).unwrap();
        grid.add_particle(0, vec3f(0.1, 0.1, 0.1));
        grid.add_particle(1, vec3f(0.2, 0.2, 0.2));
        grid.add_particle(2, vec3f(0.9, 0.9, 0.9));

        assert_eq!(grid.num_particles(), 3);
        assert_eq!(grid.cell_particles(VI::<3>::new(0, 0, 0)), &[0, 1]);
        assert_eq!(grid.cell_particles(VI::<3>::new(3, 3, 3)), &[2]);

        let mut candidates = grid.candidates(vec3f(0.3, 0.3, 0.3));
        candidates.sort_unstable();
        assert_eq!(candidates, vec![0, 1]);

        grid.remove_particles();
        assert_eq!(grid.num_particles(), 0);
        assert!(grid.candidates(vec3f(0.1, 0.1, 0.1)).is_empty());
        assert!(grid.candidates(vec3f(0.9, 0.9, 0.9)).is_empty());
    }

    #[test]
    fn candidates_contain_every_particle_within_support() {
        let h = 0.2;
        let min = vec3f(-1., -1., -0.5);
        let max = vec3f(1., 1., 0.5);
        let positions = random_positions(1500, min, max, 7);

        let mut grid = SpatialGrid::new(min, max, h).unwrap();
        grid.rebuild(&positions);
        assert_eq!(grid.num_particles(), positions.len());

        for i in 0..positions.len() {
            let candidates = grid.candidates(positions[i]);
            for j in 0..positions.len() {
                if (positions[i] - positions[j]).norm() <= h {
                    assert!(candidates.contains(&j), "particle {} misses neighbor {}", i, j);
                }
            }
        }
    }

    #[test]
    fn neighborhood_cache_matches_brute_force() {
        let h = 0.15;
        let min = vec3f(0., 0., 0.);
        let max = vec3f(1., 0.6, 0.6);
        let positions = random_positions(800, min, max, 42);

        let mut grid = SpatialGrid::new(min, max, h).unwrap();
        grid.rebuild(&positions);

        let mut neighs = NeighborhoodCache::new(0);
        neighs.build_neighborhood_list(&grid, &positions, h);

        assert_eq!(neighs.len(), positions.len());
        for i in 0..positions.len() {
            assert!(neighs.iter(i).any(|j| j == i), "particle is not neighbor of itself");
        }
        neighs.check_against_brute_force(&positions, h);
        assert!(neighs.average_neighbor_count() >= 1.);
    }

    #[test]
    fn support_radius_is_inclusive() {
        let h = 0.25;
        let positions = vec![vec3f(0.25, 0.5, 0.5), vec3f(0.5, 0.5, 0.5), vec3f(0.75 + 1.0e-3, 0.5, 0.5)];

        let mut grid = SpatialGrid::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.), h).unwrap();
        grid.rebuild(&positions);

        let mut neighs = NeighborhoodCache::new(positions.len());
        neighs.build_neighborhood_list(&grid, &positions, h);

        let mut n0: Vec<usize> = neighs.iter(0).collect();
        n0.sort_unstable();
        assert_eq!(n0, vec![0, 1]);

        let mut n1: Vec<usize> = neighs.iter(1).collect();
        n1.sort_unstable();
        assert_eq!(n1, vec![0, 1]);

        assert_eq!(neighs.neighbor_count(2), 1);
    }
}
