/*!
Smoothed particle hydrodynamics for a block of fluid in a walled box.

The core lives in [`simulation`]: kernels, the uniform neighbor grid, the
particle arena, plane collisions and the five-phase [`FluidSimulation::single_step`].
[`platform`] contains the command line driver and the VTK frame export.
*/

pub mod platform;
pub mod simulation;

pub use simulation::*;

pub use platform::{start, VtkExporter};
