mod driver;
mod main_loop;
mod vtk_exporter;

pub use main_loop::start;
pub use vtk_exporter::VtkExporter;
