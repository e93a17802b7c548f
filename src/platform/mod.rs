mod desktop;

pub use desktop::{start, VtkExporter};
