use std::{
    fs::{create_dir_all, File},
    io::Write,
    path::PathBuf,
};

use log::{debug, warn};
use vtkio::model::*;

use crate::{error::Result, floating_type_mod::FT, particles::ParticleVec, V3};

fn to_array(v: &V3) -> [FT; 3] {
    [v.x, v.y, v.z]
}

/**
 * Writes particle frames for an external renderer (e.g. ParaView).
 *
 * Frame files are named `<basename>-00001.vtk`, `<basename>-00002.vtk`, ...
 * and listed with their simulated time in `<basename>.vtk.series`.
 */
pub struct VtkExporter {
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
    series_file: File,
}

impl VtkExporter {
    pub fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> Result<VtkExporter> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder)?;

        let mut series_file = File::create(folder.join(format!("{}.vtk.series", basename)))?;
        let series_prelude_str = "{\n\"file-series-version\": \"1.0\",\n\"files\": [";
        series_file.write_all(series_prelude_str.as_bytes())?;

        Ok(VtkExporter {
            series_file,
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    pub fn num_snapshots(&self) -> usize {
        self.snapshot_number - 1
    }

    pub fn add_snapshot(&mut self, time: FT, particles: &ParticleVec) -> Result<()> {
        let vtk_filename = format!("{}-{:05}.vtk", self.basename, self.snapshot_number);
        Self::write_vtk_file(self.folder.join(&vtk_filename), particles)?;

        if self.snapshot_number > 1 {
            self.series_file.write_all(",".as_bytes())?;
        }
        write!(
            self.series_file,
            "\n{{ \"name\": \"{}\", \"time\": {} }}",
            vtk_filename, time
        )?;

        debug!("exported frame {} (t={}s)", vtk_filename, time);
        self.snapshot_number += 1;
        Ok(())
    }

    fn write_vtk_file(path: PathBuf, particles: &ParticleVec) -> Result<()> {
        let data_ft: Vec<(&str, &[FT])> = vec![
            ("density", particles.density.as_slice()),
            ("pressure", particles.pressure.as_slice()),
            ("mass", particles.mass.as_slice()),
        ];
        let data_vec: Vec<(&str, &[V3])> = vec![
            ("color", particles.color.as_slice()),
            ("velocity", particles.velocity.as_slice()),
            ("force", particles.force.as_slice()),
        ];

        let mut data_arrays: Vec<DataArray> = Vec::new();
        for (name, arr) in data_ft {
            let mut data_array = DataArray::scalars(name, 1);
            data_array.data = arr.to_vec().into();
            data_arrays.push(data_array);
        }
        for (name, arr) in data_vec {
            let mut data_array = DataArray::scalars(name, 3);
            data_array.data = arr.iter().flat_map(to_array).collect::<Vec<FT>>().into();
            data_arrays.push(data_array);
        }

        let num_particles = particles.len();
        let vtk_points: Vec<FT> = particles.position.iter().flat_map(to_array).collect();
        let vtk_verts: Vec<u32> = (0..num_particles).flat_map(|i| [1, i as u32]).collect();

        let vtk = Vtk {
            version: Version::new((4, 2)),
            byte_order: ByteOrder::BigEndian,
            title: String::from("SPH Particles 1.0"),
            file_path: Some(path.clone()),
            data: DataSet::PolyData {
                meta: None,
                pieces: vec![Piece::Inline(Box::new(PolyDataPiece {
                    points: vtk_points.into(),
                    verts: VertexNumbers::Legacy {
                        num_cells: num_particles as u32,
                        vertices: vtk_verts,
                    }
                    .into(),
                    data: Attributes {
                        cell: Vec::new(),
                        point: data_arrays.into_iter().map(Attribute::DataArray).collect(),
                    },
                    ..Default::default()
                }))],
            },
        };
        vtk.export(path)?;
        Ok(())
    }
}

impl Drop for VtkExporter {
    fn drop(&mut self) {
        let series_end_str = "\n]\n}";
        if let Err(err) = self.series_file.write_all(series_end_str.as_bytes()) {
            warn!("failed to finish {}.vtk.series: {}", self.basename, err);
        }
    }
}
