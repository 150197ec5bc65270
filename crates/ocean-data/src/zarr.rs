// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{DataError, DataResult};
use crate::ocean::{FieldSource, OceanDataset, LAT_DIM, LON_DIM, TIME_DIM};
use ndarray::Array3;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::filesystem::FilesystemStore;

/// Zarr hierarchy on the local filesystem holding the gridded fields.
#[derive(Clone, Debug)]
pub struct ZarrStore {
    path: PathBuf,
}

impl ZarrStore {
    /// Points at an existing store directory.
    pub fn open(path: impl Into<PathBuf>) -> DataResult<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(DataError::Io {
                path,
                source: io::Error::new(io::ErrorKind::NotFound, "zarr store directory not found"),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl Display) -> DataError {
        DataError::Zarr {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    fn open_array(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
    ) -> DataResult<Array<FilesystemStore>> {
        Array::open(Arc::clone(store), &format!("/{name}")).map_err(|err| match err {
            zarrs::array::ArrayCreateError::MissingMetadata => DataError::MissingVariable {
                name: name.to_string(),
            },
            other => self.error(format!("{name}: {other}")),
        })
    }

    /// Reads a whole array as `f64`, widening narrower numeric types.
    fn read_all(&self, array: &Array<FilesystemStore>, name: &str) -> DataResult<Vec<f64>> {
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let widen = |err: zarrs::array::ArrayError| self.error(format!("{name}: {err}"));
        let values = match array.data_type() {
            DataType::Float64 => array
                .retrieve_array_subset_elements::<f64>(&subset)
                .map_err(widen)?,
            DataType::Float32 => array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(widen)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::Int64 => array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(widen)?
                .into_iter()
                .map(|v| v as f64)
                .collect(),
            DataType::Int32 => array
                .retrieve_array_subset_elements::<i32>(&subset)
                .map_err(widen)?
                .into_iter()
                .map(f64::from)
                .collect(),
            other => {
                return Err(self.error(format!("{name}: unsupported data type {other:?}")));
            }
        };
        Ok(values)
    }

    fn read_coordinate(&self, store: &Arc<FilesystemStore>, name: &str) -> DataResult<Vec<f64>> {
        let array = self.open_array(store, name)?;
        if array.shape().len() != 1 {
            return Err(self.error(format!(
                "coordinate {name} must be 1-D, found shape {:?}",
                array.shape()
            )));
        }
        self.read_all(&array, name)
    }

    fn read_field(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        grid: (usize, usize, usize),
    ) -> DataResult<Array3<f32>> {
        let array = self.open_array(store, name)?;
        if let Some(dims) = array.attributes().get("_ARRAY_DIMENSIONS") {
            let expected = serde_json::json!([TIME_DIM, LAT_DIM, LON_DIM]);
            if *dims != expected {
                return Err(self.error(format!(
                    "{name}: dimensions {dims} differ from {expected}"
                )));
            }
        }
        let shape: Vec<usize> = array.shape().iter().map(|&d| d as usize).collect();
        let expected = vec![grid.0, grid.1, grid.2];
        if shape != expected {
            return Err(DataError::VariableShape {
                name: name.to_string(),
                expected,
                got: shape,
            });
        }
        let values: Vec<f32> = match array.data_type() {
            DataType::Float32 => {
                let subset = ArraySubset::new_with_shape(array.shape().to_vec());
                array
                    .retrieve_array_subset_elements::<f32>(&subset)
                    .map_err(|err| self.error(format!("{name}: {err}")))?
            }
            _ => self
                .read_all(&array, name)?
                .into_iter()
                .map(|v| v as f32)
                .collect(),
        };
        Array3::from_shape_vec(grid, values).map_err(|_| DataError::VariableShape {
            name: name.to_string(),
            expected: vec![grid.0, grid.1, grid.2],
            got: array.shape().iter().map(|&d| d as usize).collect(),
        })
    }
}

impl FieldSource for ZarrStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self, variables: &[&str]) -> DataResult<OceanDataset> {
        let store = FilesystemStore::new(&self.path)
            .map_err(|err| self.error(err))
            .map(Arc::new)?;
        let time = self.read_coordinate(&store, TIME_DIM)?;
        let lat = self.read_coordinate(&store, LAT_DIM)?;
        let lon = self.read_coordinate(&store, LON_DIM)?;
        let grid = (time.len(), lat.len(), lon.len());
        debug!(?grid, "read coordinates");

        let mut dataset = OceanDataset::new(time, lat, lon);
        for name in variables {
            let values = self.read_field(&store, name, grid)?;
            dataset.insert_variable(*name, values)?;
        }
        info!(
            samples = grid.0,
            lat = grid.1,
            lon = grid.2,
            variables = variables.len(),
            "loaded zarr store"
        );
        Ok(dataset)
    }
}
