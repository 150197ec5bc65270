// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::bounding_box::BoundingBox;
use crate::error::{DataError, DataResult};
use ndarray::{Array3, Axis};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the sample (time) dimension.
pub const TIME_DIM: &str = "time";
/// Latitude dimension of the velocity grid.
pub const LAT_DIM: &str = "yu_ocean";
/// Longitude dimension of the velocity grid.
pub const LON_DIM: &str = "xu_ocean";

/// Anything able to produce gridded ocean fields.
pub trait FieldSource {
    /// Loads the named `(time, lat, lon)` variables together with coordinates.
    fn load(&self, variables: &[&str]) -> DataResult<OceanDataset>;
}

/// In-memory gridded dataset: three coordinate axes and named variables laid
/// out as `(time, lat, lon)`.
#[derive(Clone, Debug, Default)]
pub struct OceanDataset {
    time: Vec<f64>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    variables: BTreeMap<String, Array3<f32>>,
}

impl OceanDataset {
    pub fn new(time: Vec<f64>, lat: Vec<f64>, lon: Vec<f64>) -> Self {
        Self {
            time,
            lat,
            lon,
            variables: BTreeMap::new(),
        }
    }

    /// Builder variant of [`OceanDataset::insert_variable`].
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        values: Array3<f32>,
    ) -> DataResult<Self> {
        self.insert_variable(name, values)?;
        Ok(self)
    }

    /// Adds a variable, checking it matches the coordinate grid.
    pub fn insert_variable(
        &mut self,
        name: impl Into<String>,
        values: Array3<f32>,
    ) -> DataResult<()> {
        let name = name.into();
        let (t, h, w) = self.grid_shape();
        if values.dim() != (t, h, w) {
            return Err(DataError::VariableShape {
                name,
                expected: vec![t, h, w],
                got: values.shape().to_vec(),
            });
        }
        self.variables.insert(name, values);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> DataResult<&Array3<f32>> {
        self.variables
            .get(name)
            .ok_or_else(|| DataError::MissingVariable {
                name: name.to_string(),
            })
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// `(time, lat, lon)` lengths.
    pub fn grid_shape(&self) -> (usize, usize, usize) {
        (self.time.len(), self.lat.len(), self.lon.len())
    }

    /// Restricts every variable to the grid points inside `bbox`.
    ///
    /// Selection is by coordinate label and inclusive at both ends, so the
    /// result does not depend on whether a coordinate axis is ascending.
    pub fn bound(&self, bbox: &BoundingBox) -> DataResult<OceanDataset> {
        let lat_idx: Vec<usize> = self
            .lat
            .iter()
            .enumerate()
            .filter(|(_, lat)| bbox.contains_lat(**lat))
            .map(|(idx, _)| idx)
            .collect();
        if lat_idx.is_empty() {
            return Err(DataError::EmptySelection { axis: LAT_DIM });
        }
        let lon_idx: Vec<usize> = self
            .lon
            .iter()
            .enumerate()
            .filter(|(_, lon)| bbox.contains_long(**lon))
            .map(|(idx, _)| idx)
            .collect();
        if lon_idx.is_empty() {
            return Err(DataError::EmptySelection { axis: LON_DIM });
        }

        let mut bounded = OceanDataset::new(
            self.time.clone(),
            lat_idx.iter().map(|&i| self.lat[i]).collect(),
            lon_idx.iter().map(|&i| self.lon[i]).collect(),
        );
        for (name, values) in &self.variables {
            let cut = values.select(Axis(1), &lat_idx).select(Axis(2), &lon_idx);
            bounded.variables.insert(name.clone(), cut);
        }
        debug!(
            lat = lat_idx.len(),
            lon = lon_idx.len(),
            "bounded dataset to subdomain"
        );
        Ok(bounded)
    }
}
