// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{DataError, DataResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Latitude/longitude rectangle selecting one training subdomain.
///
/// Bounds are inclusive coordinate labels, not grid indices.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub long_min: f64,
    pub long_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, long_min: f64, long_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            long_min,
            long_max,
        }
    }

    /// Checks ordering and latitude range. `index` only labels the error.
    pub fn validate(&self, index: usize) -> DataResult<()> {
        let fail = |reason: String| Err(DataError::InvalidBoundingBox { index, reason });
        let values = [self.lat_min, self.lat_max, self.long_min, self.long_max];
        if values.iter().any(|v| !v.is_finite()) {
            return fail("bounds must be finite".to_string());
        }
        if self.lat_min >= self.lat_max {
            return fail(format!(
                "lat_min {} must be below lat_max {}",
                self.lat_min, self.lat_max
            ));
        }
        if self.long_min >= self.long_max {
            return fail(format!(
                "long_min {} must be below long_max {}",
                self.long_min, self.long_max
            ));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return fail("latitudes must lie within [-90, 90]".to_string());
        }
        Ok(())
    }

    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn contains_long(&self, long: f64) -> bool {
        long >= self.long_min && long <= self.long_max
    }
}

/// Parses a YAML list of bounding boxes and validates each entry.
pub fn parse_bounding_boxes_yaml(text: &str, origin: &Path) -> DataResult<Vec<BoundingBox>> {
    let boxes: Vec<BoundingBox> =
        serde_yaml::from_str(text).map_err(|source| DataError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
    if boxes.is_empty() {
        return Err(DataError::Empty("subdomains file"));
    }
    for (index, bbox) in boxes.iter().enumerate() {
        bbox.validate(index)?;
    }
    Ok(boxes)
}

/// Loads the subdomain definitions used to cut the training grid.
pub fn load_bounding_boxes_yaml(path: impl AsRef<Path>) -> DataResult<Vec<BoundingBox>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bounding_boxes_yaml(&text, path)
}
