// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::bounding_box::BoundingBox;
use crate::dataset::FieldDataset;
use crate::error::{DataError, DataResult};
use crate::ocean::OceanDataset;
use crate::transform::{FieldNormalizer, FittedTransform};
use ndarray::{s, stack, Array3, Array4, ArrayView3, Axis};
use tracing::debug;

/// Velocity variables fed to the network, in channel order.
pub const FEATURE_VARS: [&str; 2] = ["usurf", "vsurf"];
/// Subgrid forcing variables the network predicts, in channel order.
pub const TARGET_VARS: [&str; 2] = ["S_x", "S_y"];

/// One training example: `(channel, lat, lon)` features and targets.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub features: Array3<f32>,
    pub targets: Array3<f32>,
}

/// Raw stacked fields of a region, laid out `(time, channel, lat, lon)`.
#[derive(Clone, Debug)]
pub struct SubdomainFields {
    features: Array4<f32>,
    targets: Array4<f32>,
}

impl SubdomainFields {
    pub fn new(features: Array4<f32>, targets: Array4<f32>) -> DataResult<Self> {
        let (ft, _, fh, fw) = features.dim();
        let (tt, _, th, tw) = targets.dim();
        if ft != tt {
            return Err(DataError::Incompatible {
                what: "feature/target time length",
                left: ft,
                right: tt,
            });
        }
        if (fh, fw) != (th, tw) {
            return Err(DataError::Incompatible {
                what: "feature/target latitude length",
                left: fh,
                right: th,
            });
        }
        Ok(Self { features, targets })
    }

    /// Stacks the named variables of `dataset` along a new channel axis.
    pub fn from_dataset(
        dataset: &OceanDataset,
        features: &[&str],
        targets: &[&str],
    ) -> DataResult<Self> {
        Self::new(
            stack_variables(dataset, features)?,
            stack_variables(dataset, targets)?,
        )
    }

    pub fn features(&self) -> &Array4<f32> {
        &self.features
    }

    pub fn targets(&self) -> &Array4<f32> {
        &self.targets
    }
}

fn stack_variables(dataset: &OceanDataset, names: &[&str]) -> DataResult<Array4<f32>> {
    if names.is_empty() {
        return Err(DataError::Empty("variable list"));
    }
    let views = names
        .iter()
        .map(|name| dataset.variable(name).map(|values| values.view()))
        .collect::<DataResult<Vec<ArrayView3<'_, f32>>>>()?;
    let (t, h, w) = dataset.grid_shape();
    stack(Axis(1), &views).map_err(|_| DataError::VariableShape {
        name: names.join(","),
        expected: vec![t, names.len(), h, w],
        got: Vec::new(),
    })
}

/// Centre crop of the two trailing axes of a `(channel, lat, lon)` field.
pub fn crop_center(field: &Array3<f32>, size: (usize, usize)) -> DataResult<Array3<f32>> {
    let (_, h, w) = field.dim();
    let (oh, ow) = size;
    if oh > h || ow > w {
        return Err(DataError::CropTooLarge {
            requested: size,
            available: (h, w),
        });
    }
    if (oh, ow) == (h, w) {
        return Ok(field.clone());
    }
    let top = (h - oh) / 2;
    let left = (w - ow) / 2;
    Ok(field
        .slice(s![.., top..top + oh, left..left + ow])
        .to_owned())
}

/// Normalised fields of one spatial subdomain.
///
/// The transform is fitted on this subdomain only. Targets can be cropped to
/// the spatial size a model produces, which is what
/// [`SubdomainDataset::add_transforms_from_model`] installs.
#[derive(Clone, Debug)]
pub struct SubdomainDataset {
    features: Array4<f32>,
    targets: Array4<f32>,
    transform: FittedTransform,
    target_crop: Option<(usize, usize)>,
    bounding_box: Option<BoundingBox>,
}

impl SubdomainDataset {
    /// Fits `normalizer` on the fields and keeps the normalised copies.
    pub fn fit(fields: SubdomainFields, normalizer: &FieldNormalizer) -> DataResult<Self> {
        let SubdomainFields {
            mut features,
            mut targets,
        } = fields;
        let transform = normalizer.fit_transform(&mut features, &mut targets)?;
        debug!(
            samples = features.len_of(Axis(0)),
            feature_scale = ?transform.features.scale(),
            target_scale = ?transform.targets.scale(),
            "fitted subdomain transform"
        );
        Ok(Self {
            features,
            targets,
            transform,
            target_crop: None,
            bounding_box: None,
        })
    }

    /// Bounds `dataset` to `bbox` and fits a subdomain on the default variables.
    pub fn from_region(
        dataset: &OceanDataset,
        bbox: &BoundingBox,
        normalizer: &FieldNormalizer,
    ) -> DataResult<Self> {
        let region = dataset.bound(bbox)?;
        let fields = SubdomainFields::from_dataset(&region, &FEATURE_VARS, &TARGET_VARS)?;
        let mut subdomain = Self::fit(fields, normalizer)?;
        subdomain.bounding_box = Some(*bbox);
        Ok(subdomain)
    }

    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.as_ref()
    }

    pub fn transform(&self) -> &FittedTransform {
        &self.transform
    }

    /// Crops targets to the spatial size produced by a model for this
    /// subdomain's input size.
    pub fn add_transforms_from_model(&mut self, output_size: (usize, usize)) -> DataResult<()> {
        let (_, _, h, w) = self.targets.dim();
        if output_size.0 > h || output_size.1 > w {
            return Err(DataError::CropTooLarge {
                requested: output_size,
                available: (h, w),
            });
        }
        self.target_crop = Some(output_size);
        Ok(())
    }

    /// Maps a normalised `(batch, channel, lat, lon)` target block back to
    /// physical units.
    pub fn inverse_transform_target(&self, targets: &mut Array4<f32>) -> DataResult<()> {
        self.transform.targets.inverse_in_place(targets, Axis(1))
    }
}

impl FieldDataset for SubdomainDataset {
    fn len(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    fn get(&self, index: usize) -> DataResult<Sample> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        let features = self.features.index_axis(Axis(0), index).to_owned();
        let targets = self.targets.index_axis(Axis(0), index).to_owned();
        let targets = match self.target_crop {
            Some(size) => crop_center(&targets, size)?,
            None => targets,
        };
        Ok(Sample { features, targets })
    }

    fn n_features(&self) -> usize {
        self.features.len_of(Axis(1))
    }

    fn n_targets(&self) -> usize {
        self.targets.len_of(Axis(1))
    }

    fn feature_shape(&self) -> (usize, usize) {
        let (_, _, h, w) = self.features.dim();
        (h, w)
    }

    fn target_shape(&self) -> (usize, usize) {
        self.target_crop.unwrap_or_else(|| {
            let (_, _, h, w) = self.targets.dim();
            (h, w)
        })
    }
}
