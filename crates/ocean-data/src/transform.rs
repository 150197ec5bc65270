// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{DataError, DataResult};
use ndarray::{Array, Array4, Axis, RemoveAxis};
use serde::{Deserialize, Serialize};

/// Per-channel affine map `x -> (x - offset) / scale`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelScaling {
    scale: Vec<f32>,
    offset: Vec<f32>,
}

impl ChannelScaling {
    pub fn identity(channels: usize) -> Self {
        Self {
            scale: vec![1.0; channels],
            offset: vec![0.0; channels],
        }
    }

    /// Builds a scaling from explicit parameters. Scales must be finite and
    /// non-zero so the map stays invertible.
    pub fn new(scale: Vec<f32>, offset: Vec<f32>) -> DataResult<Self> {
        if scale.len() != offset.len() {
            return Err(DataError::Incompatible {
                what: "scale/offset channel count",
                left: scale.len(),
                right: offset.len(),
            });
        }
        if let Some(channel) = scale.iter().position(|s| !s.is_finite() || *s == 0.0) {
            return Err(DataError::InvalidScale {
                channel,
                value: scale[channel],
            });
        }
        Ok(Self { scale, offset })
    }

    pub fn channels(&self) -> usize {
        self.scale.len()
    }

    pub fn scale(&self) -> &[f32] {
        &self.scale
    }

    pub fn offset(&self) -> &[f32] {
        &self.offset
    }

    /// Normalises `values` in place; `channel_axis` indexes the channels.
    pub fn forward_in_place<D: RemoveAxis>(
        &self,
        values: &mut Array<f32, D>,
        channel_axis: Axis,
    ) -> DataResult<()> {
        self.check_channels(values.len_of(channel_axis))?;
        for (c, mut lane) in values.axis_iter_mut(channel_axis).enumerate() {
            let (scale, offset) = (self.scale[c], self.offset[c]);
            lane.mapv_inplace(|x| (x - offset) / scale);
        }
        Ok(())
    }

    /// Maps normalised values back to physical units in place.
    pub fn inverse_in_place<D: RemoveAxis>(
        &self,
        values: &mut Array<f32, D>,
        channel_axis: Axis,
    ) -> DataResult<()> {
        self.check_channels(values.len_of(channel_axis))?;
        for (c, mut lane) in values.axis_iter_mut(channel_axis).enumerate() {
            let (scale, offset) = (self.scale[c], self.offset[c]);
            lane.mapv_inplace(|x| x * scale + offset);
        }
        Ok(())
    }

    fn check_channels(&self, got: usize) -> DataResult<()> {
        if got != self.channels() {
            return Err(DataError::Incompatible {
                what: "channel count",
                left: self.channels(),
                right: got,
            });
        }
        Ok(())
    }
}

/// Feature and target scalings fitted on one subdomain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    pub features: ChannelScaling,
    pub targets: ChannelScaling,
}

/// Fits per-channel scalings from `(time, channel, lat, lon)` fields.
///
/// The scale is the standard deviation over finite values; the offset is the
/// mean when centring is enabled and zero otherwise. Channels without finite
/// values or with zero spread keep a unit scale.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldNormalizer {
    center: bool,
    nan_fill: Option<f32>,
}

impl FieldNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides whether the channel mean is subtracted.
    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// Overrides the value written over non-finite entries after fitting.
    pub fn with_nan_fill(mut self, fill: Option<f32>) -> Self {
        self.nan_fill = fill;
        self
    }

    pub fn nan_fill(&self) -> Option<f32> {
        self.nan_fill
    }

    pub fn fit(&self, fields: &Array4<f32>) -> ChannelScaling {
        let channels = fields.len_of(Axis(1));
        let mut scale = Vec::with_capacity(channels);
        let mut offset = Vec::with_capacity(channels);
        for lane in fields.axis_iter(Axis(1)) {
            let mut count = 0usize;
            let mut sum = 0f64;
            let mut sum_sq = 0f64;
            for &x in lane.iter().filter(|x| x.is_finite()) {
                let x = f64::from(x);
                count += 1;
                sum += x;
                sum_sq += x * x;
            }
            if count == 0 {
                scale.push(1.0);
                offset.push(0.0);
                continue;
            }
            let mean = sum / count as f64;
            let var = (sum_sq / count as f64 - mean * mean).max(0.0);
            let std = var.sqrt() as f32;
            scale.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
            offset.push(if self.center { mean as f32 } else { 0.0 });
        }
        ChannelScaling { scale, offset }
    }

    /// Fits both scalings and applies them, returning what was fitted.
    pub fn fit_transform(
        &self,
        features: &mut Array4<f32>,
        targets: &mut Array4<f32>,
    ) -> DataResult<FittedTransform> {
        let fitted = FittedTransform {
            features: self.fit(features),
            targets: self.fit(targets),
        };
        fitted.features.forward_in_place(features, Axis(1))?;
        fitted.targets.forward_in_place(targets, Axis(1))?;
        if let Some(fill) = self.nan_fill {
            features.mapv_inplace(|x| if x.is_finite() { x } else { fill });
            targets.mapv_inplace(|x| if x.is_finite() { x } else { fill });
        }
        Ok(fitted)
    }
}
