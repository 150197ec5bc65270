// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::Array4;
use ocean_data::Batch;

/// Host batch moved onto a backend device.
#[derive(Clone, Debug)]
pub struct FieldBatch<B: Backend> {
    pub features: Tensor<B, 4>,
    pub targets: Tensor<B, 4>,
}

fn to_tensor<B: Backend>(array: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, c, h, w) = array.dim();
    // `iter` walks in logical row-major order whatever the memory layout.
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [n, c, h, w]), device)
}

impl<B: Backend> FieldBatch<B> {
    pub fn from_host(batch: &Batch, device: &B::Device) -> Self {
        Self {
            features: to_tensor(&batch.features, device),
            targets: to_tensor(&batch.targets, device),
        }
    }

    pub fn len(&self) -> usize {
        self.features.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn copies_values_in_logical_order() {
        let features =
            Array4::from_shape_fn((2, 1, 2, 3), |(n, _, i, j)| (n * 100 + i * 10 + j) as f32);
        // transposed view forces a non-standard layout
        let targets =
            Array4::from_shape_fn((2, 1, 3, 2), |(n, _, j, i)| (n * 100 + i * 10 + j) as f32)
                .permuted_axes([0, 1, 3, 2]);
        let batch = Batch { features: features.clone(), targets };
        let moved = FieldBatch::<NdArray<f32>>::from_host(&batch, &Default::default());
        assert_eq!(moved.len(), 2);
        assert_eq!(moved.features.dims(), [2, 1, 2, 3]);
        assert_eq!(moved.targets.dims(), [2, 1, 2, 3]);
        let expected: Vec<f32> = features.iter().copied().collect();
        assert_eq!(moved.features.into_data().to_vec::<f32>().unwrap(), expected);
        assert_eq!(moved.targets.into_data().to_vec::<f32>().unwrap(), expected);
    }
}
