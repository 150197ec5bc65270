// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Host-side data pipeline for the gz21 ocean momentum models.
//!
//! Velocity and forcing fields are read from a zarr store, cut into spatial
//! subdomains by bounding boxes, normalised per subdomain, split along time
//! and concatenated into one dataset that the [`DataLoader`] batches.

pub mod bounding_box;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod ocean;
pub mod subdomain;
pub mod transform;
pub mod zarr;

pub use bounding_box::{load_bounding_boxes_yaml, parse_bounding_boxes_yaml, BoundingBox};
pub use dataset::{at_idx_pct, split_train_test, ConcatDataset, FieldDataset, Subset};
pub use error::{DataError, DataResult};
pub use loader::{Batch, DataLoader, EpochBatches};
pub use ocean::{FieldSource, OceanDataset, LAT_DIM, LON_DIM, TIME_DIM};
pub use subdomain::{
    crop_center, Sample, SubdomainDataset, SubdomainFields, FEATURE_VARS, TARGET_VARS,
};
pub use transform::{ChannelScaling, FieldNormalizer, FittedTransform};
pub use zarr::ZarrStore;
