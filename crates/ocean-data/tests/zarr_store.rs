// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ocean_data::{
    split_train_test, BoundingBox, ConcatDataset, DataError, DataLoader, FieldDataset,
    FieldNormalizer, FieldSource, SubdomainDataset, ZarrStore, FEATURE_VARS, TARGET_VARS,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn write_array(
    root: &Path,
    name: &str,
    shape: &[usize],
    dtype: &str,
    bytes: Vec<u8>,
    dims: &[&str],
) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let meta = json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": shape,
        "dtype": dtype,
        "compressor": null,
        "fill_value": 0.0,
        "filters": null,
        "order": "C",
    });
    fs::write(dir.join(".zarray"), meta.to_string()).unwrap();
    fs::write(
        dir.join(".zattrs"),
        json!({ "_ARRAY_DIMENSIONS": dims }).to_string(),
    )
    .unwrap();
    let key = vec!["0"; shape.len()].join(".");
    fs::write(dir.join(key), bytes).unwrap();
}

fn f32_bytes(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(f32::to_le_bytes).collect()
}

fn f64_bytes(values: impl IntoIterator<Item = f64>) -> Vec<u8> {
    values.into_iter().flat_map(f64::to_le_bytes).collect()
}

/// Store with 6 time steps on an 8x10 grid spanning lat 0..7, lon -5..4.
fn write_store(root: &Path) {
    let (t, h, w) = (6usize, 8usize, 10usize);
    fs::create_dir_all(root).unwrap();
    fs::write(root.join(".zgroup"), json!({ "zarr_format": 2 }).to_string()).unwrap();
    write_array(root, "time", &[t], "<f8", f64_bytes((0..t).map(|v| v as f64)), &["time"]);
    write_array(root, "yu_ocean", &[h], "<f4", f32_bytes((0..h).map(|v| v as f32)), &["yu_ocean"]);
    write_array(
        root,
        "xu_ocean",
        &[w],
        "<f4",
        f32_bytes((0..w).map(|v| v as f32 - 5.0)),
        &["xu_ocean"],
    );
    for (k, name) in FEATURE_VARS.iter().chain(TARGET_VARS.iter()).enumerate() {
        let values = (0..t * h * w).map(|flat| (k as f32 + 1.0) * (flat as f32 + 1.0));
        write_array(
            root,
            name,
            &[t, h, w],
            "<f4",
            f32_bytes(values),
            &["time", "yu_ocean", "xu_ocean"],
        );
    }
}

#[test]
fn loads_coordinates_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("forcing.zarr");
    write_store(&root);

    let store = ZarrStore::open(&root).unwrap();
    let ds = store.load(&["usurf", "S_y"]).unwrap();
    assert_eq!(ds.grid_shape(), (6, 8, 10));
    assert_eq!(ds.lon()[0], -5.0);
    let usurf = ds.variable("usurf").unwrap();
    assert_eq!(usurf[[0, 0, 0]], 1.0);
    assert_eq!(usurf[[1, 2, 3]], (80 + 20 + 3 + 1) as f32);
    assert_eq!(ds.variable("S_y").unwrap()[[0, 0, 1]], 8.0);
}

#[test]
fn missing_store_and_variable_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ZarrStore::open(dir.path().join("absent.zarr")),
        Err(DataError::Io { .. })
    ));

    let root = dir.path().join("forcing.zarr");
    write_store(&root);
    let store = ZarrStore::open(&root).unwrap();
    let err = store.load(&["temperature"]).unwrap_err();
    assert!(
        matches!(err, DataError::MissingVariable { .. } | DataError::Zarr { .. }),
        "{err:?}"
    );
}

#[test]
fn store_to_batches_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("forcing.zarr");
    write_store(&root);
    let all_vars: Vec<&str> = FEATURE_VARS.iter().chain(TARGET_VARS.iter()).copied().collect();
    let ds = ZarrStore::open(&root).unwrap().load(&all_vars).unwrap();

    let normalizer = FieldNormalizer::new();
    let boxes = [
        BoundingBox::new(0.0, 5.0, -5.0, 0.0),
        BoundingBox::new(2.0, 7.0, -2.0, 4.0),
    ];
    let mut tests = Vec::new();
    let mut trains = Vec::new();
    for bbox in &boxes {
        let mut sub = SubdomainDataset::from_region(&ds, bbox, &normalizer).unwrap();
        let (h, w) = sub.feature_shape();
        sub.add_transforms_from_model((h - 2, w - 2)).unwrap();
        let (train, test) = split_train_test(Arc::new(sub), 0.5, 0.5).unwrap();
        trains.push(train);
        tests.push(test);
    }
    let train = ConcatDataset::new(trains).unwrap();
    let test = ConcatDataset::new(tests).unwrap();
    assert_eq!(train.len(), 6);
    assert_eq!(test.len(), 6);
    assert_eq!(train.feature_shape(), (6, 6));
    assert_eq!(train.target_shape(), (4, 4));

    let loader = DataLoader::new(Arc::new(train))
        .batched(4)
        .shuffle(3)
        .drop_last(true)
        .prefetch(2);
    let batches: Vec<_> = loader.epoch(0).collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].features.dim(), (4, 2, 6, 6));
    assert_eq!(batches[0].targets.dim(), (4, 2, 4, 4));
}
