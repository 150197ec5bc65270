// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde_json::json;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run_cli(args: &[&str], tmp: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gz21-train"))
        .args(args)
        .env("TMPDIR", tmp)
        .env_remove("RUST_LOG")
        .env_remove("OCEAN_TRACE_CHROME")
        .output()
        .unwrap()
}

fn base_args<'a>(store: &'a str, subdomains: &'a str, out: &'a str) -> Vec<&'a str> {
    vec![
        "--in-train-data-dir",
        store,
        "--subdomains-file",
        subdomains,
        "--batch-size",
        "2",
        "--epochs",
        "1",
        "--out-model",
        out,
        "--initial-learning-rate",
        "0.0005",
        "--decay-factor",
        "0.1",
        "--train-split-end",
        "0.5",
        "--test-split-start",
        "0.5",
        "--num-workers",
        "0",
    ]
}

fn write_array(root: &Path, name: &str, shape: &[usize], bytes: Vec<u8>, dims: &[&str]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let meta = json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": shape,
        "dtype": "<f4",
        "compressor": null,
        "fill_value": 0.0,
        "filters": null,
        "order": "C",
    });
    fs::write(dir.join(".zarray"), meta.to_string()).unwrap();
    fs::write(dir.join(".zattrs"), json!({ "_ARRAY_DIMENSIONS": dims }).to_string()).unwrap();
    fs::write(dir.join(vec!["0"; shape.len()].join(".")), bytes).unwrap();
}

fn f32_bytes(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(f32::to_le_bytes).collect()
}

/// Six snapshots of smooth fields on a 24x24 grid, lat 30..53, lon -60..-37.
fn write_store(root: &Path) {
    let (t, h, w) = (6usize, 24usize, 24usize);
    fs::create_dir_all(root).unwrap();
    fs::write(root.join(".zgroup"), json!({ "zarr_format": 2 }).to_string()).unwrap();
    write_array(root, "time", &[t], f32_bytes((0..t).map(|v| v as f32)), &["time"]);
    write_array(root, "yu_ocean", &[h], f32_bytes((0..h).map(|v| 30.0 + v as f32)), &["yu_ocean"]);
    write_array(root, "xu_ocean", &[w], f32_bytes((0..w).map(|v| v as f32 - 60.0)), &["xu_ocean"]);
    for (k, name) in ["usurf", "vsurf", "S_x", "S_y"].iter().enumerate() {
        let values = (0..t * h * w).map(|flat| {
            let (s, i, j) = (flat / (h * w), (flat / w) % h, flat % w);
            ((i as f32 * 0.3 + s as f32).sin() + (j as f32 * 0.2 + k as f32).cos()) * 0.1
        });
        write_array(root, name, &[t, h, w], f32_bytes(values), &["time", "yu_ocean", "xu_ocean"]);
    }
}

#[test]
fn repeated_milestones_exit_with_usage_code_before_loading_data() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.zarr");
    let out = dir.path().join("model");
    let mut args = base_args(
        missing.to_str().unwrap(),
        "absent.yaml",
        out.to_str().unwrap(),
    );
    args.extend(["--decay-at-epoch-milestones", "1", "2", "2"]);
    let output = run_cli(&args, dir.path());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("epoch milestones list is not strictly increasing"),
        "{stderr}"
    );
    assert!(!stderr.contains("absent.zarr"), "{stderr}");
}

#[test]
fn increasing_milestones_proceed_and_fail_on_the_missing_store() {
    let dir = tempdir().unwrap();
    let subdomains = dir.path().join("subdomains.yaml");
    fs::write(&subdomains, "- {lat_min: 35, lat_max: 50, long_min: -50, long_max: -20}\n").unwrap();
    let missing = dir.path().join("absent.zarr");
    let out = dir.path().join("model");
    let mut args = base_args(
        missing.to_str().unwrap(),
        subdomains.to_str().unwrap(),
        out.to_str().unwrap(),
    );
    args.extend(["--decay-at-epoch-milestones", "1", "3", "5"]);
    let output = run_cli(&args, dir.path());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.zarr"), "{stderr}");
}

#[test]
fn missing_required_option_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let output = run_cli(&["--decay-at-epoch-milestones", "1"], dir.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--batch-size"));
}

#[test]
fn unsupported_device_fails_at_runtime() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("model");
    let mut args = base_args("store.zarr", "boxes.yaml", out.to_str().unwrap());
    args.extend(["--decay-at-epoch-milestones", "1", "--device", "cuda:0"]);
    let output = run_cli(&args, dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cuda:0"));
}

#[test]
fn config_file_supplies_options_and_trains_a_model() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("forcing.zarr");
    write_store(&store);
    let subdomains = dir.path().join("subdomains.yaml");
    fs::write(
        &subdomains,
        "- {lat_min: 30, lat_max: 53, long_min: -60, long_max: -37}\n",
    )
    .unwrap();
    let out = dir.path().join("weights").join("trained_model.pth");
    let config = dir.path().join("train.json");
    fs::write(
        &config,
        json!({
            "in-train-data-dir": store,
            "subdomains-file": subdomains,
            "batch-size": 2,
            "epochs": 1,
            "out-model": out,
            "initial-learning-rate": 0.0005,
            "decay-factor": 0.1,
            "decay-at-epoch-milestones": [5],
            "train-split-end": 0.5,
            "test-split-start": 0.5,
            "num-workers": 1,
            "printevery": 1,
            "seed": 3,
        })
        .to_string(),
    )
    .unwrap();

    let output = run_cli(&["--config-file", config.to_str().unwrap()], dir.path());
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(out.with_extension("mpk").is_file());

    let run_dir = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("gz21-train-"))
        })
        .expect("run directory under TMPDIR");
    let models = run_dir.join("models");
    let architecture = fs::read_to_string(models.join("nn_architecture.txt")).unwrap();
    assert!(architecture.starts_with("FullyCnn("));
    assert!(models.join("transforms.json").is_file());
}
