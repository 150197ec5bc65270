// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Data preparation, model construction and the training session behind
//! one `gz21-train` invocation.

use crate::config::TrainConfig;
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use ocean_config::determinism::{self, SeedConfig};
use ocean_config::RunDirectories;
use ocean_data::{
    load_bounding_boxes_yaml, split_train_test, ConcatDataset, DataLoader, FieldDataset,
    FieldNormalizer, FieldSource, FittedTransform, Subset, SubdomainDataset, ZarrStore,
    FEATURE_VARS, TARGET_VARS,
};
use ocean_nn::{
    parse_device, save_weights, write_architecture, write_transforms, AdamSettings,
    EarlyStopping, FieldLoss, FieldNet, FinalTransform, FullyCnn, FullyCnnConfig,
    HeteroskedasticGaussianLossV2, MultiStepLr, NnError, SessionReport, TrainBackend, Trainer,
    TrainingSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, warn};

type Split = ConcatDataset<Subset<Arc<SubdomainDataset>>>;

/// What a finished run produced.
#[derive(Debug)]
pub struct TrainSummary {
    pub weights: PathBuf,
    pub run_dir: PathBuf,
    pub report: SessionReport,
}

struct PreparedData {
    train: Split,
    test: Split,
    transforms: Vec<FittedTransform>,
}

/// Loads the store, fits one subdomain per bounding box, crops targets to
/// the model output and splits every subdomain along time.
fn prepare_data<N: FieldNet<TrainBackend>>(config: &TrainConfig, net: &N) -> Result<PreparedData> {
    let _span = info_span!("prepare_data").entered();
    let boxes = load_bounding_boxes_yaml(&config.subdomains_file)?;
    let store = ZarrStore::open(&config.in_train_data_dir)?;
    let variables: Vec<&str> = FEATURE_VARS.iter().chain(TARGET_VARS.iter()).copied().collect();
    let dataset = store.load(&variables)?;

    let normalizer = FieldNormalizer::new();
    let mut trains = Vec::with_capacity(boxes.len());
    let mut tests = Vec::with_capacity(boxes.len());
    let mut transforms = Vec::with_capacity(boxes.len());
    for (index, bbox) in boxes.iter().enumerate() {
        let mut subdomain = SubdomainDataset::from_region(&dataset, bbox, &normalizer)
            .with_context(|| format!("subdomain {index} ({bbox:?})"))?;
        let (h, w) = subdomain.feature_shape();
        let output = net
            .output_size(h, w)
            .ok_or(NnError::InputTooSmall {
                height: h,
                width: w,
            })
            .with_context(|| format!("subdomain {index} ({bbox:?})"))?;
        subdomain.add_transforms_from_model(output)?;
        info!(
            index,
            samples = subdomain.len(),
            features = ?(h, w),
            targets = ?output,
            "subdomain ready"
        );
        transforms.push(subdomain.transform().clone());
        let (train, test) = split_train_test(
            Arc::new(subdomain),
            config.train_split_end,
            config.test_split_start,
        )?;
        trains.push(train);
        tests.push(test);
    }

    Ok(PreparedData {
        train: ConcatDataset::new(trains).context("training split")?,
        test: ConcatDataset::new(tests).context("test split")?,
        transforms,
    })
}

fn build_model(
    config: &TrainConfig,
    loss: &HeteroskedasticGaussianLossV2,
    device: &<TrainBackend as Backend>::Device,
) -> Result<FullyCnn<TrainBackend>> {
    let model = FullyCnnConfig::new(FEATURE_VARS.len(), loss.n_required_channels())
        .with_padding_str(&config.padding)?
        .with_batch_norm(config.batch_norm)
        .with_final_transform(FinalTransform::softplus_precision(loss.precision_indices()))
        .init::<TrainBackend>(device)?;
    Ok(model)
}

/// Runs a full training job described by `config`.
pub fn train_on(config: &TrainConfig) -> Result<TrainSummary> {
    let seeds = determinism::configure(SeedConfig::resolve(config.seed));
    TrainBackend::seed(seeds.seed_for("weights"));
    let device = parse_device(&config.device)?;

    let run_dirs = RunDirectories::create_temp().context("creating the run directory")?;
    warn!(
        run_dir = %run_dirs.root().display(),
        "run directory is kept after the run and must be removed by hand"
    );

    let loss = HeteroskedasticGaussianLossV2::new(TARGET_VARS.len());
    let model = build_model(config, &loss, &device)?;
    let data = prepare_data(config, &model)?;
    info!(
        train = data.train.len(),
        test = data.test.len(),
        feature_shape = ?data.train.feature_shape(),
        target_shape = ?data.train.target_shape(),
        "datasets ready"
    );

    write_architecture(&run_dirs.models(), &model.describe())?;
    write_transforms(&run_dirs.models(), &data.transforms)?;

    let train_loader = DataLoader::new(Arc::new(data.train))
        .batched(config.batch_size)
        .shuffle(seeds.seed_for("shuffle"))
        .drop_last(true)
        .prefetch(config.num_workers);
    let test_loader = DataLoader::new(Arc::new(data.test))
        .batched(config.batch_size)
        .drop_last(true)
        .prefetch(config.num_workers);

    let adam = AdamSettings::default()
        .with_weight_decay(config.weight_decay)
        .with_clip(config.clip);
    let optimizer = adam.init::<TrainBackend, FullyCnn<TrainBackend>>();
    let scheduler = MultiStepLr::new(
        config.initial_learning_rate,
        config.decay_factor,
        config.decay_at_epoch_milestones.clone(),
    )?;
    // Metrics are reported in the physical units of the first subdomain.
    let metric_scaling = data.transforms.first().map(|t| t.targets.clone());
    let trainer: Trainer<TrainBackend, _, _> = Trainer::new(loss, optimizer, scheduler, device)
        .with_printevery(config.printevery)
        .with_grad_clip(adam.clipping())
        .with_early_stopping(EarlyStopping::new(config.early_stopping_patience))
        .with_metric_transform(metric_scaling);

    let mut session = TrainingSession::new(trainer, config.epochs);
    let (model, report) = session.run(model, &train_loader, &test_loader)?;

    let weights = save_weights(&model, &config.out_model)?;
    info!(path = %weights.display(), state = %report.state, "model saved");
    Ok(TrainSummary {
        weights,
        run_dir: run_dirs.root().to_path_buf(),
        report,
    })
}
