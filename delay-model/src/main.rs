use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use delay_model::dataset::Dataset;
use delay_model::logistic::TrainingOptions;
use delay_model::report::ClassificationReport;
use delay_model::DelayModel;

/// Train the flight delay classifier on a historical flights CSV.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the flights dataset (data.csv)
    #[arg(long)]
    data: PathBuf,

    /// Where to write the trained model, as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Share of rows held out for evaluation. Use 0 to evaluate on the training set.
    #[arg(long, default_value_t = 0.33)]
    test_size: f64,

    /// Seed for the train/test shuffle
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Sample weight of delayed flights relative to on-time ones
    #[arg(long, default_value_t = 10.0)]
    delay_weight: f64,

    /// Inverse regularization strength
    #[arg(long, default_value_t = 1.0)]
    inverse_regularization: f64,
}

fn run(cli: Cli) -> Result<()> {
    let dataset = Dataset::from_path(&cli.data)
        .with_context(|| format!("failed to load {}", cli.data.display()))?;
    info!(rows = dataset.len(), "loaded dataset");

    let (train, test) = dataset.train_test_split(cli.test_size, cli.seed)?;
    info!(train = train.len(), test = test.len(), "split dataset");

    let options = TrainingOptions {
        class_weight: [1.0, cli.delay_weight],
        c: cli.inverse_regularization,
        ..TrainingOptions::default()
    };

    let mut model = DelayModel::new();
    let (x_train, y_train) = model.preprocess(&train);
    model.fit_with(&x_train, &y_train, &options)?;

    let evaluation = if test.is_empty() { &train } else { &test };
    let (x_eval, y_eval) = model.preprocess(evaluation);
    let report = ClassificationReport::new(&y_eval, &model.predict(&x_eval));
    println!("{report}");

    if let Some(mean) = model.predict_proba(&x_eval).and_then(|proba| proba.mean()) {
        info!(mean_delay_probability = mean, "scored evaluation set");
    }

    if let Some(output) = cli.output {
        model
            .save(&output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!(path = %output.display(), "saved model");
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Cli::parse()) {
        error!("training failed: {:#}", e);
        std::process::exit(1);
    }
}
