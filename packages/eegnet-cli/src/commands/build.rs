use crate::cli::BuildArgs;
use crate::commands::{fail, load_config, load_input};
use crate::exit_codes;
use crate::output;
use eegnet_prep::OfflineBuilder;
use serde::Serialize;

#[derive(Serialize)]
struct BuildOutput {
    dataset_id: String,
    output: String,
    epochs: usize,
    x_shape: Vec<usize>,
    y_shape: Vec<usize>,
    class_counts: Vec<usize>,
    channels: Vec<String>,
    pipeline_fingerprint: String,
}

pub fn execute(args: BuildArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let builder = match OfflineBuilder::new(config.clone()) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let recording = match load_input(&args.input, &config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Building dataset from {} samples × {} channels...",
        recording.n_samples(),
        recording.channels().len()
    );

    let dataset = match builder.build(&recording) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    if let Err(e) = dataset.save(&args.output) {
        return fail(e);
    }

    let summary = BuildOutput {
        dataset_id: dataset.id.to_string(),
        output: args.output.clone(),
        epochs: dataset.len(),
        x_shape: dataset.x.shape().to_vec(),
        y_shape: dataset.y.shape().to_vec(),
        class_counts: dataset.class_counts(),
        channels: dataset.channels.clone(),
        pipeline_fingerprint: dataset.pipeline_fingerprint.clone(),
    };

    if args.json {
        return output::print_json(&summary);
    }

    println!("Wrote {} epochs to {}", summary.epochs, summary.output);
    println!("  X: {:?}", summary.x_shape);
    println!("  y: {:?}", summary.y_shape);
    println!("  Per class: {:?}", summary.class_counts);
    println!("  Pipeline: {}", summary.pipeline_fingerprint);
    exit_codes::SUCCESS
}
