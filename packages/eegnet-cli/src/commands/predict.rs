use crate::cli::PredictArgs;
use crate::commands::fail;
use crate::exit_codes;
use crate::output;
use eegnet_prep::{Classifier, Dataset, ModelArtifact, PipelineError, Prediction};
use serde::Serialize;

#[derive(Serialize)]
struct PredictOutput {
    index: usize,
    onset: usize,
    predicted_index: usize,
    predicted_label: String,
    confidence: f32,
    raw_probabilities: Vec<f32>,
    true_index: usize,
    true_label: String,
    correct: bool,
}

fn run(args: &PredictArgs) -> Result<PredictOutput, PipelineError> {
    let artifact = ModelArtifact::load(&args.model)?;
    let dataset = Dataset::load(&args.dataset)?;
    artifact.verify_parity(&dataset.pipeline)?;

    let batch = dataset.sample(args.index)?;
    let classifier = artifact.classifier();
    let probabilities = classifier.predict(&batch)?;
    let prediction = Prediction::from_probabilities(probabilities.row(0).to_vec())?;

    let labels = artifact.labels();
    let label = |i: usize| labels.get(&i).cloned().unwrap_or_else(|| "Unknown".to_string());
    let true_index = dataset.labels[args.index];

    Ok(PredictOutput {
        index: args.index,
        onset: dataset.onsets[args.index],
        predicted_index: prediction.predicted_index,
        predicted_label: label(prediction.predicted_index),
        confidence: prediction.confidence,
        raw_probabilities: prediction.probabilities,
        true_index,
        true_label: label(true_index),
        correct: prediction.predicted_index == true_index,
    })
}

pub fn execute(args: PredictArgs) -> i32 {
    let result = match run(&args) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if args.json {
        return output::print_json(&result);
    }

    println!(
        "Epoch {} (onset {}): predicted {} ({:.2}), actual {}",
        result.index, result.onset, result.predicted_label, result.confidence, result.true_label
    );
    exit_codes::SUCCESS
}
