use crate::cli::FitArgs;
use crate::commands::fail;
use crate::exit_codes;
use crate::output;
use eegnet_prep::{
    ArchitectureParams, Classifier, Dataset, LinearReadout, ModelArtifact, PipelineError,
    Prediction,
};
use serde::Serialize;

#[derive(Serialize)]
struct FitOutput {
    output: String,
    name: String,
    epochs: usize,
    training_accuracy: f64,
    pipeline_fingerprint: String,
}

fn accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    correct as f64 / actual.len() as f64
}

fn run(args: &FitArgs) -> Result<FitOutput, PipelineError> {
    let dataset = Dataset::load(&args.dataset)?;
    let readout = LinearReadout::fit_centroids(&dataset)?;
    let architecture = ArchitectureParams {
        dropout: args.dropout.into(),
        ..ArchitectureParams::default()
    };
    let artifact = ModelArtifact::new(&args.name, dataset.pipeline.clone(), architecture, readout)?;

    let probabilities = artifact.readout.predict(&dataset.x)?;
    let predicted = probabilities
        .rows()
        .into_iter()
        .map(|row| Prediction::from_probabilities(row.to_vec()).map(|p| p.predicted_index))
        .collect::<Result<Vec<_>, _>>()?;

    artifact.save(&args.output)?;

    Ok(FitOutput {
        output: args.output.clone(),
        name: artifact.name.clone(),
        epochs: dataset.len(),
        training_accuracy: accuracy(&predicted, &dataset.labels),
        pipeline_fingerprint: artifact.pipeline_fingerprint,
    })
}

pub fn execute(args: FitArgs) -> i32 {
    let result = match run(&args) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if args.json {
        return output::print_json(&result);
    }

    println!(
        "Wrote model '{}' to {} ({} epochs, training accuracy {:.1}%)",
        result.name,
        result.output,
        result.epochs,
        result.training_accuracy * 100.0
    );
    exit_codes::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 3], &[0, 1, 0, 3]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }
}
