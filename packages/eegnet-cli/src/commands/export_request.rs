use crate::cli::ExportRequestArgs;
use crate::commands::{fail, load_config, load_input};
use crate::exit_codes;
use crate::output;
use eegnet_prep::{OfflineBuilder, PipelineError, TensorNormalizer};
use serde::Serialize;

/// Body accepted by the serving endpoint
#[derive(Serialize)]
struct PredictRequest {
    data: Vec<Vec<f64>>,
}

fn run(args: &ExportRequestArgs) -> Result<(PredictRequest, usize, usize), PipelineError> {
    let config = load_config(args.config.as_deref())?;
    let builder = OfflineBuilder::new(config.clone())?;
    let recording = load_input(&args.input, &config)?;

    let (_, epochs, _) = builder.extract_epochs(&recording)?;
    let epoch = epochs.get(args.index).ok_or_else(|| {
        PipelineError::Shape(format!(
            "Epoch index {} out of range ({} epochs fit the recording)",
            args.index,
            epochs.len()
        ))
    })?;

    // Native units: only the truncation half of normalization applies
    let window = TensorNormalizer::from_config(&config).truncate(epoch.data.view())?;
    let data = window.rows().into_iter().map(|r| r.to_vec()).collect();
    Ok((PredictRequest { data }, epoch.onset, epoch.label))
}

pub fn execute(args: ExportRequestArgs) -> i32 {
    let (request, onset, label) = match run(&args) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let json = match output::to_json(&request, true) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    eprintln!(
        "Exported epoch {} (onset {}, class {}): {} × {}",
        args.index,
        onset,
        label,
        request.data.len(),
        request.data.first().map(|r| r.len()).unwrap_or(0)
    );
    exit_codes::SUCCESS
}
