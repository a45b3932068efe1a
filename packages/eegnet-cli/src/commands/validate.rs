use crate::cli::ValidateArgs;
use crate::commands::{exit_code_for, fail, load_config};
use crate::exit_codes;
use crate::output;
use eegnet_prep::{load_recording, Channel, FileType, OfflineBuilder, PipelineError, Recording};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize, Default)]
struct ValidateOutput {
    file: String,
    file_type: Option<String>,
    sample_rate: Option<f64>,
    n_samples: Option<usize>,
    channels: Vec<Channel>,
    segments: Vec<usize>,
    annotations: usize,
    task_events: Option<usize>,
    epochs: Option<usize>,
    error: Option<String>,
}

impl ValidateOutput {
    fn describe(&mut self, recording: &Recording) {
        self.sample_rate = Some(recording.sample_rate());
        self.n_samples = Some(recording.n_samples());
        self.channels = recording.channels().to_vec();
        self.segments = recording.segments().to_vec();
        self.annotations = recording.annotations().len();
    }
}

pub fn execute(args: ValidateArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let builder = match OfflineBuilder::new(config.clone()) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let mut result = ValidateOutput {
        file: args.file.clone(),
        file_type: FileType::from_path(Path::new(&args.file))
            .ok()
            .map(|ft| format!("{:?}", ft)),
        ..Default::default()
    };

    let outcome: Result<(), PipelineError> = load_recording(&args.file, &config.aux_channels)
        .and_then(|recording| {
            result.describe(&recording);
            let (_, epochs, located) = builder.extract_epochs(&recording)?;
            result.task_events = Some(located);
            result.epochs = Some(epochs.len());
            Ok(())
        });

    let code = match &outcome {
        Ok(()) if result.epochs == Some(0) => {
            result.error = Some("No event window fits inside the recording".to_string());
            exit_codes::INPUT_ERROR
        }
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            result.error = Some(e.to_string());
            exit_code_for(e)
        }
    };

    if args.json {
        let print = output::print_json(&result);
        return if print == exit_codes::SUCCESS { code } else { print };
    }

    if let Some(sr) = result.sample_rate {
        println!(
            "{}: {} channels, {} samples at {} Hz, {} annotations",
            args.file,
            result.channels.len(),
            result.n_samples.unwrap_or(0),
            sr,
            result.annotations
        );
    }
    if let (Some(events), Some(epochs)) = (result.task_events, result.epochs) {
        println!("  {} task events, {} epochs fit the recording", events, epochs);
    }
    match result.error {
        Some(ref err) => eprintln!("Error: {}", err),
        None => println!("File '{}' is valid", args.file),
    }
    code
}
