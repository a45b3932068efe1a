pub mod build;
pub mod config;
pub mod export_request;
pub mod fit;
pub mod predict;
pub mod validate;

use crate::cli::InputArgs;
use crate::exit_codes;
use eegnet_prep::{load_many, load_subject, PipelineConfig, PipelineError, Recording};

/// Effective configuration: the given file, or the training defaults.
pub fn load_config(path: Option<&str>) -> Result<PipelineConfig, PipelineError> {
    match path {
        Some(p) => {
            log::info!("Using pipeline configuration {}", p);
            PipelineConfig::from_file(p)
        }
        None => {
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

pub fn load_input(input: &InputArgs, config: &PipelineConfig) -> Result<Recording, PipelineError> {
    match (&input.data_dir, input.subject) {
        (Some(dir), Some(subject)) => load_subject(dir, subject, &config.aux_channels),
        _ if input.files.is_empty() => Err(PipelineError::InvalidConfig(
            "no input: pass recording files or --data-dir with --subject".into(),
        )),
        _ => load_many(&input.files, &config.aux_channels),
    }
}

pub fn exit_code_for(error: &PipelineError) -> i32 {
    match error {
        PipelineError::ConfigParity { .. } => exit_codes::PARITY_ERROR,
        PipelineError::IoError(_)
        | PipelineError::Serialization(_)
        | PipelineError::Inference(_)
        | PipelineError::ClassifierUnavailable => exit_codes::EXECUTION_ERROR,
        _ => exit_codes::INPUT_ERROR,
    }
}

/// Report `error` on stderr and return its exit code.
pub fn fail(error: PipelineError) -> i32 {
    eprintln!("Error: {}", error);
    exit_code_for(&error)
}
