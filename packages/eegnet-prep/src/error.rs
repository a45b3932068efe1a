use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Channel mismatch: {0}")]
    ChannelMismatch(String),

    #[error("Invalid filter configuration: {0}")]
    FilterConfig(String),

    #[error("No events found: none of the annotation codes {codes:?} appear in the event map")]
    NoEventsFound { codes: Vec<String> },

    #[error("Insufficient samples: epoch has {actual} samples, {required} required")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Pipeline configuration mismatch: expected fingerprint {expected}, got {actual}")]
    ConfigParity { expected: String, actual: String },

    #[error("Sample rate mismatch: recording is {actual} Hz, pipeline expects {expected} Hz")]
    SampleRateMismatch { expected: f64, actual: f64 },

    #[error("Empty dataset: {located} events located, all {dropped} epochs dropped")]
    EmptyDataset { located: usize, dropped: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to parse input: {0}")]
    Parse(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Classifier is not loaded")]
    ClassifierUnavailable,

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors caused by the caller's input rather than by this process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::ChannelMismatch(_)
                | PipelineError::InsufficientSamples { .. }
                | PipelineError::Shape(_)
                | PipelineError::SampleRateMismatch { .. }
                | PipelineError::Parse(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(PipelineError::Shape("x".into()).is_client_error());
        assert!(PipelineError::ChannelMismatch("x".into()).is_client_error());
        assert!(!PipelineError::ClassifierUnavailable.is_client_error());
        assert!(!PipelineError::ConfigParity {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_client_error());
    }
}
