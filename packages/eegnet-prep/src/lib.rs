//! Signal-to-tensor preprocessing for EEGNet motor-imagery classification.
//!
//! The offline builder and the online adapter in [`pipeline`] share one
//! [`PipelineConfig`] and one [`Preprocessor`], so a window that reaches the
//! classifier at serving time is computed exactly as it was at training time.

pub mod channels;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod edf;
pub mod epochs;
pub mod error;
pub mod events;
pub mod filter;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod tensor;
pub mod types;

pub use channels::{ChannelSelector, ChannelSet};
pub use classifier::{
    ArchitectureParams, Classifier, DropoutKind, LinearReadout, ModelArtifact, Prediction,
};
pub use config::{EventMap, PipelineConfig};
pub use dataset::Dataset;
pub use epochs::{Epoch, EpochExtractor};
pub use error::{PipelineError, Result};
pub use events::{EventLocator, LocatedEvent};
pub use filter::FirBandpass;
pub use edf::{EdfReader, EdfWriter};
pub use loader::{load_many, load_recording, load_subject, subject_files, FileType, RecordingFile};
pub use normalize::TensorNormalizer;
pub use pipeline::{OfflineBuilder, OnlineAdapter, Preprocessor};
pub use tensor::{TensorBatch, TensorPackager};
pub use types::{Annotation, Channel, ChannelKind, Recording};
