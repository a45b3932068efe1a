use clap::{Args, Parser, Subcommand, ValueEnum};
use eegnet_prep::DropoutKind;

#[derive(Parser)]
#[command(
    name = "eegnet",
    version,
    about = "EEGNet motor-imagery preprocessing tool",
    long_about = "Turn EEG recordings (EDF/EDF+, JSON) into EEGNet training tensors and\n\
                  check that serving requests go through the same preprocessing.\n\
                  Set $EEGNET_PIPELINE_CONFIG to use a non-default pipeline configuration."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a training dataset from recordings
    Build(BuildArgs),
    /// Show or write the pipeline configuration
    Config(ConfigArgs),
    /// Check a recording against the pipeline configuration
    Validate(ValidateArgs),
    /// Classify one dataset epoch with a model artifact
    Predict(PredictArgs),
    /// Write one raw epoch as a serving request body
    ExportRequest(ExportRequestArgs),
    /// Fit the linear read-out of a model artifact to a dataset
    Fit(FitArgs),
}

/// Where the recordings come from: explicit files or a subject's sessions
#[derive(Args)]
pub struct InputArgs {
    /// Recording files (EDF, JSON), concatenated in the given order
    #[arg(num_args = 0..)]
    pub files: Vec<String>,

    /// Directory holding A0<subject>*.edf / .json session files
    #[arg(long, requires = "subject", conflicts_with = "files")]
    pub data_dir: Option<String>,

    /// Subject number used with --data-dir
    #[arg(long, requires = "data_dir")]
    pub subject: Option<u32>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Pipeline configuration file (JSON); defaults to the training settings
    #[arg(long, env = "EEGNET_PIPELINE_CONFIG")]
    pub config: Option<String>,

    /// Dataset output file (MessagePack)
    #[arg(short, long)]
    pub output: String,

    /// Print the build summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long, env = "EEGNET_PIPELINE_CONFIG")]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write the effective configuration to this file
    #[arg(long)]
    pub write: Option<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Recording file path
    #[arg(long)]
    pub file: String,

    #[arg(long, env = "EEGNET_PIPELINE_CONFIG")]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Model artifact (JSON)
    #[arg(long, env = "EEGNET_MODEL_PATH")]
    pub model: String,

    /// Dataset file written by `eegnet build`
    #[arg(long)]
    pub dataset: String,

    /// Epoch index within the dataset
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ExportRequestArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, env = "EEGNET_PIPELINE_CONFIG")]
    pub config: Option<String>,

    /// Index among the epochs that fit the recording
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DropoutArg {
    Dropout,
    SpatialDropout2d,
}

impl From<DropoutArg> for DropoutKind {
    fn from(arg: DropoutArg) -> Self {
        match arg {
            DropoutArg::Dropout => DropoutKind::Dropout,
            DropoutArg::SpatialDropout2d => DropoutKind::SpatialDropout2D,
        }
    }
}

#[derive(Args)]
pub struct FitArgs {
    /// Dataset file written by `eegnet build`
    #[arg(long)]
    pub dataset: String,

    /// Model artifact output file (JSON)
    #[arg(short, long)]
    pub output: String,

    /// Model name recorded in the artifact
    #[arg(long, default_value = "eegnet")]
    pub name: String,

    /// Dropout layer recorded in the architecture
    #[arg(long, value_enum, default_value_t = DropoutArg::Dropout)]
    pub dropout: DropoutArg,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subject_requires_data_dir() {
        let result = Cli::try_parse_from(["eegnet", "build", "--subject", "1", "-o", "x.msgpack"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_accepts_files() {
        let cli = Cli::try_parse_from(["eegnet", "build", "a.edf", "b.edf", "-o", "x.msgpack"])
            .unwrap();
        match cli.command {
            Command::Build(args) => assert_eq!(args.input.files, vec!["a.edf", "b.edf"]),
            _ => panic!("expected build"),
        }
    }
}
