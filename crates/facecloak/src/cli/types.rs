//! Value enums shared by the commands.

use clap::ValueEnum;

/// Supported output formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object or array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl From<OutputFormat> for facecloak_core::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => facecloak_core::OutputFormat::Json,
            OutputFormat::Jsonl => facecloak_core::OutputFormat::JsonLines,
        }
    }
}

/// How a photo reached the CLI.
///
/// Camera captures belong to the pipeline and are deleted once uploaded;
/// library picks are never touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Camera,
    #[default]
    Library,
}
