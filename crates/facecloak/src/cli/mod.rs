//! CLI command implementations.

pub mod anonymize;
pub mod check;
pub mod config;
pub mod types;
pub mod upload;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use facecloak_core::{Config, OutputWriter};

use types::OutputFormat;

/// Writer for command results: the `--output` file, or stdout.
pub(crate) fn open_output(
    path: Option<&Path>,
    format: Option<OutputFormat>,
    config: &Config,
) -> anyhow::Result<OutputWriter<Box<dyn Write>>> {
    let format = match format {
        Some(format) => facecloak_core::OutputFormat::from(format),
        None => config
            .output
            .format
            .parse()
            .map_err(|e: String| anyhow::anyhow!("output.format: {e}"))?,
    };

    let sink: Box<dyn Write> = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(BufWriter::new(File::create(path)?))
        }
        None => Box::new(io::stdout().lock()),
    };

    Ok(OutputWriter::new(sink, format, config.output.pretty))
}

/// Expand `~` in a path given on the command line.
pub(crate) fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// Shared indicatif style for bars driven by the commands.
pub(crate) fn progress_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .progress_chars("##-")
}
