//! The `facecloak anonymize` command: local detect + blur, no upload.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use facecloak_core::detect::DetectionMode;
use facecloak_core::pipeline::FileDiscovery;
use facecloak_core::{components, BlurAttemptResult, CaptureSource, Config, StrategyKind};
use serde::Serialize;

use super::types::OutputFormat;

#[derive(Args, Debug)]
pub struct AnonymizeArgs {
    /// Photo or directory of photos
    pub input: PathBuf,

    /// Write results here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Result format (defaults to output.format from the config)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Directory for blurred copies (overrides general.workspace_dir)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Smallest face to blur, as a fraction of the shorter image edge
    #[arg(long)]
    pub min_face_size: Option<f32>,

    /// Slower, more thorough face search
    #[arg(long)]
    pub accurate: bool,
}

/// One line of `anonymize` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnonymizeRecord<'a> {
    source: &'a std::path::Path,
    #[serde(flatten)]
    result: &'a BlurAttemptResult,
}

pub async fn execute(args: AnonymizeArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args)?;

    let pipeline = components::capture_pipeline(&config)?;
    if !pipeline.detector().is_enabled() {
        tracing::warn!(
            "No face model configured (detection.model_path); photos will only be recompressed"
        );
    }

    let input = super::expand(&args.input);
    if !input.exists() {
        anyhow::bail!("Path does not exist: {}", input.display());
    }
    let files = FileDiscovery::new()
        .excluding(config.workspace_dir())
        .discover(&input);
    if files.is_empty() {
        anyhow::bail!("No supported photos found at {}", input.display());
    }
    tracing::info!("Anonymizing {} photo(s)", files.len());

    let mut output = super::open_output(args.output.as_deref(), args.format, &config)?;
    let mut summary = Summary::default();
    let start = Instant::now();

    let progress = indicatif::ProgressBar::new(files.len() as u64);
    progress.set_style(super::progress_style());
    if files.len() == 1 {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    for file in &files {
        progress.set_message(file_label(&file.path));
        let source = CaptureSource::Library {
            path: file.path.clone(),
        };

        match pipeline.capture_and_anonymize(&source).await {
            Ok(result) => {
                if let Some(error) = &result.error {
                    tracing::debug!("{}: earlier strategies failed: {error}", file.path.display());
                }
                summary.record(result.strategy_used);
                output.record(&AnonymizeRecord {
                    source: &file.path,
                    result: &result,
                })?;
            }
            Err(e) => {
                summary.failed += 1;
                progress.suspend(|| tracing::error!("Failed: {} - {e}", file.path.display()));
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    output.finish()?;
    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }

    summary.print(start.elapsed());
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &AnonymizeArgs) -> anyhow::Result<()> {
    if let Some(dir) = &args.output_dir {
        config.general.workspace_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(size) = args.min_face_size {
        config.detection.min_face_size = size;
    }
    if args.accurate {
        config.detection.mode = DetectionMode::Accurate;
    }
    config.validate()?;
    Ok(())
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct Summary {
    by_strategy: BTreeMap<String, u64>,
    blurred: u64,
    untouched: u64,
    failed: u64,
}

impl Summary {
    fn record(&mut self, strategy: StrategyKind) {
        match strategy {
            StrategyKind::Passthrough => self.untouched += 1,
            _ => self.blurred += 1,
        }
        *self.by_strategy.entry(strategy.to_string()).or_default() += 1;
    }

    fn total(&self) -> u64 {
        self.blurred + self.untouched + self.failed
    }

    fn print(&self, elapsed: Duration) {
        eprintln!();
        eprintln!("  ====================================");
        eprintln!("               Summary");
        eprintln!("  ====================================");
        eprintln!("    Written:      {:>8}", self.blurred);
        if self.untouched > 0 {
            eprintln!("    Untouched:    {:>8}", self.untouched);
        }
        if self.failed > 0 {
            eprintln!("    Failed:       {:>8}", self.failed);
        }
        eprintln!("  ------------------------------------");
        for (strategy, count) in &self.by_strategy {
            eprintln!("    {:<14}{:>8}", format!("{strategy}:"), count);
        }
        eprintln!("  ------------------------------------");
        eprintln!("    Total:        {:>8}", self.total());
        eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
        eprintln!("  ====================================");
    }
}
