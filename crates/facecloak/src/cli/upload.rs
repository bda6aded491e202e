//! The `facecloak upload` command: blur, upload, remote re-anonymization.

use std::path::{Path, PathBuf};

use clap::Args;
use facecloak_core::types::UploadPhase;
use facecloak_core::{CaptureSource, Config, Facecloak, PipelineResult, UploadProgressState};

use super::types::{OutputFormat, SourceKind};

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Photo to share
    pub input: PathBuf,

    /// Owner id used as the storage path prefix
    #[arg(long, env = "FACECLOAK_OWNER_ID")]
    pub owner: String,

    /// Where the photo came from; camera captures are deleted afterwards
    #[arg(long, value_enum, default_value_t = SourceKind::Library)]
    pub source: SourceKind,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format (defaults to output.format from the config)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Keep the blurred local copy after uploading
    #[arg(long)]
    pub keep_local: bool,

    /// Skip the database/API reachability check
    #[arg(long)]
    pub no_preflight: bool,

    /// Upload the file as-is (e.g. the copy kept after a failed upload)
    #[arg(long, conflicts_with = "source")]
    pub already_blurred: bool,
}

pub async fn execute(args: UploadArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if args.keep_local {
        config.general.keep_local_copies = true;
    }
    if args.no_preflight {
        config.connectivity.enabled = false;
    }

    let path = super::expand(&args.input);
    let source = match args.source {
        SourceKind::Camera => CaptureSource::Camera { path },
        SourceKind::Library => CaptureSource::Library { path },
    };

    let facecloak = Facecloak::new(config).await?;
    if !facecloak.capture_pipeline().detector().is_enabled() {
        tracing::warn!("No face model configured; the photo is only blurred remotely");
    }

    let progress = indicatif::ProgressBar::new(100);
    progress.set_style(super::progress_style());
    progress.set_message("preparing");
    {
        let progress = progress.clone();
        facecloak
            .upload_pipeline()
            .on_progress(move |state| render(&progress, state));
    }

    if args.already_blurred {
        let result = facecloak.resubmit(source.path(), &args.owner).await;
        progress.finish_and_clear();
        let result = result?;

        let mut output =
            super::open_output(args.output.as_deref(), args.format, facecloak.config())?;
        output.write(&result)?;
        return outcome(&result, source.path());
    }

    let report = facecloak.submit(&source, &args.owner).await;
    progress.finish_and_clear();
    let report = report?;

    let mut output =
        super::open_output(args.output.as_deref(), args.format, facecloak.config())?;
    output.write(&report)?;

    let kept = report.blur.image.as_ref().map(|i| i.path());
    outcome(&report.result, kept.as_deref().unwrap_or(source.path().as_path()))?;
    tracing::info!("Shared via {} strategy", report.blur.strategy_used);
    Ok(())
}

fn outcome(result: &PipelineResult, local: &Path) -> anyhow::Result<()> {
    if result.success {
        tracing::info!(
            "Processed image: {}",
            result.processed_url.as_deref().unwrap_or_default()
        );
        return Ok(());
    }

    let error = result.error.as_deref().unwrap_or("unknown error");
    if result.retryable {
        anyhow::bail!(
            "Upload failed: {error}\n  Retry with: facecloak upload {} --owner <owner> --already-blurred",
            local.display()
        );
    }
    anyhow::bail!("Upload failed: {error}");
}

fn render(progress: &indicatif::ProgressBar, state: &UploadProgressState) {
    progress.set_position(u64::from(state.progress));
    progress.set_message(phase_label(state.phase));
}

fn phase_label(phase: UploadPhase) -> &'static str {
    match phase {
        UploadPhase::Idle => "idle",
        UploadPhase::Uploading => "uploading",
        UploadPhase::RemoteProcessing => "anonymizing remotely",
        UploadPhase::Complete => "done",
        UploadPhase::Error => "failed",
    }
}
