//! `tj cleanup`: analyze, back up and clean, without validation.

use super::{config_for, print_cleanup};
use crate::cleanup::StandardCleaner;
use crate::cli::PhaseArgs;
use crate::error::Result;
use crate::output::OutputContext;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::runner::SubprocessExecutor;

/// Execute the cleanup command.
///
/// Cleanup needs parsed sources, so analysis is re-run rather than loaded.
///
/// # Errors
///
/// Returns the cleanup error after the backup has been restored.
pub fn execute(args: &PhaseArgs, ctx: &OutputContext) -> Result<()> {
    let config = config_for(&args.target, &args.overrides())?;
    let options = PipelineOptions {
        dry_run: args.dry_run,
        skip_validation: true,
        skip_docs: true,
        ..PipelineOptions::default()
    };
    let executor = SubprocessExecutor::new(&config.target, &config.runner, &config.output_dir);
    let run = Pipeline::new(&config, options, ctx, &StandardCleaner, &executor).run();

    if ctx.is_json() {
        ctx.json(&run.outcome);
    } else {
        if let Some(log) = &run.outcome.cleanup {
            print_cleanup(ctx, log);
        }
        if let Some(path) = &run.outcome.backup_path {
            ctx.note(&format!("Backup: {}", path.display()));
        }
        if run.outcome.rolled_back {
            ctx.warn("Cleanup failed; the target was restored from backup");
        }
    }
    let outcome = run.into_result()?;
    if !ctx.is_json() && !outcome.dry_run {
        ctx.success("Cleanup applied");
    }
    Ok(())
}
