//! `tj run`: the full pipeline.

use super::{config_for, print_analysis, print_cleanup, print_validation};
use crate::cleanup::StandardCleaner;
use crate::cli::RunArgs;
use crate::error::Result;
use crate::output::OutputContext;
use crate::pipeline::{Pipeline, PipelineOptions, PipelineOutcome};
use crate::runner::SubprocessExecutor;

fn print_outcome(ctx: &OutputContext, outcome: &PipelineOutcome) {
    if let Some(report) = &outcome.analysis {
        print_analysis(ctx, report);
    }
    if let Some(log) = &outcome.cleanup {
        print_cleanup(ctx, log);
    }
    if let Some(report) = &outcome.validation {
        print_validation(ctx, report);
    }
    if let Some(path) = &outcome.backup_path {
        ctx.note(&format!("Backup: {}", path.display()));
    }
    for path in &outcome.docs {
        ctx.note(&format!("Wrote {}", path.display()));
    }
    if outcome.rolled_back {
        ctx.warn("The target was restored from backup");
    }
}

/// Execute the run command.
///
/// # Errors
///
/// Returns the error of the phase that stopped the pipeline.
pub fn execute(args: &RunArgs, ctx: &OutputContext) -> Result<()> {
    let config = config_for(&args.phase.target, &args.overrides())?;
    let options = PipelineOptions {
        dry_run: args.phase.dry_run,
        skip_cleanup: args.skip_cleanup,
        skip_validation: args.skip_validation,
        skip_docs: args.skip_docs,
        flaky_check: !args.probe.no_flaky_check,
    };
    tracing::info!(target = %config.target.display(), ?options, "Starting pipeline");

    let executor = SubprocessExecutor::new(&config.target, &config.runner, &config.output_dir);
    let run = Pipeline::new(&config, options, ctx, &StandardCleaner, &executor).run();

    if ctx.is_json() {
        ctx.json(&run.outcome);
    } else {
        print_outcome(ctx, &run.outcome);
    }
    let outcome = run.into_result()?;
    ctx.success(&format!("Pipeline finished ({})", outcome.state));
    Ok(())
}
