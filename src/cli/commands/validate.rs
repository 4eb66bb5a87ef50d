//! `tj validate`: re-run the suite against the persisted analysis baseline.

use super::{config_for, print_validation};
use crate::cli::ValidateArgs;
use crate::error::{JanitorError, Result};
use crate::output::OutputContext;
use crate::pipeline::{VALIDATION_FILE, load_analysis_report};
use crate::runner::SubprocessExecutor;
use crate::util::write_json;
use crate::validation::{BaselineSnapshot, Validator};

/// Execute the validate command.
///
/// # Errors
///
/// Returns `ArtifactNotFound` without a prior analysis, or
/// `ValidationFailed` when the judgement does not pass.
pub fn execute(args: &ValidateArgs, ctx: &OutputContext) -> Result<()> {
    let config = config_for(&args.phase.target, &args.overrides())?;
    let analysis = load_analysis_report(&config.output_dir)?;
    let baseline = BaselineSnapshot::from_report(&analysis);

    let targets: Vec<String> = if args.probe.no_flaky_check {
        Vec::new()
    } else if args.flaky_targets.is_empty() {
        analysis
            .fragile_tests
            .iter()
            .map(|metrics| metrics.test_name.clone())
            .collect()
    } else {
        args.flaky_targets.clone()
    };

    let executor = SubprocessExecutor::new(&config.target, &config.runner, &config.output_dir);
    let report = Validator::new(&config, &executor, ctx).validate(&baseline, &targets)?;
    write_json(&config.output_dir.join(VALIDATION_FILE), &report)?;

    if ctx.is_json() {
        ctx.json(&report);
    } else {
        print_validation(ctx, &report);
    }
    if report.passed {
        ctx.success("Validation passed");
        Ok(())
    } else {
        Err(JanitorError::ValidationFailed {
            reason: report.recommendations.first().cloned().unwrap_or_else(|| {
                "judgement failed; see validation_report.json".to_string()
            }),
        })
    }
}
