//! `tj analyze`: categorize the suite and persist the report.

use super::{config_for, print_analysis};
use crate::analysis::analyze;
use crate::cli::PhaseArgs;
use crate::error::Result;
use crate::output::OutputContext;
use crate::pipeline::ANALYSIS_FILE;
use crate::util::write_json;
use tracing::info;

/// Execute the analyze command.
///
/// # Errors
///
/// Returns an error if the target is missing or the report cannot be written.
pub fn execute(args: &PhaseArgs, ctx: &OutputContext) -> Result<()> {
    let config = config_for(&args.target, &args.overrides())?;
    let analysis = analyze(&config, ctx)?;
    let path = config.output_dir.join(ANALYSIS_FILE);
    write_json(&path, &analysis.report)?;
    info!(path = %path.display(), "Wrote analysis report");

    if ctx.is_json() {
        ctx.json(&analysis.report);
        return Ok(());
    }
    print_analysis(ctx, &analysis.report);
    ctx.success(&format!("Analysis report written to {}", path.display()));
    Ok(())
}
