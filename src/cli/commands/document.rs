//! `tj document`: render Markdown docs from the persisted artifacts.

use super::{config_for, read_optional};
use crate::cli::PhaseArgs;
use crate::docs::{self, DocInputs};
use crate::error::Result;
use crate::model::{CleanupLog, ValidationReport};
use crate::output::OutputContext;
use crate::pipeline::{CLEANUP_LOG_FILE, VALIDATION_FILE, load_analysis_report};
use serde_json::json;

/// Execute the document command.
///
/// # Errors
///
/// Returns `ArtifactNotFound` without a prior analysis, or
/// `DocumentationFailed` if a document cannot be written.
pub fn execute(args: &PhaseArgs, ctx: &OutputContext) -> Result<()> {
    let config = config_for(&args.target, &args.overrides())?;
    let analysis = load_analysis_report(&config.output_dir)?;
    let cleanup: Option<CleanupLog> =
        read_optional(&config.output_dir.join(CLEANUP_LOG_FILE), "cleanup")?;
    let validation: Option<ValidationReport> =
        read_optional(&config.output_dir.join(VALIDATION_FILE), "validate")?;

    let inputs = DocInputs {
        config: &config,
        analysis: &analysis,
        cleanup: cleanup.as_ref(),
        validation: validation.as_ref(),
    };
    let written = docs::generate(&inputs, &config.output_dir, ctx)?;

    if ctx.is_json() {
        ctx.json(&json!({ "documents": written }));
        return Ok(());
    }
    for path in &written {
        ctx.print(&format!("  {}", path.display()));
    }
    ctx.success(&format!("Wrote {} documents", written.len()));
    Ok(())
}
