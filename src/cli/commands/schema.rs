//! `tj schema`: JSON schemas of the persisted artifacts.

use crate::cli::{SchemaArgs, SchemaTarget};
use crate::error::Result;
use crate::model::{AnalysisReport, CleanupLog, ValidationReport};
use crate::pipeline::{
    ANALYSIS_FILE, CLEANUP_LOG_FILE, PipelineOutcome, SUMMARY_FILE, VALIDATION_FILE,
};
use schemars::schema_for;
use serde_json::{Map, Value};

fn schema_of(target: SchemaTarget) -> Result<Value> {
    let schema = match target {
        SchemaTarget::Analysis => serde_json::to_value(schema_for!(AnalysisReport))?,
        SchemaTarget::CleanupLog => serde_json::to_value(schema_for!(CleanupLog))?,
        SchemaTarget::Validation => serde_json::to_value(schema_for!(ValidationReport))?,
        SchemaTarget::Pipeline => serde_json::to_value(schema_for!(PipelineOutcome))?,
        SchemaTarget::All => {
            let mut all = Map::new();
            for (name, target) in [
                (ANALYSIS_FILE, SchemaTarget::Analysis),
                (CLEANUP_LOG_FILE, SchemaTarget::CleanupLog),
                (VALIDATION_FILE, SchemaTarget::Validation),
                (SUMMARY_FILE, SchemaTarget::Pipeline),
            ] {
                all.insert(name.to_string(), schema_of(target)?);
            }
            Value::Object(all)
        }
    };
    Ok(schema)
}

/// Execute the schema command. Output is always JSON.
///
/// # Errors
///
/// Returns an error if a schema cannot be serialized.
pub fn execute(args: &SchemaArgs) -> Result<()> {
    let schema = schema_of(args.artifact)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
