//! `tj rollback`: list, prune or restore backups.

use crate::backup::{BackupEntry, BackupManager};
use crate::cli::RollbackArgs;
use crate::config::{CliOverrides, load_config};
use crate::error::{JanitorError, Result};
use crate::output::OutputContext;
use serde_json::json;

fn entry_json(entry: &BackupEntry) -> serde_json::Value {
    json!({
        "name": entry.name,
        "path": entry.path,
        "created_at": entry.created_at.to_rfc3339(),
        "files": entry.file_count,
    })
}

fn list(manager: &BackupManager, ctx: &OutputContext) -> Result<()> {
    let backups = manager.list()?;
    if ctx.is_json() {
        let items: Vec<_> = backups.iter().map(entry_json).collect();
        ctx.json(&json!({ "count": backups.len(), "backups": items }));
        return Ok(());
    }
    if backups.is_empty() {
        ctx.print(&format!("No backups found in {}", manager.root().display()));
        return Ok(());
    }
    ctx.section(&format!("Backups in {}", manager.root().display()));
    for entry in &backups {
        ctx.print(&format!(
            "  {}  {}  {} files",
            entry.name,
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.file_count
        ));
    }
    Ok(())
}

/// Execute the rollback command.
///
/// # Errors
///
/// Returns `BackupNotFound` when nothing can be restored, `BackupIntegrity`
/// if the restored tree does not match its manifest, or a config error when
/// confirmation is required but unavailable.
pub fn execute(args: &RollbackArgs, ctx: &OutputContext) -> Result<()> {
    // The target may have been deleted by a bad cleanup; only config needs it.
    let overrides = CliOverrides {
        output_dir: args.output_dir.clone(),
        backup_dir: args.backup_dir.clone(),
        ..CliOverrides::default()
    };
    let config = load_config(&args.target, &overrides)?;
    let manager = BackupManager::for_config(&config);

    if args.list {
        return list(&manager, ctx);
    }
    if let Some(keep) = args.prune {
        let removed = manager.prune(keep)?;
        if ctx.is_json() {
            ctx.json(&json!({ "removed": removed, "kept": keep }));
        } else {
            ctx.success(&format!("Removed {removed} old backup(s)"));
        }
        return Ok(());
    }

    let backup = match &args.backup {
        Some(path) => manager.resolve(path)?,
        None => manager.latest()?.path,
    };

    if args.dry_run {
        if ctx.is_json() {
            ctx.json(&json!({ "dry_run": true, "backup": backup, "target": config.target }));
        } else {
            ctx.note(&format!(
                "Would restore {} over {}",
                backup.display(),
                config.target.display()
            ));
        }
        return Ok(());
    }

    if !args.yes {
        let question = format!(
            "Replace the contents of {} with {}?",
            config.target.display(),
            backup.display()
        );
        if !ctx.confirm(&question) {
            return Err(JanitorError::Config(
                "rollback not confirmed; pass --yes to restore without prompting".to_string(),
            ));
        }
    }

    let files = manager.restore(&backup)?;
    if ctx.is_json() {
        ctx.json(&json!({ "restored": files, "backup": backup, "target": config.target }));
    } else {
        ctx.success(&format!("Restored {files} files from {}", backup.display()));
    }
    Ok(())
}
