//! CLI definitions and entry point.

use crate::config::CliOverrides;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Analyze, clean up, validate and document pytest and Vitest suites
#[derive(Parser, Debug)]
#[command(name = "tj", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the whole pipeline: analyze, back up, clean, validate, document
    #[command(long_about = "Run the whole pipeline: analyze, back up, clean, validate, document.

SAFETY:
  • A full backup of the target is taken before any file is changed
  • Cleanup or validation failure restores the backup automatically
  • --dry-run plans every action without touching the suite

ARTIFACTS (in the output directory, default <target>/.test-janitor):
  analysis_report.json, cleanup_log.json, validation_report.json,
  pipeline_summary.json, docs/*.md

EXAMPLES:
  tj run tests/ --dry-run       Preview every cleanup action
  tj run . --no-flaky-check     Skip repeated runs of fragile tests
  tj run . --iterations 20 -v   Shorter flakiness probe with progress logs")]
    Run(RunArgs),

    /// Analyze the suite and write analysis_report.json
    Analyze(PhaseArgs),

    /// Clean up the suite (backs up first, rolls back on failure)
    Cleanup(PhaseArgs),

    /// Re-run the suite and compare with the analysis baseline
    Validate(ValidateArgs),

    /// Generate Markdown documentation from prior artifacts
    Document(PhaseArgs),

    /// Restore the target from a backup
    Rollback(RollbackArgs),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Print JSON schemas for the persisted artifacts
    Schema(SchemaArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments shared by every phase command.
#[derive(Args, Debug, Clone, Default)]
pub struct PhaseArgs {
    /// Root of the test suite
    #[arg(default_value = ".")]
    pub target: PathBuf,

    /// Where artifacts and docs are written
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Where backups are kept
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Directory of historical test reports
    #[arg(long, value_name = "DIR")]
    pub history_dir: Option<PathBuf>,

    /// Plan every action without changing any file
    #[arg(long)]
    pub dry_run: bool,

    /// Failure rate at or above which a test is fragile
    #[arg(long, value_name = "RATE")]
    pub fragile_threshold: Option<f64>,

    /// Name similarity above which tests are duplicates
    #[arg(long, value_name = "RATIO")]
    pub name_threshold: Option<f64>,

    /// Assertion overlap above which tests are duplicates
    #[arg(long, value_name = "RATIO")]
    pub assertion_threshold: Option<f64>,

    /// Per-invocation runner timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl PhaseArgs {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_dir: self.output_dir.clone(),
            backup_dir: self.backup_dir.clone(),
            history_dir: self.history_dir.clone(),
            fragile_threshold: self.fragile_threshold,
            name_threshold: self.name_threshold,
            assertion_threshold: self.assertion_threshold,
            timeout_secs: self.timeout,
            ..CliOverrides::default()
        }
    }
}

/// Flakiness probe settings shared by `run` and `validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    /// Do not re-run fragile tests to detect flakiness
    #[arg(long)]
    pub no_flaky_check: bool,

    /// Repetitions per probed test
    #[arg(long, value_name = "N")]
    pub iterations: Option<usize>,

    /// Concurrent probe workers
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

/// Arguments for the run command.
#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    #[command(flatten)]
    pub phase: PhaseArgs,

    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Stop after analysis (no backup, no cleanup)
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Do not re-run the suite after cleanup
    #[arg(long)]
    pub skip_validation: bool,

    /// Do not generate Markdown documentation
    #[arg(long)]
    pub skip_docs: bool,
}

impl RunArgs {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            iterations: self.probe.iterations,
            workers: self.probe.workers,
            ..self.phase.overrides()
        }
    }
}

/// Arguments for the validate command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub phase: PhaseArgs,

    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Test id to probe for flakiness (repeatable; default: fragile tests)
    #[arg(long = "flaky-target", value_name = "TEST_ID")]
    pub flaky_targets: Vec<String>,
}

impl ValidateArgs {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            iterations: self.probe.iterations,
            workers: self.probe.workers,
            ..self.phase.overrides()
        }
    }
}

/// Arguments for the rollback command.
#[derive(Args, Debug, Clone, Default)]
pub struct RollbackArgs {
    /// Root of the test suite
    #[arg(default_value = ".")]
    pub target: PathBuf,

    /// Where backups are kept
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Where artifacts are written (kept out of the restore)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Backup directory or name to restore (default: latest)
    #[arg(long, value_name = "BACKUP")]
    pub backup: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// List backups instead of restoring
    #[arg(long, short = 'l')]
    pub list: bool,

    /// Keep only the N newest backups, then exit
    #[arg(long, value_name = "N", conflicts_with = "backup")]
    pub prune: Option<usize>,

    /// Show which backup would be restored
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the config command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Target whose project config to include
    #[arg(default_value = ".")]
    pub target: PathBuf,

    /// Get a specific config value by key
    #[arg(long, short = 'g', value_name = "KEY")]
    pub get: Option<String>,

    /// List every known key
    #[arg(long, short = 'l')]
    pub list: bool,

    /// Show config file paths
    #[arg(long, short = 'p')]
    pub path: bool,
}

/// Artifacts with a published schema.
#[derive(ValueEnum, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum SchemaTarget {
    /// Every artifact, keyed by file name
    #[default]
    All,
    /// analysis_report.json
    Analysis,
    /// cleanup_log.json
    CleanupLog,
    /// validation_report.json
    Validation,
    /// pipeline_summary.json
    Pipeline,
}

/// Arguments for the schema command.
#[derive(Args, Debug, Clone, Default)]
pub struct SchemaArgs {
    #[arg(value_enum, default_value_t = SchemaTarget::All)]
    pub artifact: SchemaTarget,
}

/// Arguments for the completions command.
#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Supported shells for completion generation.
#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    #[value(name = "powershell")]
    #[value(alias = "pwsh")]
    /// `PowerShell`
    PowerShell,
    /// Elvish
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "tj",
            "run",
            "suite",
            "--dry-run",
            "--fragile-threshold",
            "0.1",
            "--iterations",
            "5",
            "--no-flaky-check",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.phase.dry_run);
        assert!(args.probe.no_flaky_check);
        assert_eq!(args.phase.target, PathBuf::from("suite"));
        let overrides = args.overrides();
        assert_eq!(overrides.fragile_threshold, Some(0.1));
        assert_eq!(overrides.iterations, Some(5));
        assert_eq!(overrides.workers, None);
    }

    #[test]
    fn target_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["tj", "--json", "analyze"]).unwrap();
        assert!(cli.json);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.target, PathBuf::from("."));
    }

    #[test]
    fn rollback_prune_conflicts_with_backup() {
        let result = Cli::try_parse_from(["tj", "rollback", "--prune", "2", "--backup", "x"]);
        assert!(result.is_err());
    }
}
