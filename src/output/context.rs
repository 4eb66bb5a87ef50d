use super::Theme;
use super::table::SummaryTable;
use crate::util::progress::{ProgressTracker, should_show_progress};
use std::io::{IsTerminal, Write};
use std::sync::Mutex;

/// Progress and status sink handed to every phase.
///
/// Phases never reach for a global output handle; the caller passes one in.
pub trait Reporter: Send + Sync {
    fn phase_started(&self, phase: &str);
    fn phase_finished(&self, phase: &str, summary: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);

    /// A progress tracker for `total` units of work (0 means a spinner).
    fn progress(&self, total: u64, message: &str) -> ProgressTracker;
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn phase_started(&self, _phase: &str) {}
    fn phase_finished(&self, _phase: &str, _summary: &str) {}
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn progress(&self, _total: u64, _message: &str) -> ProgressTracker {
        ProgressTracker::hidden()
    }
}

/// Reporter that keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for RecordingReporter {
    fn phase_started(&self, phase: &str) {
        self.push(format!("start:{phase}"));
    }
    fn phase_finished(&self, phase: &str, summary: &str) {
        self.push(format!("done:{phase}:{summary}"));
    }
    fn info(&self, message: &str) {
        self.push(format!("info:{message}"));
    }
    fn warning(&self, message: &str) {
        self.push(format!("warn:{message}"));
    }
    fn progress(&self, _total: u64, _message: &str) -> ProgressTracker {
        ProgressTracker::hidden()
    }
}

/// Central output coordinator that respects json/quiet/plain modes.
pub struct OutputContext {
    /// Theme for consistent styling
    theme: Theme,
    /// Output mode
    mode: OutputMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// ANSI colors and progress bars
    Rich,
    /// Plain text, no ANSI codes (for piping)
    Plain,
    /// JSON output only
    Json,
    /// Minimal output (quiet mode)
    Quiet,
}

impl OutputContext {
    /// Create from CLI-style flags.
    #[must_use]
    pub fn from_flags(json: bool, quiet: bool, no_color: bool) -> Self {
        let mode = if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else if no_color || std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
        {
            OutputMode::Plain
        } else {
            OutputMode::Rich
        };

        Self::with_mode(mode)
    }

    #[must_use]
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            theme: Theme::default(),
            mode,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode Checks
    // ─────────────────────────────────────────────────────────────

    pub fn mode(&self) -> OutputMode {
        self.mode
    }
    pub fn is_rich(&self) -> bool {
        self.mode == OutputMode::Rich
    }
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }
    pub fn is_quiet(&self) -> bool {
        self.mode == OutputMode::Quiet
    }
    pub fn is_plain(&self) -> bool {
        self.mode == OutputMode::Plain
    }
    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    // ─────────────────────────────────────────────────────────────
    // Output Methods
    // ─────────────────────────────────────────────────────────────

    pub fn print(&self, content: &str) {
        match self.mode {
            OutputMode::Rich | OutputMode::Plain => println!("{content}"),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    pub fn table(&self, table: &SummaryTable) {
        if table.is_empty() {
            return;
        }
        match self.mode {
            OutputMode::Rich => {
                let rendered = table.render();
                let mut lines = rendered.lines();
                if let Some(title) = lines.next() {
                    println!("{}", self.theme.section.paint(title));
                }
                for line in lines {
                    println!("{line}");
                }
            }
            OutputMode::Plain => println!("{}", table.render()),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    /// Print a value as a single JSON document (json mode only).
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if self.is_json() {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(error = %err, "Failed to serialize output"),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Semantic Output Methods
    // ─────────────────────────────────────────────────────────────

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Rich => println!("{} {message}", self.theme.success.paint("✓")),
            OutputMode::Plain => println!("✓ {message}"),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Rich => eprintln!("{} {message}", self.theme.error.paint("Error:")),
            OutputMode::Plain | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {}
        }
    }

    pub fn warn(&self, message: &str) {
        match self.mode {
            OutputMode::Rich => eprintln!(
                "{} {}",
                self.theme.warning.paint("⚠"),
                self.theme.warning.paint(message)
            ),
            OutputMode::Plain => eprintln!("Warning: {message}"),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    pub fn note(&self, message: &str) {
        match self.mode {
            OutputMode::Rich => println!("{} {message}", self.theme.info.paint("ℹ")),
            OutputMode::Plain => println!("{message}"),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    pub fn section(&self, title: &str) {
        if self.is_rich() {
            println!("\n{}", self.theme.section.paint(&format!("─── {title} ───")));
        } else if self.is_plain() {
            println!("\n─── {title} ───\n");
        }
    }

    pub fn newline(&self) {
        if !self.is_quiet() && !self.is_json() {
            println!();
        }
    }

    /// Ask a yes/no question on stderr; anything but `y`/`yes` declines.
    ///
    /// Non-interactive sessions always decline.
    pub fn confirm(&self, question: &str) -> bool {
        if self.is_json() || !std::io::stdin().is_terminal() {
            return false;
        }
        eprint!("{question} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

impl Reporter for OutputContext {
    fn phase_started(&self, phase: &str) {
        tracing::info!(phase, "Phase started");
        if self.is_rich() {
            eprintln!("{} {phase}", self.theme.accent.paint("▶"));
        } else if self.is_plain() {
            eprintln!("> {phase}");
        }
    }

    fn phase_finished(&self, phase: &str, summary: &str) {
        tracing::info!(phase, summary, "Phase finished");
        match self.mode {
            OutputMode::Rich => eprintln!(
                "{} {phase}: {}",
                self.theme.success.paint("✓"),
                self.theme.dimmed.paint(summary)
            ),
            OutputMode::Plain => eprintln!("✓ {phase}: {summary}"),
            OutputMode::Quiet | OutputMode::Json => {}
        }
    }

    fn info(&self, message: &str) {
        tracing::debug!(message, "Reporter info");
        if !self.is_quiet() && !self.is_json() {
            eprintln!("  {message}");
        }
    }

    fn warning(&self, message: &str) {
        tracing::warn!(message, "Reporter warning");
        self.warn(message);
    }

    fn progress(&self, total: u64, message: &str) -> ProgressTracker {
        let show = self.is_rich() && should_show_progress();
        if total == 0 {
            ProgressTracker::new_spinner(message, show)
        } else {
            ProgressTracker::new(total, message, show)
        }
    }
}
