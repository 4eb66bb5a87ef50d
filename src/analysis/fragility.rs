//! Fragility classification and non-deterministic pattern detection.

use super::syntax::TestFunction;
use crate::model::{Ecosystem, PatternCategory, PatternFinding, RewriteCandidate, TestMetrics};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Marker written above each finding when a rewrite is applied.
pub const REWRITE_MARKER: &str = "TJ-REWRITE";

/// A test is fragile iff it was observed at least once and its failure
/// rate is at or above `threshold`.
#[must_use]
pub fn is_fragile(metrics: &TestMetrics, threshold: f64) -> bool {
    metrics.total_runs > 0 && metrics.failure_rate >= threshold
}

/// Remediation text for a pattern category.
#[must_use]
pub const fn suggestion_for(category: PatternCategory, ecosystem: Ecosystem) -> &'static str {
    match (category, ecosystem) {
        (PatternCategory::Timing, Ecosystem::Python) => {
            "Replace sleep with fixture-driven state or a frozen clock (freezegun, monkeypatch)"
        }
        (PatternCategory::Timing, Ecosystem::JavaScript) => {
            "Replace real timers with vi.useFakeTimers() and advance time explicitly"
        }
        (PatternCategory::Randomness, Ecosystem::Python) => {
            "Inject a fixed seed or pass generated values (ids, timestamps) in explicitly"
        }
        (PatternCategory::Randomness, Ecosystem::JavaScript) => {
            "Stub Math.random/Date with vi.spyOn or vi.setSystemTime, or pass values in explicitly"
        }
        (PatternCategory::ExternalCall, Ecosystem::Python) => {
            "Mock the external call with unittest.mock.patch or a local fake server"
        }
        (PatternCategory::ExternalCall, Ecosystem::JavaScript) => {
            "Mock the external call with vi.mock / vi.fn or an MSW handler"
        }
        (PatternCategory::GlobalState, Ecosystem::Python) => {
            "Pass state as parameters; use monkeypatch.setenv instead of mutating globals"
        }
        (PatternCategory::GlobalState, Ecosystem::JavaScript) => {
            "Pass state as parameters; use vi.stubEnv instead of mutating process.env or globals"
        }
    }
}

struct PatternTable {
    category: PatternCategory,
    python: Vec<Regex>,
    javascript: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern is valid"))
        .collect()
}

static PATTERNS: Lazy<Vec<PatternTable>> = Lazy::new(|| {
    vec![
        PatternTable {
            category: PatternCategory::Timing,
            python: compile(&[
                r"\btime\.sleep\s*\(",
                r"\basyncio\.sleep\s*\(",
                r"(^|[^.\w])sleep\s*\(",
            ]),
            javascript: compile(&[
                r"\bsetTimeout\s*\(",
                r"\bsetInterval\s*\(",
                r"\bwaitForTimeout\s*\(",
                r"\b(sleep|delay)\s*\(",
            ]),
        },
        PatternTable {
            category: PatternCategory::Randomness,
            python: compile(&[
                r"\brandom\.\w+\s*\(",
                r"\buuid\.uuid[14]\s*\(",
                r"\bdatetime\.(now|utcnow|today)\s*\(",
                r"\btime\.time\s*\(",
                r"\bsecrets\.\w+\s*\(",
            ]),
            javascript: compile(&[
                r"\bMath\.random\s*\(",
                r"\bDate\.now\s*\(",
                r"\bnew Date\s*\(\s*\)",
                r"\bcrypto\.randomUUID\s*\(",
                r"\buuid(v4)?\s*\(",
                r"\bfaker\.",
            ]),
        },
        PatternTable {
            category: PatternCategory::ExternalCall,
            python: compile(&[
                r"\brequests\.(get|post|put|patch|delete|head|request)\s*\(",
                r"\burllib\.request\.",
                r"\burlopen\s*\(",
                r"\bhttpx\.\w+\s*\(",
                r"\baiohttp\.ClientSession\s*\(",
                r"\bsocket\.(socket|create_connection)\s*\(",
                r"\bsmtplib\.SMTP",
                r"\bsubprocess\.(run|call|Popen|check_output)\s*\(",
            ]),
            javascript: compile(&[
                r"\bfetch\s*\(",
                r"\baxios(\.\w+)?\s*\(",
                r"\bhttps?\.(get|request)\s*\(",
                r"\bXMLHttpRequest\b",
                r"\bnew WebSocket\s*\(",
            ]),
        },
        PatternTable {
            category: PatternCategory::GlobalState,
            python: compile(&[
                r"^\s*global\s+\w+",
                r"\bos\.environ\b",
                r"\bos\.(putenv|getenv|unsetenv)\s*\(",
            ]),
            javascript: compile(&[
                r"\bprocess\.env\b",
                r"\bglobalThis\.\w+\s*=[^=]",
                r"\b(window|global)\.\w+\s*=[^=]",
            ]),
        },
    ]
});

fn is_comment(line: &str, ecosystem: Ecosystem) -> bool {
    let trimmed = line.trim_start();
    match ecosystem {
        Ecosystem::Python => trimmed.starts_with('#'),
        Ecosystem::JavaScript => {
            trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
        }
    }
}

fn is_mocked(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("mock") || lower.contains("patch")
}

/// Scan source text for non-deterministic patterns.
///
/// At most one finding per line and category. External-call matches on
/// lines mentioning mock/patch are ignored.
#[must_use]
pub fn detect_patterns(source: &str, ecosystem: Ecosystem) -> Vec<PatternFinding> {
    let mut findings = Vec::new();
    for (index, line) in source.lines().enumerate() {
        if line.trim().is_empty() || is_comment(line, ecosystem) || line.contains(REWRITE_MARKER) {
            continue;
        }
        for table in PATTERNS.iter() {
            let patterns = match ecosystem {
                Ecosystem::Python => &table.python,
                Ecosystem::JavaScript => &table.javascript,
            };
            if !patterns.iter().any(|re| re.is_match(line)) {
                continue;
            }
            if table.category == PatternCategory::ExternalCall && is_mocked(line) {
                continue;
            }
            findings.push(PatternFinding {
                line: index + 1,
                snippet: line.trim().to_string(),
                category: table.category,
                suggestion: suggestion_for(table.category, ecosystem).to_string(),
            });
        }
    }
    findings
}

/// Build a rewrite candidate for a file, or `None` when nothing was found.
#[must_use]
pub fn rewrite_candidate(
    rel_path: &str,
    ecosystem: Ecosystem,
    source: &str,
    tests: &[TestFunction],
) -> Option<RewriteCandidate> {
    let findings = detect_patterns(source, ecosystem);
    if findings.is_empty() {
        return None;
    }
    let mut seen = BTreeSet::new();
    let affected = findings
        .iter()
        .filter_map(|finding| tests.iter().find(|t| t.contains_line(finding.line)))
        .filter(|test| seen.insert(test.qualified_name.as_str()))
        .map(|test| test.qualified_name.clone())
        .collect();
    Some(RewriteCandidate {
        file_path: rel_path.to_string(),
        ecosystem,
        findings,
        tests: affected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragile_threshold_boundary() {
        let metrics = TestMetrics::from_tallies("t", "f.py", 100, 8, 10.0);
        assert!(is_fragile(&metrics, 0.05));
        assert!(!is_fragile(&metrics, 0.10));
        assert!(is_fragile(&metrics, 0.08));
    }

    #[test]
    fn never_run_is_never_fragile() {
        let metrics = TestMetrics::from_tallies("t", "f.py", 0, 0, 0.0);
        assert!(!is_fragile(&metrics, 0.0));
    }

    #[test]
    fn python_patterns() {
        let source = "\
import time, random, os, requests
def test_x():
    time.sleep(1)
    seed = random.randint(0, 9)
    r = requests.get('http://x')
    with patch('requests.get') as fake: requests.get('http://y')
    os.environ['A'] = '1'
    # time.sleep(5)
";
        let findings = detect_patterns(source, Ecosystem::Python);
        let got: Vec<(usize, PatternCategory)> =
            findings.iter().map(|f| (f.line, f.category)).collect();
        assert_eq!(
            got,
            vec![
                (3, PatternCategory::Timing),
                (4, PatternCategory::Randomness),
                (5, PatternCategory::ExternalCall),
                (7, PatternCategory::GlobalState),
            ]
        );
        assert_eq!(findings[0].snippet, "time.sleep(1)");
        assert!(findings[2].suggestion.contains("mock"));
    }

    #[test]
    fn javascript_patterns() {
        let source = "\
it('loads', async () => {
  await new Promise((r) => setTimeout(r, 50));
  const id = Math.random();
  const res = await fetch('/api');
  vi.mock('axios');
  process.env.API = 'x';
});
";
        let categories: Vec<PatternCategory> = detect_patterns(source, Ecosystem::JavaScript)
            .into_iter()
            .map(|f| f.category)
            .collect();
        assert_eq!(
            categories,
            vec![
                PatternCategory::Timing,
                PatternCategory::Randomness,
                PatternCategory::ExternalCall,
                PatternCategory::GlobalState,
            ]
        );
    }

    #[test]
    fn clean_file_needs_no_rewrite() {
        let source = "def test_a():\n    assert 1\n";
        assert!(rewrite_candidate("t.py", Ecosystem::Python, source, &[]).is_none());
    }
}
