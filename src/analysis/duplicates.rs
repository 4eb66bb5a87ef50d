//! Duplicate and near-duplicate test detection.
//!
//! Two passes run over the candidate tests of one ecosystem at a time:
//!
//! 1. Exact: tests sharing a bare name form one group with score `1.0`.
//!    Grouping by key makes this pass symmetric and transitive.
//! 2. Similar: a greedy sweep in candidate order. A test seeds a group and
//!    absorbs every later unassigned test whose name similarity or assertion
//!    similarity exceeds its threshold. Assigned tests are never
//!    reconsidered, so membership depends on order and is not a transitive
//!    closure.

use super::syntax::TestFunction;
use crate::model::{Ecosystem, GroupKind, TestGroup};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A test eligible for grouping.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub ecosystem: Ecosystem,
    pub test: &'a TestFunction,
}

/// Character-overlap ratio between two names.
///
/// Ratcliff/Obershelp: twice the matched characters over the total length,
/// where matches are found by recursively taking the longest common
/// substring. Identical names score exactly `1.0`.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    (2 * matched) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                row[j] = prev[j - 1] + 1;
                if row[j] > best.2 {
                    best = (i - row[j], j - row[j], row[j]);
                }
            }
        }
        prev = row;
    }
    best
}

/// Jaccard index over the sets of assertion strings.
///
/// Two tests without assertions share no evidence and score `0.0`.
#[must_use]
pub fn assertion_similarity(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Assertions present in every member, in the first member's order.
fn shared_assertions(members: &[&TestFunction]) -> Vec<String> {
    let Some((first, rest)) = members.split_first() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    first
        .assertions
        .iter()
        .filter(|assertion| rest.iter().all(|m| m.assertions.contains(assertion)))
        .filter(|assertion| seen.insert(assertion.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    pub name_threshold: f64,
    pub assertion_threshold: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self {
            name_threshold: 0.7,
            assertion_threshold: 0.5,
        }
    }
}

impl DuplicateDetector {
    #[must_use]
    pub const fn new(name_threshold: f64, assertion_threshold: f64) -> Self {
        Self {
            name_threshold,
            assertion_threshold,
        }
    }

    /// Pairwise similarity, or `None` when neither signal clears its threshold.
    #[must_use]
    pub fn pair_score(&self, a: &TestFunction, b: &TestFunction) -> Option<f64> {
        let name = name_similarity(&a.name, &b.name);
        let assertions = assertion_similarity(&a.assertions, &b.assertions);
        (name > self.name_threshold || assertions > self.assertion_threshold)
            .then_some(name.max(assertions))
    }

    /// Group identical bare names. Only groups of two or more are returned.
    #[must_use]
    pub fn find_exact(&self, candidates: &[Candidate<'_>]) -> Vec<TestGroup> {
        let mut by_name: BTreeMap<(Ecosystem, &str), Vec<&TestFunction>> = BTreeMap::new();
        let mut order: Vec<(Ecosystem, &str)> = Vec::new();
        for candidate in candidates {
            let key = (candidate.ecosystem, candidate.test.name.as_str());
            let members = by_name.entry(key).or_default();
            if members.is_empty() {
                order.push(key);
            }
            members.push(candidate.test);
        }

        order
            .into_iter()
            .filter_map(|key| by_name.get(&key))
            .filter(|members| members.len() >= 2)
            .map(|members| TestGroup {
                tests: members.iter().map(|t| t.qualified_name.clone()).collect(),
                similarity_score: 1.0,
                shared_assertions: shared_assertions(members),
                kind: GroupKind::Exact,
            })
            .collect()
    }

    /// Greedy similarity grouping in candidate order.
    #[must_use]
    pub fn find_similar(&self, candidates: &[Candidate<'_>]) -> Vec<TestGroup> {
        let mut assigned = vec![false; candidates.len()];
        let mut groups = Vec::new();

        for (i, seed) in candidates.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            let mut members = vec![seed.test];
            let mut scores = Vec::new();
            for (j, other) in candidates.iter().enumerate().skip(i + 1) {
                if assigned[j] || other.ecosystem != seed.ecosystem {
                    continue;
                }
                if let Some(score) = self.pair_score(seed.test, other.test) {
                    assigned[j] = true;
                    members.push(other.test);
                    scores.push(score);
                }
            }
            if members.len() < 2 {
                continue;
            }
            assigned[i] = true;
            let similarity_score = scores.iter().sum::<f64>() / scores.len() as f64;
            groups.push(TestGroup {
                tests: members.iter().map(|t| t.qualified_name.clone()).collect(),
                similarity_score: similarity_score.clamp(0.0, 1.0),
                shared_assertions: shared_assertions(&members),
                kind: GroupKind::Similar,
            });
        }
        groups
    }

    /// Exact pass first, then the greedy pass over whatever is left.
    #[must_use]
    pub fn detect(&self, candidates: &[Candidate<'_>]) -> Vec<TestGroup> {
        let mut groups = self.find_exact(candidates);
        let grouped: HashSet<&str> = groups
            .iter()
            .flat_map(|g| g.tests.iter().map(String::as_str))
            .collect();
        let remaining: Vec<Candidate<'_>> = candidates
            .iter()
            .copied()
            .filter(|c| !grouped.contains(c.test.qualified_name.as_str()))
            .collect();
        groups.extend(self.find_similar(&remaining));
        tracing::debug!(
            candidates = candidates.len(),
            groups = groups.len(),
            "Duplicate detection finished"
        );
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fn(file: &str, name: &str, assertions: &[&str]) -> TestFunction {
        TestFunction {
            qualified_name: format!("{file}::{name}"),
            name: name.to_string(),
            file_path: file.to_string(),
            scope: vec![],
            line: 1,
            end_line: 3,
            start_byte: 0,
            end_byte: 10,
            docstring: None,
            assertions: assertions.iter().map(ToString::to_string).collect(),
            setup: vec![],
            body: vec![],
            decorators: vec![],
            lines_of_code: 3,
        }
    }

    fn py<'a>(tests: &'a [TestFunction]) -> Vec<Candidate<'a>> {
        tests
            .iter()
            .map(|test| Candidate {
                ecosystem: Ecosystem::Python,
                test,
            })
            .collect()
    }

    #[test]
    fn name_similarity_bounds() {
        assert!((name_similarity("test_login", "test_login") - 1.0).abs() < f64::EPSILON);
        assert!(name_similarity("abc", "xyz").abs() < f64::EPSILON);
        let partial = name_similarity("test_login_ok", "test_login_fail");
        assert!(partial > 0.5 && partial < 1.0);
    }

    #[test]
    fn ratcliff_matches_difflib() {
        // difflib.SequenceMatcher(None, "abcd", "bcde").ratio() == 0.75
        assert!((name_similarity("abcd", "bcde") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn assertion_jaccard() {
        let a = vec!["assert x".to_string(), "assert y".to_string()];
        let b = vec!["assert y".to_string(), "assert z".to_string()];
        assert!((assertion_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert!(assertion_similarity(&[], &[]).abs() < f64::EPSILON);
    }

    #[test]
    fn exact_duplicates_across_files() {
        let tests = vec![
            test_fn("tests/test_a.py", "test_example", &["assert 1 == 1"]),
            test_fn("tests/test_b.py", "test_example", &["assert 1 == 1"]),
        ];
        let groups = DuplicateDetector::default().detect(&py(&tests));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, GroupKind::Exact);
        assert_eq!(groups[0].len(), 2);
        assert!((groups[0].similarity_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(groups[0].shared_assertions, vec!["assert 1 == 1"]);
    }

    #[test]
    fn exact_pass_is_transitive() {
        let tests = vec![
            test_fn("a.py", "test_same", &["assert a"]),
            test_fn("b.py", "test_other", &[]),
            test_fn("c.py", "test_same", &["assert c"]),
            test_fn("d.py", "test_same", &[]),
        ];
        let groups = DuplicateDetector::default().find_exact(&py(&tests));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tests, vec!["a.py::test_same", "c.py::test_same", "d.py::test_same"]);
        assert!(groups[0].shared_assertions.is_empty());
    }

    #[test]
    fn ecosystems_never_mix() {
        let tests = vec![
            test_fn("a.py", "adds numbers", &[]),
            test_fn("a.test.ts", "adds numbers", &[]),
        ];
        let candidates = vec![
            Candidate { ecosystem: Ecosystem::Python, test: &tests[0] },
            Candidate { ecosystem: Ecosystem::JavaScript, test: &tests[1] },
        ];
        assert!(DuplicateDetector::default().detect(&candidates).is_empty());
    }

    #[test]
    fn greedy_grouping_depends_on_order() {
        // B is similar to both A and C, but A and C are not similar to each other.
        let a = test_fn("f.py", "test_a", &["assert p", "assert q"]);
        let b = test_fn("f.py", "test_b", &["assert q", "assert r"]);
        let c = test_fn("f.py", "test_c", &["assert r", "assert s"]);
        let detector = DuplicateDetector::new(0.95, 0.3);

        let forward = detector.find_similar(&py(&[a.clone(), b.clone(), c.clone()]));
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].tests, vec!["f.py::test_a", "f.py::test_b"]);

        let reordered = detector.find_similar(&py(&[b, a, c]));
        assert_eq!(reordered.len(), 1);
        assert_eq!(
            reordered[0].tests,
            vec!["f.py::test_b", "f.py::test_a", "f.py::test_c"]
        );
    }
}
