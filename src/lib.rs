//! `test_janitor`: analyze, clean up, validate and document test suites.
//!
//! Two ecosystems are supported side by side: pytest (Python) and Vitest
//! (JavaScript/TypeScript). A run flows through these phases:
//!
//! 1. [`analysis`] discovers test files, parses them with tree-sitter and
//!    sorts every test into exactly one of obsolete, fragile, duplicate or
//!    valuable.
//! 2. [`backup`] copies the tree before anything is changed.
//! 3. [`cleanup`] removes obsolete tests, merges duplicates, annotates
//!    non-deterministic code and extracts shared fixtures.
//! 4. [`validation`] re-runs the suite through [`runner`] and compares
//!    coverage, timing and flakiness with the pre-cleanup baseline.
//! 5. [`docs`] renders the standards, examples and cleanup report.
//!
//! [`pipeline`] sequences the phases and rolls back on failure.

pub mod analysis;
pub mod backup;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod docs;
pub mod error;
pub mod logging;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod runner;
pub mod util;
pub mod validation;

pub use error::{JanitorError, Result, StructuredError};
