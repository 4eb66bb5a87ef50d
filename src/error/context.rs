//! Context helpers for attaching messages to errors.

use super::{JanitorError, Result};

/// Extension trait that wraps an error with a context message.
pub trait ResultExt<T> {
    /// Wrap the error with a static context string.
    ///
    /// # Errors
    ///
    /// Returns `JanitorError::WithContext` when `self` is an error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error with a lazily built context string.
    ///
    /// # Errors
    ///
    /// Returns `JanitorError::WithContext` when `self` is an error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| JanitorError::WithContext {
            context: context.into(),
            source: Box::new(source),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| JanitorError::WithContext {
            context: f().into(),
            source: Box::new(source),
        })
    }
}
