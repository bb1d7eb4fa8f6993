// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type for durable store operations.

/// An error from a durable store operation.
///
/// Store adapters wrap whatever their transport produces in this type; the
/// cache core treats every `StoreError` as a degradation signal, never as a
/// caller-visible failure.
///
/// # Examples
///
/// ```
/// use larder_store::StoreError;
///
/// let error = StoreError::new("get", "connection reset");
/// assert_eq!(error.op(), "get");
/// ```
#[derive(Debug, thiserror::Error)]
#[error("durable store {op} failed: {message}")]
pub struct StoreError {
    op: &'static str,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Creates an error for the named operation.
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        op: &'static str,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            op,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The store operation that failed (`"get"`, `"set"`, ...).
    #[must_use]
    pub fn op(&self) -> &'static str {
        self.op
    }
}
