//! Error types for the cordon crate.

use thiserror::Error;

/// Errors the engine can report.
///
/// All of these are non-fatal: callers inside the engine catch them locally
/// and degrade (an invalid selector demotes to "no explicit target"), so
/// they surface mainly through logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A focus-target selector string could not be parsed.
    #[error("invalid focus-target selector {selector:?}: {reason}")]
    InvalidSelector {
        /// The selector as given.
        selector: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn invalid_selector(selector: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason,
        }
    }
}
