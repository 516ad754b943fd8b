//! CLI error type.

use std::fmt;
use tilestash::error::CacheError;

/// Errors surfaced to the command line user.
#[derive(Debug)]
pub enum CliError {
    /// A cache operation failed
    Cache(CacheError),
    /// The worker exited before answering
    WorkerGone,
    /// No tile set with the given name exists
    NoSuchSet(String),
    /// The default set cannot be deleted
    DefaultSetProtected,
    /// The user declined a destructive operation
    Aborted,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Cache(e) => write!(f, "error: {e}"),
            CliError::WorkerGone => write!(f, "error: cache worker exited unexpectedly"),
            CliError::NoSuchSet(name) => write!(f, "error: no tile set named \"{name}\""),
            CliError::DefaultSetProtected => {
                write!(f, "error: the default tile set cannot be deleted")
            }
            CliError::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
