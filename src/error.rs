use thiserror::Error;

/// Broken internal invariants. These abort the run; recoverable input problems
/// (malformed records, unparseable licenses, missing metadata) never surface here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("package {0} was emitted twice; graph deduplication is broken")]
    DuplicateNode(String),

    #[error("no verdict was produced for package {0}")]
    MissingVerdict(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
