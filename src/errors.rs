//! Engine Error Types
//!
//! One error enum for the whole query lifecycle: parse-time, bind-time,
//! optimization and execution errors all surface through [`Error`].
//! Optimizer rules never raise on well-typed input; a rule that cannot
//! decide defers and leaves the plan unchanged.

use thiserror::Error;

/// Errors surfaced to the user by the query engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed SQL or a construct the parser rejects
    #[error("SQL error: {0}")]
    Sql(String),

    /// The statement was empty
    #[error("No SQL statement found")]
    MissingSqlStatement,

    /// Recognised syntax the engine refuses to execute
    #[error("Unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    /// A referenced column could not be bound
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// A column reference matched more than one relation
    #[error("Identifier '{0}' is ambiguous")]
    AmbiguousIdentifier(String),

    /// A qualified reference names a relation not in scope
    #[error("Unexpected dataset reference '{0}'")]
    UnexpectedDatasetReference(String),

    /// Unknown relation, or a path outside the allowed roots
    #[error("Dataset '{0}' not found")]
    DatasetNotFound(String),

    /// Malformed `FOR` / `FOR DATES` clause
    #[error("Invalid temporal range filter: {0}")]
    InvalidTemporalRangeFilter(String),

    /// A connector signalled that a pushed predicate matched zero partitions
    #[error("Empty result set: {0}")]
    EmptyResultSet(String),

    /// The session lacks the permission for this statement kind
    #[error("Not permitted to execute this statement: {0}")]
    Permissions(String),

    /// Invalid API arguments
    #[error("Programming error: {0}")]
    Programming(String),

    /// Internal assertion failure; should never fire for user input
    #[error("Invalid internal state: {0}")]
    InvalidInternalState(String),

    /// I/O error from the CLI output path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
