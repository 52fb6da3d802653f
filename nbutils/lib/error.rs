//! `nbutils::error` is a module containing error utilities for the nbcontainer project.

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an nbutils-related operation.
pub type NbutilsResult<T> = Result<T, NbutilsError>;

/// An error that occurred in one of the nbutils helpers.
#[derive(pretty_error_debug::Debug, Error)]
pub enum NbutilsError {
    /// A path failed validation.
    #[error("path validation error: {0}")]
    PathValidation(String),

    /// A path could not be expressed relative to its expected root.
    #[error("path {path} is not inside {root}")]
    OutsideRoot {
        /// The offending path.
        path: String,

        /// The root the path was expected to live under.
        root: String,
    },

    /// An error that occurred when performing an IO operation.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
