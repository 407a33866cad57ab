use thiserror::Error;

/// Error depicting why a price query could not be answered
///
/// All variants are turned into an unavailable answer at the query boundary.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("InvalidMode: {0}")]
    InvalidMode(String),
    #[error("InvalidWindowSize: {0}")]
    InvalidWindowSize(String),
    #[error("NoWindowFound")]
    NoWindowFound,
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),
}
