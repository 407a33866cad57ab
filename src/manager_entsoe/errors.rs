use thiserror::Error;
use crate::normalizer::NormalizeError;

#[derive(Error, Debug)]
pub enum EntsoeError {
    #[error("ParseError: {0}")]
    Parse(String),
    #[error("MissingFirstPosition: period starting {0}")]
    MissingFirstPosition(String),
    #[error("UnsupportedResolution: {0}")]
    UnsupportedResolution(String),
    #[error("NormalizeError: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("NetworkError: {0}")]
    Network(#[from] reqwest::Error),
    #[error("NoContentError")]
    NoContent,
}
