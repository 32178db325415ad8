use grid_layout::{LayoutError, SelectorError};
use thiserror::Error;

use crate::media_query::MediaQueryError;

/// Failures surfaced synchronously to the caller of a public entry point.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("grid {selector:?} does not exist")]
    NotFound { selector: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("invalid media query: {0}")]
    MediaQuery(#[from] MediaQueryError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl GridError {
    /// True for the errors raised by argument validation at the registry boundary.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            GridError::InvalidArgument(_)
                | GridError::Selector(_)
                | GridError::MediaQuery(_)
                | GridError::Config(_)
        )
    }
}
