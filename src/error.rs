//! Engine error model.

use thiserror::Error;

use crate::model::ValidationError;

/// Result type used by every engine operation.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// `NotFound` and `NoSpace` are recoverable: the transaction that produced
/// them is rolled back and the inventory is left unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Unknown item or container, or an item that is not currently placed.
    #[error("not found: {0}")]
    NotFound(String),

    /// No position could be found or freed.
    #[error("no space: {0}")]
    NoSpace(String),

    /// The item cannot fit a container even when it is empty.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The operation is not allowed in the item's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An id is already registered.
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn no_space(msg: impl Into<String>) -> Self {
        Self::NoSpace(msg.into())
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Stable machine-readable code, used by the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::NoSpace(_) => "no_space",
            EngineError::InvalidGeometry(_) => "invalid_geometry",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::Duplicate(_) => "duplicate",
            EngineError::Validation(_) => "validation",
        }
    }
}
