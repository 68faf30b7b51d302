//! Error taxonomy for the boundary layer
//!
//! Engine working-memory failures are [`HeapError`]; everything that can go
//! wrong while crossing the boundary is a [`BridgeError`]. Status codes
//! returned by the engine are not errors and travel as [`crate::engine::Status`].

use crate::bridge::QueryState;
use crate::engine::Status;
use crate::managed::ManagedFault;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures raised by engine working memory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("working memory cannot grow to {requested} cells (limit {limit}, in use {in_use})")]
    Overflow {
        requested: usize,
        in_use: usize,
        limit: usize,
    },

    #[error("cell {0} is already bound")]
    NotUnbound(u32),

    #[error("cell {0} does not exist")]
    Dangling(u32),

    #[error("cell {0} is not a list")]
    NotAList(u32),

    #[error("list through cell {0} does not terminate")]
    Unterminated(u32),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Working memory could not be grown before list construction
    #[error("fatal allocation failure: {0}")]
    FatalAllocation(HeapError),

    #[error("callback invoked with no caller registered")]
    MissingRegistration,

    #[error("could not find the class of the registered caller")]
    MissingClass,

    #[error("could not find method {name}{signature} on {class}")]
    MissingMethod {
        class: String,
        name: &'static str,
        signature: &'static str,
    },

    #[error(transparent)]
    ManagedFault(#[from] ManagedFault),

    #[error("callback did not return a byte buffer")]
    NullReply,

    #[error("engine reported {status}: {message}")]
    EngineQuery { status: Status, message: String },

    #[error("engine initialization failed with {0}")]
    EngineInit(Status),

    #[error("unsupported query arity {0}, expected 1..=3")]
    InvalidArity(usize),

    #[error("list holds {actual} elements but {declared} were declared")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("malformed byte list: {0}")]
    MalformedList(String),

    #[error("list element {0} is outside 0..=255")]
    ValueOutOfRange(i64),

    #[error("zero-length buffers are rejected")]
    EmptyBuffer,

    #[error("invalid query state transition {from:?} -> {to:?}")]
    InvalidTransition { from: QueryState, to: QueryState },

    #[error("bridge is poisoned by an earlier fatal failure")]
    Poisoned,

    #[error("could not attach thread to the managed runtime: {0}")]
    ThreadAttach(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Heap failures other than overflow are bugs in term construction and
    /// surface as malformed lists; overflow is always fatal.
    pub(crate) fn from_heap(err: HeapError) -> Self {
        match err {
            HeapError::Overflow { .. } => Self::FatalAllocation(err),
            other => Self::MalformedList(other.to_string()),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAllocation(_))
    }
}

impl From<HeapError> for BridgeError {
    fn from(err: HeapError) -> Self {
        Self::from_heap(err)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_is_fatal() {
        let err: BridgeError = HeapError::Overflow {
            requested: 10,
            in_use: 4,
            limit: 8,
        }
        .into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_binding_errors_are_not_fatal() {
        let err: BridgeError = HeapError::NotUnbound(3).into();
        assert!(!err.is_fatal());
        assert!(matches!(err, BridgeError::MalformedList(_)));
    }

    #[test]
    fn test_messages() {
        let err = BridgeError::LengthMismatch { declared: 4, actual: 3 };
        assert_eq!(err.to_string(), "list holds 3 elements but 4 were declared");
        assert_eq!(
            BridgeError::InvalidArity(5).to_string(),
            "unsupported query arity 5, expected 1..=3"
        );
    }
}
