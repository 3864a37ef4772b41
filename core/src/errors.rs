use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error produced by a user supplied factory.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type ScopeResult<T> = Result<T, ScopeError>;

#[derive(Debug, Error)]
pub enum ScopeError {
    /// A value for the same type key was already added to this exact scope.
    #[error("DUPLICATE REGISTRATION: {type_name} already present in scope '{scope}'")]
    DuplicateRegistration {
        type_name: &'static str,
        scope: String,
    },

    /// Internal consistency failure; indicates a bug or improper nesting.
    #[error("INVARIANT VIOLATION: {code} - {message}")]
    InvariantViolation { code: &'static str, message: String },

    #[error("UNSUPPORTED OPERATION: {operation} - {message}")]
    UnsupportedOperation {
        operation: &'static str,
        message: String,
    },

    /// The lazily invoked factory for a type failed; nothing was stored.
    #[error("CONSTRUCTION ERROR: failed to create {type_name}: {source}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("NOT CONSTRUCTIBLE: no factory declared for {type_name}")]
    NotConstructible { type_name: &'static str },

    #[error("TYPE MISMATCH: value stored for {expected} is not of that type")]
    TypeMismatch { expected: &'static str },
}

impl ScopeError {
    pub(crate) fn invariant(code: &'static str, message: impl Into<String>) -> Self {
        let error = ScopeError::InvariantViolation {
            code,
            message: message.into(),
        };
        log::error!("{}", error);
        error
    }

    /// True for failures that indicate a defect in the engine rather than caller misuse.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScopeError::InvariantViolation { .. })
    }
}
