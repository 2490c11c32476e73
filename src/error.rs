//! Error types for resolution and registration

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while registering or resolving contracts
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No registration and no unregistered plan exists for the contract
    #[error("Contract not resolvable: {contract}")]
    NotFound { contract: String },

    /// Top-level failure wrapping the deepest original cause
    #[error("Resolution of {contract} failed: {cause}")]
    ResolutionFailed {
        contract: String,
        cause: Box<DiError>,
    },

    /// Constructor, factory or injector failed to produce a value
    #[error("Failed to create {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// A contract was requested again while it was still being built
    #[error("Circular dependency detected while resolving: {contract}")]
    CircularDependency { contract: String },

    /// Resolution nested deeper than the configured limit
    #[error("Resolution depth {depth} exceeded while resolving: {contract}")]
    DepthExceeded { contract: String, depth: usize },

    /// Waiting for another thread's construction exceeded the resolve timeout
    #[error("Timed out after {timeout:?} waiting for {contract}")]
    Timeout { contract: String, timeout: Duration },

    /// A set-once lifetime manager received a second value
    #[error("Value for {type_name} can only be set once")]
    ValueAlreadySet { type_name: &'static str },

    /// An instance registration no longer holds its value
    #[error("Registered instance for {contract} is no longer available")]
    InstanceReleased { contract: String },

    /// An open generic registration cannot be closed over the requested argument
    #[error("Generic definition {definition} cannot be closed over {argument}")]
    GenericArgument {
        definition: &'static str,
        argument: &'static str,
    },

    /// The lifetime manager does not support the registration category
    #[error("Lifetime {lifetime} cannot be used with {category} registrations")]
    InvalidLifetime {
        lifetime: &'static str,
        category: &'static str,
    },

    /// The type-erased value did not hold the expected type
    #[error("Resolved value is not of type {expected}")]
    TypeMismatch { expected: &'static str },

    /// The scope was disposed
    #[error("Container has been disposed")]
    ContainerDisposed,
}

impl DiError {
    /// Create a NotFound error for a contract
    #[inline]
    pub fn not_found(contract: impl ToString) -> Self {
        Self::NotFound {
            contract: contract.to_string(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(contract: impl ToString) -> Self {
        Self::CircularDependency {
            contract: contract.to_string(),
        }
    }

    /// Create a Timeout error
    #[inline]
    pub fn timeout(contract: impl ToString, timeout: Duration) -> Self {
        Self::Timeout {
            contract: contract.to_string(),
            timeout,
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>() -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
        }
    }

    /// Wrap a cause for the top-level contract.
    ///
    /// An already aggregated error is unwrapped first so the result always
    /// carries the deepest cause exactly once.
    pub fn aggregate(contract: impl ToString, cause: DiError) -> Self {
        Self::ResolutionFailed {
            contract: contract.to_string(),
            cause: Box::new(cause.into_root_cause()),
        }
    }

    /// The deepest original cause
    pub fn root_cause(&self) -> &DiError {
        match self {
            Self::ResolutionFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    fn into_root_cause(self) -> DiError {
        match self {
            Self::ResolutionFailed { cause, .. } => cause.into_root_cause(),
            other => other,
        }
    }

    /// Whether the failure is a lifetime synchronization timeout
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }

    /// Whether the failure is a generic-construction incompatibility
    #[inline]
    pub fn is_generic_argument(&self) -> bool {
        matches!(self.root_cause(), Self::GenericArgument { .. })
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_keeps_deepest_cause() {
        let inner = DiError::timeout("Foo", Duration::from_millis(5));
        let middle = DiError::aggregate("Bar", inner);
        let outer = DiError::aggregate("Baz", middle);

        match &outer {
            DiError::ResolutionFailed { contract, cause } => {
                assert_eq!(contract, "Baz");
                assert!(matches!(**cause, DiError::Timeout { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(outer.is_timeout());
    }

    #[test]
    fn test_display() {
        let err = DiError::not_found("Widget");
        assert_eq!(err.to_string(), "Contract not resolvable: Widget");
    }
}
