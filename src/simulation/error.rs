use crate::simulation::routing::RoutingError;
use thiserror::Error;

/// Errors of the joint trip machinery. A search that finds nothing to do is not an error, operators
/// return `Ok(None)` in that case.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JointTripError {
    /// The plan link registry and the plans it describes have diverged. Fatal.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),
    /// A spliced or restored leg could not be routed. The move is abandoned.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Invalid setup detected before any matching or replanning runs. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl JointTripError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, JointTripError::Routing(_))
    }
}

pub type JointTripResult<T> = Result<T, JointTripError>;

#[cfg(test)]
mod tests {
    use crate::simulation::error::JointTripError;
    use crate::simulation::routing::RoutingError;

    #[test]
    fn routing_errors_are_recoverable() {
        let err: JointTripError = RoutingError {
            from: "a".to_string(),
            to: "b".to_string(),
        }
        .into();
        assert!(!err.is_fatal());
        assert_eq!("No route from link a to link b", err.to_string());
        assert!(JointTripError::ConsistencyViolation("x".to_string()).is_fatal());
        assert!(JointTripError::Configuration("x".to_string()).is_fatal());
    }
}
