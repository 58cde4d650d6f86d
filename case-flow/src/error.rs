use thiserror::Error;

/// Error taxonomy for the case workflow.
///
/// Phase entry points never let these escape to the caller: extraction
/// degrades into an error-marker result and retrieval converts failures into
/// user-visible progress text. The variants exist so that boundary code can
/// distinguish an unreachable network from a service that answered with a
/// failure, and so that a malformed stream event kills the run but not the
/// session.
#[derive(Error, Debug)]
pub enum FlowError {
    /// The external collaborator could not be reached at all.
    #[error("network unreachable: {0}")]
    Transport(String),

    /// The external collaborator was reached but returned a failure.
    #[error("service error: {0}")]
    Service(String),

    /// A streamed event did not match any known shape. Fatal to the
    /// retrieval run, not to the session.
    #[error("malformed stream event: {0}")]
    StreamProtocol(String),

    /// The conversation store rejected a read or write.
    #[error("conversation store error: {0}")]
    Store(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
