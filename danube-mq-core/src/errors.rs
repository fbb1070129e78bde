use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed for user {0}")]
    Authentication(String),

    #[error("the {0} is already closed")]
    AlreadyClosed(&'static str),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("unable to send message to {destination}: {reason}")]
    Send { destination: String, reason: String },

    #[error("unable to acknowledge message {message_id}: {reason}")]
    Acknowledge { message_id: String, reason: String },

    #[error("message {0} has no pending delivery on this session")]
    NotPending(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl BrokerError {
    /// True when the error only reports that a resource was released earlier.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, BrokerError::AlreadyClosed(_))
    }

    /// True when the session does not hold the delivery, for instance because it was
    /// acknowledged already or delivered to another session.
    pub fn is_not_pending(&self) -> bool {
        matches!(self, BrokerError::NotPending(_))
    }
}
