use std::fmt::Display;

/// Failure kinds shared by the session store and both state machines.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a user cannot target themself")]
    SelfReference,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("message is {len} characters long, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = DomainError> = std::result::Result<T, E>;

impl DomainError {
    pub fn invalid_transition(from: impl Display, to: impl Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::SelfReference => "SELF_REFERENCE",
            Self::InvalidSchedule(_) => "INVALID_SCHEDULE",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_both_states() {
        let err = DomainError::invalid_transition("confirmed", "confirmed");
        assert_eq!(err.to_string(), "cannot transition from confirmed to confirmed");
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: DomainError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "INTERNAL");
        assert_eq!(err.to_string(), "disk full");
    }
}
