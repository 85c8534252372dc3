use thiserror::Error;

/// Failure taxonomy shared by the reconciliation core and the metrics cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// Network failure, timeout or cancellation on a collaborator call.
    #[error("upstream {collaborator} unavailable: {reason}")]
    UpstreamUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("insufficient data for draw {draw_number}: {what}")]
    InsufficientData { draw_number: u64, what: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ReconcileError {
    pub fn upstream(collaborator: &'static str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }

    pub fn insufficient(draw_number: u64, what: impl Into<String>) -> Self {
        Self::InsufficientData {
            draw_number,
            what: what.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
