use thiserror::Error;

#[derive(Debug, Error)]
pub enum NhanhocError {
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid job transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },
    #[error("job is still running: {0}")]
    JobStillRunning(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl NhanhocError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::JobNotFound(_) => "JobNotFound",
            Self::UnknownOperation(_) => "UnknownOperation",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::JobStillRunning(_) => "JobStillRunning",
            Self::Upstream(_) => "UpstreamError",
            Self::InternalError(_) => "InternalError",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_) | Self::UnknownOperation(_))
    }
}

pub type Result<T> = std::result::Result<T, NhanhocError>;
