use newsroom_core::error::CoreError;

/// Errors raised by pipeline operations.
///
/// Per-recipient send failures are not errors: they are counted on the send
/// job and written to the delivery log.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Tracking ID not found")]
    TrackingNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A batch send stopped at a batch boundary because of shutdown.
    #[error("Send interrupted by shutdown")]
    Interrupted,
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Validation(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Conflict(message.into()))
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::Core(CoreError::NotFound { entity, id })
    }
}
