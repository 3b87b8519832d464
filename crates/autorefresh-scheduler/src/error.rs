use autorefresh_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The durable store could not be read or written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The submitted timer definition is unusable.
    #[error("Invalid timer: {0}")]
    InvalidTimer(String),

    /// The operation would exceed a configured limit (e.g. maxTasks).
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// The alarm facility refused a registration.
    #[error("Alarm error: {0}")]
    Alarm(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
