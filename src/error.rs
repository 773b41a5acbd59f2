use thiserror::Error;

/// Problems that make a routine unplayable or unstorable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutineError {
    #[error("routine must have at least one step")]
    NoSteps,
    #[error("step {index} has a zero duration")]
    ZeroDuration { index: usize },
    #[error("title is empty")]
    EmptyTitle,
    #[error("too many steps ({count}, max {max})")]
    TooManySteps { count: usize, max: usize },
    #[error("step {index}: duration {secs}s must be 5-3600 and a multiple of 5")]
    BadDraftDuration { index: usize, secs: u32 },
}

/// Reminder delivery failures
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("reminder permission denied")]
    PermissionDenied,
    #[error("reminder backend unavailable: {0}")]
    Unavailable(String),
    #[error("reminder dispatcher has shut down")]
    DispatcherClosed,
}

/// Media preparation failures
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media asset not found: {0}")]
    NotFound(String),
    #[error("unsupported media asset: {0}")]
    Unsupported(String),
}

/// Routine library failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("routine {0} not found")]
    NotFound(uuid::Uuid),
    #[error("routine {0} already exists")]
    Duplicate(uuid::Uuid),
    #[error(transparent)]
    Invalid(#[from] RoutineError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed routine library: {0}")]
    Json(#[from] serde_json::Error),
}

/// Playback session driver failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("playback session has ended")]
    Closed,
}
