use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ReminderError;

/// A one-shot reminder for an upcoming step boundary
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderRequest {
    /// Absolute instant the reminder should fire
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    /// Stable per-routine key; scheduling again under the same key overwrites
    pub key: String,
}

/// Trait for reminder delivery backends
///
/// Implementations keep at most one pending reminder per key:
/// - `schedule_one_shot` replaces any reminder already pending under `key`
/// - `cancel_all` removes every pending reminder for `key`, fired or not
#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    /// Ask the platform for permission to deliver reminders
    async fn request_permission(&self) -> Result<(), ReminderError>;

    /// Schedule a reminder, overwriting any prior one sharing `key`
    async fn schedule_one_shot(
        &self,
        fire_at: DateTime<Utc>,
        title: &str,
        body: &str,
        key: &str,
    ) -> Result<(), ReminderError>;

    /// Remove any pending reminder for `key`
    async fn cancel_all(&self, key: &str);
}

/// Operation queued by the engine for the reminder backend
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderOp {
    Schedule(ReminderRequest),
    Cancel { key: String },
}

/// Fire-and-continue front end for a [`ReminderScheduler`]
///
/// The engine pushes operations onto an unbounded channel and never waits
/// for the backend. A single worker drains the channel in order, so a
/// cancel issued after a schedule can never overtake it.
#[derive(Debug, Clone)]
pub struct ReminderDispatcher {
    tx: mpsc::UnboundedSender<ReminderOp>,
}

impl ReminderDispatcher {
    /// Spawn the worker task on the current tokio runtime
    pub fn spawn(scheduler: Arc<dyn ReminderScheduler>) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel();
        let worker = tokio::spawn(run_worker(scheduler, rx));
        (dispatcher, worker)
    }

    /// Create a dispatcher whose operations are read from the returned receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReminderOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn schedule(&self, request: ReminderRequest) -> Result<(), ReminderError> {
        self.tx
            .send(ReminderOp::Schedule(request))
            .map_err(|_| ReminderError::DispatcherClosed)
    }

    pub fn cancel(&self, key: &str) -> Result<(), ReminderError> {
        self.tx
            .send(ReminderOp::Cancel { key: key.to_string() })
            .map_err(|_| ReminderError::DispatcherClosed)
    }
}

/// Drain queued operations into the backend until every dispatcher is dropped
pub async fn run_worker(
    scheduler: Arc<dyn ReminderScheduler>,
    mut rx: mpsc::UnboundedReceiver<ReminderOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            ReminderOp::Schedule(request) => {
                let result = scheduler
                    .schedule_one_shot(request.fire_at, &request.title, &request.body, &request.key)
                    .await;
                match result {
                    Ok(()) => debug!(key = %request.key, fire_at = %request.fire_at, "Reminder scheduled"),
                    Err(e) => warn!(key = %request.key, "Failed to schedule reminder: {}", e),
                }
            }
            ReminderOp::Cancel { key } => {
                scheduler.cancel_all(&key).await;
                debug!(key = %key, "Reminder cancelled");
            }
        }
    }
    debug!("Reminder dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::mock::{RecordingReminders, ReminderCall};

    fn request(key: &str, title: &str) -> ReminderRequest {
        ReminderRequest {
            fire_at: Utc::now(),
            title: title.to_string(),
            body: String::new(),
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_worker_preserves_order() {
        let backend = RecordingReminders::new();
        let (dispatcher, worker) = ReminderDispatcher::spawn(Arc::new(backend.clone()));

        dispatcher.schedule(request("r1", "Next: A")).unwrap();
        dispatcher.cancel("r1").unwrap();
        dispatcher.schedule(request("r1", "Next: B")).unwrap();
        drop(dispatcher);
        worker.await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], ReminderCall::Schedule(r) if r.title == "Next: A"));
        assert_eq!(calls[1], ReminderCall::Cancel("r1".to_string()));
        assert!(matches!(&calls[2], ReminderCall::Schedule(r) if r.title == "Next: B"));
        assert_eq!(backend.pending("r1").map(|r| r.title), Some("Next: B".to_string()));
    }

    #[tokio::test]
    async fn test_worker_survives_backend_failures() {
        let backend = RecordingReminders::new();
        backend.set_failing(true);
        let (dispatcher, worker) = ReminderDispatcher::spawn(Arc::new(backend.clone()));

        dispatcher.schedule(request("r1", "Next: A")).unwrap();
        dispatcher.cancel("r1").unwrap();
        drop(dispatcher);
        worker.await.unwrap();

        // The failed schedule is recorded as attempted, the cancel still runs
        assert_eq!(backend.calls().len(), 2);
        assert!(backend.pending("r1").is_none());
    }

    #[test]
    fn test_closed_dispatcher_reports_error() {
        let (dispatcher, rx) = ReminderDispatcher::channel();
        drop(rx);
        assert!(matches!(
            dispatcher.cancel("r1"),
            Err(ReminderError::DispatcherClosed)
        ));
    }
}
