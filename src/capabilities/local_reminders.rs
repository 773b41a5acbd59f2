use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capabilities::reminders::{ReminderRequest, ReminderScheduler};
use crate::error::ReminderError;

/// Reminders never fire sooner than this after being scheduled
const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// In-process reminder backend built on tokio timers
///
/// Each key owns at most one sleeping task. When the task wakes, the
/// reminder is pushed to the delivery channel (the terminal UI prints it).
pub struct LocalReminderScheduler {
    enabled: bool,
    min_delay: Duration,
    pending: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    delivery: mpsc::UnboundedSender<ReminderRequest>,
}

impl LocalReminderScheduler {
    pub fn new(delivery: mpsc::UnboundedSender<ReminderRequest>) -> Self {
        Self {
            enabled: true,
            min_delay: DEFAULT_MIN_DELAY,
            pending: Arc::new(Mutex::new(HashMap::new())),
            delivery,
        }
    }

    /// Disable delivery; permission requests and schedules are refused
    pub fn disabled(delivery: mpsc::UnboundedSender<ReminderRequest>) -> Self {
        let mut scheduler = Self::new(delivery);
        scheduler.enabled = false;
        scheduler
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Number of reminders still waiting to fire
    pub async fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .await
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    fn delay_until(&self, fire_at: DateTime<Utc>) -> Duration {
        let until = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        until.max(self.min_delay)
    }
}

#[async_trait]
impl ReminderScheduler for LocalReminderScheduler {
    async fn request_permission(&self) -> Result<(), ReminderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ReminderError::PermissionDenied)
        }
    }

    async fn schedule_one_shot(
        &self,
        fire_at: DateTime<Utc>,
        title: &str,
        body: &str,
        key: &str,
    ) -> Result<(), ReminderError> {
        if !self.enabled {
            return Err(ReminderError::PermissionDenied);
        }

        let delay = self.delay_until(fire_at);
        let request = ReminderRequest {
            fire_at,
            title: title.to_string(),
            body: body.to_string(),
            key: key.to_string(),
        };
        let delivery = self.delivery.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(key = %request.key, "Reminder: {}", request.title);
            let _ = delivery.send(request);
        });

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.insert(key.to_string(), task) {
            previous.abort();
            debug!(key = %key, "Replaced pending reminder");
        }
        Ok(())
    }

    async fn cancel_all(&self, key: &str) {
        if let Some(task) = self.pending.lock().await.remove(key) {
            task.abort();
        }
    }
}

impl Drop for LocalReminderScheduler {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_lock() {
            for (_, task) in pending.drain() {
                task.abort();
            }
        }
    }
}
