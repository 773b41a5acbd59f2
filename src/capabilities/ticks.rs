use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

/// Identifies one tick subscription
///
/// Every tick carries the token of the subscription that produced it, so
/// the engine can drop ticks from a subscription it already cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickToken(pub u64);

/// Periodic tick source for UI refresh
///
/// Ticks only trigger recomputation; they never decide elapsed time.
pub trait TickSource: Send {
    /// Start a repeating subscription with the given period
    fn subscribe(&mut self, period: Duration) -> TickToken;

    /// Stop a subscription; no further ticks are produced for `token`
    fn cancel(&mut self, token: TickToken);
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tick source backed by tokio intervals
///
/// Each subscription is a task that sends its token to `sink` once per
/// period. The first tick arrives one period after subscribing.
pub struct IntervalTickSource {
    sink: mpsc::UnboundedSender<TickToken>,
    next_id: u64,
    tasks: HashMap<TickToken, JoinHandle<()>>,
}

impl IntervalTickSource {
    pub fn new(sink: mpsc::UnboundedSender<TickToken>) -> Self {
        Self {
            sink,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    /// Number of live subscriptions
    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl TickSource for IntervalTickSource {
    /// Periods below 1ms are raised to 1ms
    fn subscribe(&mut self, period: Duration) -> TickToken {
        let period = period.max(MIN_PERIOD);
        self.next_id += 1;
        let token = TickToken(self.next_id);
        let sink = self.sink.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if sink.send(token).is_err() {
                    break;
                }
            }
        });

        trace!(token = token.0, "Tick subscription started");
        self.tasks.insert(token, task);
        token
    }

    fn cancel(&mut self, token: TickToken) {
        if let Some(task) = self.tasks.remove(&token) {
            task.abort();
            trace!(token = token.0, "Tick subscription cancelled");
        }
    }
}

impl Drop for IntervalTickSource {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
