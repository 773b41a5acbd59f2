pub mod engine;
pub mod progress;
pub mod session;

pub use engine::{Collaborators, PlaybackEngine};
pub use progress::{format_clock, progress};
pub use session::{SessionCommand, SessionHandle};

use crate::core::AssetRef;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// When step-boundary reminders may be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPolicy {
    /// Every step transition schedules a reminder, even a skip while paused
    #[default]
    Always,
    /// Only a running countdown has a reminder; pausing cancels it and
    /// resuming schedules it again
    WhilePlaying,
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Period of the UI refresh tick
    pub tick_interval: Duration,
    /// Tick cue on whole seconds divisible by this (0 disables cues)
    pub cue_every_secs: u64,
    /// Characters of the next step's instructions carried in reminders
    pub preview_chars: usize,
    pub reminder_policy: ReminderPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            cue_every_secs: 5,
            preview_chars: 120,
            reminder_policy: ReminderPolicy::Always,
        }
    }
}

/// Observable transition reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { step_index: usize },
    Paused { remaining: f64 },
    Resumed { remaining: f64 },
    Stopped,
    StepChanged { step_index: usize, remaining: f64 },
    Finished,
    /// Wall-clock recompute while playing
    Tick { remaining: f64 },
}

/// Listener for engine transitions, called in order on the engine's context
pub trait PlaybackObserver: Send {
    fn on_event(&mut self, event: &PlaybackEvent);
}

impl PlaybackObserver for mpsc::UnboundedSender<PlaybackEvent> {
    fn on_event(&mut self, event: &PlaybackEvent) {
        let _ = self.send(event.clone());
    }
}

/// Observer that keeps every event it sees
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PlaybackObserver for EventLog {
    fn on_event(&mut self, event: &PlaybackEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Read-only view of the engine for presentation
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_index: usize,
    pub step_count: usize,
    pub remaining_in_step: f64,
    /// Asset of the prepared media player, if any
    pub media: Option<AssetRef>,
    pub progress: f64,
}
