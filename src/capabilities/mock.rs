//! Fake collaborators for exercising the engine without a platform
//!
//! Every fake is cheaply cloneable; clones share their recorded state so a
//! test can hand one copy to the engine and inspect another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::capabilities::feedback::FeedbackEmitter;
use crate::capabilities::media::{MediaPlayer, MediaPreparer};
use crate::capabilities::reminders::{ReminderRequest, ReminderScheduler};
use crate::capabilities::ticks::{TickSource, TickToken};
use crate::core::AssetRef;
use crate::error::{MediaError, ReminderError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A call received by [`RecordingReminders`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderCall {
    Permission,
    Schedule(ReminderRequest),
    Cancel(String),
}

/// Reminder backend that records calls and keeps one pending entry per key
#[derive(Debug, Clone, Default)]
pub struct RecordingReminders {
    calls: Arc<Mutex<Vec<ReminderCall>>>,
    pending: Arc<Mutex<HashMap<String, ReminderRequest>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingReminders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every permission request and schedule fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ReminderCall> {
        lock(&self.calls).clone()
    }

    pub fn pending(&self, key: &str) -> Option<ReminderRequest> {
        lock(&self.pending).get(key).cloned()
    }
}

#[async_trait]
impl ReminderScheduler for RecordingReminders {
    async fn request_permission(&self) -> Result<(), ReminderError> {
        lock(&self.calls).push(ReminderCall::Permission);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReminderError::PermissionDenied);
        }
        Ok(())
    }

    async fn schedule_one_shot(
        &self,
        fire_at: DateTime<Utc>,
        title: &str,
        body: &str,
        key: &str,
    ) -> Result<(), ReminderError> {
        let request = ReminderRequest {
            fire_at,
            title: title.to_string(),
            body: body.to_string(),
            key: key.to_string(),
        };
        lock(&self.calls).push(ReminderCall::Schedule(request.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReminderError::Unavailable("simulated failure".to_string()));
        }
        lock(&self.pending).insert(key.to_string(), request);
        Ok(())
    }

    async fn cancel_all(&self, key: &str) {
        lock(&self.calls).push(ReminderCall::Cancel(key.to_string()));
        lock(&self.pending).remove(key);
    }
}

/// A call received by [`FakeMedia`] or one of its players
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    Preload(AssetRef),
    Prepare(AssetRef),
    Play(AssetRef),
    Pause(AssetRef),
}

/// Media preparer that records calls and can refuse chosen assets
#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    calls: Arc<Mutex<Vec<MediaCall>>>,
    broken: Arc<Mutex<HashSet<AssetRef>>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `prepare` fail for this asset
    pub fn break_asset(&self, asset: AssetRef) {
        lock(&self.broken).insert(asset);
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, predicate: impl Fn(&MediaCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }
}

impl MediaPreparer for FakeMedia {
    fn prepare(&self, asset: &AssetRef) -> Result<Box<dyn MediaPlayer>, MediaError> {
        lock(&self.calls).push(MediaCall::Prepare(asset.clone()));
        if lock(&self.broken).contains(asset) {
            return Err(MediaError::NotFound(asset.to_string()));
        }
        Ok(Box::new(FakePlayer {
            asset: asset.clone(),
            playing: false,
            calls: self.calls.clone(),
        }))
    }

    fn preload(&self, asset: &AssetRef) {
        lock(&self.calls).push(MediaCall::Preload(asset.clone()));
    }
}

struct FakePlayer {
    asset: AssetRef,
    playing: bool,
    calls: Arc<Mutex<Vec<MediaCall>>>,
}

impl MediaPlayer for FakePlayer {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn play(&mut self) {
        self.playing = true;
        lock(&self.calls).push(MediaCall::Play(self.asset.clone()));
    }

    fn pause(&mut self) {
        self.playing = false;
        lock(&self.calls).push(MediaCall::Pause(self.asset.clone()));
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Feedback emitter that counts cues
#[derive(Debug, Clone, Default)]
pub struct CountingFeedback {
    ticks: Arc<AtomicUsize>,
    completions: Arc<AtomicUsize>,
}

impl CountingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

impl FeedbackEmitter for CountingFeedback {
    fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_step_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct TickLog {
    next_id: u64,
    active: HashSet<TickToken>,
    subscribed: usize,
    cancelled: usize,
    last_period: Option<Duration>,
}

/// Tick source that never ticks on its own; tests deliver ticks by hand
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    log: Arc<Mutex<TickLog>>,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live subscription, if exactly one exists
    pub fn active_token(&self) -> Option<TickToken> {
        let log = lock(&self.log);
        match log.active.len() {
            1 => log.active.iter().next().copied(),
            _ => None,
        }
    }

    pub fn active_count(&self) -> usize {
        lock(&self.log).active.len()
    }

    pub fn subscribed(&self) -> usize {
        lock(&self.log).subscribed
    }

    pub fn cancelled(&self) -> usize {
        lock(&self.log).cancelled
    }

    pub fn last_period(&self) -> Option<Duration> {
        lock(&self.log).last_period
    }
}

impl TickSource for ManualTicks {
    fn subscribe(&mut self, period: Duration) -> TickToken {
        let mut log = lock(&self.log);
        log.next_id += 1;
        let token = TickToken(log.next_id);
        log.active.insert(token);
        log.subscribed += 1;
        log.last_period = Some(period);
        token
    }

    fn cancel(&mut self, token: TickToken) {
        let mut log = lock(&self.log);
        if log.active.remove(&token) {
            log.cancelled += 1;
        }
    }
}
