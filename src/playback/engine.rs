use crate::capabilities::{
    FeedbackEmitter, MediaPlayer, MediaPreparer, ReminderDispatcher, ReminderRequest, TickSource,
    TickToken,
};
use crate::clock::{secs_between, secs_to_delta, TimeSource};
use crate::core::{Routine, Step};
use crate::playback::{
    progress, PlaybackConfig, PlaybackEvent, PlaybackObserver, PlaybackSnapshot, PlaybackState,
    ReminderPolicy,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Capabilities the engine calls out to, injected at construction
pub struct Collaborators {
    pub clock: Arc<dyn TimeSource>,
    pub reminders: ReminderDispatcher,
    pub media: Arc<dyn MediaPreparer>,
    pub feedback: Arc<dyn FeedbackEmitter>,
    pub ticks: Box<dyn TickSource>,
}

/// Playback engine for a timed routine
///
/// Remaining time is always a pure function of the wall clock, the instant
/// the current step started and the step duration. Ticks only trigger a
/// recompute, so missed or late ticks (suspension, a busy UI thread) never
/// cause drift.
pub struct PlaybackEngine {
    routine: Routine,
    config: PlaybackConfig,
    clock: Arc<dyn TimeSource>,
    reminders: ReminderDispatcher,
    media: Arc<dyn MediaPreparer>,
    feedback: Arc<dyn FeedbackEmitter>,
    ticks: Box<dyn TickSource>,
    observers: Vec<Box<dyn PlaybackObserver>>,

    state: PlaybackState,
    current_index: usize,
    remaining_in_step: f64,
    step_started_at: Option<DateTime<Utc>>,
    /// Live tick subscription; ticks with any other token are stale
    tick_token: Option<TickToken>,
    player: Option<Box<dyn MediaPlayer>>,
    /// (step index, whole remaining second) seen by the last tick
    last_cue: Option<(usize, u64)>,
}

impl PlaybackEngine {
    pub fn new(routine: Routine, config: PlaybackConfig, collaborators: Collaborators) -> Self {
        let remaining_in_step = routine
            .step(0)
            .map(|s| s.duration_secs as f64)
            .unwrap_or(0.0);
        Self {
            routine,
            config,
            clock: collaborators.clock,
            reminders: collaborators.reminders,
            media: collaborators.media,
            feedback: collaborators.feedback,
            ticks: collaborators.ticks,
            observers: Vec::new(),
            state: PlaybackState::Idle,
            current_index: 0,
            remaining_in_step,
            step_started_at: None,
            tick_token: None,
            player: None,
            last_cue: None,
        }
    }

    /// Register a listener for every subsequent transition
    pub fn add_observer(&mut self, observer: Box<dyn PlaybackObserver>) {
        self.observers.push(observer);
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Index of the current step; equals the step count once finished
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.routine.step(self.current_index)
    }

    pub fn remaining_in_step(&self) -> f64 {
        self.remaining_in_step
    }

    pub fn step_started_at(&self) -> Option<DateTime<Utc>> {
        self.step_started_at
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_token.is_some()
    }

    pub fn progress(&self) -> f64 {
        progress(&self.routine, self.current_index, self.remaining_in_step)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            current_index: self.current_index,
            step_count: self.routine.step_count(),
            remaining_in_step: self.remaining_in_step,
            media: self.player.as_ref().map(|p| p.asset().clone()),
            progress: self.progress(),
        }
    }

    /// Begin playback from the first step
    ///
    /// A routine without steps finishes immediately. Calling `start` again
    /// restarts from the first step.
    pub fn start(&mut self) {
        self.cancel_ticks();

        if self.routine.steps.is_empty() {
            warn!(routine = %self.routine.id, "Routine has no steps, finishing immediately");
            self.current_index = 0;
            self.remaining_in_step = 0.0;
            self.step_started_at = None;
            self.state = PlaybackState::Finished;
            self.emit(PlaybackEvent::Finished);
            return;
        }

        let now = self.clock.now();
        self.state = PlaybackState::Playing;
        self.current_index = 0;
        self.step_started_at = Some(now);
        self.remaining_in_step = self.current_duration();
        self.last_cue = None;

        info!(routine = %self.routine.id, steps = self.routine.step_count(), "Playback started");

        self.prepare_media_for_current_step();
        self.schedule_reminder_for_current_step();
        self.start_ticking();
        self.emit(PlaybackEvent::Started { step_index: 0 });
    }

    /// Freeze the countdown
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            debug!(state = ?self.state, "Ignoring pause");
            return;
        }

        self.state = PlaybackState::Paused;
        self.cancel_ticks();
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
        if self.config.reminder_policy == ReminderPolicy::WhilePlaying {
            self.cancel_reminder();
        }

        debug!(remaining = self.remaining_in_step, "Playback paused");
        self.emit(PlaybackEvent::Paused {
            remaining: self.remaining_in_step,
        });
    }

    /// Continue a paused countdown, keeping the time elapsed before the pause
    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            debug!(state = ?self.state, "Ignoring resume");
            return;
        }

        let elapsed = (self.current_duration() - self.remaining_in_step).max(0.0);
        self.step_started_at = Some(self.clock.now() - secs_to_delta(elapsed));
        self.state = PlaybackState::Playing;

        self.start_ticking();
        if let Some(player) = self.player.as_mut() {
            player.play();
        }
        if self.config.reminder_policy == ReminderPolicy::WhilePlaying {
            self.schedule_reminder_for_current_step();
        }

        debug!(remaining = self.remaining_in_step, "Playback resumed");
        self.emit(PlaybackEvent::Resumed {
            remaining: self.remaining_in_step,
        });
    }

    /// End the session; safe to call in any state
    ///
    /// A finished routine stays finished, everything else returns to idle.
    pub fn stop(&mut self) {
        self.cancel_ticks();
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
        self.cancel_reminder();
        self.step_started_at = None;

        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            info!(routine = %self.routine.id, "Playback stopped");
            self.state = PlaybackState::Idle;
            self.emit(PlaybackEvent::Stopped);
        }
    }

    /// Tick delivered by the tick source; stale subscriptions are ignored
    pub fn handle_tick(&mut self, token: TickToken) {
        if self.tick_token != Some(token) {
            trace!(token = token.0, "Dropping stale tick");
            return;
        }
        self.tick();
    }

    /// Recompute from the wall clock and advance on expiry
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing || self.current_index >= self.routine.step_count() {
            return;
        }

        self.recompute_remaining();
        if self.remaining_in_step <= 0.0 {
            self.advance_step();
            return;
        }

        self.emit_cue_if_due();
        self.emit(PlaybackEvent::Tick {
            remaining: self.remaining_in_step,
        });
    }

    /// Complete the current step and move to the next one
    ///
    /// Used for manual skips and for expiry. Works while paused or idle too,
    /// but never starts ticking by itself.
    pub fn advance_step(&mut self) {
        if self.state == PlaybackState::Finished {
            debug!("Ignoring advance on finished routine");
            return;
        }

        self.feedback.on_step_complete();
        self.current_index += 1;

        if self.current_index >= self.routine.step_count() {
            self.finish();
            return;
        }

        self.step_started_at = match self.state {
            PlaybackState::Idle => None,
            _ => Some(self.clock.now()),
        };
        self.remaining_in_step = self.current_duration();
        self.last_cue = None;

        debug!(step = self.current_index, "Advanced to next step");

        self.prepare_media_for_current_step();
        let may_remind = match self.config.reminder_policy {
            ReminderPolicy::Always => true,
            ReminderPolicy::WhilePlaying => self.state == PlaybackState::Playing,
        };
        if may_remind {
            self.schedule_reminder_for_current_step();
        }

        self.emit(PlaybackEvent::StepChanged {
            step_index: self.current_index,
            remaining: self.remaining_in_step,
        });
    }

    /// The host came back to the foreground
    ///
    /// Nothing ticked while suspended, so rebuild remaining time from the
    /// wall clock. A paused countdown stays frozen; expiry is left to the
    /// next tick.
    pub fn app_became_active(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.recompute_remaining();
        debug!(remaining = self.remaining_in_step, "Recomputed after becoming active");
        self.emit(PlaybackEvent::Tick {
            remaining: self.remaining_in_step,
        });
    }

    fn finish(&mut self) {
        info!(routine = %self.routine.id, "Routine finished");
        self.current_index = self.routine.step_count();
        self.remaining_in_step = 0.0;
        self.step_started_at = None;
        self.state = PlaybackState::Finished;

        self.cancel_ticks();
        self.cancel_reminder();
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
        self.emit(PlaybackEvent::Finished);
    }

    fn current_duration(&self) -> f64 {
        self.current_step()
            .map(|s| s.duration_secs as f64)
            .unwrap_or(0.0)
    }

    fn recompute_remaining(&mut self) {
        let Some(started) = self.step_started_at else {
            return;
        };
        // A clock stepping backwards never adds time to the step
        let elapsed = secs_between(started, self.clock.now()).max(0.0);
        self.remaining_in_step = (self.current_duration() - elapsed).max(0.0);
    }

    /// Cue once if a qualifying whole second was reached since the last tick
    ///
    /// Slow or late ticks still cue for a boundary they skipped over.
    fn emit_cue_if_due(&mut self) {
        let every = self.config.cue_every_secs;
        if every == 0 {
            return;
        }
        let whole = self.remaining_in_step.floor() as u64;
        let upper = match self.last_cue {
            Some((index, seen)) if index == self.current_index => seen,
            _ => self.current_duration() as u64,
        };
        self.last_cue = Some((self.current_index, whole));

        // Smallest nonzero multiple of `every` at or above `whole`
        let boundary = whole.max(1).div_ceil(every) * every;
        if boundary < upper {
            self.feedback.on_tick();
        }
    }

    fn start_ticking(&mut self) {
        self.cancel_ticks();
        self.tick_token = Some(self.ticks.subscribe(self.config.tick_interval));
    }

    fn cancel_ticks(&mut self) {
        if let Some(token) = self.tick_token.take() {
            self.ticks.cancel(token);
        }
    }

    fn prepare_media_for_current_step(&mut self) {
        if let Some(mut previous) = self.player.take() {
            previous.pause();
        }

        let Some(asset) = self.current_step().and_then(|s| s.video.clone()) else {
            return;
        };

        self.media.preload(&asset);
        match self.media.prepare(&asset) {
            Ok(mut player) => {
                if self.state == PlaybackState::Playing {
                    player.play();
                }
                self.player = Some(player);
            }
            Err(e) => {
                warn!(asset = %asset, "Media unavailable, showing text only: {}", e);
            }
        }
    }

    fn schedule_reminder_for_current_step(&mut self) {
        let Some(step) = self.current_step() else {
            return;
        };
        let started = self.step_started_at.unwrap_or_else(|| self.clock.now());
        let fire_at = started + TimeDelta::seconds(step.duration_secs as i64);

        let (title, body) = match self.routine.step(self.current_index + 1) {
            Some(next) => (
                format!("Next: {}", next.title),
                next.instructions_preview(self.config.preview_chars),
            ),
            None => ("Next: Done".to_string(), "Routine complete".to_string()),
        };

        let request = ReminderRequest {
            fire_at,
            title,
            body,
            key: self.routine.reminder_key(),
        };
        if let Err(e) = self.reminders.schedule(request) {
            warn!(routine = %self.routine.id, "Could not queue reminder: {}", e);
        }
    }

    fn cancel_reminder(&mut self) {
        if let Err(e) = self.reminders.cancel(&self.routine.reminder_key()) {
            warn!(routine = %self.routine.id, "Could not queue reminder cancel: {}", e);
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        for observer in self.observers.iter_mut() {
            observer.on_event(&event);
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.cancel_ticks();
    }
}
