use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::capabilities::{IntervalTickSource, TickSource, TickToken};
use crate::error::SessionError;
use crate::playback::{PlaybackEngine, PlaybackSnapshot};

/// Control request for a running session
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Pause,
    Resume,
    Skip,
    Stop,
    AppBecameActive,
    Snapshot(oneshot::Sender<PlaybackSnapshot>),
    Shutdown,
}

/// Handle to an engine running on its own task
///
/// The task owns the engine outright. Controls and ticks arrive on channels
/// and are applied one at a time, so every mutation is serialized without a
/// lock around the engine.
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<PlaybackSnapshot>,
}

impl SessionHandle {
    /// Build an engine around a tokio interval tick source and run it
    ///
    /// `make_engine` receives the tick source the engine must own.
    pub fn spawn<F>(make_engine: F) -> Self
    where
        F: FnOnce(Box<dyn TickSource>) -> PlaybackEngine,
    {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let engine = make_engine(Box::new(IntervalTickSource::new(tick_tx)));

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(engine, rx, tick_rx));
        Self { tx, task }
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::Closed)
    }

    pub fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start)
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resume)
    }

    pub fn skip(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Skip)
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop)
    }

    pub fn app_became_active(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::AppBecameActive)
    }

    /// Current engine state, after every previously sent command
    pub async fn snapshot(&self) -> Result<PlaybackSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop playback, end the task and return the final state
    pub async fn shutdown(self) -> Result<PlaybackSnapshot, SessionError> {
        // The task may already be gone; awaiting it reports that
        let _ = self.tx.send(SessionCommand::Shutdown);
        self.task.await.map_err(|_| SessionError::Closed)
    }
}

async fn run_session(
    mut engine: PlaybackEngine,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut ticks: mpsc::UnboundedReceiver<TickToken>,
) -> PlaybackSnapshot {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(SessionCommand::Shutdown) => break,
                Some(command) => apply(&mut engine, command),
            },
            Some(token) = ticks.recv() => engine.handle_tick(token),
        }
    }

    engine.stop();
    debug!(routine = %engine.routine().id, "Playback session ended");
    engine.snapshot()
}

fn apply(engine: &mut PlaybackEngine, command: SessionCommand) {
    match command {
        SessionCommand::Start => engine.start(),
        SessionCommand::Pause => engine.pause(),
        SessionCommand::Resume => engine.resume(),
        SessionCommand::Skip => engine.advance_step(),
        SessionCommand::Stop => engine.stop(),
        SessionCommand::AppBecameActive => engine.app_became_active(),
        SessionCommand::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        SessionCommand::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::mock::{CountingFeedback, FakeMedia, RecordingReminders, ReminderCall};
    use crate::capabilities::ReminderDispatcher;
    use crate::clock::ManualClock;
    use crate::core::{Routine, Step};
    use crate::playback::{Collaborators, PlaybackConfig, PlaybackEvent, PlaybackState};
    use std::sync::Arc;
    use std::time::Duration;

    struct Running {
        session: SessionHandle,
        clock: ManualClock,
        reminders: RecordingReminders,
        worker: JoinHandle<()>,
        events: mpsc::UnboundedReceiver<PlaybackEvent>,
    }

    fn spawn(durations: &[u32]) -> Running {
        spawn_with_interval(durations, Duration::from_millis(5))
    }

    fn spawn_with_interval(durations: &[u32], tick_interval: Duration) -> Running {
        let routine = Routine::new(
            "Session",
            "",
            durations.iter().map(|d| Step::new("step", *d, "")).collect(),
        );
        let clock = ManualClock::default();
        let reminders = RecordingReminders::new();
        let (dispatcher, worker) = ReminderDispatcher::spawn(Arc::new(reminders.clone()));
        let (event_tx, events) = mpsc::unbounded_channel();
        let config = PlaybackConfig {
            tick_interval,
            ..PlaybackConfig::default()
        };

        let engine_clock = clock.clone();
        let session = SessionHandle::spawn(move |ticks| {
            let mut engine = PlaybackEngine::new(
                routine,
                config,
                Collaborators {
                    clock: Arc::new(engine_clock),
                    reminders: dispatcher,
                    media: Arc::new(FakeMedia::new()),
                    feedback: Arc::new(CountingFeedback::new()),
                    ticks,
                },
            );
            engine.add_observer(Box::new(event_tx));
            engine
        });

        Running {
            session,
            clock,
            reminders,
            worker,
            events,
        }
    }

    async fn wait_for(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>, wanted: PlaybackEvent) {
        let found = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = events.recv().await {
                if event == wanted {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(found, Ok(true), "never saw {wanted:?}");
    }

    #[tokio::test]
    async fn test_ticks_drive_step_expiry() {
        let mut run = spawn(&[10, 10]);
        run.session.start().unwrap();
        wait_for(&mut run.events, PlaybackEvent::Started { step_index: 0 }).await;

        run.clock.advance_secs(10.0);
        wait_for(
            &mut run.events,
            PlaybackEvent::StepChanged {
                step_index: 1,
                remaining: 10.0,
            },
        )
        .await;

        run.clock.advance_secs(10.0);
        wait_for(&mut run.events, PlaybackEvent::Finished).await;

        let snapshot = run.session.shutdown().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Finished);
        assert_eq!(snapshot.current_index, 2);

        run.worker.await.unwrap();
        let calls = run.reminders.calls();
        let schedules = calls
            .iter()
            .filter(|c| matches!(c, ReminderCall::Schedule(_)))
            .count();
        assert_eq!(schedules, 2);
        // Finishing cancels once, shutdown's stop cancels again
        assert!(matches!(calls.last(), Some(ReminderCall::Cancel(_))));
    }

    #[tokio::test]
    async fn test_paused_session_does_not_tick() {
        let mut run = spawn(&[10]);
        run.session.start().unwrap();
        run.session.pause().unwrap();

        run.clock.advance_secs(30.0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let snapshot = run.session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert_eq!(snapshot.current_index, 0);
        assert_eq!(snapshot.remaining_in_step, 10.0);

        run.session.resume().unwrap();
        // Let the resume land before time moves on
        run.session.snapshot().await.unwrap();
        run.clock.advance_secs(4.0);
        run.session.app_became_active().unwrap();
        let snapshot = run.session.snapshot().await.unwrap();
        assert_eq!(snapshot.remaining_in_step, 6.0);

        run.session.skip().unwrap();
        wait_for(&mut run.events, PlaybackEvent::Finished).await;
        run.session.stop().unwrap();
        run.session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_tick_interval_still_expires_steps() {
        let mut run = spawn_with_interval(&[10, 10], Duration::ZERO);
        run.session.start().unwrap();
        wait_for(&mut run.events, PlaybackEvent::Started { step_index: 0 }).await;

        run.clock.advance_secs(10.0);
        wait_for(
            &mut run.events,
            PlaybackEvent::StepChanged {
                step_index: 1,
                remaining: 10.0,
            },
        )
        .await;

        run.clock.advance_secs(10.0);
        wait_for(&mut run.events, PlaybackEvent::Finished).await;

        let snapshot = run.session.shutdown().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Finished);
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let run = spawn(&[10]);
        let tx = run.session.tx.clone();
        run.session.shutdown().await.unwrap();
        assert!(tx.send(SessionCommand::Start).is_err());
    }
}
