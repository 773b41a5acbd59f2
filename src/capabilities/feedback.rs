use std::io::Write;
use tracing::trace;

/// Tick and completion cues (haptics, sounds, bells)
///
/// Both calls are fire-and-forget and must never fail.
pub trait FeedbackEmitter: Send + Sync {
    /// Countdown cue on qualifying whole seconds
    fn on_tick(&self);

    /// A step just completed or was skipped
    fn on_step_complete(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedback;

impl FeedbackEmitter for NoopFeedback {
    fn on_tick(&self) {}
    fn on_step_complete(&self) {}
}

/// Rings the terminal bell
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalFeedback {
    /// Also ring on countdown ticks, not just step completion
    pub bell_on_tick: bool,
}

impl TerminalFeedback {
    fn ring() {
        let mut out = std::io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

impl FeedbackEmitter for TerminalFeedback {
    fn on_tick(&self) {
        trace!("tick cue");
        if self.bell_on_tick {
            Self::ring();
        }
    }

    fn on_step_complete(&self) {
        trace!("step complete cue");
        Self::ring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_silent_feedback_stands_in_for_bell() {
        let feedback: Arc<dyn FeedbackEmitter> = Arc::new(NoopFeedback);
        feedback.on_tick();
        feedback.on_step_complete();
    }
}
