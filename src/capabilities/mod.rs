pub mod reminders;
pub mod local_reminders;
pub mod media;
pub mod feedback;
pub mod ticks;
pub mod mock;

pub use reminders::{ReminderDispatcher, ReminderOp, ReminderRequest, ReminderScheduler};
pub use local_reminders::LocalReminderScheduler;
pub use media::{FileMediaPreparer, MediaPlayer, MediaPreparer};
pub use feedback::{FeedbackEmitter, NoopFeedback, TerminalFeedback};
pub use ticks::{IntervalTickSource, TickSource, TickToken};
