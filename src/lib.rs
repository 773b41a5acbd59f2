//! Step-by-step timed routine player
//!
//! [`playback::PlaybackEngine`] walks a [`core::Routine`] step by step.
//! Remaining time is always rebuilt from the wall clock, so a suspended or
//! throttled host picks up exactly where real time says it should be.
//! Reminders, media, feedback cues and ticks are capabilities injected into
//! the engine (see [`capabilities`]).

pub mod capabilities;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod library;
pub mod playback;
