pub mod routine;
pub mod draft;

pub use routine::{AssetRef, Routine, Step, StepVisual};
pub use draft::{DraftStep, RoutineDraft};
