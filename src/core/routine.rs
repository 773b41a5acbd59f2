use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::fmt;

use crate::error::RoutineError;

/// Reference to a media asset (URL or local path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the location carries a URL scheme
    pub fn is_url(&self) -> bool {
        self.0.contains("://")
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a step shows alongside its instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVisual<'a> {
    Video(&'a AssetRef),
    Image(&'a AssetRef),
}

impl fmt::Display for StepVisual<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepVisual::Video(asset) => write!(f, "video: {}", asset),
            StepVisual::Image(asset) => write!(f, "image: {}", asset),
        }
    }
}

/// One timed unit of a routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,

    pub title: String,

    /// Duration in whole seconds (must be > 0)
    pub duration_secs: u32,

    /// Instructional text (markdown)
    #[serde(default)]
    pub instructions: String,

    /// Optional video shown while the step runs
    #[serde(default)]
    pub video: Option<AssetRef>,

    /// Optional still image, shown when there is no video
    #[serde(default)]
    pub image: Option<AssetRef>,

    /// Whether the assets live on a remote host
    #[serde(default)]
    pub is_remote: bool,
}

impl Step {
    /// Create a step without media
    pub fn new(title: impl Into<String>, duration_secs: u32, instructions: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            duration_secs,
            instructions: instructions.into(),
            video: None,
            image: None,
            is_remote: false,
        }
    }

    pub fn with_video(mut self, video: AssetRef) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_image(mut self, image: AssetRef) -> Self {
        self.image = Some(image);
        self
    }

    /// The video if there is one, otherwise the still image
    pub fn visual(&self) -> Option<StepVisual<'_>> {
        match (&self.video, &self.image) {
            (Some(video), _) => Some(StepVisual::Video(video)),
            (None, Some(image)) => Some(StepVisual::Image(image)),
            (None, None) => None,
        }
    }

    /// First `max_chars` characters of the instructions
    pub fn instructions_preview(&self, max_chars: usize) -> String {
        self.instructions.chars().take(max_chars).collect()
    }
}

/// An ordered set of timed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub summary: String,

    /// Playback order
    pub steps: Vec<Step>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Routine {
    /// Create a new routine with a fresh id
    pub fn new(title: impl Into<String>, summary: impl Into<String>, steps: Vec<Step>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            summary: summary.into(),
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of all step durations in seconds
    pub fn total_duration_secs(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_secs as u64).sum()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Key used for reminders belonging to this routine
    pub fn reminder_key(&self) -> String {
        self.id.to_string()
    }

    /// Check that the routine can be stored and played
    pub fn validate(&self) -> Result<(), RoutineError> {
        if self.steps.is_empty() {
            return Err(RoutineError::NoSteps);
        }
        if let Some((index, _)) = self.steps.iter().enumerate().find(|(_, s)| s.duration_secs == 0) {
            return Err(RoutineError::ZeroDuration { index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_duration() {
        let routine = Routine::new("Morning", "", vec![
            Step::new("Stretch", 30, ""),
            Step::new("Plank", 45, ""),
        ]);
        assert_eq!(routine.total_duration_secs(), 75);
        assert_eq!(routine.step_count(), 2);
        assert_eq!(routine.step(1).map(|s| s.title.as_str()), Some("Plank"));
        assert!(routine.step(2).is_none());
    }

    #[test]
    fn test_validate() {
        let empty = Routine::new("Empty", "", Vec::new());
        assert_eq!(empty.validate(), Err(RoutineError::NoSteps));

        let zero = Routine::new("Zero", "", vec![Step::new("A", 10, ""), Step::new("B", 0, "")]);
        assert_eq!(zero.validate(), Err(RoutineError::ZeroDuration { index: 1 }));

        let ok = Routine::new("Ok", "", vec![Step::new("A", 10, "")]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_instructions_preview_counts_chars() {
        let step = Step::new("Breathe", 10, "ééééé and more");
        assert_eq!(step.instructions_preview(3), "ééé");
        assert_eq!(step.instructions_preview(500), "ééééé and more");
    }

    #[test]
    fn test_visual_prefers_video_over_image() {
        let plain = Step::new("Rest", 10, "");
        assert_eq!(plain.visual(), None);

        let still = Step::new("Plank", 30, "").with_image(AssetRef::new("plank.png"));
        assert_eq!(still.visual().map(|v| v.to_string()), Some("image: plank.png".to_string()));

        let both = still
            .clone()
            .with_video(AssetRef::new("https://cdn.example.com/plank.mp4"));
        assert_eq!(
            both.visual(),
            Some(StepVisual::Video(&AssetRef::new("https://cdn.example.com/plank.mp4")))
        );
    }

    #[test]
    fn test_asset_ref() {
        assert!(AssetRef::new("https://cdn.example.com/a.mp4").is_url());
        assert!(!AssetRef::new("/videos/a.mp4").is_url());
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{
            "id": "6f1c2f9e-8f0e-4c55-9d1c-2b8c0d6f2a10",
            "title": "Quick",
            "steps": [{"id": "0b7a7f1e-4b8e-4d1a-a2f3-1c9a4b1f7e22", "title": "Jump", "duration_secs": 20}],
            "created_at": "2025-08-09T10:00:00Z",
            "updated_at": "2025-08-09T10:00:00Z"
        }"#;
        let routine: Routine = serde_json::from_str(json).unwrap();
        assert_eq!(routine.summary, "");
        assert_eq!(routine.steps[0].instructions, "");
        assert!(routine.steps[0].video.is_none());
        assert!(!routine.steps[0].is_remote);
    }
}
