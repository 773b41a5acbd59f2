use serde::{Deserialize, Serialize};

use crate::core::{Routine, Step};
use crate::error::RoutineError;

/// Maximum steps a draft may contain
pub const MAX_DRAFT_STEPS: usize = 30;

/// Allowed draft step durations in seconds
pub const DRAFT_DURATION_RANGE: std::ops::RangeInclusive<u32> = 5..=3600;

/// Draft durations must be a multiple of this many seconds
pub const DRAFT_DURATION_GRANULARITY: u32 = 5;

/// A routine proposal produced outside the player (e.g. by a generator service)
///
/// Drafts are untrusted input: they must pass [`RoutineDraft::validated`]
/// before they turn into a [`Routine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineDraft {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub steps: Vec<DraftStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftStep {
    pub title: String,
    pub duration_secs: u32,
    #[serde(default)]
    pub instructions: String,
}

impl RoutineDraft {
    pub fn validated(self) -> Result<Self, RoutineError> {
        if self.title.trim().is_empty() {
            return Err(RoutineError::EmptyTitle);
        }
        if self.steps.is_empty() {
            return Err(RoutineError::NoSteps);
        }
        if self.steps.len() > MAX_DRAFT_STEPS {
            return Err(RoutineError::TooManySteps {
                count: self.steps.len(),
                max: MAX_DRAFT_STEPS,
            });
        }
        for (index, step) in self.steps.iter().enumerate() {
            let secs = step.duration_secs;
            if !DRAFT_DURATION_RANGE.contains(&secs) || secs % DRAFT_DURATION_GRANULARITY != 0 {
                return Err(RoutineError::BadDraftDuration { index, secs });
            }
        }
        Ok(self)
    }

    /// Validate and convert into a playable routine
    pub fn into_routine(self) -> Result<Routine, RoutineError> {
        let draft = self.validated()?;
        let steps = draft
            .steps
            .into_iter()
            .map(|s| {
                let mut step = Step::new(s.title, s.duration_secs, s.instructions);
                step.is_remote = true;
                step
            })
            .collect();
        Ok(Routine::new(draft.title, draft.summary, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(durations: &[u32]) -> RoutineDraft {
        RoutineDraft {
            title: "Desk break".to_string(),
            summary: "Loosen up".to_string(),
            steps: durations
                .iter()
                .enumerate()
                .map(|(i, d)| DraftStep {
                    title: format!("Step {}", i + 1),
                    duration_secs: *d,
                    instructions: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_draft_converts() {
        let routine = draft(&[30, 60]).into_routine().unwrap();
        assert_eq!(routine.title, "Desk break");
        assert_eq!(routine.total_duration_secs(), 90);
        assert!(routine.steps.iter().all(|s| s.is_remote));
        assert!(routine.validate().is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut d = draft(&[30]);
        d.title = "   ".to_string();
        assert_eq!(d.validated(), Err(RoutineError::EmptyTitle));
    }

    #[test]
    fn test_step_count_limits() {
        assert_eq!(draft(&[]).validated(), Err(RoutineError::NoSteps));
        let too_many = draft(&[10; 31]);
        assert_eq!(
            too_many.validated(),
            Err(RoutineError::TooManySteps { count: 31, max: 30 })
        );
        assert!(draft(&[10; 30]).validated().is_ok());
    }

    #[test]
    fn test_duration_rules() {
        assert_eq!(
            draft(&[30, 7]).validated(),
            Err(RoutineError::BadDraftDuration { index: 1, secs: 7 })
        );
        assert_eq!(
            draft(&[0]).validated(),
            Err(RoutineError::BadDraftDuration { index: 0, secs: 0 })
        );
        assert_eq!(
            draft(&[3605]).validated(),
            Err(RoutineError::BadDraftDuration { index: 0, secs: 3605 })
        );
        assert!(draft(&[5, 3600]).validated().is_ok());
    }

    #[test]
    fn test_parse_json_draft() {
        let json = r#"{"title":"Focus","steps":[{"title":"Breathe","duration_secs":60}]}"#;
        let d: RoutineDraft = serde_json::from_str(json).unwrap();
        assert_eq!(d.summary, "");
        assert_eq!(d.steps[0].instructions, "");
    }
}
