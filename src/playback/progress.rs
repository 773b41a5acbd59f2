use crate::core::Routine;

/// Fraction of the routine completed, in `[0, 1]`
///
/// Completed steps count in full; the current step counts its elapsed part.
/// Once `current_index` reaches the step count the routine is complete.
pub fn progress(routine: &Routine, current_index: usize, remaining_in_step: f64) -> f64 {
    let total = routine.total_duration_secs();
    if total == 0 {
        return 0.0;
    }

    let completed: u64 = routine
        .steps
        .iter()
        .take(current_index)
        .map(|s| s.duration_secs as u64)
        .sum();
    let current_elapsed = routine
        .step(current_index)
        .map(|s| (s.duration_secs as f64 - remaining_in_step).max(0.0))
        .unwrap_or(0.0);

    ((completed as f64 + current_elapsed) / total as f64).clamp(0.0, 1.0)
}

/// Format remaining seconds as `MM:SS`, rounding partial seconds up
pub fn format_clock(remaining_secs: f64) -> String {
    let secs = remaining_secs.max(0.0).ceil() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
