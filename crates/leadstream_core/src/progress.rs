//! Synthetic progress that stays smooth while the backend reports sparsely.
//!
//! The numbers below were tuned by feel and are kept verbatim; do not retune
//! them without product input.

/// Value reserved for the `complete` event.
pub const PROGRESS_COMPLETE: f64 = 100.0;
/// Targets at or below this value are treated as "no real signal yet".
pub const EARLY_PHASE_MAX_TARGET: f64 = 15.0;
/// How far past the displayed value the early-phase creep aims each tick.
pub const CREEP_INCREMENT: f64 = 0.5;
/// Highest value the creep alone can reach.
pub const CREEP_CEILING: f64 = 45.0;
pub const SPRINT_SPEED_FACTOR: f64 = 0.3;
pub const NORMAL_SPEED_FACTOR: f64 = 0.05;
pub const SPRINT_STEP_MIN: f64 = 1.2;
pub const SPRINT_STEP_MAX: f64 = 15.0;
pub const NORMAL_STEP_MIN: f64 = 0.02;
pub const NORMAL_STEP_MAX: f64 = 1.5;

/// Target floor applied on the first status message of a session.
pub const FIRST_PHASE_TARGET: f64 = 5.0;
/// Target bump per `lead` event.
pub const LEAD_TARGET_INCREMENT: f64 = 0.3;
/// Discovery activity never pushes the target past this value.
pub const DISCOVERY_TARGET_CAP: f64 = 85.0;
/// Displayed value at which the completion sprint counts as visually done.
pub const COMPLETION_FLOOR: f64 = 99.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSynthesizer {
    target: f64,
    displayed: f64,
    message: Option<String>,
}

impl ProgressSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the target. Lower values and NaN are ignored so the target never regresses.
    pub fn set_target(&mut self, percent: f64, message: Option<String>) {
        if !percent.is_nan() {
            let percent = percent.clamp(0.0, PROGRESS_COMPLETE);
            if percent > self.target {
                self.target = percent;
            }
        }
        if let Some(message) = message {
            self.message = Some(message);
        }
    }

    /// Adds `delta` to the target without crossing `cap`.
    pub fn bump_target(&mut self, delta: f64, cap: f64) {
        let bumped = (self.target + delta).min(cap);
        self.set_target(bumped, None);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Advances the displayed value by one clock period and returns it.
    pub fn tick(&mut self) -> f64 {
        if self.target <= 0.0 || self.displayed >= PROGRESS_COMPLETE {
            return self.displayed;
        }

        let sprint = self.target >= PROGRESS_COMPLETE;
        let effective = if sprint {
            PROGRESS_COMPLETE
        } else if self.target <= EARLY_PHASE_MAX_TARGET {
            self.target
                .max((self.displayed + CREEP_INCREMENT).min(CREEP_CEILING))
        } else {
            self.target
        };
        if effective <= self.displayed {
            return self.displayed;
        }

        let (factor, min_step, max_step) = if sprint {
            (SPRINT_SPEED_FACTOR, SPRINT_STEP_MIN, SPRINT_STEP_MAX)
        } else {
            (NORMAL_SPEED_FACTOR, NORMAL_STEP_MIN, NORMAL_STEP_MAX)
        };
        let step = ((effective - self.displayed) * factor).clamp(min_step, max_step);
        self.displayed = (self.displayed + step).min(effective);
        self.displayed
    }

    /// Snaps to 100 once completion has been signalled; no-op otherwise.
    pub fn finish(&mut self) {
        if self.target >= PROGRESS_COMPLETE {
            self.displayed = PROGRESS_COMPLETE;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn displayed(&self) -> f64 {
        self.displayed
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.displayed >= PROGRESS_COMPLETE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_creep_step_from_floor() {
        let mut progress = ProgressSynthesizer::new();
        progress.set_target(FIRST_PHASE_TARGET, None);
        // (5 - 0) * 0.05 = 0.25, inside the normal clamp.
        assert!((progress.tick() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn sprint_step_is_clamped_to_maximum() {
        let mut progress = ProgressSynthesizer::new();
        progress.set_target(PROGRESS_COMPLETE, None);
        // (100 - 0) * 0.3 = 30, clamped to 15.
        assert!((progress.tick() - SPRINT_STEP_MAX).abs() < 1e-9);
    }

    #[test]
    fn late_phase_step_is_clamped_to_maximum() {
        let mut progress = ProgressSynthesizer::new();
        progress.set_target(60.0, None);
        assert!((progress.tick() - NORMAL_STEP_MAX).abs() < 1e-9);
    }

    #[test]
    fn nan_target_is_ignored() {
        let mut progress = ProgressSynthesizer::new();
        progress.set_target(20.0, Some("Scanning".into()));
        progress.set_target(f64::NAN, None);
        assert_eq!(progress.target(), 20.0);
        assert_eq!(progress.message(), Some("Scanning"));
    }

    #[test]
    fn finish_requires_completion_target() {
        let mut progress = ProgressSynthesizer::new();
        progress.set_target(80.0, None);
        progress.finish();
        assert_eq!(progress.displayed(), 0.0);

        progress.set_target(PROGRESS_COMPLETE, None);
        progress.finish();
        assert!(progress.is_complete());
    }
}
