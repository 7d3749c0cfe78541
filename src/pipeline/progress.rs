// src/pipeline/progress.rs
//! Time-based progress estimate. Purely advisory: it never drives a stage transition.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Running estimates stop here until the stage actually completes.
pub const RUNNING_CEILING: f64 = 99.0;

const STORYBOARD_FIRST_PHASE: Duration = Duration::from_secs(5);
const STORYBOARD_EXPECTED: Duration = Duration::from_secs(20);
const STORYBOARD_TAIL: Duration = Duration::from_secs(2);
pub const VIDEO_EXPECTED: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCurve {
    /// Storyboard text plus the three keyframes.
    Storyboard,
    Video,
}

impl ProgressCurve {
    /// Percent for a given elapsed time, already clamped to the running ceiling.
    pub fn percent_at(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        let raw = match self {
            ProgressCurve::Storyboard => {
                let first = STORYBOARD_FIRST_PHASE.as_secs_f64();
                let expected = STORYBOARD_EXPECTED.as_secs_f64();
                if secs < first {
                    secs / first * 30.0
                } else if secs < expected {
                    30.0 + (secs - first) / (expected - first) * 65.0
                } else {
                    95.0 + ((secs - expected) / STORYBOARD_TAIL.as_secs_f64()).min(1.0) * 5.0
                }
            }
            ProgressCurve::Video => secs / VIDEO_EXPECTED.as_secs_f64() * 100.0,
        };
        raw.clamp(0.0, RUNNING_CEILING)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProgressState {
    Idle,
    Running { curve: ProgressCurve, started_at: Instant },
    Complete,
}

/// Progress for whichever stage is active. Monotonic within a stage because
/// each curve is non-decreasing in elapsed time.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: ProgressState,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: ProgressState::Idle,
        }
    }

    /// Resets to 0 and starts timing a new stage.
    pub fn start(&mut self, curve: ProgressCurve) {
        self.state = ProgressState::Running {
            curve,
            started_at: Instant::now(),
        };
    }

    /// Success snaps to 100; failure drops back to idle.
    pub fn finish(&mut self, success: bool) {
        self.state = if success {
            ProgressState::Complete
        } else {
            ProgressState::Idle
        };
    }

    pub fn reset(&mut self) {
        self.state = ProgressState::Idle;
    }

    pub fn percent(&self) -> u8 {
        match self.state {
            ProgressState::Idle => 0,
            ProgressState::Complete => 100,
            ProgressState::Running { curve, started_at } => {
                curve.percent_at(started_at.elapsed()).floor() as u8
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_storyboard_curve_breakpoints() {
        let curve = ProgressCurve::Storyboard;
        assert_eq!(curve.percent_at(secs(0.0)), 0.0);
        assert!((curve.percent_at(secs(2.5)) - 15.0).abs() < 1e-9);
        assert!((curve.percent_at(secs(5.0)) - 30.0).abs() < 1e-9);
        assert!((curve.percent_at(secs(12.5)) - 62.5).abs() < 1e-9);
        assert!((curve.percent_at(secs(20.0)) - 95.0).abs() < 1e-9);
        assert!((curve.percent_at(secs(21.0)) - 97.5).abs() < 1e-9);
        assert_eq!(curve.percent_at(secs(300.0)), RUNNING_CEILING);
    }

    #[test]
    fn test_video_curve_is_linear_and_clamped() {
        let curve = ProgressCurve::Video;
        assert!((curve.percent_at(secs(60.0)) - 50.0).abs() < 1e-9);
        assert_eq!(curve.percent_at(secs(119.5)), 99.0);
        assert_eq!(curve.percent_at(secs(1000.0)), RUNNING_CEILING);
    }

    #[test]
    fn test_curves_never_decrease() {
        for curve in [ProgressCurve::Storyboard, ProgressCurve::Video] {
            let mut last = 0.0;
            for tenth in 0..3000 {
                let value = curve.percent_at(secs(tenth as f64 / 10.0));
                assert!(value >= last, "{:?} decreased at {}", curve, tenth);
                last = value;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_lifecycle() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.percent(), 0);

        tracker.start(ProgressCurve::Storyboard);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tracker.percent(), 30);

        tracker.finish(true);
        assert_eq!(tracker.percent(), 100);

        tracker.start(ProgressCurve::Video);
        assert_eq!(tracker.percent(), 0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tracker.percent(), 50);

        tracker.finish(false);
        assert_eq!(tracker.percent(), 0);
    }
}
