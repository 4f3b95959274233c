//! Readiness state machine.
//!
//! Decides when a session's score is trustworthy enough to surface.
//! Progression is strictly monotonic (`NotReady -> Warming -> Ready`);
//! the stalled condition is an orthogonal overlay computed from the time
//! of the last accepted append and clears as soon as new audio arrives.

use std::time::{Duration, Instant};

use crate::result::Readiness;

/// Confidence required to enter `Ready`.
const READY_CONFIDENCE: f32 = 0.6;

/// Internal phase; never regresses except through `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotReady,
    Warming,
    Ready,
}

pub struct ReadinessController {
    phase: Phase,
    k_min_frames: usize,
    k_reliable_frames: usize,
    stall_timeout: Duration,
    last_progress: Option<Instant>,
}

impl ReadinessController {
    pub fn new(k_min_frames: usize, k_reliable_frames: usize, stall_timeout_ms: u64) -> Self {
        Self {
            phase: Phase::NotReady,
            k_min_frames,
            k_reliable_frames,
            stall_timeout: Duration::from_millis(stall_timeout_ms),
            last_progress: None,
        }
    }

    /// Advance the phase after an append. `variance_ok` is the silence
    /// gate; `new_frames` marks whether this append produced frames (which
    /// feeds the stall clock).
    pub fn observe(
        &mut self,
        user_frames: usize,
        variance_ok: bool,
        confidence: f32,
        new_frames: bool,
    ) {
        if new_frames {
            self.last_progress = Some(Instant::now());
        }
        if self.phase == Phase::NotReady && user_frames >= self.k_min_frames && variance_ok {
            self.phase = Phase::Warming;
        }
        if self.phase == Phase::Warming
            && user_frames >= self.k_reliable_frames
            && confidence >= READY_CONFIDENCE
        {
            self.phase = Phase::Ready;
        }
    }

    /// Current readiness including the stall overlay.
    pub fn current(&self) -> Readiness {
        match self.phase {
            Phase::NotReady => Readiness::NotReady,
            Phase::Warming | Phase::Ready => {
                if self.is_stalled() {
                    Readiness::Stalled
                } else if self.phase == Phase::Ready {
                    Readiness::Ready
                } else {
                    Readiness::Warming
                }
            }
        }
    }

    /// Readiness ignoring the stall overlay (the retained phase).
    pub fn phase_readiness(&self) -> Readiness {
        match self.phase {
            Phase::NotReady => Readiness::NotReady,
            Phase::Warming => Readiness::Warming,
            Phase::Ready => Readiness::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    fn is_stalled(&self) -> bool {
        match self.last_progress {
            Some(at) => at.elapsed() >= self.stall_timeout,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::NotReady;
        self.last_progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let ctrl = ReadinessController::new(25, 75, 1500);
        assert_eq!(ctrl.current(), Readiness::NotReady);
    }

    #[test]
    fn progresses_through_phases_monotonically() {
        let mut ctrl = ReadinessController::new(25, 75, 1500);
        ctrl.observe(10, true, 0.0, true);
        assert_eq!(ctrl.current(), Readiness::NotReady);
        ctrl.observe(30, true, 0.2, true);
        assert_eq!(ctrl.current(), Readiness::Warming);
        // High confidence but not enough frames: stays warming.
        ctrl.observe(60, true, 0.9, true);
        assert_eq!(ctrl.current(), Readiness::Warming);
        ctrl.observe(80, true, 0.9, true);
        assert_eq!(ctrl.current(), Readiness::Ready);
        // Low confidence afterwards never downgrades.
        ctrl.observe(90, false, 0.0, true);
        assert_eq!(ctrl.current(), Readiness::Ready);
    }

    #[test]
    fn silence_never_leaves_not_ready() {
        let mut ctrl = ReadinessController::new(25, 75, 1500);
        for frames in (25..200).step_by(25) {
            ctrl.observe(frames, false, 0.0, true);
        }
        assert_eq!(ctrl.current(), Readiness::NotReady);
    }

    #[test]
    fn stall_overlays_warming_and_clears_on_new_frames() {
        let mut ctrl = ReadinessController::new(25, 75, 0);
        ctrl.observe(30, true, 0.2, true);
        // Zero timeout: immediately stalled once progress time passes.
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(ctrl.current(), Readiness::Stalled);
        assert_eq!(ctrl.phase_readiness(), Readiness::Warming);
        ctrl.observe(40, true, 0.2, true);
        // Fresh frames restart the clock; with zero timeout the state is
        // reported stalled again after any delay, so only the retained
        // phase is asserted here.
        assert_eq!(ctrl.phase_readiness(), Readiness::Warming);
    }

    #[test]
    fn not_ready_is_never_reported_stalled() {
        let mut ctrl = ReadinessController::new(25, 75, 0);
        ctrl.observe(5, true, 0.0, true);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(ctrl.current(), Readiness::NotReady);
    }

    #[test]
    fn reset_returns_to_not_ready() {
        let mut ctrl = ReadinessController::new(25, 75, 1500);
        ctrl.observe(100, true, 0.9, true);
        ctrl.observe(120, true, 0.9, true);
        assert_eq!(ctrl.current(), Readiness::Ready);
        ctrl.reset();
        assert_eq!(ctrl.current(), Readiness::NotReady);
    }
}
