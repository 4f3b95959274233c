//! Per-frame fundamental-frequency estimation.
//!
//! Normalized autocorrelation over a configurable lag range with DC
//! removal, pre-emphasis, and an energy gate. The peak correlation doubles
//! as the confidence value; frames below the confidence threshold are
//! reported unvoiced.

use super::spectrum::FrameObservation;

/// Minimum frame energy for a pitch estimate to be attempted.
const ENERGY_GATE: f32 = 1e-6;

/// Pre-emphasis coefficient applied before correlation.
const PRE_EMPHASIS: f32 = 0.97;

/// One frame's pitch estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz; 0.0 when unvoiced.
    pub f0_hz: f32,
    /// Peak normalized autocorrelation in [0, 1].
    pub confidence: f32,
    /// Whether confidence cleared the voicing threshold.
    pub voiced: bool,
}

impl PitchEstimate {
    fn unvoiced() -> Self {
        Self {
            f0_hz: 0.0,
            confidence: 0.0,
            voiced: false,
        }
    }
}

pub struct PitchTracker {
    sample_rate: f32,
    lag_min: usize,
    lag_max: usize,
    confidence_threshold: f32,
    scratch: Vec<f32>,
    voiced_f0: Vec<f32>,
    frames_seen: usize,
}

impl PitchTracker {
    pub fn new(
        min_hz: f32,
        max_hz: f32,
        confidence_threshold: f32,
        sample_rate: u32,
        frame_size: usize,
    ) -> Self {
        let sr = sample_rate as f32;
        let lag_min = ((sr / max_hz).floor() as usize).max(2);
        let lag_max = ((sr / min_hz).ceil() as usize).min(frame_size / 2);
        Self {
            sample_rate: sr,
            lag_min,
            lag_max: lag_max.max(lag_min + 1),
            confidence_threshold,
            scratch: vec![0.0; frame_size],
            voiced_f0: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn process_frame(&mut self, obs: &FrameObservation<'_>) -> PitchEstimate {
        self.frames_seen += 1;
        let frame = obs.samples;
        let n = frame.len();
        if n < 2 * self.lag_min || n < 64 {
            return PitchEstimate::unvoiced();
        }

        // DC removal + pre-emphasis into the scratch buffer.
        let mut mean = 0.0f32;
        for &v in frame {
            mean += v;
        }
        mean /= n as f32;
        let mut prev = 0.0f32;
        for (dst, &v) in self.scratch.iter_mut().zip(frame.iter()) {
            let d = v - mean;
            *dst = d - PRE_EMPHASIS * prev;
            prev = d;
        }
        let x = &self.scratch[..n];

        let mut e0 = 0.0f32;
        for &v in x {
            e0 += v * v;
        }
        if e0 < ENERGY_GATE {
            return PitchEstimate::unvoiced();
        }

        let lag_max = self.lag_max.min(n / 2);
        let mut best_lag = 0usize;
        let mut best = 0.0f32;
        for lag in self.lag_min..=lag_max {
            let mut s = 0.0f32;
            let mut e1 = 0.0f32;
            let mut e2 = 0.0f32;
            for i in 0..(n - lag) {
                let a = x[i];
                let b = x[i + lag];
                s += a * b;
                e1 += a * a;
                e2 += b * b;
            }
            let denom = (e1 * e2).sqrt().max(1e-12);
            let r = (s / denom).clamp(-1.0, 1.0);
            if r > best {
                best = r;
                best_lag = lag;
            }
        }

        let confidence = best.clamp(0.0, 1.0);
        if best_lag == 0 || confidence < self.confidence_threshold {
            return PitchEstimate {
                f0_hz: 0.0,
                confidence,
                voiced: false,
            };
        }
        let f0 = self.sample_rate / best_lag as f32;
        self.voiced_f0.push(f0);
        PitchEstimate {
            f0_hz: f0,
            confidence,
            voiced: true,
        }
    }

    /// Median f0 over voiced frames seen so far.
    pub fn median_f0(&self) -> Option<f32> {
        if self.voiced_f0.is_empty() {
            return None;
        }
        let mut sorted = self.voiced_f0.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(sorted[sorted.len() / 2])
    }

    /// Fraction of processed frames that were voiced.
    pub fn voiced_ratio(&self) -> f32 {
        if self.frames_seen == 0 {
            return 0.0;
        }
        self.voiced_f0.len() as f32 / self.frames_seen as f32
    }

    pub fn reset(&mut self) {
        self.voiced_f0.clear();
        self.frames_seen = 0;
    }
}
