//! Harmonic structure analysis.
//!
//! Peak picking on the frame's power spectrum yields a harmonic-to-noise
//! ratio; spectral centroid, rolloff, and flatness are computed alongside.
//! These feed the diagnostic summary only, not the similarity blend.

use super::spectrum::FrameObservation;
use super::utils::{power_to_db, DB_EPS};

/// Fraction of total energy below the rolloff frequency.
const ROLLOFF_FRACTION: f64 = 0.85;

/// A local maximum must exceed the spectrum mean by this factor to count
/// as a peak.
const PEAK_MEAN_FACTOR: f64 = 4.0;

/// Bins on each side of a peak attributed to the harmonic.
const PEAK_HALF_WIDTH: usize = 1;

/// Per-frame harmonic descriptors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicProfile {
    /// Harmonic-to-noise ratio in dB; 0.0 for silent frames.
    pub hnr_db: f32,
    /// Power-weighted mean frequency in Hz.
    pub centroid_hz: f32,
    /// Frequency below which 85% of the energy sits, in Hz.
    pub rolloff_hz: f32,
    /// Spectral peak count.
    pub peak_count: usize,
}

impl HarmonicProfile {
    fn silent() -> Self {
        Self {
            hnr_db: 0.0,
            centroid_hz: 0.0,
            rolloff_hz: 0.0,
            peak_count: 0,
        }
    }
}

pub struct HarmonicAnalyzer {
    centroid_sum: f64,
    analyzed_frames: usize,
}

impl HarmonicAnalyzer {
    pub fn new() -> Self {
        Self {
            centroid_sum: 0.0,
            analyzed_frames: 0,
        }
    }

    pub fn process_frame(&mut self, obs: &FrameObservation<'_>) -> HarmonicProfile {
        let power = obs.power;
        let total: f64 = power.iter().sum();
        if total < DB_EPS as f64 {
            return HarmonicProfile::silent();
        }

        // Centroid.
        let mut weighted = 0.0f64;
        for (bin, &p) in power.iter().enumerate() {
            weighted += bin as f64 * p;
        }
        let centroid_hz = (weighted / total) as f32 * obs.bin_hz;

        // Rolloff.
        let target = total * ROLLOFF_FRACTION;
        let mut acc = 0.0f64;
        let mut rolloff_bin = power.len() - 1;
        for (bin, &p) in power.iter().enumerate() {
            acc += p;
            if acc >= target {
                rolloff_bin = bin;
                break;
            }
        }
        let rolloff_hz = rolloff_bin as f32 * obs.bin_hz;

        // Peak picking against the mean level.
        let mean = total / power.len() as f64;
        let threshold = mean * PEAK_MEAN_FACTOR;
        let mut peak_bins = Vec::new();
        for bin in 1..power.len() - 1 {
            if power[bin] > threshold
                && power[bin] >= power[bin - 1]
                && power[bin] > power[bin + 1]
            {
                peak_bins.push(bin);
            }
        }

        // Harmonic energy = peaks plus their immediate neighbors.
        let mut harmonic = 0.0f64;
        let mut counted = vec![false; power.len()];
        for &bin in &peak_bins {
            let lo = bin.saturating_sub(PEAK_HALF_WIDTH);
            let hi = (bin + PEAK_HALF_WIDTH).min(power.len() - 1);
            for (i, flag) in counted.iter_mut().enumerate().take(hi + 1).skip(lo) {
                if !*flag {
                    harmonic += power[i];
                    *flag = true;
                }
            }
        }
        let noise = (total - harmonic).max(DB_EPS as f64);
        let hnr_db = power_to_db((harmonic / noise) as f32);

        self.centroid_sum += centroid_hz as f64;
        self.analyzed_frames += 1;

        HarmonicProfile {
            hnr_db,
            centroid_hz,
            rolloff_hz,
            peak_count: peak_bins.len(),
        }
    }

    /// Mean centroid over analyzed (non-silent) frames.
    pub fn mean_centroid_hz(&self) -> f32 {
        if self.analyzed_frames == 0 {
            return 0.0;
        }
        (self.centroid_sum / self.analyzed_frames as f64) as f32
    }

    pub fn reset(&mut self) {
        self.centroid_sum = 0.0;
        self.analyzed_frames = 0;
    }
}

impl Default for HarmonicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
