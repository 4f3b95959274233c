//! Cadence analysis: onset strength and tempo.
//!
//! Onset strength per frame is half-wave-rectified spectral flux; a
//! windowed autocorrelation over the resulting envelope yields a tempo
//! estimate when a lag peak is prominent enough. Diagnostics only; the
//! similarity blend does not consume tempo.

use super::spectrum::FrameObservation;

/// Envelope window used for tempo estimation, in frames.
const TEMPO_WINDOW_FRAMES: usize = 512;

/// Searchable tempo range.
const TEMPO_MIN_BPM: f32 = 30.0;
const TEMPO_MAX_BPM: f32 = 300.0;

/// Autocorrelation peak must exceed this fraction of the zero-lag energy.
const PEAK_PROMINENCE: f32 = 0.3;

pub struct CadenceAnalyzer {
    frames_per_second: f32,
    prev_magnitude: Vec<f64>,
    have_prev: bool,
    envelope: Vec<f32>,
}

impl CadenceAnalyzer {
    pub fn new(sample_rate: u32, hop_size: usize, spectrum_bins: usize) -> Self {
        Self {
            frames_per_second: sample_rate as f32 / hop_size as f32,
            prev_magnitude: vec![0.0; spectrum_bins],
            have_prev: false,
            envelope: Vec::new(),
        }
    }

    /// Returns this frame's onset strength.
    pub fn process_frame(&mut self, obs: &FrameObservation<'_>) -> f32 {
        let mut flux = 0.0f64;
        for (prev, &p) in self.prev_magnitude.iter_mut().zip(obs.power.iter()) {
            let magnitude = p.sqrt();
            if self.have_prev {
                let d = magnitude - *prev;
                if d > 0.0 {
                    flux += d;
                }
            }
            *prev = magnitude;
        }
        self.have_prev = true;
        let strength = flux as f32;
        self.envelope.push(strength);
        strength
    }

    /// Tempo estimate over the trailing envelope window, if a prominent
    /// periodicity exists.
    pub fn tempo_bpm(&self) -> Option<f32> {
        let window: &[f32] = if self.envelope.len() > TEMPO_WINDOW_FRAMES {
            &self.envelope[self.envelope.len() - TEMPO_WINDOW_FRAMES..]
        } else {
            &self.envelope
        };
        let n = window.len();
        if n < 16 {
            return None;
        }

        // Remove the mean so steady flux does not read as periodicity.
        let mean = window.iter().sum::<f32>() / n as f32;
        let x: Vec<f32> = window.iter().map(|v| v - mean).collect();
        let energy: f32 = x.iter().map(|v| v * v).sum();
        if energy < 1e-9 {
            return None;
        }

        let lag_min = ((self.frames_per_second * 60.0 / TEMPO_MAX_BPM).floor() as usize).max(1);
        let lag_max = ((self.frames_per_second * 60.0 / TEMPO_MIN_BPM).ceil() as usize).min(n - 1);
        if lag_min >= lag_max {
            return None;
        }

        let mut best_lag = 0usize;
        let mut best = 0.0f32;
        for lag in lag_min..=lag_max {
            let mut s = 0.0f32;
            for i in 0..(n - lag) {
                s += x[i] * x[i + lag];
            }
            if s > best {
                best = s;
                best_lag = lag;
            }
        }
        if best_lag == 0 || best < PEAK_PROMINENCE * energy {
            return None;
        }
        Some(self.frames_per_second * 60.0 / best_lag as f32)
    }

    pub fn reset(&mut self) {
        self.prev_magnitude.fill(0.0);
        self.have_prev = false;
        self.envelope.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;
    const HOP: usize = 256;
    const BINS: usize = 513;

    fn feed(analyzer: &mut CadenceAnalyzer, power: &[f64]) -> f32 {
        analyzer.process_frame(&FrameObservation {
            samples: &[],
            power,
            bin_hz: SR as f32 / 1024.0,
            sample_rate: SR,
        })
    }

    #[test]
    fn steady_spectrum_has_zero_flux_after_first_frame() {
        let mut analyzer = CadenceAnalyzer::new(SR, HOP, BINS);
        let power = vec![1.0f64; BINS];
        feed(&mut analyzer, &power);
        let flux = feed(&mut analyzer, &power);
        assert_eq!(flux, 0.0);
    }

    #[test]
    fn energy_rise_produces_flux() {
        let mut analyzer = CadenceAnalyzer::new(SR, HOP, BINS);
        feed(&mut analyzer, &vec![0.0f64; BINS]);
        let flux = feed(&mut analyzer, &vec![1.0f64; BINS]);
        assert!(flux > 0.0);
    }

    #[test]
    fn periodic_onsets_yield_tempo() {
        let mut analyzer = CadenceAnalyzer::new(SR, HOP, BINS);
        // Pulse every 25 frames = 2.5 pulses/sec = 150 BPM at 62.5 fps.
        let loud = vec![1.0f64; BINS];
        let quiet = vec![0.0f64; BINS];
        for i in 0..256 {
            if i % 25 == 0 {
                feed(&mut analyzer, &loud);
            } else {
                feed(&mut analyzer, &quiet);
            }
        }
        let bpm = analyzer.tempo_bpm().expect("tempo expected");
        let expected = (SR as f32 / HOP as f32) * 60.0 / 25.0;
        assert!(
            (bpm - expected).abs() < expected * 0.1,
            "bpm {} vs expected {}",
            bpm,
            expected
        );
    }

    #[test]
    fn silence_has_no_tempo() {
        let mut analyzer = CadenceAnalyzer::new(SR, HOP, BINS);
        let quiet = vec![0.0f64; BINS];
        for _ in 0..64 {
            feed(&mut analyzer, &quiet);
        }
        assert!(analyzer.tempo_bpm().is_none());
    }
}
