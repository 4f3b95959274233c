//! Voice activity detection.
//!
//! Frame-level gate combining short-time energy (dB above a running noise
//! floor) with spectral flatness, followed by segment grouping with
//! hangover bridging and a minimum-duration requirement. Readiness and the
//! subsequence matcher use the resulting segments to trim leading and
//! trailing silence.

use super::spectrum::FrameObservation;
use super::utils::{frame_rms, power_to_db, DB_EPS};

/// Absolute RMS below which a frame is silent no matter the noise floor.
const MIN_RMS: f32 = 1e-4;

/// Spectral flatness above this reads as noise-like rather than tonal.
const FLATNESS_NOISE_THRESHOLD: f64 = 0.6;

/// Noise floor ballistics: fast to fall into silence, slow to rise into
/// signal so the floor does not track the call itself.
const FLOOR_FALL_COEFF: f32 = 0.6;
const FLOOR_RISE_COEFF: f32 = 0.995;

/// A contiguous run of voiced frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicedSegment {
    /// First voiced frame index (inclusive).
    pub start: usize,
    /// One past the last voiced frame index.
    pub end: usize,
}

impl VoicedSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub struct VoiceActivityDetector {
    energy_threshold_db: f32,
    hangover_frames: usize,
    min_segment_frames: usize,

    noise_floor_sq: f32,
    frame_index: usize,
    hangover_left: usize,

    open_start: Option<usize>,
    open_voiced_end: usize,
    segments: Vec<VoicedSegment>,
    voiced_total: usize,
}

impl VoiceActivityDetector {
    pub fn new(
        energy_threshold_db: f32,
        hangover_ms: f32,
        min_segment_ms: f32,
        sample_rate: u32,
        hop_size: usize,
    ) -> Self {
        let frames_per_ms = sample_rate as f32 / (hop_size as f32 * 1000.0);
        let hangover_frames = (hangover_ms * frames_per_ms).round() as usize;
        let min_segment_frames = ((min_segment_ms * frames_per_ms).round() as usize).max(1);
        Self {
            energy_threshold_db,
            hangover_frames,
            min_segment_frames,
            noise_floor_sq: 1e-8,
            frame_index: 0,
            hangover_left: 0,
            open_start: None,
            open_voiced_end: 0,
            segments: Vec::new(),
            voiced_total: 0,
        }
    }

    /// Classify one frame. Returns the voiced flag for this frame.
    pub fn process_frame(&mut self, obs: &FrameObservation<'_>) -> bool {
        let rms = frame_rms(obs.samples);
        let energy_sq = rms * rms;

        let floor_db = power_to_db(self.noise_floor_sq);
        let energy_db = power_to_db(energy_sq);
        let above_floor = energy_db - floor_db >= self.energy_threshold_db;
        let flatness = spectral_flatness(obs.power);
        let tonal_enough = flatness < FLATNESS_NOISE_THRESHOLD;

        let raw_voiced = rms >= MIN_RMS && above_floor && tonal_enough;

        // Asymmetric floor tracking.
        if energy_sq < self.noise_floor_sq {
            self.noise_floor_sq =
                FLOOR_FALL_COEFF * self.noise_floor_sq + (1.0 - FLOOR_FALL_COEFF) * energy_sq;
        } else if !raw_voiced {
            self.noise_floor_sq =
                FLOOR_RISE_COEFF * self.noise_floor_sq + (1.0 - FLOOR_RISE_COEFF) * energy_sq;
        }
        self.noise_floor_sq = self.noise_floor_sq.clamp(1e-10, 0.1);

        let voiced = if raw_voiced {
            self.hangover_left = self.hangover_frames;
            true
        } else if self.hangover_left > 0 {
            self.hangover_left -= 1;
            true
        } else {
            false
        };

        self.track_segment(voiced, raw_voiced);
        if voiced {
            self.voiced_total += 1;
        }
        self.frame_index += 1;
        voiced
    }

    fn track_segment(&mut self, voiced: bool, raw_voiced: bool) {
        match (self.open_start, voiced) {
            (None, true) => {
                self.open_start = Some(self.frame_index);
                self.open_voiced_end = self.frame_index + 1;
            }
            (Some(_), true) => {
                if raw_voiced {
                    self.open_voiced_end = self.frame_index + 1;
                }
            }
            (Some(start), false) => {
                self.close_segment(start);
                self.open_start = None;
            }
            (None, false) => {}
        }
    }

    fn close_segment(&mut self, start: usize) {
        let end = self.open_voiced_end.max(start + 1);
        if end - start >= self.min_segment_frames {
            self.segments.push(VoicedSegment { start, end });
        }
    }

    /// Close any open segment; call at end of stream.
    pub fn finalize(&mut self) {
        if let Some(start) = self.open_start.take() {
            self.close_segment(start);
        }
    }

    /// Segments closed so far (an in-progress segment is not listed).
    pub fn segments(&self) -> &[VoicedSegment] {
        &self.segments
    }

    /// Voiced span from the first voiced frame to the last, including an
    /// in-progress segment. `None` before any voiced frame was seen.
    pub fn trimmed_range(&self) -> Option<(usize, usize)> {
        let first = self.segments.first().map(|s| s.start);
        let open = self.open_start;
        let start = match (first, open) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };
        let end = if self.open_start.is_some() {
            self.open_voiced_end
        } else {
            self.segments.last().map(|s| s.end).unwrap_or(start)
        };
        (end > start).then_some((start, end))
    }

    pub fn voiced_ratio(&self) -> f32 {
        if self.frame_index == 0 {
            return 0.0;
        }
        self.voiced_total as f32 / self.frame_index as f32
    }

    pub fn frames_seen(&self) -> usize {
        self.frame_index
    }

    pub fn reset(&mut self) {
        self.noise_floor_sq = 1e-8;
        self.frame_index = 0;
        self.hangover_left = 0;
        self.open_start = None;
        self.open_voiced_end = 0;
        self.segments.clear();
        self.voiced_total = 0;
    }
}

/// Geometric mean over arithmetic mean of the power spectrum; 1.0 is flat
/// (noise-like), near 0 is tonal.
fn spectral_flatness(power: &[f64]) -> f64 {
    if power.is_empty() {
        return 1.0;
    }
    let mut log_sum = 0.0f64;
    let mut sum = 0.0f64;
    for &p in power {
        let p = p.max(DB_EPS as f64);
        log_sum += p.ln();
        sum += p;
    }
    let n = power.len() as f64;
    let geo = (log_sum / n).exp();
    let arith = sum / n;
    if arith < DB_EPS as f64 {
        return 1.0;
    }
    (geo / arith).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrum::SpectrumEngine;
    use crate::dsp::tables::{tables_for, GeometryKey};

    const SR: u32 = 16_000;
    const HOP: usize = 256;

    fn run(vad: &mut VoiceActivityDetector, frames: &[Vec<f32>]) -> Vec<bool> {
        let tables = tables_for(GeometryKey {
            frame_size: 512,
            fft_size: 512,
            n_mels: 26,
            sample_rate: SR,
        });
        let mut eng = SpectrumEngine::new(tables);
        frames
            .iter()
            .map(|frame| {
                let power: Vec<f64> = eng.analyze(frame).to_vec();
                vad.process_frame(&FrameObservation {
                    samples: frame,
                    power: &power,
                    bin_hz: SR as f32 / 512.0,
                    sample_rate: SR,
                })
            })
            .collect()
    }

    fn tone(len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / SR as f32).sin())
            .collect()
    }

    fn vad() -> VoiceActivityDetector {
        VoiceActivityDetector::new(6.0, 40.0, 60.0, SR, HOP)
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut v = vad();
        let flags = run(&mut v, &vec![vec![0.0; 512]; 20]);
        assert!(flags.iter().all(|&f| !f));
        assert!(v.trimmed_range().is_none());
    }

    #[test]
    fn tone_after_silence_is_voiced() {
        let mut v = vad();
        let mut frames = vec![vec![0.0; 512]; 10];
        frames.extend(std::iter::repeat_with(|| tone(512, 0.5)).take(10));
        let flags = run(&mut v, &frames);
        assert!(flags[..10].iter().all(|&f| !f));
        assert!(flags[10..].iter().filter(|&&f| f).count() >= 8);
        let (start, end) = v.trimmed_range().unwrap();
        assert!(start >= 10);
        assert_eq!(end, 20);
    }

    #[test]
    fn short_blips_are_dropped_from_segments() {
        let mut v = vad();
        // One voiced frame (~16 ms) is below the 60 ms minimum.
        let mut frames = vec![vec![0.0; 512]; 8];
        frames.push(tone(512, 0.5));
        frames.extend(vec![vec![0.0; 512]; 8]);
        run(&mut v, &frames);
        v.finalize();
        assert!(v.segments().is_empty());
    }

    #[test]
    fn sustained_tone_forms_one_segment() {
        let mut v = vad();
        let mut frames = vec![vec![0.0; 512]; 6];
        frames.extend(std::iter::repeat_with(|| tone(512, 0.5)).take(12));
        frames.extend(vec![vec![0.0; 512]; 6]);
        run(&mut v, &frames);
        v.finalize();
        assert_eq!(v.segments().len(), 1);
        let seg = v.segments()[0];
        assert!(seg.start >= 6 && seg.len() >= 10, "segment {:?}", seg);
    }
}
