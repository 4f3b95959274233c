//! Windowed power-spectrum computation shared by the per-frame analyzers.
//!
//! The session computes one FFT per frame here and hands the result to each
//! analyzer, so MFCC, VAD, harmonic, and cadence stages all read the same
//! spectrum without recomputing it or referencing each other.

use std::sync::Arc;

use rustfft::num_complex::Complex;

use super::tables::DspTables;

/// Everything an analyzer may observe about one frame.
pub struct FrameObservation<'a> {
    /// Raw (un-windowed) frame samples, `frame_size` long.
    pub samples: &'a [f32],
    /// Power spectrum of the Hann-windowed frame, `fft_size / 2 + 1` bins.
    pub power: &'a [f64],
    /// Width of one spectrum bin in Hz.
    pub bin_hz: f32,
    /// Session sample rate in Hz.
    pub sample_rate: u32,
}

/// Per-session FFT scratch. The plan and window are shared immutable
/// tables; only the scratch buffers live here.
pub struct SpectrumEngine {
    tables: Arc<DspTables>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    power: Vec<f64>,
}

impl SpectrumEngine {
    pub fn new(tables: Arc<DspTables>) -> Self {
        let fft_size = tables.fft_size;
        let scratch_len = tables.fft.get_inplace_scratch_len();
        let bins = tables.spectrum_bins();
        Self {
            tables,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            power: vec![0.0; bins],
        }
    }

    /// Window the frame, run the FFT, and return the power spectrum.
    /// The frame is zero-padded up to `fft_size` when it is shorter.
    pub fn analyze(&mut self, frame: &[f32]) -> &[f64] {
        let t = &self.tables;
        debug_assert!(frame.len() <= t.fft_size);
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let windowed = if i < frame.len() && i < t.window.len() {
                frame[i] * t.window[i]
            } else {
                0.0
            };
            *slot = Complex::new(windowed, 0.0);
        }
        t.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (bin, p) in self.power.iter_mut().enumerate() {
            *p = self.buffer[bin].norm_sqr() as f64;
        }
        &self.power
    }

    /// Power spectrum from the most recent `analyze` call.
    pub fn last_power(&self) -> &[f64] {
        &self.power
    }

    pub fn tables(&self) -> &Arc<DspTables> {
        &self.tables
    }

    pub fn reset(&mut self) {
        self.buffer.fill(Complex::new(0.0, 0.0));
        self.power.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::tables::{tables_for, GeometryKey};

    fn engine(sample_rate: u32) -> SpectrumEngine {
        SpectrumEngine::new(tables_for(GeometryKey {
            frame_size: 1024,
            fft_size: 1024,
            n_mels: 26,
            sample_rate,
        }))
    }

    #[test]
    fn sine_concentrates_power_at_its_bin() {
        let sample_rate = 16_000u32;
        let mut eng = engine(sample_rate);
        // 1 kHz sits at bin 64 with a 1024-point FFT at 16 kHz.
        let frame: Vec<f32> = (0..1024)
            .map(|i| {
                (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        let power = eng.analyze(&frame);
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((peak as i64 - 64).abs() <= 1, "peak bin {}", peak);
    }

    #[test]
    fn silence_yields_zero_power() {
        let mut eng = engine(16_000);
        let frame = vec![0.0f32; 1024];
        assert!(eng.analyze(&frame).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn analysis_is_deterministic() {
        let mut a = engine(16_000);
        let mut b = engine(16_000);
        let frame: Vec<f32> = (0..1024).map(|i| ((i * 37) % 101) as f32 / 101.0).collect();
        let pa: Vec<f64> = a.analyze(&frame).to_vec();
        let pb: Vec<f64> = b.analyze(&frame).to_vec();
        assert_eq!(pa, pb);
    }
}
