//! MFCC extraction.
//!
//! Per frame: power spectrum (shared, already windowed) -> triangular mel
//! filterbank -> floored natural log -> DCT-II (ortho) -> first `n_cepstra`
//! coefficients. Optionally coefficient 0 is replaced with the frame's
//! log-energy, and delta / delta-delta coefficients are appended from a
//! symmetric +/-2 frame window with reflected edges.
//!
//! Extraction is bit-deterministic: accumulation order is fixed and no
//! parallel reductions are used, so a frame sequence always maps to the
//! same cepstra no matter how the PCM was chunked.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;

use super::spectrum::FrameObservation;
use super::tables::DspTables;
use super::utils::POWER_FLOOR;

/// Denominator of the +/-2 regression window: 2 * (1^2 + 2^2).
const DELTA_NORM: f64 = 10.0;

pub struct MfccProcessor {
    tables: Arc<DspTables>,
    n_cepstra: usize,
    replace_c0_with_log_energy: bool,
    enable_deltas: bool,

    mel_energies: Vec<f64>,
    log_mel: Vec<f64>,

    // Base vectors awaiting +/-2 context when deltas are enabled.
    history: VecDeque<Vec<f32>>,
    history_start: usize,
    base_count: usize,
    next_emit: usize,
}

impl MfccProcessor {
    pub fn new(
        tables: Arc<DspTables>,
        n_cepstra: usize,
        replace_c0_with_log_energy: bool,
        enable_deltas: bool,
    ) -> Self {
        let n_mels = tables.n_mels;
        assert!(n_cepstra > 0 && n_cepstra <= n_mels);
        Self {
            tables,
            n_cepstra,
            replace_c0_with_log_energy,
            enable_deltas,
            mel_energies: vec![0.0; n_mels],
            log_mel: vec![0.0; n_mels],
            history: VecDeque::new(),
            history_start: 0,
            base_count: 0,
            next_emit: 0,
        }
    }

    /// Output dimension per emitted vector.
    pub fn dim(&self) -> usize {
        if self.enable_deltas {
            self.n_cepstra * 3
        } else {
            self.n_cepstra
        }
    }

    /// Process one frame; completed vectors are appended to `out`.
    ///
    /// Without deltas this is exactly one vector per call. With deltas the
    /// emission lags two frames behind until `finalize` flushes the tail.
    pub fn process_frame(&mut self, obs: &FrameObservation<'_>, out: &mut Vec<Vec<f32>>) {
        let base = self.cepstra_for(obs.power);
        if !self.enable_deltas {
            out.push(base);
            return;
        }
        self.history.push_back(base);
        self.base_count += 1;
        // Emitting index t needs base t+2; reflected context covers t < 2.
        while self.next_emit + 2 < self.base_count {
            let full = self.emit_with_context(self.next_emit, self.base_count);
            out.push(full);
            self.next_emit += 1;
            self.trim_history();
        }
    }

    /// Flush vectors still waiting on future context, reflecting at the
    /// final edge. Call once, after the last frame of the stream.
    pub fn finalize(&mut self, out: &mut Vec<Vec<f32>>) {
        if !self.enable_deltas {
            return;
        }
        while self.next_emit < self.base_count {
            let full = self.emit_with_context(self.next_emit, self.base_count);
            out.push(full);
            self.next_emit += 1;
        }
        self.history.clear();
        self.history_start = self.next_emit;
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.history_start = 0;
        self.base_count = 0;
        self.next_emit = 0;
    }

    fn cepstra_for(&mut self, power: &[f64]) -> Vec<f32> {
        let bank = &self.tables.mel_bank;
        debug_assert_eq!(power.len(), self.tables.spectrum_bins());

        for (energy, filter) in self.mel_energies.iter_mut().zip(bank.iter()) {
            let mut sum = 0.0f64;
            for (&p, &w) in power.iter().zip(filter.iter()) {
                sum += p * w as f64;
            }
            *energy = sum;
        }
        for (lm, &e) in self.log_mel.iter_mut().zip(self.mel_energies.iter()) {
            *lm = e.max(POWER_FLOOR).ln();
        }

        let n = self.log_mel.len();
        let mut cepstra = Vec::with_capacity(self.n_cepstra);
        for k in 0..self.n_cepstra {
            let mut sum = 0.0f64;
            for (i, &v) in self.log_mel.iter().enumerate() {
                sum += v * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos();
            }
            let norm = if k == 0 {
                (1.0 / n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
            };
            cepstra.push((sum * norm) as f32);
        }

        if self.replace_c0_with_log_energy {
            let total: f64 = power.iter().sum();
            cepstra[0] = total.max(POWER_FLOOR).ln() as f32;
        }
        cepstra
    }

    /// Reflected index into the base sequence of length `len`.
    fn reflect(i: isize, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let mut i = i;
        if i < 0 {
            i = -i;
        }
        let last = (len - 1) as isize;
        if i > last {
            i = 2 * last - i;
        }
        i.clamp(0, last) as usize
    }

    fn base(&self, index: usize) -> &[f32] {
        &self.history[index - self.history_start]
    }

    fn emit_with_context(&self, t: usize, len: usize) -> Vec<f32> {
        let ctx = |offset: isize| Self::reflect(t as isize + offset, len);
        let c_m2 = self.base(ctx(-2));
        let c_m1 = self.base(ctx(-1));
        let c_0 = self.base(ctx(0));
        let c_p1 = self.base(ctx(1));
        let c_p2 = self.base(ctx(2));

        let mut full = Vec::with_capacity(self.n_cepstra * 3);
        full.extend_from_slice(c_0);
        for j in 0..self.n_cepstra {
            let d = ((c_p1[j] as f64 - c_m1[j] as f64)
                + 2.0 * (c_p2[j] as f64 - c_m2[j] as f64))
                / DELTA_NORM;
            full.push(d as f32);
        }
        for j in 0..self.n_cepstra {
            let dd = (c_m2[j] as f64 - 2.0 * c_0[j] as f64 + c_p2[j] as f64) / 4.0;
            full.push(dd as f32);
        }
        full
    }

    fn trim_history(&mut self) {
        // Index t-1 is still context for the next emission; older drops.
        let keep_from = self.next_emit.saturating_sub(2);
        while self.history_start < keep_from {
            self.history.pop_front();
            self.history_start += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrum::SpectrumEngine;
    use crate::dsp::tables::{tables_for, GeometryKey};

    const SR: u32 = 16_000;

    fn key() -> GeometryKey {
        GeometryKey {
            frame_size: 512,
            fft_size: 512,
            n_mels: 26,
            sample_rate: SR,
        }
    }

    fn tone_frame(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn extract(proc_: &mut MfccProcessor, eng: &mut SpectrumEngine, frame: &[f32]) -> Vec<Vec<f32>> {
        let power: Vec<f64> = eng.analyze(frame).to_vec();
        let obs = FrameObservation {
            samples: frame,
            power: &power,
            bin_hz: SR as f32 / 512.0,
            sample_rate: SR,
        };
        let mut out = Vec::new();
        proc_.process_frame(&obs, &mut out);
        out
    }

    #[test]
    fn one_vector_per_frame_without_deltas() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(tables, 13, false, false);
        let out = extract(&mut mfcc, &mut eng, &tone_frame(440.0, 512));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 13);
        assert!(out[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn distinct_tones_give_distinct_cepstra() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(tables, 13, false, false);
        let low = extract(&mut mfcc, &mut eng, &tone_frame(300.0, 512));
        let high = extract(&mut mfcc, &mut eng, &tone_frame(3000.0, 512));
        let dist: f32 = low[0]
            .iter()
            .zip(high[0].iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(dist > 1.0, "cepstra too close: {}", dist);
    }

    #[test]
    fn silence_stays_finite_through_log_floor() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(tables, 13, false, false);
        let out = extract(&mut mfcc, &mut eng, &vec![0.0; 512]);
        assert!(out[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn delta_emission_lags_then_flushes() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(tables, 13, false, true);

        let mut emitted = Vec::new();
        for i in 0..5 {
            let frame = tone_frame(300.0 + 100.0 * i as f32, 512);
            emitted.extend(extract(&mut mfcc, &mut eng, &frame));
        }
        // Five frames in, the last two still wait on future context.
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[0].len(), 39);

        let mut tail = Vec::new();
        mfcc.finalize(&mut tail);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn constant_input_has_zero_deltas() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(tables, 13, false, true);
        let frame = tone_frame(440.0, 512);
        let mut out = Vec::new();
        for _ in 0..6 {
            out.extend(extract(&mut mfcc, &mut eng, &frame));
        }
        mfcc.finalize(&mut out);
        assert_eq!(out.len(), 6);
        for vector in &out {
            for &d in &vector[13..] {
                assert!(d.abs() < 1e-4, "delta {} not near zero", d);
            }
        }
    }

    #[test]
    fn log_energy_replaces_c0_when_configured() {
        let tables = tables_for(key());
        let mut eng = SpectrumEngine::new(Arc::clone(&tables));
        let mut plain = MfccProcessor::new(Arc::clone(&tables), 13, false, false);
        let mut energy = MfccProcessor::new(tables, 13, true, false);
        let frame = tone_frame(440.0, 512);
        let a = extract(&mut plain, &mut eng, &frame);
        let b = extract(&mut energy, &mut eng, &frame);
        assert_ne!(a[0][0], b[0][0]);
        assert_eq!(a[0][1..], b[0][1..]);
    }
}
