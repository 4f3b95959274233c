//! Immutable, lazily-initialized DSP tables shared across sessions.
//!
//! The Hann window, mel filterbank, and FFT plan depend only on frame
//! geometry and sample rate, so they are computed once per distinct
//! geometry and shared by reference. This is the only global state in the
//! engine besides the session registry; the tables themselves are
//! immutable after construction.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use rustfft::{Fft, FftPlanner};

/// Cache key: everything the tables are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    pub frame_size: usize,
    pub fft_size: usize,
    pub n_mels: usize,
    pub sample_rate: u32,
}

/// Shared immutable tables for one geometry.
pub struct DspTables {
    pub frame_size: usize,
    pub fft_size: usize,
    pub n_mels: usize,
    pub sample_rate: u32,
    /// Periodic Hann window, `frame_size` coefficients.
    pub window: Vec<f32>,
    /// Triangular mel filterbank, `n_mels` rows of `fft_size / 2 + 1` bins.
    pub mel_bank: Vec<Vec<f32>>,
    /// Forward FFT plan of length `fft_size`.
    pub fft: Arc<dyn Fft<f32>>,
}

impl DspTables {
    /// Number of bins in the real half of the spectrum.
    pub fn spectrum_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }
}

static TABLE_CACHE: Lazy<Mutex<HashMap<GeometryKey, Arc<DspTables>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Fetch (or build) the shared tables for a geometry.
pub fn tables_for(key: GeometryKey) -> Arc<DspTables> {
    let mut cache = TABLE_CACHE.lock().expect("table cache poisoned");
    if let Some(tables) = cache.get(&key) {
        return Arc::clone(tables);
    }
    let tables = Arc::new(build_tables(key));
    cache.insert(key, Arc::clone(&tables));
    tables
}

fn build_tables(key: GeometryKey) -> DspTables {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(key.fft_size);
    DspTables {
        frame_size: key.frame_size,
        fft_size: key.fft_size,
        n_mels: key.n_mels,
        sample_rate: key.sample_rate,
        window: hann_window(key.frame_size),
        mel_bank: mel_filterbank(key.n_mels, key.fft_size, key.sample_rate),
        fft,
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos())) as f32)
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Triangular mel filterbank spanning 0 Hz to Nyquist with Slaney-style
/// bandwidth normalization.
fn mel_filterbank(n_mels: usize, fft_size: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let n_bins = fft_size / 2 + 1;
    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);

    // n_mels + 2 edge points give n_mels triangles.
    let hz_points: Vec<f64> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_points: Vec<f64> = hz_points
        .iter()
        .map(|&hz| hz * fft_size as f64 / sample_rate as f64)
        .collect();

    let mut bank = vec![vec![0.0f32; n_bins]; n_mels];
    for m in 0..n_mels {
        let start = bin_points[m];
        let center = bin_points[m + 1];
        let end = bin_points[m + 2];
        for (bin, weight) in bank[m].iter_mut().enumerate() {
            let b = bin as f64;
            let w = if b >= start && b < center && center > start {
                (b - start) / (center - start)
            } else if b >= center && b <= end && end > center {
                (end - b) / (end - center)
            } else {
                0.0
            };
            *weight = w as f32;
        }
        let bandwidth = hz_points[m + 2] - hz_points[m];
        if bandwidth > 0.0 {
            let norm = (2.0 / bandwidth) as f32;
            for weight in bank[m].iter_mut() {
                *weight *= norm;
            }
        }
    }
    bank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> GeometryKey {
        GeometryKey {
            frame_size: 1024,
            fft_size: 1024,
            n_mels: 26,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn tables_are_cached_and_shared() {
        let a = tables_for(key());
        let b = tables_for(key());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn window_has_frame_size_coefficients() {
        let t = tables_for(key());
        assert_eq!(t.window.len(), 1024);
        assert!(t.window[0] < 1e-6);
        assert!((t.window[512] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let t = tables_for(key());
        assert_eq!(t.mel_bank.len(), 26);
        assert_eq!(t.mel_bank[0].len(), 513);
        // Every filter carries some weight.
        for row in &t.mel_bank {
            assert!(row.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn distinct_geometries_get_distinct_tables() {
        let a = tables_for(key());
        let b = tables_for(GeometryKey {
            sample_rate: 16_000,
            ..key()
        });
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.sample_rate, 16_000);
    }
}
