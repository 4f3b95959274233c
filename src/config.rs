//! Session configuration.
//!
//! A session's sample rate and frame geometry are fixed at creation and
//! never change afterwards; everything here is validated up front so the
//! DSP stages can assume well-formed parameters.

use serde::{Deserialize, Serialize};

use crate::compare::blend::BlendWeights;
use crate::error::{EngineError, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default analysis frame length in samples.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Default hop between consecutive frames in samples.
pub const DEFAULT_HOP_SIZE: usize = 256;

/// Default number of mel filterbank bands.
pub const DEFAULT_MEL_BANDS: usize = 26;

/// Default number of cepstral coefficients kept per frame.
pub const DEFAULT_CEPSTRA: usize = 13;

/// Default bounded PCM buffer length in seconds.
pub const DEFAULT_MAX_PCM_SECONDS: f32 = 30.0;

// =============================================================================
// Frame geometry
// =============================================================================

/// Immutable framing parameters for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameGeometry {
    /// Analysis window length in samples.
    pub frame_size: usize,
    /// Stride between frame starts in samples.
    pub hop_size: usize,
    /// FFT length; must be a power of two and >= `frame_size`.
    pub fft_size: usize,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            fft_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl FrameGeometry {
    /// Samples of overlap retained between consecutive frames.
    pub fn overlap(&self) -> usize {
        self.frame_size - self.hop_size
    }

    /// Number of spectrum bins produced by the real half of the FFT.
    pub fn spectrum_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

// =============================================================================
// DTW metric
// =============================================================================

/// Local distance used inside the DTW comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtwMetric {
    /// Euclidean distance between per-vector z-scored cepstra (default).
    Euclidean,
    /// Cosine distance (1 - cosine similarity) between raw cepstra.
    Cosine,
}

// =============================================================================
// Session configuration
// =============================================================================

/// Everything a session needs at creation time. All knobs carry the
/// engine-wide defaults; construct with `SessionConfig::default()` and
/// override the fields of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// PCM sample rate in Hz.
    pub sample_rate: u32,
    /// Input channel count; only mono is accepted.
    pub channels: u16,
    /// Frame geometry, immutable for the session lifetime.
    pub geometry: FrameGeometry,

    /// Number of mel filterbank bands.
    pub n_mels: usize,
    /// Cepstral coefficients kept per frame.
    pub n_cepstra: usize,
    /// Append delta and delta-delta coefficients to each vector.
    pub enable_deltas: bool,
    /// Replace coefficient 0 with the frame's log-energy.
    pub replace_c0_with_log_energy: bool,
    /// Run the auxiliary pitch/harmonic/cadence analyzers.
    pub enable_enhanced: bool,

    /// Energy threshold above the running noise floor for a voiced frame (dB).
    pub vad_energy_db: f32,
    /// Hangover bridging short unvoiced gaps inside a segment (ms).
    pub vad_hangover_ms: f32,
    /// Minimum duration for a voiced segment to be kept (ms).
    pub vad_min_voiced_ms: f32,

    /// Lower bound of the pitch search range (Hz).
    pub pitch_min_hz: f32,
    /// Upper bound of the pitch search range (Hz).
    pub pitch_max_hz: f32,
    /// Autocorrelation peak below this is reported unvoiced.
    pub pitch_confidence_threshold: f32,

    /// Sakoe-Chiba band width as a fraction of the longer sequence, in (0, 1].
    pub dtw_band_ratio: f32,
    /// Exponent mapping DTW cost to similarity: exp(-beta * cost).
    pub dtw_beta: f32,
    /// Local distance metric for DTW.
    pub dtw_metric: DtwMetric,

    /// Exponent mapping subsequence cost to similarity: exp(-gamma * cost).
    pub subsequence_gamma: f32,
    /// Cap on the coverage multiplier for over-length user windows.
    pub coverage_uplift_max: f32,

    /// Component blend weights, renormalized over present components.
    pub blend_weights: BlendWeights,
    /// Raw cosine components below this are clamped to zero.
    pub cosine_reject_threshold: f32,
    /// User frames required before any component is produced.
    pub k_min_frames: usize,
    /// User frames required before the score is flagged reliable.
    pub k_reliable_frames: usize,
    /// No-new-frames interval after which the session reports stalled (ms).
    pub k_stall_timeout_ms: u64,
    /// User feature variance below this is treated as silence.
    pub silence_variance_threshold: f32,

    /// Bounded PCM buffer length in seconds.
    pub max_pcm_seconds: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            geometry: FrameGeometry::default(),
            n_mels: DEFAULT_MEL_BANDS,
            n_cepstra: DEFAULT_CEPSTRA,
            enable_deltas: false,
            replace_c0_with_log_energy: false,
            enable_enhanced: true,
            vad_energy_db: 6.0,
            vad_hangover_ms: 40.0,
            vad_min_voiced_ms: 60.0,
            pitch_min_hz: 80.0,
            pitch_max_hz: 1200.0,
            pitch_confidence_threshold: 0.30,
            dtw_band_ratio: 0.1,
            dtw_beta: 2.0,
            dtw_metric: DtwMetric::Euclidean,
            subsequence_gamma: 0.75,
            coverage_uplift_max: 1.15,
            blend_weights: BlendWeights::default(),
            cosine_reject_threshold: 0.3,
            k_min_frames: 25,
            k_reliable_frames: 75,
            k_stall_timeout_ms: 1500,
            silence_variance_threshold: 0.02,
            max_pcm_seconds: DEFAULT_MAX_PCM_SECONDS,
        }
    }
}

impl SessionConfig {
    /// Feature-vector dimension implied by this configuration.
    pub fn feature_dim(&self) -> usize {
        if self.enable_deltas {
            self.n_cepstra * 3
        } else {
            self.n_cepstra
        }
    }

    /// Duration of one hop in seconds.
    pub fn hop_seconds(&self) -> f64 {
        self.geometry.hop_size as f64 / self.sample_rate as f64
    }

    /// PCM buffer capacity in samples.
    pub fn pcm_capacity(&self) -> usize {
        (self.max_pcm_seconds as f64 * self.sample_rate as f64).ceil() as usize
    }

    /// Validate the configuration, returning `BadConfig` on the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::BadConfig("sample rate must be positive".into()));
        }
        if self.channels != 1 {
            return Err(EngineError::BadConfig(format!(
                "only mono input is supported, got {} channels",
                self.channels
            )));
        }
        let g = &self.geometry;
        if g.frame_size == 0 {
            return Err(EngineError::BadConfig("frame size must be positive".into()));
        }
        if g.hop_size == 0 || g.hop_size > g.frame_size {
            return Err(EngineError::BadConfig(format!(
                "hop size {} must be in 1..={}",
                g.hop_size, g.frame_size
            )));
        }
        if !g.fft_size.is_power_of_two() {
            return Err(EngineError::BadConfig(format!(
                "fft size {} is not a power of two",
                g.fft_size
            )));
        }
        if g.fft_size < g.frame_size {
            return Err(EngineError::BadConfig(format!(
                "fft size {} smaller than frame size {}",
                g.fft_size, g.frame_size
            )));
        }
        if self.n_mels < 2 {
            return Err(EngineError::BadConfig("need at least 2 mel bands".into()));
        }
        if self.n_cepstra == 0 || self.n_cepstra > self.n_mels {
            return Err(EngineError::BadConfig(format!(
                "cepstra count {} must be in 1..={}",
                self.n_cepstra, self.n_mels
            )));
        }
        if !(self.dtw_band_ratio > 0.0 && self.dtw_band_ratio <= 1.0) {
            return Err(EngineError::BadConfig(format!(
                "dtw band ratio {} must be in (0, 1]",
                self.dtw_band_ratio
            )));
        }
        if self.pitch_min_hz <= 0.0 || self.pitch_max_hz <= self.pitch_min_hz {
            return Err(EngineError::BadConfig("invalid pitch range".into()));
        }
        if self.k_reliable_frames < self.k_min_frames {
            return Err(EngineError::BadConfig(
                "reliable frame count below minimum frame count".into(),
            ));
        }
        if self.max_pcm_seconds <= 0.0 {
            return Err(EngineError::BadConfig("pcm buffer must be non-empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Registry configuration
// =============================================================================

/// Process-wide registry limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,
    /// Idle seconds after which a session is evicted.
    pub session_ttl_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            session_ttl_seconds: 300,
        }
    }
}
