//! Per-session telemetry.
//!
//! Counters are updated inside `append`/`finalize` and scraped by consumers
//! through the session's `get` snapshot; nothing here is persisted.

use serde::{Deserialize, Serialize};

use crate::result::ComponentScores;

/// Engine build identifier embedded in every telemetry snapshot.
pub fn engine_build() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Blend weights actually applied after absent components were dropped and
/// the remainder renormalized.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveWeights {
    pub dtw: f32,
    pub offset_cosine: f32,
    pub mean_cosine: f32,
    pub subsequence: f32,
}

/// Summary of the auxiliary analyzers; populated only when the session runs
/// with `enable_enhanced`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxSummary {
    /// Median fundamental frequency over voiced frames.
    pub median_f0_hz: Option<f32>,
    /// Fraction of frames the pitch tracker called voiced.
    pub voiced_ratio: f32,
    /// Mean spectral centroid over non-silent frames.
    pub mean_centroid_hz: f32,
    /// Tempo estimate from the cadence analyzer, when one is prominent.
    pub tempo_bpm: Option<f32>,
    /// Closed voiced segments detected by the VAD.
    pub voiced_segments: usize,
}

/// Telemetry scraped per session via `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTelemetry {
    /// Wall-clock microseconds spent in the most recent append.
    pub last_extract_micros: u64,
    /// Cumulative microseconds spent extracting features and blending.
    pub total_extract_micros: u64,
    /// Number of append calls accepted.
    pub appends: u64,
    /// Frames emitted by the framer so far.
    pub frames_processed: u64,
    /// Cumulative PCM received, in seconds.
    pub pcm_seconds: f64,
    /// Component values from the latest blend.
    pub components: ComponentScores,
    /// Weights effectively used by the latest blend.
    pub effective_weights: EffectiveWeights,
    /// Auxiliary analyzer summary.
    pub aux: AuxSummary,
    /// Engine build identifier.
    pub engine_build: String,
}

impl Default for SessionTelemetry {
    fn default() -> Self {
        Self {
            last_extract_micros: 0,
            total_extract_micros: 0,
            appends: 0,
            frames_processed: 0,
            pcm_seconds: 0.0,
            components: ComponentScores::default(),
            effective_weights: EffectiveWeights::default(),
            aux: AuxSummary::default(),
            engine_build: engine_build().to_string(),
        }
    }
}
