//! Similarity blending.
//!
//! Combines the DTW, offset-invariant cosine, mean-vector cosine, and
//! subsequence components into one overall score with a confidence value.
//! Absent components are excluded and the remaining weights renormalized;
//! near-orthogonal cosine components are clamped to zero before blending.

use serde::{Deserialize, Serialize};

use super::dtw::DtwOutcome;
use super::subsequence::SubsequenceOutcome;
use crate::dsp::utils::cosine_similarity;
use crate::result::ComponentScores;
use crate::telemetry::EffectiveWeights;

/// Default component weights; tunable via [`BlendConfig`].
pub const DEFAULT_WEIGHT_DTW: f32 = 0.40;
pub const DEFAULT_WEIGHT_OFFSET_COSINE: f32 = 0.25;
pub const DEFAULT_WEIGHT_MEAN_COSINE: f32 = 0.15;
pub const DEFAULT_WEIGHT_SUBSEQUENCE: f32 = 0.20;

/// Confidence mix. The variance term gates the whole sum so silence can
/// never accumulate confidence from frame count alone.
const CONF_FRAMES_WEIGHT: f32 = 0.4;
const CONF_PRESENCE_WEIGHT: f32 = 0.3;
const CONF_AGREEMENT_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlendWeights {
    pub dtw: f32,
    pub offset_cosine: f32,
    pub mean_cosine: f32,
    pub subsequence: f32,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            dtw: DEFAULT_WEIGHT_DTW,
            offset_cosine: DEFAULT_WEIGHT_OFFSET_COSINE,
            mean_cosine: DEFAULT_WEIGHT_MEAN_COSINE,
            subsequence: DEFAULT_WEIGHT_SUBSEQUENCE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlendConfig {
    pub weights: BlendWeights,
    /// Raw cosines below this are clamped to zero.
    pub cosine_reject_threshold: f32,
    /// User frames needed before components are produced.
    pub k_min_frames: usize,
    /// Frame count at which the confidence frames term saturates.
    pub k_reliable_frames: usize,
    /// User variance below this is treated as silence.
    pub silence_variance_threshold: f32,
    /// When a subsequence component exists, the overall score is capped at
    /// `subsequence * coverage_uplift_max` so a partial match can never
    /// beat a full-length match by much.
    pub coverage_uplift_max: f32,
}

/// Everything the blender needs for one pass.
pub struct BlendInputs<'a> {
    pub user: &'a [Vec<f32>],
    pub master: &'a [Vec<f32>],
    pub user_variance: f32,
    pub dtw: Option<&'a DtwOutcome>,
    pub subsequence: Option<&'a SubsequenceOutcome>,
}

/// One blend pass output; readiness gating happens in the session.
#[derive(Debug, Clone, Copy)]
pub struct BlendOutput {
    pub components: ComponentScores,
    /// Weighted average over present components; `None` when none present.
    pub overall: Option<f32>,
    /// Raw (un-ratcheted) confidence in [0, 1].
    pub confidence: f32,
    /// False when the subsequence component is the only signal.
    pub component_reliable: bool,
    /// Weights applied after renormalization.
    pub effective_weights: EffectiveWeights,
}

pub fn blend(inputs: &BlendInputs<'_>, config: &BlendConfig) -> BlendOutput {
    let mut components = ComponentScores::default();

    if inputs.user.len() >= config.k_min_frames && inputs.master.len() >= config.k_min_frames {
        components.dtw = inputs
            .dtw
            .map(|outcome| outcome.similarity.clamp(0.0, 1.0));
        components.offset_cosine = inputs
            .dtw
            .and_then(|outcome| offset_cosine(inputs.user, inputs.master, outcome))
            .map(|c| reject_low(c, config.cosine_reject_threshold));
        components.mean_cosine = mean_cosine(inputs.user, inputs.master)
            .map(|c| reject_low(c, config.cosine_reject_threshold));
        components.subsequence = inputs
            .subsequence
            .map(|outcome| outcome.similarity.clamp(0.0, 1.0));
    }

    let (mut overall, effective_weights) = weighted_overall(&components, &config.weights);
    if let (Some(score), Some(sub)) = (overall, components.subsequence) {
        overall = Some(score.min((sub * config.coverage_uplift_max).clamp(0.0, 1.0)));
    }
    let confidence = confidence_for(inputs, &components, config);

    BlendOutput {
        components,
        overall,
        confidence,
        component_reliable: !components.subsequence_only(),
        effective_weights,
    }
}

fn reject_low(cosine: f32, threshold: f32) -> f32 {
    if cosine < threshold {
        0.0
    } else {
        cosine.clamp(0.0, 1.0)
    }
}

/// Cosine similarity between mean cepstral vectors.
fn mean_cosine(user: &[Vec<f32>], master: &[Vec<f32>]) -> Option<f32> {
    if user.is_empty() || master.is_empty() {
        return None;
    }
    let mu_user = crate::dsp::utils::mean_vector(user);
    let mu_master = crate::dsp::utils::mean_vector(master);
    Some(cosine_similarity(&mu_user, &mu_master))
}

/// Mean-subtracted cosine averaged frame-wise along the DTW path. The
/// per-sequence mean subtraction removes microphone/gain offsets.
fn offset_cosine(user: &[Vec<f32>], master: &[Vec<f32>], dtw: &DtwOutcome) -> Option<f32> {
    if dtw.path.is_empty() {
        return None;
    }
    let mu_user = crate::dsp::utils::mean_vector(user);
    let mu_master = crate::dsp::utils::mean_vector(master);
    let dim = mu_user.len();
    let mut centered_user = vec![0.0f32; dim];
    let mut centered_master = vec![0.0f32; dim];
    let mut sum = 0.0f64;
    for &(i, j) in &dtw.path {
        for d in 0..dim {
            centered_user[d] = user[i][d] - mu_user[d];
            centered_master[d] = master[j][d] - mu_master[d];
        }
        sum += cosine_similarity(&centered_user, &centered_master) as f64;
    }
    Some((sum / dtw.path.len() as f64) as f32)
}

fn weighted_overall(
    components: &ComponentScores,
    weights: &BlendWeights,
) -> (Option<f32>, EffectiveWeights) {
    let pairs = [
        (components.dtw, weights.dtw),
        (components.offset_cosine, weights.offset_cosine),
        (components.mean_cosine, weights.mean_cosine),
        (components.subsequence, weights.subsequence),
    ];
    let mut weight_sum = 0.0f64;
    let mut value_sum = 0.0f64;
    for (value, weight) in pairs {
        if let Some(v) = value {
            weight_sum += weight as f64;
            value_sum += v as f64 * weight as f64;
        }
    }
    if weight_sum <= 0.0 {
        return (None, EffectiveWeights::default());
    }
    let norm = |value: Option<f32>, weight: f32| -> f32 {
        if value.is_some() {
            (weight as f64 / weight_sum) as f32
        } else {
            0.0
        }
    };
    let effective = EffectiveWeights {
        dtw: norm(components.dtw, weights.dtw),
        offset_cosine: norm(components.offset_cosine, weights.offset_cosine),
        mean_cosine: norm(components.mean_cosine, weights.mean_cosine),
        subsequence: norm(components.subsequence, weights.subsequence),
    };
    let overall = ((value_sum / weight_sum) as f32).clamp(0.0, 1.0);
    (Some(overall), effective)
}

/// Confidence from (a) frames observed, (b) user variance, (c) component
/// presence, and (d) component agreement. Monotonicity per session is
/// enforced by the caller's ratchet.
fn confidence_for(
    inputs: &BlendInputs<'_>,
    components: &ComponentScores,
    config: &BlendConfig,
) -> f32 {
    let frames_term =
        (inputs.user.len() as f32 / config.k_reliable_frames.max(1) as f32).min(1.0);
    let variance_term = (inputs.user_variance
        / (config.silence_variance_threshold.max(f32::EPSILON) * 8.0))
        .clamp(0.0, 1.0);
    let presence_term = components.present_count() as f32 / 4.0;

    let present: Vec<f32> = [
        components.dtw,
        components.offset_cosine,
        components.mean_cosine,
        components.subsequence,
    ]
    .into_iter()
    .flatten()
    .collect();
    let agreement_term = if present.len() >= 2 {
        let max = present.iter().cloned().fold(f32::MIN, f32::max);
        let min = present.iter().cloned().fold(f32::MAX, f32::min);
        (1.0 - (max - min)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let mixed = CONF_FRAMES_WEIGHT * frames_term
        + CONF_PRESENCE_WEIGHT * presence_term
        + CONF_AGREEMENT_WEIGHT * agreement_term;
    (variance_term * mixed).clamp(0.0, 1.0)
}
