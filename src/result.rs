//! Similarity result and readiness types exposed through the session API.

use serde::{Deserialize, Serialize};

// =============================================================================
// Readiness
// =============================================================================

/// Whether the current score is meaningful enough to surface to an end user.
///
/// Progression is strictly monotonic within a session:
/// `NotReady -> Warming -> Ready`. `Stalled` is an overlay reported while no
/// new audio arrives; the underlying phase is retained and resumes on the
/// next append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    NotReady,
    Warming,
    Ready,
    Stalled,
}

impl Readiness {
    /// True once the session has surfaced a score at least once.
    pub fn has_score(&self) -> bool {
        !matches!(self, Readiness::NotReady)
    }
}

// =============================================================================
// Components
// =============================================================================

/// Individual similarity components, each in [0, 1] when present.
/// A `None` entry means the component could not be computed for the frames
/// observed so far and was excluded from the blend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    /// Banded DTW similarity over the full user sequence.
    pub dtw: Option<f32>,
    /// Mean-subtracted cosine similarity averaged along the DTW path.
    pub offset_cosine: Option<f32>,
    /// Cosine similarity between the sequences' mean cepstral vectors.
    pub mean_cosine: Option<f32>,
    /// Best contiguous user window matched against the whole master.
    pub subsequence: Option<f32>,
}

impl ComponentScores {
    /// Number of components currently present.
    pub fn present_count(&self) -> usize {
        [
            self.dtw,
            self.offset_cosine,
            self.mean_cosine,
            self.subsequence,
        ]
        .iter()
        .filter(|c| c.is_some())
        .count()
    }

    /// True when the subsequence component is the only one present.
    pub fn subsequence_only(&self) -> bool {
        self.subsequence.is_some()
            && self.dtw.is_none()
            && self.offset_cosine.is_none()
            && self.mean_cosine.is_none()
    }
}

// =============================================================================
// Similarity result
// =============================================================================

/// Snapshot of the evolving similarity score for one session.
///
/// `overall` is `None` until the session leaves `not_ready`; every present
/// component and `overall` itself is clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub overall: Option<f32>,
    pub components: ComponentScores,
    pub confidence: f32,
    pub is_reliable: bool,
    pub readiness: Readiness,
    pub frames_observed: usize,
    pub frames_required: usize,
}

impl SimilarityResult {
    /// The empty result reported before any user audio arrives.
    pub fn not_ready(frames_required: usize) -> Self {
        Self {
            overall: None,
            components: ComponentScores::default(),
            confidence: 0.0,
            is_reliable: false,
            readiness: Readiness::NotReady,
            frames_observed: 0,
            frames_required,
        }
    }
}
