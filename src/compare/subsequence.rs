//! Subsequence matching.
//!
//! Users often record longer than the master, or start offset within it.
//! This matcher slides candidate windows over the (silence-trimmed) user
//! sequence and aligns each against the whole master with the banded DTW,
//! keeping the window with the lowest normalized cost. The similarity is
//! `exp(-gamma * bestCost)` scaled by a coverage factor so short windows
//! are penalized and over-length windows gain at most the configured
//! uplift.

use super::dtw::{banded_dtw_cost, similarity_from_cost, DtwParams};

/// Window lengths tried per candidate start, as fractions of the master.
const LENGTH_FACTORS: [f64; 3] = [0.7, 1.0, 1.4];

/// Upper bound on candidate start positions scanned per search.
const MAX_CANDIDATE_STARTS: usize = 24;

#[derive(Debug, Clone, Copy)]
pub struct SubsequenceParams {
    /// Cost-to-similarity exponent; deliberately gentler than the DTW beta
    /// but high enough not to reward weak partial matches.
    pub gamma: f32,
    /// Cap on the coverage multiplier.
    pub coverage_uplift_max: f32,
    /// Band policy shared with the full-sequence comparator.
    pub dtw: DtwParams,
}

#[derive(Debug, Clone, Copy)]
pub struct SubsequenceOutcome {
    /// Lowest normalized DTW cost over all windows tried.
    pub best_cost: f64,
    /// Start frame of the best window in the user sequence.
    pub start: usize,
    /// Length of the best window in frames.
    pub len: usize,
    /// Coverage-scaled similarity in [0, 1].
    pub similarity: f32,
    /// True when any evaluated window degraded its band.
    pub band_degraded: bool,
}

/// Find the best contiguous user window against the whole master.
///
/// `trim` restricts the scan to the user's voiced span when one is known.
/// Returns `None` when either sequence is too short to align.
pub fn best_window(
    user: &[Vec<f32>],
    master: &[Vec<f32>],
    params: &SubsequenceParams,
    trim: Option<(usize, usize)>,
) -> Option<SubsequenceOutcome> {
    let n = master.len();
    if n < 2 || user.len() < 2 {
        return None;
    }
    let (scan_start, scan_end) = match trim {
        Some((start, end)) if end > start + 1 => (start, end.min(user.len())),
        _ => (0, user.len()),
    };
    let available = scan_end - scan_start;
    if available < 2 {
        return None;
    }

    let min_len = (((n as f64) * LENGTH_FACTORS[0]).round() as usize)
        .clamp(2, available);
    let stride = (available / MAX_CANDIDATE_STARTS).max(1);

    let mut best: Option<SubsequenceOutcome> = None;
    let mut t = scan_start;
    while t < scan_end.saturating_sub(1) {
        let tail = scan_end - t;
        if tail < 2 {
            break;
        }
        let mut tried_lens = [0usize; LENGTH_FACTORS.len()];
        for (slot, factor) in LENGTH_FACTORS.iter().enumerate() {
            let want = ((n as f64) * factor).round() as usize;
            let len = want.min(tail).max(min_len.min(tail)).max(2);
            // Clamping can collapse several factors onto one length.
            if tried_lens[..slot].contains(&len) {
                continue;
            }
            tried_lens[slot] = len;
            let window = &user[t..t + len];
            let Some((cost, degraded)) = banded_dtw_cost(window, master, &params.dtw) else {
                continue;
            };
            let candidate = SubsequenceOutcome {
                best_cost: cost,
                start: t,
                len,
                similarity: coverage_scaled(cost, len, n, params),
                band_degraded: degraded,
            };
            let better = match &best {
                Some(b) => cost < b.best_cost,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        t += stride;
    }
    best
}

fn coverage_scaled(cost: f64, len: usize, master_len: usize, params: &SubsequenceParams) -> f32 {
    let raw = similarity_from_cost(cost, params.gamma);
    let coverage = (len as f32 / master_len as f32).min(params.coverage_uplift_max);
    (raw * coverage).clamp(0.0, 1.0)
}
