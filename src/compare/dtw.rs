//! Banded dynamic time warping between feature sequences.
//!
//! The comparator aligns the user sequence (rows) against the master
//! (columns) inside a Sakoe-Chiba corridor around the scaled diagonal.
//! The accumulated cost is normalized by the alignment path length and
//! mapped to a similarity in (0, 1] by `exp(-beta * cost)`, which
//! penalizes larger distances more aggressively than `1 / (1 + d)` and
//! sharpens the separation between same-type and different-type calls.

use crate::config::DtwMetric;
use crate::dsp::utils::{cosine_similarity, euclidean_distance, zscore_into};

/// Minimum band half-width in frames.
const MIN_BAND: usize = 8;

/// Length ratio beyond which the corridor is considered unable to follow
/// the diagonal and is widened to the shorter sequence length.
const EXTREME_RATIO: usize = 4;

/// Move codes stored per cell for backtracking.
const MOVE_DIAG: u8 = 0;
const MOVE_UP: u8 = 1;
const MOVE_LEFT: u8 = 2;
const MOVE_NONE: u8 = u8::MAX;

#[derive(Debug, Clone, Copy)]
pub struct DtwParams {
    /// Corridor half-width as a fraction of the longer sequence.
    pub band_ratio: f32,
    /// Cost-to-similarity exponent.
    pub beta: f32,
    /// Local distance metric.
    pub metric: DtwMetric,
}

#[derive(Debug, Clone)]
pub struct DtwOutcome {
    /// Accumulated cost divided by alignment path length.
    pub normalized_cost: f64,
    /// `exp(-beta * normalized_cost)`, in (0, 1].
    pub similarity: f32,
    /// Alignment pairs `(user_index, master_index)`, empty unless requested.
    pub path: Vec<(usize, usize)>,
    /// True when the corridor had to be widened past the configured ratio.
    pub band_degraded: bool,
}

/// Align `user` against `master`. Returns `None` when either sequence has
/// fewer than two frames (the component is then omitted from the blend).
pub fn banded_dtw(
    user: &[Vec<f32>],
    master: &[Vec<f32>],
    params: &DtwParams,
    need_path: bool,
) -> Option<DtwOutcome> {
    let m = user.len();
    let n = master.len();
    if m < 2 || n < 2 {
        return None;
    }

    let user_prepared = prepare(user, params.metric);
    let master_prepared = prepare(master, params.metric);

    let longer = m.max(n);
    let mut width = MIN_BAND.max((params.band_ratio as f64 * longer as f64).ceil() as usize);
    let mut degraded = false;
    if m > EXTREME_RATIO * n || n > EXTREME_RATIO * m {
        width = width.max(m.min(n));
        degraded = true;
    }

    if let Some(outcome) = run_banded(
        &user_prepared,
        &master_prepared,
        width,
        params,
        degraded,
        need_path,
    ) {
        return Some(outcome);
    }
    // Corridor too narrow to connect the corners; a full-width band always
    // reaches the terminal cell.
    run_banded(
        &user_prepared,
        &master_prepared,
        longer,
        params,
        true,
        need_path,
    )
}

/// Cost-only variant used by the subsequence matcher.
pub fn banded_dtw_cost(
    user: &[Vec<f32>],
    master: &[Vec<f32>],
    params: &DtwParams,
) -> Option<(f64, bool)> {
    banded_dtw(user, master, params, false).map(|o| (o.normalized_cost, o.band_degraded))
}

fn prepare(frames: &[Vec<f32>], metric: DtwMetric) -> Vec<Vec<f32>> {
    match metric {
        DtwMetric::Euclidean => frames
            .iter()
            .map(|f| {
                let mut z = vec![0.0f32; f.len()];
                zscore_into(f, &mut z);
                z
            })
            .collect(),
        DtwMetric::Cosine => frames.to_vec(),
    }
}

fn local_distance(a: &[f32], b: &[f32], metric: DtwMetric) -> f64 {
    match metric {
        DtwMetric::Euclidean => euclidean_distance(a, b),
        DtwMetric::Cosine => (1.0 - cosine_similarity(a, b) as f64).max(0.0),
    }
}

struct BandRow {
    lo: usize,
    costs: Vec<f64>,
    steps: Vec<u32>,
}

impl BandRow {
    fn cost_at(&self, j: usize) -> f64 {
        if j < self.lo || j >= self.lo + self.costs.len() {
            f64::INFINITY
        } else {
            self.costs[j - self.lo]
        }
    }

    fn steps_at(&self, j: usize) -> u32 {
        if j < self.lo || j >= self.lo + self.steps.len() {
            0
        } else {
            self.steps[j - self.lo]
        }
    }
}

fn band_bounds(i: usize, m: usize, n: usize, width: usize) -> (usize, usize) {
    let center = if m > 1 {
        i as f64 * (n - 1) as f64 / (m - 1) as f64
    } else {
        0.0
    };
    let lo = (center - width as f64).ceil().max(0.0) as usize;
    let hi = ((center + width as f64).floor() as usize).min(n - 1);
    (lo.min(n - 1), hi)
}

fn run_banded(
    user: &[Vec<f32>],
    master: &[Vec<f32>],
    width: usize,
    params: &DtwParams,
    degraded: bool,
    need_path: bool,
) -> Option<DtwOutcome> {
    let m = user.len();
    let n = master.len();
    let metric = params.metric;

    let mut prev_row: Option<BandRow> = None;
    let mut moves: Vec<(usize, Vec<u8>)> = if need_path {
        Vec::with_capacity(m)
    } else {
        Vec::new()
    };

    let mut terminal_cost = f64::INFINITY;
    let mut terminal_steps = 0u32;

    for i in 0..m {
        let (lo, hi) = band_bounds(i, m, n, width);
        let row_len = hi - lo + 1;
        let mut costs = vec![f64::INFINITY; row_len];
        let mut steps = vec![0u32; row_len];
        let mut row_moves = if need_path {
            vec![MOVE_NONE; row_len]
        } else {
            Vec::new()
        };

        for j in lo..=hi {
            let dist = local_distance(&user[i], &master[j], metric);
            let idx = j - lo;

            if i == 0 && j == 0 {
                costs[idx] = dist;
                steps[idx] = 1;
                continue;
            }

            let (diag, up) = match &prev_row {
                Some(prev) => (
                    if j > 0 { prev.cost_at(j - 1) } else { f64::INFINITY },
                    prev.cost_at(j),
                ),
                None => (f64::INFINITY, f64::INFINITY),
            };
            let left = if j > lo {
                costs[idx - 1]
            } else {
                f64::INFINITY
            };

            // Ties prefer the diagonal move.
            let (best, mv) = if diag <= up && diag <= left {
                (diag, MOVE_DIAG)
            } else if up <= left {
                (up, MOVE_UP)
            } else {
                (left, MOVE_LEFT)
            };
            if !best.is_finite() {
                continue;
            }

            costs[idx] = best + dist;
            steps[idx] = 1 + match mv {
                MOVE_DIAG => prev_row.as_ref().map(|p| p.steps_at(j - 1)).unwrap_or(0),
                MOVE_UP => prev_row.as_ref().map(|p| p.steps_at(j)).unwrap_or(0),
                _ => steps[idx - 1],
            };
            if need_path {
                row_moves[idx] = mv;
            }
        }

        if i == m - 1 {
            terminal_cost = if hi == n - 1 {
                costs[row_len - 1]
            } else {
                f64::INFINITY
            };
            terminal_steps = steps[row_len - 1];
        }
        if need_path {
            moves.push((lo, row_moves));
        }
        prev_row = Some(BandRow { lo, costs, steps });
    }

    if !terminal_cost.is_finite() || terminal_steps == 0 {
        return None;
    }

    let normalized = terminal_cost / terminal_steps as f64;
    let path = if need_path {
        backtrack(&moves, m, n)
    } else {
        Vec::new()
    };

    Some(DtwOutcome {
        normalized_cost: normalized,
        similarity: similarity_from_cost(normalized, params.beta),
        path,
        band_degraded: degraded,
    })
}

pub fn similarity_from_cost(normalized_cost: f64, exponent: f32) -> f32 {
    ((-(exponent as f64) * normalized_cost).exp() as f32).clamp(0.0, 1.0)
}

fn backtrack(moves: &[(usize, Vec<u8>)], m: usize, n: usize) -> Vec<(usize, usize)> {
    let mut path = Vec::new();
    let mut i = m - 1;
    let mut j = n - 1;
    loop {
        path.push((i, j));
        if i == 0 && j == 0 {
            break;
        }
        let (lo, row) = &moves[i];
        let mv = if *lo <= j && j < lo + row.len() {
            row[j - lo]
        } else {
            MOVE_NONE
        };
        match mv {
            MOVE_DIAG => {
                i -= 1;
                j -= 1;
            }
            MOVE_UP => {
                i -= 1;
            }
            MOVE_LEFT => {
                j -= 1;
            }
            _ => {
                // Degenerate cell; walk toward the origin deterministically.
                if i > 0 && j > 0 {
                    i -= 1;
                    j -= 1;
                } else if i > 0 {
                    i -= 1;
                } else {
                    j -= 1;
                }
            }
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DtwParams {
        DtwParams {
            band_ratio: 0.1,
            beta: 2.0,
            metric: DtwMetric::Euclidean,
        }
    }

    /// Deterministic pseudo-feature sequence with per-frame variety.
    fn sequence(len: usize, seed: f32) -> Vec<Vec<f32>> {
        (0..len)
            .map(|i| {
                (0..13)
                    .map(|d| ((i as f32 * 0.7 + d as f32 * 1.3 + seed) * 0.9).sin() * 3.0)
                    .collect()
            })
            .collect()
    }

    /// Deterministic white-noise sequence; distinct seeds share nothing.
    fn noise_sequence(len: usize, seed: u32) -> Vec<Vec<f32>> {
        let mut state = seed.wrapping_mul(2654435761).max(1);
        (0..len)
            .map(|_| {
                (0..13)
                    .map(|_| {
                        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                        (state >> 8) as f32 / (1u32 << 24) as f32 * 6.0 - 3.0
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn identical_sequences_have_zero_cost_and_unit_similarity() {
        let seq = sequence(60, 0.0);
        let out = banded_dtw(&seq, &seq, &params(), true).unwrap();
        assert!(out.normalized_cost < 1e-9, "cost {}", out.normalized_cost);
        assert!((out.similarity - 1.0).abs() < 1e-6);
        // The path of an exact match is the main diagonal.
        for (k, &(i, j)) in out.path.iter().enumerate() {
            assert_eq!(i, k);
            assert_eq!(j, k);
        }
    }

    #[test]
    fn unrelated_sequences_score_low() {
        let a = noise_sequence(60, 1);
        let b = noise_sequence(60, 2);
        let out = banded_dtw(&a, &b, &params(), false).unwrap();
        assert!(out.normalized_cost > 0.5);
        assert!(out.similarity < 0.4, "similarity {}", out.similarity);
    }

    #[test]
    fn warped_copy_scores_higher_than_unrelated() {
        let a = noise_sequence(60, 1);
        // Time-stretched copy: every frame duplicated.
        let stretched: Vec<Vec<f32>> = a.iter().flat_map(|f| [f.clone(), f.clone()]).collect();
        let warped = banded_dtw(&stretched, &a, &params(), false).unwrap();
        let unrelated = banded_dtw(&noise_sequence(120, 7), &a, &params(), false).unwrap();
        assert!(warped.similarity > unrelated.similarity);
        assert!(warped.normalized_cost < unrelated.normalized_cost);
    }

    #[test]
    fn too_short_sequences_are_undefined() {
        let a = sequence(1, 0.0);
        let b = sequence(40, 0.0);
        assert!(banded_dtw(&a, &b, &params(), false).is_none());
        assert!(banded_dtw(&b, &a, &params(), false).is_none());
    }

    #[test]
    fn extreme_length_ratio_degrades_but_succeeds() {
        let a = sequence(100, 0.0);
        let b = sequence(10, 0.0);
        let out = banded_dtw(&a, &b, &params(), false).unwrap();
        assert!(out.band_degraded);
        assert!(out.normalized_cost.is_finite());
    }

    #[test]
    fn path_endpoints_cover_both_sequences() {
        let a = sequence(40, 0.0);
        let b = sequence(50, 0.3);
        let out = banded_dtw(&a, &b, &params(), true).unwrap();
        assert_eq!(*out.path.first().unwrap(), (0, 0));
        assert_eq!(*out.path.last().unwrap(), (39, 49));
        // Monotone, unit-step moves only.
        for pair in out.path.windows(2) {
            let (i0, j0) = pair[0];
            let (i1, j1) = pair[1];
            assert!(i1 == i0 || i1 == i0 + 1);
            assert!(j1 == j0 || j1 == j0 + 1);
            assert!(i1 + j1 > i0 + j0);
        }
    }

    #[test]
    fn cosine_metric_is_selectable() {
        let a = sequence(30, 0.0);
        let out = banded_dtw(
            &a,
            &a,
            &DtwParams {
                metric: DtwMetric::Cosine,
                ..params()
            },
            false,
        )
        .unwrap();
        assert!(out.normalized_cost < 1e-6);
    }
}
