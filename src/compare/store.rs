//! In-memory feature sequences.
//!
//! Two logical sequences per session: the master (read-only after load,
//! shared by reference) and the user (append-only, growing). Access is by
//! index and slice; there are no deletes and no random mutation.

use std::sync::Arc;

use crate::dsp::utils::{mean_vector, sequence_variance};

/// An ordered, append-only list of fixed-dimension feature vectors,
/// indexed by frame.
#[derive(Debug, Clone, Default)]
pub struct FeatureSequence {
    dim: usize,
    frames: Vec<Vec<f32>>,
}

impl FeatureSequence {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            frames: Vec::new(),
        }
    }

    /// Build a sequence from pre-extracted vectors. All vectors must share
    /// one dimension.
    pub fn from_frames(frames: Vec<Vec<f32>>) -> Self {
        let dim = frames.first().map(|f| f.len()).unwrap_or(0);
        debug_assert!(frames.iter().all(|f| f.len() == dim));
        Self { dim, frames }
    }

    /// O(1) amortized append.
    pub fn push(&mut self, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dim);
        self.frames.push(vector);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.frames.get(index).map(|f| f.as_slice())
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn slice(&self, start: usize, end: usize) -> &[Vec<f32>] {
        &self.frames[start..end]
    }

    /// Timestamp of a frame in seconds given the session's hop.
    pub fn frame_time(&self, index: usize, hop_size: usize, sample_rate: u32) -> f64 {
        index as f64 * hop_size as f64 / sample_rate as f64
    }

    pub fn mean(&self) -> Vec<f32> {
        mean_vector(&self.frames)
    }

    pub fn variance(&self) -> f32 {
        sequence_variance(&self.frames)
    }
}

/// The per-session pair of sequences. The master is shared read-only with
/// the bundle it came from; the user sequence grows monotonically.
pub struct FeatureStore {
    master: Arc<FeatureSequence>,
    user: FeatureSequence,
}

impl FeatureStore {
    pub fn new(master: Arc<FeatureSequence>) -> Self {
        let dim = master.dim();
        Self {
            master,
            user: FeatureSequence::new(dim),
        }
    }

    pub fn master(&self) -> &FeatureSequence {
        &self.master
    }

    pub fn user(&self) -> &FeatureSequence {
        &self.user
    }

    pub fn push_user(&mut self, vector: Vec<f32>) {
        self.user.push(vector);
    }

    /// Drop the user sequence; the master is untouched.
    pub fn reset_user(&mut self) {
        self.user = FeatureSequence::new(self.master.dim());
    }
}
