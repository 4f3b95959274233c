//! Feature comparison and scoring.
//!
//! - [`store`] - Master/user feature sequences for one session
//! - [`dtw`] - Banded dynamic time warping with alignment path
//! - [`subsequence`] - Best contiguous user window against the whole master
//! - [`blend`] - Component blending, confidence, reliability
//! - [`readiness`] - When the blended score is trustworthy enough to show

pub mod blend;
pub mod dtw;
pub mod readiness;
pub mod store;
pub mod subsequence;

pub use blend::{blend, BlendConfig, BlendInputs, BlendOutput, BlendWeights};
pub use dtw::{banded_dtw, banded_dtw_cost, DtwOutcome, DtwParams};
pub use readiness::ReadinessController;
pub use store::{FeatureSequence, FeatureStore};
pub use subsequence::{best_window, SubsequenceOutcome, SubsequenceParams};
