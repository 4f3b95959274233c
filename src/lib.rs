//! Real-time acoustic call-matching engine.
//!
//! Given a reference ("master") recording and a stream of user audio, the
//! engine produces an evolving similarity score with confidence and
//! readiness signals so a client can give live feedback while a user
//! attempts to reproduce a wildlife call.
//!
//! # Pipeline
//!
//! PCM in -> [`dsp::framer`] -> ([`dsp::mfcc`], [`dsp::vad`],
//! [`dsp::pitch`], [`dsp::harmonic`], [`dsp::cadence`]) -> feature store
//! -> ([`compare::dtw`] + [`compare::subsequence`] + cosine variants)
//! against the master -> [`compare::blend`] -> [`compare::readiness`] ->
//! result via the session API.
//!
//! # Typical use
//!
//! ```no_run
//! use callmatch::{MasterBundle, RegistryConfig, SessionConfig, SessionRegistry};
//!
//! let config = SessionConfig::default();
//! let master_pcm: Vec<f32> = load_master_somehow();
//! let master = MasterBundle::from_pcm(&master_pcm, &config)?;
//!
//! let registry = SessionRegistry::new(RegistryConfig::default());
//! let desc = registry.create(master, config)?;
//! registry.start(&desc.session_id)?;
//! let result = registry.append(&desc.session_id, &user_chunk())?;
//! println!("overall: {:?}", result.overall);
//! let final_result = registry.finalize(&desc.session_id)?;
//! registry.destroy(&desc.session_id)?;
//! # fn load_master_somehow() -> Vec<f32> { Vec::new() }
//! # fn user_chunk() -> Vec<f32> { Vec::new() }
//! # Ok::<(), callmatch::EngineError>(())
//! ```
//!
//! Sessions are isolated: each owns its buffers and analyzers outright and
//! is guarded by its own mutex in the registry. The only process-wide
//! state is the registry itself and the immutable geometry-keyed DSP
//! tables ([`dsp::tables`]).

pub mod compare;
pub mod config;
pub mod dsp;
pub mod error;
pub mod registry;
pub mod result;
pub mod session;
pub mod telemetry;

pub use compare::{BlendWeights, FeatureSequence};
pub use config::{DtwMetric, FrameGeometry, RegistryConfig, SessionConfig};
pub use error::{EngineError, Result};
pub use registry::{spawn_janitor, SessionDescriptor, SessionRegistry};
pub use result::{ComponentScores, Readiness, SimilarityResult};
pub use session::{MasterBundle, MasterStats, Session, SessionSnapshot, SessionState};
pub use telemetry::{engine_build, SessionTelemetry};
