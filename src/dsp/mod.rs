//! DSP stages of the call-matching pipeline.
//!
//! Audio flows through these modules in order:
//!
//! ## Framing
//! - [`framer`] - Bounded PCM FIFO sliced into overlapping analysis frames
//!
//! ## Spectrum
//! - [`spectrum`] - One windowed FFT per frame, shared by all analyzers
//! - [`tables`] - Immutable window/filterbank/FFT tables keyed by geometry
//!
//! ## Per-frame analysis
//! - [`mfcc`] - Cepstral feature extraction (the similarity features)
//! - [`vad`] - Voiced/unvoiced gating and silence trimming
//! - [`pitch`] - Fundamental-frequency estimate with confidence
//! - [`harmonic`] - Spectral peaks, HNR, centroid, rolloff
//! - [`cadence`] - Onset strength and tempo
//!
//! ## Utilities
//! - [`utils`] - Shared DSP math (RMS, cosine, variance, z-score)
//!
//! Analyzers never reference each other; the session feeds each one the
//! same [`spectrum::FrameObservation`] and routes every derived feature
//! through the feature store.

pub mod cadence;
pub mod framer;
pub mod harmonic;
pub mod mfcc;
pub mod pitch;
pub mod spectrum;
pub mod tables;
pub mod utils;
pub mod vad;

pub use cadence::CadenceAnalyzer;
pub use framer::PcmFramer;
pub use harmonic::{HarmonicAnalyzer, HarmonicProfile};
pub use mfcc::MfccProcessor;
pub use pitch::{PitchEstimate, PitchTracker};
pub use spectrum::{FrameObservation, SpectrumEngine};
pub use tables::{tables_for, DspTables, GeometryKey};
pub use vad::{VoiceActivityDetector, VoicedSegment};
