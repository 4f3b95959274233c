//! Session: one live comparison of streamed user audio against a master.
//!
//! A session exclusively owns its framer, analyzers, feature store, and
//! result state; nothing is shared between sessions except the immutable
//! geometry tables and the master bundle (read-only). All per-frame data
//! flow between analyzers goes through the feature store and the blend
//! pass; analyzers never reference each other.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::compare::{
    banded_dtw, best_window, blend, BlendConfig, BlendInputs, DtwParams, FeatureSequence,
    FeatureStore, ReadinessController, SubsequenceParams,
};
use crate::config::{FrameGeometry, SessionConfig};
use crate::dsp::{
    tables_for, CadenceAnalyzer, FrameObservation, GeometryKey, HarmonicAnalyzer, MfccProcessor,
    PcmFramer, PitchTracker, SpectrumEngine, VoiceActivityDetector,
};
use crate::error::{EngineError, Result};
use crate::result::{Readiness, SimilarityResult};
use crate::telemetry::{AuxSummary, SessionTelemetry};

// =============================================================================
// Master bundle
// =============================================================================

/// Aggregate statistics captured when the master is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterStats {
    pub mean_vector: Vec<f32>,
    pub variance: f32,
    pub median_f0_hz: Option<f32>,
    pub voiced_ratio: f32,
}

/// The reference recording's features plus metadata. Created once at
/// session start, immutable thereafter, shareable by reference.
#[derive(Debug, Clone)]
pub struct MasterBundle {
    features: Arc<FeatureSequence>,
    duration_seconds: f64,
    sample_rate: u32,
    geometry: FrameGeometry,
    stats: MasterStats,
}

impl MasterBundle {
    /// Extract master features from raw PCM with the same pipeline the
    /// session applies to user audio, so a master streamed back as user
    /// reproduces its own feature sequence exactly.
    pub fn from_pcm(samples: &[f32], config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        if samples.is_empty() {
            return Err(EngineError::Precondition(
                "master PCM is empty".into(),
            ));
        }
        let geometry = config.geometry;
        let tables = tables_for(GeometryKey {
            frame_size: geometry.frame_size,
            fft_size: geometry.fft_size,
            n_mels: config.n_mels,
            sample_rate: config.sample_rate,
        });

        let mut framer = PcmFramer::new(
            geometry.frame_size,
            geometry.hop_size,
            samples.len() + geometry.frame_size,
        );
        let mut spectrum = SpectrumEngine::new(Arc::clone(&tables));
        let mut mfcc = MfccProcessor::new(
            Arc::clone(&tables),
            config.n_cepstra,
            config.replace_c0_with_log_energy,
            config.enable_deltas,
        );
        let mut pitch = PitchTracker::new(
            config.pitch_min_hz,
            config.pitch_max_hz,
            config.pitch_confidence_threshold,
            config.sample_rate,
            geometry.frame_size,
        );

        framer.append(samples)?;
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        let mut frame_buf = vec![0.0f32; geometry.frame_size];
        loop {
            {
                let Some(frame) = framer.next_frame() else {
                    break;
                };
                frame_buf.copy_from_slice(frame);
            }
            let power = spectrum.analyze(&frame_buf);
            let obs = FrameObservation {
                samples: &frame_buf,
                power,
                bin_hz: tables.bin_hz(),
                sample_rate: config.sample_rate,
            };
            mfcc.process_frame(&obs, &mut vectors);
            pitch.process_frame(&obs);
        }
        if let Some(frame) = framer.flush_partial() {
            frame_buf.copy_from_slice(frame);
            let power = spectrum.analyze(&frame_buf);
            let obs = FrameObservation {
                samples: &frame_buf,
                power,
                bin_hz: tables.bin_hz(),
                sample_rate: config.sample_rate,
            };
            mfcc.process_frame(&obs, &mut vectors);
            pitch.process_frame(&obs);
        }
        mfcc.finalize(&mut vectors);

        let features = FeatureSequence::from_frames(vectors);
        if features.is_empty() {
            return Err(EngineError::Precondition(
                "master PCM shorter than one frame".into(),
            ));
        }
        let stats = MasterStats {
            mean_vector: features.mean(),
            variance: features.variance(),
            median_f0_hz: pitch.median_f0(),
            voiced_ratio: pitch.voiced_ratio(),
        };
        Ok(Self {
            features: Arc::new(features),
            duration_seconds: samples.len() as f64 / config.sample_rate as f64,
            sample_rate: config.sample_rate,
            geometry,
            stats,
        })
    }

    /// Wrap precomputed features (the low-latency provisioning mode).
    /// Geometry compatibility with the session is checked at create time.
    pub fn from_features(
        frames: Vec<Vec<f32>>,
        sample_rate: u32,
        geometry: FrameGeometry,
        duration_seconds: f64,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(EngineError::Precondition(
                "master feature sequence is empty".into(),
            ));
        }
        let features = FeatureSequence::from_frames(frames);
        let stats = MasterStats {
            mean_vector: features.mean(),
            variance: features.variance(),
            median_f0_hz: None,
            voiced_ratio: 0.0,
        };
        Ok(Self {
            features: Arc::new(features),
            duration_seconds,
            sample_rate,
            geometry,
            stats,
        })
    }

    pub fn features(&self) -> &Arc<FeatureSequence> {
        &self.features
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn stats(&self) -> &MasterStats {
        &self.stats
    }
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Recording,
    Finalized,
}

/// Snapshot returned by `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub native_handle: u64,
    pub status: SessionState,
    pub sample_rate: u32,
    pub geometry: FrameGeometry,
    pub readiness: Readiness,
    pub master_duration_seconds: f64,
    pub metrics: SessionTelemetry,
}

pub struct Session {
    id: String,
    native_handle: u64,
    config: SessionConfig,
    state: SessionState,
    master: MasterBundle,

    framer: PcmFramer,
    spectrum: SpectrumEngine,
    mfcc: MfccProcessor,
    vad: VoiceActivityDetector,
    pitch: Option<PitchTracker>,
    harmonic: Option<HarmonicAnalyzer>,
    cadence: Option<CadenceAnalyzer>,

    store: FeatureStore,
    readiness: ReadinessController,
    last_result: SimilarityResult,
    confidence_ratchet: f32,
    telemetry: SessionTelemetry,
    last_activity: Instant,

    frame_buf: Vec<f32>,
    pending_vectors: Vec<Vec<f32>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("native_handle", &self.native_handle)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(master: MasterBundle, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        if master.sample_rate() != config.sample_rate {
            return Err(EngineError::BadConfig(format!(
                "master sample rate {} does not match session sample rate {}",
                master.sample_rate(),
                config.sample_rate
            )));
        }
        if master.geometry() != config.geometry {
            return Err(EngineError::BadConfig(
                "master frame geometry does not match session geometry".into(),
            ));
        }
        if master.features().dim() != config.feature_dim() {
            return Err(EngineError::BadConfig(format!(
                "master feature dimension {} does not match session dimension {}",
                master.features().dim(),
                config.feature_dim()
            )));
        }

        let geometry = config.geometry;
        let tables = tables_for(GeometryKey {
            frame_size: geometry.frame_size,
            fft_size: geometry.fft_size,
            n_mels: config.n_mels,
            sample_rate: config.sample_rate,
        });

        let uuid = uuid::Uuid::new_v4();
        let id = uuid.simple().to_string();
        let native_handle = u64::from_be_bytes(uuid.as_bytes()[..8].try_into().expect("uuid prefix"));

        let framer = PcmFramer::new(geometry.frame_size, geometry.hop_size, config.pcm_capacity());
        let spectrum = SpectrumEngine::new(Arc::clone(&tables));
        let mfcc = MfccProcessor::new(
            Arc::clone(&tables),
            config.n_cepstra,
            config.replace_c0_with_log_energy,
            config.enable_deltas,
        );
        let vad = VoiceActivityDetector::new(
            config.vad_energy_db,
            config.vad_hangover_ms,
            config.vad_min_voiced_ms,
            config.sample_rate,
            geometry.hop_size,
        );
        let (pitch, harmonic, cadence) = if config.enable_enhanced {
            (
                Some(PitchTracker::new(
                    config.pitch_min_hz,
                    config.pitch_max_hz,
                    config.pitch_confidence_threshold,
                    config.sample_rate,
                    geometry.frame_size,
                )),
                Some(HarmonicAnalyzer::new()),
                Some(CadenceAnalyzer::new(
                    config.sample_rate,
                    geometry.hop_size,
                    geometry.spectrum_bins(),
                )),
            )
        } else {
            (None, None, None)
        };

        let store = FeatureStore::new(Arc::clone(master.features()));
        let readiness = ReadinessController::new(
            config.k_min_frames,
            config.k_reliable_frames,
            config.k_stall_timeout_ms,
        );
        let last_result = SimilarityResult::not_ready(config.k_reliable_frames);
        let frame_size = geometry.frame_size;

        debug!(
            "session {} created: {} Hz, frame {}/{}, master {:.2}s ({} frames)",
            id,
            config.sample_rate,
            geometry.frame_size,
            geometry.hop_size,
            master.duration_seconds(),
            master.features().len()
        );

        Ok(Self {
            id,
            native_handle,
            config,
            state: SessionState::Created,
            master,
            framer,
            spectrum,
            mfcc,
            vad,
            pitch,
            harmonic,
            cadence,
            store,
            readiness,
            last_result,
            confidence_ratchet: 0.0,
            telemetry: SessionTelemetry::default(),
            last_activity: Instant::now(),
            frame_buf: vec![0.0; frame_size],
            pending_vectors: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn native_handle(&self) -> u64 {
        self.native_handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn master(&self) -> &MasterBundle {
        &self.master
    }

    /// User feature vectors extracted so far.
    pub fn user_features(&self) -> &[Vec<f32>] {
        self.store.user().frames()
    }

    /// Seconds since the last accepted call.
    pub fn idle_seconds(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }

    /// Transition created -> recording. Idempotent while recording.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Created => {
                self.state = SessionState::Recording;
                self.last_activity = Instant::now();
                debug!("session {} recording", self.id);
                Ok(())
            }
            SessionState::Recording => Ok(()),
            SessionState::Finalized => Err(EngineError::Precondition(
                "session already finalized".into(),
            )),
        }
    }

    /// Append mono PCM, run the per-frame analyzers on every completed
    /// frame, recompute the blend, and return the fresh result. Atomic per
    /// call: on backpressure no sample is consumed and the previous result
    /// stands.
    pub fn append_audio(&mut self, samples: &[f32]) -> Result<SimilarityResult> {
        if self.state != SessionState::Recording {
            return Err(EngineError::Precondition(match self.state {
                SessionState::Created => "append before start".into(),
                _ => "append after finalize".into(),
            }));
        }
        let started = Instant::now();
        self.framer.append(samples)?;

        let mut new_frames = 0usize;
        while self.take_next_frame() {
            self.analyze_current_frame();
            new_frames += 1;
        }

        self.recompute(new_frames > 0);
        self.note_work(started, samples.len(), new_frames);
        Ok(self.last_result.clone())
    }

    /// Flush the trailing partial frame (zero-padded), run the last blend
    /// pass, and return the final result.
    pub fn finalize(&mut self) -> Result<SimilarityResult> {
        if self.state != SessionState::Recording {
            return Err(EngineError::Precondition(match self.state {
                SessionState::Created => "finalize before start".into(),
                _ => "session already finalized".into(),
            }));
        }
        let started = Instant::now();
        let mut new_frames = 0usize;
        while self.take_next_frame() {
            self.analyze_current_frame();
            new_frames += 1;
        }
        if self.take_partial_frame() {
            self.analyze_current_frame();
            new_frames += 1;
        }
        // Emit delta-delayed vectors and close the last voiced segment.
        self.pending_vectors.clear();
        self.mfcc.finalize(&mut self.pending_vectors);
        while let Some(vector) = pop_front(&mut self.pending_vectors) {
            self.store.push_user(vector);
        }
        self.vad.finalize();

        self.state = SessionState::Finalized;
        self.recompute(new_frames > 0);
        self.note_work(started, 0, new_frames);
        debug!(
            "session {} finalized: {} user frames, overall {:?}",
            self.id,
            self.store.user().len(),
            self.last_result.overall
        );
        Ok(self.last_result.clone())
    }

    /// Latest snapshot with the stall overlay applied; O(1).
    pub fn result(&self) -> SimilarityResult {
        let mut result = self.last_result.clone();
        if result.readiness != Readiness::NotReady && self.state == SessionState::Recording {
            result.readiness = self.readiness.current();
        }
        result
    }

    /// Full status snapshot for the `get` operation.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut metrics = self.telemetry.clone();
        metrics.aux = self.aux_summary();
        SessionSnapshot {
            session_id: self.id.clone(),
            native_handle: self.native_handle,
            status: self.state,
            sample_rate: self.config.sample_rate,
            geometry: self.config.geometry,
            readiness: self.result().readiness,
            master_duration_seconds: self.master.duration_seconds(),
            metrics,
        }
    }

    // -------------------------------------------------------------------------
    // Frame plumbing
    // -------------------------------------------------------------------------

    fn take_next_frame(&mut self) -> bool {
        match self.framer.next_frame() {
            Some(frame) => {
                self.frame_buf.copy_from_slice(frame);
                true
            }
            None => false,
        }
    }

    fn take_partial_frame(&mut self) -> bool {
        match self.framer.flush_partial() {
            Some(frame) => {
                self.frame_buf.copy_from_slice(frame);
                true
            }
            None => false,
        }
    }

    fn analyze_current_frame(&mut self) {
        let bin_hz = self.spectrum.tables().bin_hz();
        let power = self.spectrum.analyze(&self.frame_buf);
        let obs = FrameObservation {
            samples: &self.frame_buf,
            power,
            bin_hz,
            sample_rate: self.config.sample_rate,
        };
        self.mfcc.process_frame(&obs, &mut self.pending_vectors);
        self.vad.process_frame(&obs);
        if let Some(pitch) = self.pitch.as_mut() {
            pitch.process_frame(&obs);
        }
        if let Some(harmonic) = self.harmonic.as_mut() {
            harmonic.process_frame(&obs);
        }
        if let Some(cadence) = self.cadence.as_mut() {
            cadence.process_frame(&obs);
        }
        while let Some(vector) = pop_front(&mut self.pending_vectors) {
            self.store.push_user(vector);
        }
    }

    // -------------------------------------------------------------------------
    // Scoring
    // -------------------------------------------------------------------------

    fn recompute(&mut self, new_frames: bool) {
        let user = self.store.user().frames();
        let master = self.store.master().frames();
        let user_len = user.len();
        let user_variance = crate::dsp::utils::sequence_variance(user);
        let variance_ok = user_variance >= self.config.silence_variance_threshold;

        let dtw_params = DtwParams {
            band_ratio: self.config.dtw_band_ratio,
            beta: self.config.dtw_beta,
            metric: self.config.dtw_metric,
        };
        let run_comparators = user_len >= self.config.k_min_frames;
        let dtw_outcome = if run_comparators {
            banded_dtw(user, master, &dtw_params, true)
        } else {
            None
        };
        let subsequence_outcome = if run_comparators {
            best_window(
                user,
                master,
                &SubsequenceParams {
                    gamma: self.config.subsequence_gamma,
                    coverage_uplift_max: self.config.coverage_uplift_max,
                    dtw: dtw_params,
                },
                self.vad.trimmed_range(),
            )
        } else {
            None
        };

        let blend_config = BlendConfig {
            weights: self.config.blend_weights,
            cosine_reject_threshold: self.config.cosine_reject_threshold,
            k_min_frames: self.config.k_min_frames,
            k_reliable_frames: self.config.k_reliable_frames,
            silence_variance_threshold: self.config.silence_variance_threshold,
            coverage_uplift_max: self.config.coverage_uplift_max,
        };
        let blended = blend(
            &BlendInputs {
                user,
                master,
                user_variance,
                dtw: dtw_outcome.as_ref(),
                subsequence: subsequence_outcome.as_ref(),
            },
            &blend_config,
        );

        // Arithmetic faults never escape: any component that slipped past
        // the internal floors is dropped here and the session continues.
        let mut components = blended.components;
        if sanitize(&mut components) {
            warn!(
                "session {}: non-finite component trapped, reporting absent",
                self.id
            );
        }
        let mut blended_overall = blended.overall.filter(|o| o.is_finite());
        if components.present_count() == 0 {
            blended_overall = None;
        }
        let component_reliable = !components.subsequence_only();

        // Confidence never regresses within a session; silence keeps the
        // raw value near zero so the ratchet stays down too.
        self.confidence_ratchet = self.confidence_ratchet.max(blended.confidence);
        let confidence = self.confidence_ratchet;

        self.readiness
            .observe(user_len, variance_ok, confidence, new_frames);
        let readiness = if self.state == SessionState::Finalized {
            self.readiness.phase_readiness()
        } else {
            self.readiness.current()
        };

        let overall = if readiness == Readiness::NotReady {
            None
        } else {
            blended_overall
        };
        let is_reliable = self.readiness.is_ready() && component_reliable;

        self.last_result = SimilarityResult {
            overall,
            components,
            confidence,
            is_reliable,
            readiness,
            frames_observed: user_len,
            frames_required: self.config.k_reliable_frames,
        };
        self.telemetry.components = components;
        self.telemetry.effective_weights = blended.effective_weights;
    }

    fn aux_summary(&self) -> AuxSummary {
        AuxSummary {
            median_f0_hz: self.pitch.as_ref().and_then(|p| p.median_f0()),
            voiced_ratio: self
                .pitch
                .as_ref()
                .map(|p| p.voiced_ratio())
                .unwrap_or_else(|| self.vad.voiced_ratio()),
            mean_centroid_hz: self
                .harmonic
                .as_ref()
                .map(|h| h.mean_centroid_hz())
                .unwrap_or(0.0),
            tempo_bpm: self.cadence.as_ref().and_then(|c| c.tempo_bpm()),
            voiced_segments: self.vad.segments().len(),
        }
    }

    fn note_work(&mut self, started: Instant, samples: usize, frames: usize) {
        let micros = started.elapsed().as_micros() as u64;
        self.telemetry.last_extract_micros = micros;
        self.telemetry.total_extract_micros += micros;
        self.telemetry.appends += 1;
        self.telemetry.frames_processed += frames as u64;
        self.telemetry.pcm_seconds += samples as f64 / self.config.sample_rate as f64;
        self.last_activity = Instant::now();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session {} destroyed", self.id);
    }
}

/// Drop any present component that is non-finite or out of [0, 1].
/// Returns true when something had to be dropped.
fn sanitize(components: &mut crate::result::ComponentScores) -> bool {
    let mut changed = false;
    for slot in [
        &mut components.dtw,
        &mut components.offset_cosine,
        &mut components.mean_cosine,
        &mut components.subsequence,
    ] {
        if let Some(v) = slot {
            if !v.is_finite() || !(0.0..=1.0).contains(v) {
                *slot = None;
                changed = true;
            }
        }
    }
    changed
}

fn pop_front(vectors: &mut Vec<Vec<f32>>) -> Option<Vec<f32>> {
    if vectors.is_empty() {
        None
    } else {
        Some(vectors.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;

    fn test_config() -> SessionConfig {
        SessionConfig {
            sample_rate: SR,
            ..SessionConfig::default()
        }
    }

    /// A warbling harmonic call: f0 sweeps around a center with vibrato.
    fn call_signal(seconds: f32, f0: f32, vibrato_hz: f32) -> Vec<f32> {
        let len = (seconds * SR as f32) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let f = f0 * (1.0 + 0.08 * (2.0 * std::f32::consts::PI * vibrato_hz * t).sin());
                let phase = 2.0 * std::f32::consts::PI * f * t;
                0.5 * phase.sin() + 0.25 * (2.0 * phase).sin() + 0.12 * (3.0 * phase).sin()
            })
            .collect()
    }

    fn session_for(master_pcm: &[f32]) -> Session {
        let config = test_config();
        let master = MasterBundle::from_pcm(master_pcm, &config).unwrap();
        Session::new(master, config).unwrap()
    }

    #[test]
    fn create_rejects_sample_rate_mismatch() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let master = MasterBundle::from_pcm(&pcm, &test_config()).unwrap();
        let mismatched = SessionConfig {
            sample_rate: 44_100,
            ..SessionConfig::default()
        };
        let err = Session::new(master, mismatched).unwrap_err();
        assert_eq!(err.kind(), "BAD_CONFIG");
    }

    #[test]
    fn create_rejects_geometry_mismatch() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let master = MasterBundle::from_pcm(&pcm, &test_config()).unwrap();
        let mut config = test_config();
        config.geometry.hop_size = 512;
        let err = Session::new(master, config).unwrap_err();
        assert_eq!(err.kind(), "BAD_CONFIG");
    }

    #[test]
    fn append_before_start_is_precondition() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let mut session = session_for(&pcm);
        let err = session.append_audio(&pcm[..1024]).unwrap_err();
        assert_eq!(err.kind(), "PRECONDITION");
    }

    #[test]
    fn start_is_idempotent() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Recording);
    }

    #[test]
    fn self_similarity_scores_high() {
        let pcm = call_signal(2.0, 500.0, 6.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        for chunk in pcm.chunks(4800) {
            session.append_audio(chunk).unwrap();
        }
        let result = session.finalize().unwrap();
        let overall = result.overall.expect("score expected");
        assert!(overall >= 0.90, "overall {}", overall);
        assert_eq!(result.readiness, Readiness::Ready);
        assert!(result.is_reliable);
        assert!(result.components.dtw.unwrap() >= 0.80);
        assert!(result.components.subsequence.unwrap() >= 0.80);
    }

    #[test]
    fn append_after_finalize_is_precondition() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        session.append_audio(&pcm).unwrap();
        session.finalize().unwrap();
        let err = session.append_audio(&pcm[..256]).unwrap_err();
        assert_eq!(err.kind(), "PRECONDITION");
        assert!(session.finalize().is_err());
    }

    #[test]
    fn user_frame_count_is_monotonic() {
        let pcm = call_signal(1.5, 420.0, 4.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        let mut last = 0usize;
        for chunk in pcm.chunks(3000) {
            let result = session.append_audio(chunk).unwrap();
            assert!(result.frames_observed >= last);
            last = result.frames_observed;
        }
    }

    #[test]
    fn confidence_is_monotonic_for_nonsilent_stream() {
        let pcm = call_signal(2.0, 500.0, 6.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        let mut last = 0.0f32;
        for chunk in pcm.chunks(4000) {
            let result = session.append_audio(chunk).unwrap();
            assert!(
                result.confidence >= last - 1e-6,
                "confidence regressed: {} -> {}",
                last,
                result.confidence
            );
            last = result.confidence;
        }
    }

    #[test]
    fn silence_stays_not_ready_with_low_confidence() {
        let pcm = call_signal(1.5, 420.0, 4.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        let silence = vec![0.0f32; (1.5 * SR as f32) as usize];
        for chunk in silence.chunks(4000) {
            session.append_audio(chunk).unwrap();
        }
        let result = session.finalize().unwrap();
        assert_eq!(result.readiness, Readiness::NotReady);
        assert!(result.overall.is_none());
        assert!(result.confidence < 0.2, "confidence {}", result.confidence);
        assert!(!result.is_reliable);
    }

    #[test]
    fn master_features_unchanged_by_appends() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let config = test_config();
        let master = MasterBundle::from_pcm(&pcm, &config).unwrap();
        let before: Vec<Vec<f32>> = master.features().frames().to_vec();
        let mut session = Session::new(master.clone(), config).unwrap();
        session.start().unwrap();
        session.append_audio(&pcm).unwrap();
        session.finalize().unwrap();
        assert_eq!(master.features().frames(), before.as_slice());
    }

    #[test]
    fn backpressure_leaves_previous_result_intact() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let mut config = test_config();
        config.max_pcm_seconds = 0.1;
        let master = MasterBundle::from_pcm(&pcm, &config).unwrap();
        let mut session = Session::new(master, config).unwrap();
        session.start().unwrap();
        let oversized = vec![0.1f32; SR as usize];
        let err = session.append_audio(&oversized).unwrap_err();
        assert_eq!(err.kind(), "BACKPRESSURE");
        assert_eq!(session.result().frames_observed, 0);
    }

    #[test]
    fn snapshot_carries_telemetry() {
        let pcm = call_signal(1.0, 400.0, 5.0);
        let mut session = session_for(&pcm);
        session.start().unwrap();
        session.append_audio(&pcm).unwrap();
        let snap = session.snapshot();
        assert_eq!(snap.sample_rate, SR);
        assert!(snap.metrics.frames_processed > 0);
        assert!(snap.metrics.pcm_seconds > 0.9);
        assert_eq!(snap.metrics.engine_build, env!("CARGO_PKG_VERSION"));
        assert_eq!(snap.session_id.len(), 32);
    }

    /// A rising call: f0 sweeps linearly so different time regions have
    /// genuinely different spectra.
    fn sweep_signal(seconds: f32, start_hz: f32, end_hz: f32) -> Vec<f32> {
        let len = (seconds * SR as f32) as usize;
        let mut phase = 0.0f32;
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let f = start_hz + (end_hz - start_hz) * t / seconds;
                phase += 2.0 * std::f32::consts::PI * f / SR as f32;
                0.5 * phase.sin() + 0.25 * (2.0 * phase).sin()
            })
            .collect()
    }

    #[test]
    fn partial_coverage_favors_subsequence() {
        let pcm = sweep_signal(5.0, 250.0, 900.0);
        let config = test_config();
        let master = MasterBundle::from_pcm(&pcm, &config).unwrap();
        let mut session = Session::new(master, config).unwrap();
        session.start().unwrap();
        // Only the central 2 s of the same recording.
        let start = (1.5 * SR as f32) as usize;
        let end = (3.5 * SR as f32) as usize;
        session.append_audio(&pcm[start..end]).unwrap();
        let result = session.finalize().unwrap();
        let sub = result.components.subsequence.expect("subsequence expected");
        let dtw = result.components.dtw.expect("dtw expected");
        assert!(sub > dtw, "subsequence {} <= dtw {}", sub, dtw);
        let overall = result.overall.unwrap();
        assert!(overall <= sub * 1.15 + 1e-6);
    }
}
