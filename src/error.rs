//! Error types for the call-matching engine.
//!
//! Every public operation returns a tagged [`EngineError`] instead of
//! panicking; arithmetic faults inside the DSP are trapped by floors and
//! clamps and surface at worst as a blanked component plus a log line.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid session configuration: bad sample rate, mismatched frame
    /// geometry, multi-channel input, non-power-of-two FFT size.
    #[error("bad config: {0}")]
    BadConfig(String),

    /// Unknown session id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Operation attempted out of lifecycle order (append before start,
    /// append after finalize, master missing).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Session registry is at its configured capacity.
    #[error("session capacity reached ({0} sessions)")]
    Capacity(usize),

    /// The bounded PCM buffer cannot accept the append; the caller may
    /// retry with smaller chunks once the framer has drained.
    #[error("pcm buffer saturated: {0}")]
    Backpressure(String),

    /// Arithmetic fault that escaped the internal guards. The session
    /// survives; the offending component is reported absent.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable wire identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BadConfig(_) => "BAD_CONFIG",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Precondition(_) => "PRECONDITION",
            EngineError::Capacity(_) => "CAPACITY",
            EngineError::Backpressure(_) => "BACKPRESSURE",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::BadConfig("x".into()).kind(), "BAD_CONFIG");
        assert_eq!(EngineError::NotFound("x".into()).kind(), "NOT_FOUND");
        assert_eq!(EngineError::Capacity(4).kind(), "CAPACITY");
        assert_eq!(
            EngineError::Backpressure("full".into()).kind(),
            "BACKPRESSURE"
        );
    }
}
