//! Process-wide session registry.
//!
//! A locked map from opaque session ids to sessions. The registry lock is
//! held only for the O(1) lookup; per-session work then runs under that
//! session's own mutex, so different sessions never contend beyond the
//! brief lookup. A janitor thread expires idle sessions by TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use serde::{Deserialize, Serialize};

use crate::config::{FrameGeometry, RegistryConfig, SessionConfig};
use crate::error::{EngineError, Result};
use crate::result::SimilarityResult;
use crate::session::{MasterBundle, Session, SessionSnapshot, SessionState};

/// Returned by `create`; everything a caller needs to address the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_id: String,
    pub native_handle: u64,
    pub status: SessionState,
    pub sample_rate: u32,
    pub geometry: FrameGeometry,
}

pub struct SessionRegistry {
    config: RegistryConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session. Fails with `Capacity` when the registry is full
    /// and `BadConfig` when the master does not fit the configuration.
    pub fn create(
        &self,
        master: MasterBundle,
        config: SessionConfig,
    ) -> Result<SessionDescriptor> {
        let session = Session::new(master, config)?;
        let descriptor = SessionDescriptor {
            session_id: session.id().to_string(),
            native_handle: session.native_handle(),
            status: session.state(),
            sample_rate: session.config().sample_rate,
            geometry: session.config().geometry,
        };

        let mut sessions = self.lock_map();
        if sessions.len() >= self.config.max_sessions {
            return Err(EngineError::Capacity(self.config.max_sessions));
        }
        sessions.insert(
            descriptor.session_id.clone(),
            Arc::new(Mutex::new(session)),
        );
        Ok(descriptor)
    }

    /// Run `f` on the session, holding only that session's lock.
    pub fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let handle = {
            let sessions = self.lock_map();
            sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(session_id.to_string()))?
        };
        let mut session = handle.lock().expect("session lock poisoned");
        f(&mut session)
    }

    pub fn start(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| s.start())
    }

    pub fn append(&self, session_id: &str, samples: &[f32]) -> Result<SimilarityResult> {
        self.with_session(session_id, |s| s.append_audio(samples))
    }

    pub fn get(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.with_session(session_id, |s| Ok(s.snapshot()))
    }

    pub fn result(&self, session_id: &str) -> Result<SimilarityResult> {
        self.with_session(session_id, |s| Ok(s.result()))
    }

    pub fn finalize(&self, session_id: &str) -> Result<SimilarityResult> {
        self.with_session(session_id, |s| s.finalize())
    }

    /// Remove and drop the session, releasing its buffers.
    pub fn destroy(&self, session_id: &str) -> Result<()> {
        let removed = self.lock_map().remove(session_id);
        match removed {
            Some(_) => {
                debug!("registry destroyed session {}", session_id);
                Ok(())
            }
            None => Err(EngineError::NotFound(session_id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy sessions idle past the TTL; returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let ttl = self.config.session_ttl_seconds;
        let candidates: Vec<(String, Arc<Mutex<Session>>)> = {
            let sessions = self.lock_map();
            sessions
                .iter()
                .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
                .collect()
        };
        // Idle checks take each session's lock outside the registry lock.
        let mut to_remove = Vec::new();
        for (id, handle) in candidates {
            let idle = handle.lock().expect("session lock poisoned").idle_seconds();
            if idle >= ttl {
                to_remove.push(id);
            }
        }
        let mut removed = 0;
        if !to_remove.is_empty() {
            let mut sessions = self.lock_map();
            for id in &to_remove {
                if sessions.remove(id).is_some() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!("registry evicted {} idle session(s)", removed);
        }
        removed
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<Session>>>> {
        self.sessions.lock().expect("registry lock poisoned")
    }
}

/// Spawn the TTL janitor. The thread holds only a weak reference and
/// exits on its own once the registry is dropped.
pub fn spawn_janitor(registry: &Arc<SessionRegistry>, interval: Duration) -> thread::JoinHandle<()> {
    let weak: Weak<SessionRegistry> = Arc::downgrade(registry);
    thread::Builder::new()
        .name("callmatch-janitor".into())
        .spawn(move || loop {
            thread::sleep(interval);
            match weak.upgrade() {
                Some(registry) => {
                    registry.evict_idle();
                }
                None => break,
            }
        })
        .expect("failed to spawn janitor thread")
}
