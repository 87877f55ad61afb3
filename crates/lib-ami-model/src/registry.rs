//! Session arena keyed by handle id.
//!
//! Handles given to the host are ids, never pointers. Ids start at 1 and
//! are never reused, so a closed handle can be told apart from one that
//! was never issued. The map lock is only held for lookup, insert and
//! remove; each session has its own mutex, so lanes run concurrently.

use crate::error::{AmiError, AmiResult};
use crate::session::{InitRequest, Session};
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Strings handed to the host, kept alive until the session closes.
#[derive(Default)]
pub struct OutputStrings {
    pub init_params: Option<CString>,
    pub init_message: Option<CString>,
    pub wave_params: Option<CString>,
}

/// A session plus the strings the host may still be reading.
pub struct SessionSlot {
    pub session: Session,
    pub strings: OutputStrings,
}

/// Arena of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Mutex<SessionSlot>>>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Process-wide registry used by the exported functions.
    pub fn global() -> &'static SessionRegistry {
        static REGISTRY: OnceLock<SessionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(SessionRegistry::new)
    }

    /// Create and initialize a session; it is registered only on success.
    pub fn initialize(&self, request: InitRequest<'_>) -> AmiResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut session = Session::new(id);
        session.initialize(request)?;

        let slot = SessionSlot {
            session,
            strings: OutputStrings::default(),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(slot)));

        debug!(handle = id, live = self.live_sessions(), "Session registered");
        Ok(id)
    }

    /// Run `f` with exclusive access to one session.
    pub fn with_slot<R>(&self, id: u64, f: impl FnOnce(&mut SessionSlot) -> R) -> AmiResult<R> {
        let slot = self.lookup(id)?;
        let mut guard = lock(&slot);
        Ok(f(&mut guard))
    }

    /// Equalize a waveform block on one session.
    pub fn process_waveform(&self, id: u64, wave: &mut [f64], clock_times: Option<&mut [f64]>) -> AmiResult<()> {
        self.with_slot(id, |slot| slot.session.process_waveform(wave, clock_times))?
    }

    /// Close a session and drop it with its strings.
    pub fn close(&self, id: u64) -> AmiResult<()> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        let slot = match removed {
            Some(slot) => slot,
            None => return Err(self.missing(id)),
        };
        let result = lock(&slot).session.close();
        debug!(handle = id, live = self.live_sessions(), "Session released");
        result
    }

    /// Number of sessions not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lookup(&self, id: u64) -> AmiResult<Arc<Mutex<SessionSlot>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| self.missing(id))
    }

    fn missing(&self, id: u64) -> AmiError {
        if id == 0 {
            AmiError::handle("null handle")
        } else if id < self.next_id.load(Ordering::Relaxed) {
            AmiError::handle(format!("handle {id} is closed"))
        } else {
            AmiError::handle(format!("handle {id} was never issued"))
        }
    }
}

fn lock(slot: &Mutex<SessionSlot>) -> MutexGuard<'_, SessionSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
