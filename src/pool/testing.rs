//! In-memory backend with scriptable failures.
//!
//! Used by the crate's tests and handy for exercising code that depends on
//! a [`Pool`](super::Pool) without a database.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Backend, BackendError};

/// Session handed out by [`ScriptedBackend`].
#[derive(Debug)]
pub struct ScriptedConnection {
    id: u64,
}

impl ScriptedConnection {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct Script {
    next_id: AtomicU64,
    connects: AtomicUsize,
    probes: AtomicUsize,
    fail_connects: AtomicBool,
    fail_next: AtomicUsize,
    reject: AtomicBool,
    connect_delay_ms: AtomicU64,
    stale: Mutex<HashSet<u64>>,
    closed: Mutex<Vec<u64>>,
}

/// Backend whose behavior is switched at runtime. Clones share the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every connect with a transient error until switched off.
    pub fn fail_connects(&self, fail: bool) {
        self.script.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` connects with a transient error.
    pub fn fail_next_connects(&self, count: usize) {
        self.script.fail_next.store(count, Ordering::SeqCst);
    }

    /// Refuse every connect as a configuration error.
    pub fn reject_connects(&self, reject: bool) {
        self.script.reject.store(reject, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.script
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make probes on this session fail.
    pub fn mark_stale(&self, id: u64) {
        self.script.stale.lock().insert(id);
    }

    /// Connect attempts made, successful or not.
    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.script.probes.load(Ordering::SeqCst)
    }

    /// Ids of closed sessions, in close order.
    pub fn closed(&self) -> Vec<u64> {
        self.script.closed.lock().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> Result<ScriptedConnection, BackendError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);

        let delay = self.script.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.script.reject.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected(
                "Access denied for user 'root'@'localhost'".to_string(),
            ));
        }
        if self.script.fail_connects.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("Connection refused".to_string()));
        }
        let scripted_failure = self
            .script
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(BackendError::Unavailable("Connection reset".to_string()));
        }

        let id = self.script.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ScriptedConnection { id })
    }

    async fn probe(&self, conn: &mut ScriptedConnection) -> Result<(), BackendError> {
        self.script.probes.fetch_add(1, Ordering::SeqCst);
        if self.script.stale.lock().contains(&conn.id) {
            return Err(BackendError::Probe("MySQL server has gone away".to_string()));
        }
        Ok(())
    }

    async fn close(&self, conn: ScriptedConnection) {
        self.script.closed.lock().push(conn.id);
    }
}
