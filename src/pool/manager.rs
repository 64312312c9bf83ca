//! Connection pool manager.
//!
//! All bookkeeping lives in one `PoolState` behind a single mutex. The lock
//! is only held for constant-time updates; connecting, probing and closing
//! happen after it is released. Capacity that must travel between tasks is
//! carried by a [`Handoff`] so that a released connection or freed slot is
//! always owned by exactly one party: the pool, a waiter's channel, or a
//! caller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::metrics::PoolMetrics;

use super::state::{Entry, Handoff, PoolState, Waiter};
use super::{Backend, PoolConfig, PoolError, PoolStats, PooledConnection};

/// State shared by a pool and every handle it lends out.
pub(crate) struct Shared<B: Backend> {
    pub(crate) id: Uuid,
    backend: Arc<B>,
    config: PoolConfig,
    state: Mutex<PoolState<B::Connection>>,
    next_id: AtomicU64,
}

impl<B: Backend> Shared<B> {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Take back a checked-out connection. Never suspends.
    pub(crate) fn check_in(
        &self,
        entry: Entry<B::Connection>,
        valid: bool,
    ) -> Result<(), PoolError> {
        let id = entry.id;
        let mut state = self.state.lock();

        if !state.in_use.contains(&id) {
            drop(state);
            self.close_detached(entry.conn);
            return Err(PoolError::InvalidHandle);
        }

        let to_close = if state.closed {
            state.in_use.remove(&id);
            Some(entry.conn)
        } else if !valid {
            state.discard_in_use(id);
            Some(entry.conn)
        } else {
            state.hand_off(Handoff::Connection(entry))
        };
        drop(state);

        if !valid {
            PoolMetrics::record_discarded();
            tracing::debug!(connection_id = id, "Discarding broken connection");
        }
        if let Some(conn) = to_close {
            self.close_detached(conn);
        }
        Ok(())
    }

    /// Close a connection on a background task so callers never wait on it.
    fn close_detached(&self, conn: B::Connection) {
        let backend = Arc::clone(&self.backend);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    backend.close(conn).await;
                });
            }
            Err(_) => {
                tracing::debug!("No runtime available, dropping connection without close");
                drop(conn);
            }
        }
    }
}

/// Capacity reserved for one connect attempt.
///
/// Dropping it unused passes the capacity to the oldest waiter, which also
/// covers cancellation of an acquire during connect.
struct SlotGuard<B: Backend> {
    shared: Arc<Shared<B>>,
    armed: bool,
}

impl<B: Backend> SlotGuard<B> {
    fn new(shared: Arc<Shared<B>>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// Turn the reservation into a connection lent to the caller.
    fn check_out(mut self, conn: B::Connection) -> Result<PooledConnection<B>, PoolError> {
        self.armed = false;
        let entry = Entry::new(self.shared.next_id(), conn);

        let mut state = self.shared.state.lock();
        state.connecting = state.connecting.saturating_sub(1);
        if state.closed {
            drop(state);
            self.shared.close_detached(entry.conn);
            return Err(PoolError::PoolClosed);
        }
        state.in_use.insert(entry.id);
        state.counters.created += 1;
        state.counters.acquired += 1;
        drop(state);

        Ok(PooledConnection::new(entry, Arc::clone(&self.shared)))
    }

    /// Turn the reservation into an idle connection.
    fn park_idle(mut self, conn: B::Connection) {
        self.armed = false;
        let entry = Entry::new(self.shared.next_id(), conn);

        let mut state = self.shared.state.lock();
        state.connecting = state.connecting.saturating_sub(1);
        state.counters.created += 1;
        state.in_use.insert(entry.id);
        let to_close = state.hand_off(Handoff::Connection(entry));
        drop(state);

        if let Some(conn) = to_close {
            self.shared.close_detached(conn);
        }
    }
}

impl<B: Backend> Drop for SlotGuard<B> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            let _ = state.hand_off(Handoff::Slot);
        }
    }
}

/// A queued acquisition.
///
/// Assignment and departure are decided under the pool lock: whichever
/// happens first wins, and a hand-off that arrives for a departing waiter
/// is passed on rather than lost.
struct WaitGuard<B: Backend> {
    shared: Arc<Shared<B>>,
    id: u64,
    rx: Option<oneshot::Receiver<Handoff<B::Connection>>>,
}

impl<B: Backend> WaitGuard<B> {
    async fn wait(mut self, deadline: Instant) -> Result<Handoff<B::Connection>, PoolError> {
        let outcome = match self.rx.as_mut() {
            Some(rx) => tokio::time::timeout_at(deadline, rx).await,
            None => return Err(PoolError::PoolClosed),
        };

        match outcome {
            Ok(Ok(handoff)) => {
                self.rx = None;
                Ok(handoff)
            }
            // Sender dropped: shutdown drained the queue
            Ok(Err(_)) => {
                self.rx = None;
                Err(PoolError::PoolClosed)
            }
            Err(_) => Err(self.leave(true)),
        }
    }

    fn leave(&mut self, timed_out: bool) -> PoolError {
        let Some(mut rx) = self.rx.take() else {
            return PoolError::PoolClosed;
        };

        let mut state = self.shared.state.lock();
        let mut to_close = None;
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
        } else if let Ok(handoff) = rx.try_recv() {
            to_close = state.hand_off(handoff);
        }

        let error = if state.closed {
            PoolError::PoolClosed
        } else {
            if timed_out {
                state.counters.timed_out += 1;
            }
            state.exhausted()
        };
        drop(state);

        if let Some(conn) = to_close {
            self.shared.close_detached(conn);
        }
        error
    }
}

impl<B: Backend> Drop for WaitGuard<B> {
    fn drop(&mut self) {
        if self.rx.is_some() {
            let _ = self.leave(false);
        }
    }
}

enum Reservation<B: Backend> {
    Ready(Handoff<B::Connection>),
    Queued(WaitGuard<B>),
}

/// Bounded pool of backend connections.
///
/// Cheap to clone; clones share the same connections. Construct one at
/// startup and pass it to whatever needs database access.
pub struct Pool<B: Backend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> fmt::Debug for Pool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<B: Backend> Pool<B> {
    /// Create a pool that opens connections lazily.
    ///
    /// # Errors
    /// Returns [`PoolError::Config`] if `config` fails validation.
    pub fn new(config: PoolConfig, backend: B) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Shared {
            id: Uuid::new_v4(),
            backend: Arc::new(backend),
            state: Mutex::new(PoolState::new(config.max_connections)),
            config,
            next_id: AtomicU64::new(1),
        };

        tracing::debug!(
            pool_id = %shared.id,
            max_connections = shared.config.max_connections,
            max_waiters = shared.config.max_waiters,
            "Connection pool created"
        );

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Create a pool and eagerly open `warm_up` connections.
    ///
    /// # Errors
    /// Fails with [`PoolError::Rejected`] when the backend refuses the
    /// configuration. Transient warm-up failures are logged and leave the
    /// pool with fewer idle connections.
    pub async fn connect(config: PoolConfig, backend: B) -> Result<Self, PoolError> {
        let pool = Self::new(config, backend)?;
        pool.warm_up().await?;
        Ok(pool)
    }

    async fn warm_up(&self) -> Result<(), PoolError> {
        let target = self.shared.config.warm_up;
        let connect_timeout = self.shared.config.connect_timeout();
        let mut opened = 0;

        while opened < target {
            let Some(slot) = self.reserve_slot() else {
                break;
            };

            match tokio::time::timeout(connect_timeout, self.shared.backend.connect()).await {
                Ok(Ok(conn)) => {
                    slot.park_idle(conn);
                    PoolMetrics::record_created();
                    opened += 1;
                }
                Ok(Err(e)) if e.is_fatal() => {
                    drop(slot);
                    tracing::error!(error = %e, "Database rejected pool configuration");
                    return Err(PoolError::Rejected(e));
                }
                Ok(Err(e)) => {
                    drop(slot);
                    self.record_connect_failure();
                    tracing::warn!(error = %e, opened, target, "Warm-up connect failed");
                    break;
                }
                Err(_) => {
                    drop(slot);
                    self.record_connect_failure();
                    tracing::warn!(
                        timeout_ms = connect_timeout.as_millis() as u64,
                        opened,
                        target,
                        "Warm-up connect timed out"
                    );
                    break;
                }
            }
        }

        if target > 0 {
            tracing::info!(pool_id = %self.shared.id, opened, target, "Connection pool warm-up finished");
        }
        Ok(())
    }

    fn reserve_slot(&self) -> Option<SlotGuard<B>> {
        let mut state = self.shared.state.lock();
        if state.closed || !state.has_capacity() {
            return None;
        }
        state.connecting += 1;
        drop(state);
        Some(SlotGuard::new(Arc::clone(&self.shared)))
    }

    fn record_connect_failure(&self) {
        self.shared.state.lock().counters.connect_failures += 1;
        PoolMetrics::record_connect_failure();
    }

    /// Acquire a connection, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<B>, PoolError> {
        self.acquire_timeout(self.shared.config.acquire_timeout()).await
    }

    /// Acquire a connection, waiting at most `timeout` in total, including
    /// connect and probe I/O.
    ///
    /// # Errors
    /// - [`PoolError::PoolExhausted`] if the queue is full or `timeout` elapses
    /// - [`PoolError::ConnectFailed`] if opening a new connection fails
    /// - [`PoolError::PoolClosed`] once shutdown has begun
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<B>, PoolError> {
        let started = Instant::now();
        let result = self.acquire_until(started + timeout).await;

        let outcome = match result {
            Ok(_) => "ok",
            Err(ref e) => e.kind(),
        };
        PoolMetrics::record_acquire(outcome, started.elapsed());
        result
    }

    async fn acquire_until(&self, deadline: Instant) -> Result<PooledConnection<B>, PoolError> {
        loop {
            let handoff = match self.reserve()? {
                Reservation::Ready(handoff) => handoff,
                Reservation::Queued(waiter) => waiter.wait(deadline).await?,
            };

            match handoff {
                Handoff::Connection(entry) => {
                    if let Some(conn) = self.check_out(entry, deadline).await? {
                        return Ok(conn);
                    }
                    // Stale connection discarded; take another turn
                }
                Handoff::Slot => {
                    let slot = SlotGuard::new(Arc::clone(&self.shared));
                    return self.open(slot, deadline).await;
                }
            }
        }
    }

    fn reserve(&self) -> Result<Reservation<B>, PoolError> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        let expired = state.take_expired(config.idle_timeout(), config.max_lifetime());

        let reservation = if let Some(entry) = state.idle.pop_back() {
            state.in_use.insert(entry.id);
            Ok(Reservation::Ready(Handoff::Connection(entry)))
        } else if state.has_capacity() {
            state.connecting += 1;
            Ok(Reservation::Ready(Handoff::Slot))
        } else if config.max_waiters != 0 && state.waiters.len() >= config.max_waiters {
            Err(state.exhausted())
        } else {
            let (tx, rx) = oneshot::channel();
            let id = self.shared.next_id();
            state.waiters.push_back(Waiter { id, tx });
            Ok(Reservation::Queued(WaitGuard {
                shared: Arc::clone(&self.shared),
                id,
                rx: Some(rx),
            }))
        };
        drop(state);

        for conn in expired {
            PoolMetrics::record_discarded();
            self.shared.close_detached(conn);
        }
        reservation
    }

    /// Probe a connection taken from idle or handed over by a release.
    /// `Ok(None)` means it was stale and has been discarded.
    async fn check_out(
        &self,
        entry: Entry<B::Connection>,
        deadline: Instant,
    ) -> Result<Option<PooledConnection<B>>, PoolError> {
        let mut conn = PooledConnection::new(entry, Arc::clone(&self.shared));
        let backend = Arc::clone(&self.shared.backend);
        let probe = tokio::time::timeout_at(deadline, backend.probe(conn.get_mut()?)).await;

        match probe {
            Ok(Ok(())) => {
                let mut state = self.shared.state.lock();
                if state.closed {
                    drop(state);
                    return Err(PoolError::PoolClosed);
                }
                state.counters.acquired += 1;
                Ok(Some(conn))
            }
            Ok(Err(e)) => {
                tracing::debug!(connection_id = conn.id(), error = %e, "Stale connection discarded");
                conn.mark_broken();
                drop(conn);
                Ok(None)
            }
            Err(_) => {
                tracing::debug!(connection_id = conn.id(), "Liveness probe timed out");
                conn.mark_broken();
                drop(conn);
                let mut state = self.shared.state.lock();
                state.counters.timed_out += 1;
                Err(state.exhausted())
            }
        }
    }

    /// Open a new connection into a reserved slot.
    async fn open(
        &self,
        slot: SlotGuard<B>,
        deadline: Instant,
    ) -> Result<PooledConnection<B>, PoolError> {
        match tokio::time::timeout_at(deadline, self.shared.backend.connect()).await {
            Ok(Ok(conn)) => {
                let conn = slot.check_out(conn)?;
                PoolMetrics::record_created();
                tracing::debug!(
                    pool_id = %self.shared.id,
                    connection_id = conn.id(),
                    "Opened database connection"
                );
                Ok(conn)
            }
            Ok(Err(e)) => {
                drop(slot);
                self.record_connect_failure();
                tracing::warn!(error = %e, "Database connect attempt failed");
                Err(PoolError::ConnectFailed(e))
            }
            Err(_) => {
                drop(slot);
                let mut state = self.shared.state.lock();
                state.counters.timed_out += 1;
                Err(state.exhausted())
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Broken connections (see [`PooledConnection::mark_broken`]) are closed.
    /// The oldest waiter, if any, is served before the connection goes idle.
    ///
    /// # Errors
    /// [`PoolError::InvalidHandle`] if the handle was already released or was
    /// lent by a different pool.
    pub fn release(&self, conn: &mut PooledConnection<B>) -> Result<(), PoolError> {
        if !conn.belongs_to(&self.shared) {
            return Err(PoolError::InvalidHandle);
        }
        let (entry, valid) = conn.take().ok_or(PoolError::InvalidHandle)?;
        self.shared.check_in(entry, valid)
    }

    /// Close the pool. Queued acquisitions fail with `PoolClosed`, idle
    /// connections are closed now, checked-out ones when they come back.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (idle, waiters, in_use) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
                state.in_use.len(),
            )
        };

        tracing::info!(
            pool_id = %self.shared.id,
            idle = idle.len(),
            waiters = waiters.len(),
            in_use,
            "Shutting down connection pool"
        );

        // Dropping the senders wakes every waiter with PoolClosed
        drop(waiters);

        for entry in idle {
            self.shared.backend.close(entry.conn).await;
        }

        tracing::info!(pool_id = %self.shared.id, "Connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().snapshot()
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}
