//! Lock-protected pool bookkeeping.
//!
//! Everything here runs with the pool mutex held and never performs I/O.
//! Connections that must be closed are returned to the caller so the close
//! can happen after the lock is released.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::{PoolError, PoolStats};

/// A connection owned by the pool, idle or checked out.
pub(crate) struct Entry<C> {
    pub(crate) id: u64,
    pub(crate) conn: C,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
}

impl<C> Entry<C> {
    pub(crate) fn new(id: u64, conn: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, idle_timeout: Option<Duration>, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|limit| self.created_at.elapsed() > limit)
            || idle_timeout.is_some_and(|limit| self.last_used.elapsed() > limit)
    }
}

/// What a waiter receives when it is served.
pub(crate) enum Handoff<C> {
    /// A released connection; its id is already in the in-use set.
    Connection(Entry<C>),
    /// Reserved capacity; already counted in `connecting`.
    Slot,
}

pub(crate) struct Waiter<C> {
    pub(crate) id: u64,
    pub(crate) tx: oneshot::Sender<Handoff<C>>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) acquired: u64,
    pub(crate) created: u64,
    pub(crate) discarded: u64,
    pub(crate) timed_out: u64,
    pub(crate) connect_failures: u64,
}

pub(crate) struct PoolState<C> {
    pub(crate) idle: VecDeque<Entry<C>>,
    pub(crate) in_use: HashSet<u64>,
    pub(crate) connecting: usize,
    pub(crate) waiters: VecDeque<Waiter<C>>,
    pub(crate) closed: bool,
    pub(crate) counters: Counters,
    max_connections: usize,
}

impl<C> PoolState<C> {
    pub(crate) fn new(max_connections: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(max_connections),
            in_use: HashSet::with_capacity(max_connections),
            connecting: 0,
            waiters: VecDeque::new(),
            closed: false,
            counters: Counters::default(),
            max_connections,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.connecting
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.total() < self.max_connections
    }

    pub(crate) fn exhausted(&self) -> PoolError {
        PoolError::PoolExhausted {
            max_connections: self.max_connections,
            in_use: self.in_use.len(),
            waiters: self.waiters.len(),
        }
    }

    /// Remove idle connections past their idle timeout or lifetime.
    pub(crate) fn take_expired(
        &mut self,
        idle_timeout: Option<Duration>,
        max_lifetime: Option<Duration>,
    ) -> Vec<C> {
        if idle_timeout.is_none() && max_lifetime.is_none() {
            return Vec::new();
        }

        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.idle.len());
        while let Some(entry) = self.idle.pop_front() {
            if entry.is_expired(idle_timeout, max_lifetime) {
                expired.push(entry.conn);
            } else {
                kept.push_back(entry);
            }
        }
        self.idle = kept;
        self.counters.discarded += expired.len() as u64;
        expired
    }

    /// Pass a connection or reserved slot to the oldest waiter still
    /// listening, or park it back in the pool.
    ///
    /// Returns a connection the caller must close (only after shutdown).
    pub(crate) fn hand_off(&mut self, mut handoff: Handoff<C>) -> Option<C> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(handoff) {
                Ok(()) => return None,
                // Receiver gone; try the next one
                Err(returned) => handoff = returned,
            }
        }
        self.park(handoff)
    }

    fn park(&mut self, handoff: Handoff<C>) -> Option<C> {
        match handoff {
            Handoff::Connection(mut entry) => {
                self.in_use.remove(&entry.id);
                if self.closed {
                    return Some(entry.conn);
                }
                entry.last_used = Instant::now();
                self.idle.push_back(entry);
                None
            }
            Handoff::Slot => {
                self.connecting = self.connecting.saturating_sub(1);
                None
            }
        }
    }

    /// Drop a checked-out connection from the books and offer its capacity
    /// to the queue.
    pub(crate) fn discard_in_use(&mut self, id: u64) {
        self.in_use.remove(&id);
        self.counters.discarded += 1;
        self.connecting += 1;
        // A reserved slot never carries a connection back
        let _ = self.hand_off(Handoff::Slot);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            in_use: self.in_use.len(),
            waiters: self.waiters.len(),
            connecting: self.connecting,
            max_connections: self.max_connections,
            closed: self.closed,
            acquired: self.counters.acquired,
            created: self.counters.created,
            discarded: self.counters.discarded,
            timed_out: self.counters.timed_out,
            connect_failures: self.counters.connect_failures,
        }
    }
}
