//! Checked-out connection handle.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::manager::Shared;
use super::state::Entry;
use super::{Backend, PoolError};

/// A connection lent to one caller.
///
/// Return it with [`Pool::release`](super::Pool::release) or simply drop
/// it. Call [`mark_broken`](Self::mark_broken) after an I/O error so the
/// pool closes it instead of reusing it.
pub struct PooledConnection<B: Backend> {
    entry: Option<Entry<B::Connection>>,
    shared: Arc<Shared<B>>,
    id: u64,
    created_at: Instant,
    checked_out_at: Instant,
    valid: bool,
}

impl<B: Backend> PooledConnection<B> {
    pub(crate) fn new(mut entry: Entry<B::Connection>, shared: Arc<Shared<B>>) -> Self {
        let now = Instant::now();
        entry.last_used = now;
        Self {
            id: entry.id,
            created_at: entry.created_at,
            entry: Some(entry),
            shared,
            checked_out_at: now,
            valid: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the pool that lent this connection.
    pub fn pool_id(&self) -> Uuid {
        self.shared.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn checked_out_at(&self) -> Instant {
        self.checked_out_at
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the handle still holds its connection.
    pub fn is_released(&self) -> bool {
        self.entry.is_none()
    }

    /// Flag the connection as unusable; release will close it.
    pub fn mark_broken(&mut self) {
        self.valid = false;
    }

    /// Borrow the underlying session.
    pub fn get(&self) -> Result<&B::Connection, PoolError> {
        self.entry
            .as_ref()
            .map(|entry| &entry.conn)
            .ok_or(PoolError::InvalidHandle)
    }

    /// Mutably borrow the underlying session.
    pub fn get_mut(&mut self) -> Result<&mut B::Connection, PoolError> {
        self.entry
            .as_mut()
            .map(|entry| &mut entry.conn)
            .ok_or(PoolError::InvalidHandle)
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared<B>>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    pub(crate) fn take(&mut self) -> Option<(Entry<B::Connection>, bool)> {
        self.entry.take().map(|entry| (entry, self.valid))
    }
}

impl<B: Backend> Drop for PooledConnection<B> {
    fn drop(&mut self) {
        if let Some((entry, valid)) = self.take() {
            if let Err(e) = self.shared.check_in(entry, valid) {
                tracing::warn!(connection_id = self.id, error = %e, "Dropped connection could not be returned");
            }
        }
    }
}

impl<B: Backend> fmt::Debug for PooledConnection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("pool_id", &self.shared.id)
            .field("valid", &self.valid)
            .field("released", &self.entry.is_none())
            .finish()
    }
}
