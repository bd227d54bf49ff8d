//! Bounded pool of storage connections
//!
//! Connections live in fixed slots; a slot index is the connection's stable
//! identity. Checking a connection out moves it out of its slot into a
//! [`PooledConnection`] guard, and dropping the guard moves it back, so a
//! connection is returned on every exit path of the code that holds it.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Stable identity of a pooled connection (its slot index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised by the connection pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the bounded wait
    #[error("No storage connection available after {waited:?}")]
    Exhausted { waited: Duration },

    /// A connection was released that is not checked out
    ///
    /// This indicates a checkout/release mismatch bug.
    #[error("Release of connection {0} which is not checked out")]
    InvalidRelease(ConnectionId),
}

/// Bounded pool of connections of type `C`
pub struct ConnectionPool<C> {
    slots: Mutex<Vec<Option<C>>>,
    released: Condvar,
    acquire_timeout: Option<Duration>,
}

impl<C> ConnectionPool<C> {
    /// Creates a pool owning `connections`
    ///
    /// `acquire_timeout` bounds how long [`acquire`](Self::acquire) waits for
    /// a free connection; `None` waits indefinitely.
    pub fn new(connections: Vec<C>, acquire_timeout: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(connections.into_iter().map(Some).collect()),
            released: Condvar::new(),
            acquire_timeout,
        }
    }

    /// Total number of connections owned by the pool
    pub fn size(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of connections currently available for checkout
    pub fn available(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// Checks out a connection, waiting for one to be released if necessary
    ///
    /// Fails with [`PoolError::Exhausted`] if the configured bounded wait
    /// elapses first.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>, PoolError> {
        let started = Instant::now();
        let deadline = self.acquire_timeout.map(|timeout| started + timeout);
        let mut slots = self.slots.lock();

        loop {
            if let Some(index) = slots.iter().position(Option::is_some) {
                let conn = slots[index].take();
                tracing::trace!("Checked out storage connection #{}", index);
                return Ok(PooledConnection {
                    pool: self,
                    id: ConnectionId(index),
                    conn,
                });
            }

            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut slots, deadline).timed_out()
                        && slots.iter().all(Option::is_none)
                    {
                        return Err(PoolError::Exhausted {
                            waited: started.elapsed(),
                        });
                    }
                }
                None => self.released.wait(&mut slots),
            }
        }
    }

    /// Returns a connection to its slot
    fn check_in(&self, id: ConnectionId, conn: C) -> Result<(), PoolError> {
        let mut slots = self.slots.lock();
        let slot = match slots.get_mut(id.0) {
            Some(slot) if slot.is_none() => slot,
            _ => return Err(PoolError::InvalidRelease(id)),
        };
        *slot = Some(conn);
        drop(slots);

        self.released.notify_one();
        tracing::trace!("Released storage connection {}", id);
        Ok(())
    }
}

/// A checked-out connection
///
/// Dereferences to the connection. The connection goes back to the pool when
/// the guard is dropped or explicitly [released](Self::release).
pub struct PooledConnection<'a, C> {
    pool: &'a ConnectionPool<C>,
    id: ConnectionId,
    conn: Option<C>,
}

impl<C> PooledConnection<'_, C> {
    /// Identity of the held connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Releases the connection back to the pool
    pub fn release(mut self) -> Result<(), PoolError> {
        match self.conn.take() {
            Some(conn) => self.pool.check_in(self.id, conn),
            None => Err(PoolError::InvalidRelease(self.id)),
        }
    }
}

impl<C> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("pooled connection used after release")
    }
}

impl<C> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("pooled connection used after release")
    }
}

impl<C> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.pool.check_in(self.id, conn) {
                tracing::error!("Connection pool corrupted: {}", e);
                debug_assert!(false, "{}", e);
            }
        }
    }
}
