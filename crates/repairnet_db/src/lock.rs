//! In-process, non-blocking row and scope locks.
//!
//! A pipeline run holds the lock for its incident from admission until the
//! chain halts or finishes, so a stage's external side effect and its stage
//! write are never interleaved with another writer on the same record.
//! Runs also hold a scope lock on their host and on the unordered link pair,
//! which serializes policy checks that read sibling incidents.
//! Acquisition never waits: a held lock is reported as `DbError::Contention`.

use crate::error::{DbError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Incident(i64),
    Host(String),
    /// Both directions of a link; endpoints stored in sorted order
    Link(String, String),
}

impl LockKey {
    pub fn link(a: &str, b: &str) -> Self {
        if a <= b {
            Self::Link(a.to_string(), b.to_string())
        } else {
            Self::Link(b.to_string(), a.to_string())
        }
    }

    /// Keys whose policy checks interfere with a run on `hostname -> peer`.
    pub fn scope(hostname: &str, peer: &str) -> [LockKey; 2] {
        [Self::Host(hostname.to_string()), Self::link(hostname, peer)]
    }
}

#[derive(Clone, Default)]
pub(crate) struct RowLocks {
    held: Arc<Mutex<HashSet<LockKey>>>,
}

impl RowLocks {
    /// Claim every key in `keys` or none of them.
    pub(crate) fn try_acquire(&self, owner: i64, keys: Vec<LockKey>) -> Result<RowLockGuard> {
        let mut held = lock_set(&self.held);
        if let Some(busy) = keys.iter().find(|key| held.contains(*key)) {
            debug!(incident_id = owner, key = ?busy, "Lock already held");
            return Err(DbError::Contention { incident_id: owner });
        }
        held.extend(keys.iter().cloned());
        Ok(RowLockGuard {
            held: Arc::clone(&self.held),
            incident_id: owner,
            keys,
        })
    }

    pub(crate) fn is_held(&self, key: &LockKey) -> bool {
        lock_set(&self.held).contains(key)
    }
}

// The set stays consistent even if a holder panicked mid-insert.
fn lock_set(held: &Mutex<HashSet<LockKey>>) -> MutexGuard<'_, HashSet<LockKey>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive claim on one incident row or on an incident's scope.
///
/// The lock is released when the guard is dropped.
pub struct RowLockGuard {
    held: Arc<Mutex<HashSet<LockKey>>>,
    incident_id: i64,
    keys: Vec<LockKey>,
}

impl RowLockGuard {
    pub fn incident_id(&self) -> i64 {
        self.incident_id
    }
}

impl Drop for RowLockGuard {
    fn drop(&mut self) {
        debug!(incident_id = self.incident_id, "Releasing locks");
        let mut held = lock_set(&self.held);
        for key in &self.keys {
            held.remove(key);
        }
    }
}

impl std::fmt::Debug for RowLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowLockGuard")
            .field("incident_id", &self.incident_id)
            .field("keys", &self.keys)
            .finish()
    }
}
