use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The claim on "a containerization is running".
///
/// At most one owner holds the lock at a time. Releasing is tied to the owner, so a release by
/// anyone else is a no-op.
#[derive(Debug, Default)]
pub struct SessionLock {
    owner: Mutex<Option<Uuid>>,
}

/// A held [`SessionLock`], released when dropped.
#[derive(Debug)]
pub struct SessionClaim {
    lock: Arc<SessionLock>,
    owner: Uuid,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SessionLock {
    /// Creates a free lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock for `owner` if it is free.
    pub fn try_acquire(&self, owner: Uuid) -> bool {
        let mut current = self.guard();
        if current.is_some() {
            return false;
        }

        *current = Some(owner);
        true
    }

    /// Frees the lock if `owner` holds it. Returns whether anything was released.
    pub fn release(&self, owner: Uuid) -> bool {
        let mut current = self.guard();
        if *current != Some(owner) {
            return false;
        }

        *current = None;
        true
    }

    /// Whether a session currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.guard().is_some()
    }

    /// The current owner.
    pub fn owner(&self) -> Option<Uuid> {
        *self.guard()
    }

    /// Takes the lock under a fresh owner identity, returning a claim that releases it on drop.
    pub fn claim(lock: &Arc<Self>) -> Option<SessionClaim> {
        let owner = Uuid::new_v4();
        lock.try_acquire(owner).then(|| SessionClaim {
            lock: Arc::clone(lock),
            owner,
        })
    }

    fn guard(&self) -> MutexGuard<'_, Option<Uuid>> {
        // The critical sections cannot panic, so a poisoned lock still holds a valid owner.
        self.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionClaim {
    /// The identity the lock is held under.
    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for SessionClaim {
    fn drop(&mut self) {
        if self.lock.release(self.owner) {
            tracing::debug!("session {} released the containerization lock", self.owner);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
