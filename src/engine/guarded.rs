//! Shared ownership of a session across threads.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::error::SessionError;
use super::session::{Session, StepOutput};
use super::Backend;

/// A [`Session`] behind a mutex, cloneable across threads.
///
/// Every call holds the lock for its whole duration, so steps never
/// interleave.
pub struct GuardedSession<B: Backend> {
    inner: Arc<Mutex<Session<B>>>,
}

impl<B: Backend> GuardedSession<B> {
    pub fn new(session: Session<B>) -> Self {
        Self { inner: Arc::new(Mutex::new(session)) }
    }

    /// Exclusive access for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, Session<B>> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, Session<B>>> {
        self.inner.try_lock()
    }

    pub fn begin(&self, text: &str) -> Result<(), SessionError> {
        self.inner.lock().begin(text)
    }

    pub fn step(&self) -> Result<StepOutput, SessionError> {
        self.inner.lock().step()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn release(&self) -> bool {
        self.inner.lock().release()
    }

    /// Recover the session if this is the last handle.
    pub fn into_inner(self) -> Result<Session<B>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl<B: Backend> Clone for GuardedSession<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}
