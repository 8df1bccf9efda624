//! Process-wide backend lifetime.
//!
//! The engine backend is initialized once for the first session and torn
//! down when the last session releases it. Both transitions happen while
//! holding the registry lock, so a new session can never observe a backend
//! that is mid-teardown.

use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};

use super::error::SessionError;

struct SharedState<B> {
    backend: Option<Arc<B>>,
    leases: usize,
}

/// Reference-counted registry for a single live backend.
///
/// Intended to be placed in a `static`:
///
/// ```ignore
/// static LLAMA: SharedBackend<LlamaCppBackend> = SharedBackend::new();
/// ```
pub struct SharedBackend<B> {
    state: Mutex<SharedState<B>>,
}

impl<B: Send + Sync + 'static> SharedBackend<B> {
    pub const fn new() -> Self {
        Self {
            state: const_mutex(SharedState { backend: None, leases: 0 }),
        }
    }

    /// Lease the backend, running `init` if no lease is currently live.
    ///
    /// A failed `init` leaves the registry empty.
    pub fn acquire<F>(&'static self, init: F) -> Result<BackendLease<B>, SessionError>
    where
        F: FnOnce() -> Result<B, SessionError>,
    {
        let mut state = self.state.lock();
        let backend = match &state.backend {
            Some(backend) => backend.clone(),
            None => {
                let backend = Arc::new(init()?);
                tracing::info!("inference backend initialized");
                state.backend = Some(backend.clone());
                backend
            }
        };
        state.leases += 1;
        Ok(BackendLease { backend: Some(backend), registry: self })
    }

    /// Number of live leases.
    pub fn live_leases(&self) -> usize {
        self.state.lock().leases
    }

    /// Whether a backend instance is currently initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().backend.is_some()
    }

    fn release_lease(&self, lease_backend: Arc<B>) {
        let mut state = self.state.lock();
        drop(lease_backend);
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 {
            // Drop the last strong reference inside the lock: teardown is serialized with init.
            if state.backend.take().is_some() {
                tracing::info!("inference backend torn down");
            }
        }
    }
}

/// One session's share of the process-wide backend.
pub struct BackendLease<B: Send + Sync + 'static> {
    backend: Option<Arc<B>>,
    registry: &'static SharedBackend<B>,
}

impl<B: Send + Sync + 'static> BackendLease<B> {
    pub fn backend(&self) -> &B {
        // Only `Drop` takes the Arc out.
        self.backend.as_deref().unwrap_or_else(|| unreachable!("lease used after drop"))
    }
}

impl<B: Send + Sync + 'static> std::ops::Deref for BackendLease<B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend()
    }
}

impl<B: Send + Sync + 'static> Drop for BackendLease<B> {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            self.registry.release_lease(backend);
        }
    }
}
