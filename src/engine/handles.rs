//! Model and context handle ownership.
//!
//! A [`HandlePair`] exclusively owns one loaded model and the context derived
//! from it. Release order is fixed: context, model, then the backend lease.

use std::path::Path;

use super::config::SessionConfig;
use super::error::SessionError;
use super::shared::{BackendLease, SharedBackend};
use super::{Backend, ContextHandle};

/// Exclusive owner of a model handle, its context and the backend lease.
pub struct HandlePair<B: Backend> {
    context: Option<B::Context>,
    model: Option<B::Model>,
    lease: Option<BackendLease<B>>,
}

impl<B: Backend> HandlePair<B> {
    /// Lease the backend, load the model and create its context.
    ///
    /// Anything acquired before a failure is released before returning.
    pub fn acquire<F>(
        registry: &'static SharedBackend<B>,
        init: F,
        model_path: &Path,
        config: &SessionConfig,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<B, SessionError>,
    {
        let lease = registry.acquire(init)?;
        let model = lease
            .backend()
            .load_model(model_path, &config.model)
            .inspect_err(|e| tracing::error!(path = %model_path.display(), error = %e, "model load failed"))?;
        let context = match lease.backend().new_context(&model, &config.context) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, "context creation failed");
                drop(model);
                drop(lease);
                return Err(e);
            }
        };
        let n_ctx = context.n_ctx() as usize;
        if config.max_length > n_ctx {
            drop(context);
            drop(model);
            drop(lease);
            return Err(SessionError::Context(format!(
                "context window {n_ctx} is smaller than max_length {}",
                config.max_length
            )));
        }
        tracing::info!(path = %model_path.display(), n_ctx, "model and context acquired");
        Ok(Self {
            context: Some(context),
            model: Some(model),
            lease: Some(lease),
        })
    }

    pub fn model(&self) -> Result<&B::Model, SessionError> {
        self.model.as_ref().ok_or(SessionError::Released)
    }

    pub fn context(&self) -> Result<&B::Context, SessionError> {
        self.context.as_ref().ok_or(SessionError::Released)
    }

    /// Model and context together, the context mutably.
    pub fn split_mut(&mut self) -> Result<(&B::Model, &mut B::Context), SessionError> {
        match (&self.model, &mut self.context) {
            (Some(model), Some(context)) => Ok((model, context)),
            _ => Err(SessionError::Released),
        }
    }

    pub fn is_released(&self) -> bool {
        self.context.is_none() && self.model.is_none() && self.lease.is_none()
    }

    /// Free context, then model, then the backend lease.
    ///
    /// Returns `false` when everything was already released.
    pub fn release(&mut self) -> bool {
        let released = !self.is_released();
        drop(self.context.take());
        drop(self.model.take());
        drop(self.lease.take());
        if released {
            tracing::debug!("session handles released");
        }
        released
    }
}

impl<B: Backend> Drop for HandlePair<B> {
    fn drop(&mut self) {
        self.release();
    }
}
