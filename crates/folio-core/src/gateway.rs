//! Resilient data gateway
//!
//! Every remote call made by the application passes through this seam.
//! A structurally misconfigured backend (for example an access policy
//! that denies every read) must not crash a screen that only needed a
//! list, so those failures degrade to a caller-supplied fallback. The
//! degraded condition is surfaced on the shared sync state instead of
//! being entirely silent.

use std::future::Future;

use crate::error::{Error, Result};
use crate::models::SyncStateHandle;

/// Gateway wrapping remote operations with typed fallback behavior
#[derive(Clone)]
pub struct ResilientGateway {
    status: SyncStateHandle,
}

impl ResilientGateway {
    /// Create a gateway reporting degraded mode on the given state handle
    #[must_use]
    pub const fn new(status: SyncStateHandle) -> Self {
        Self { status }
    }

    /// Run `operation`, degrading backend misconfiguration to `fallback`.
    ///
    /// Success clears the degraded flag and passes the value through.
    /// [`Error::BackendConfiguration`] logs a warning, sets the degraded
    /// flag, and resolves to `Ok(fallback)` — the caller cannot tell an
    /// empty result from a misconfigured backend. Any other error
    /// propagates typed.
    pub async fn execute<T, F>(&self, operation: &str, future: F, fallback: T) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match future.await {
            Ok(value) => {
                self.clear_degraded();
                Ok(value)
            }
            Err(Error::BackendConfiguration(message)) => {
                tracing::warn!("{operation}: backend misconfigured, serving fallback: {message}");
                self.status.update(|state| state.degraded = true);
                Ok(fallback)
            }
            Err(error) => Err(error),
        }
    }

    /// Run `operation` without a fallback; all errors propagate typed.
    ///
    /// This is the path the sync protocol client routes through: during a
    /// sync cycle even a misconfigured backend is terminal for the cycle.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match future.await {
            Ok(value) => {
                self.clear_degraded();
                Ok(value)
            }
            Err(error) => {
                tracing::debug!("{operation} failed: {error}");
                Err(error)
            }
        }
    }

    fn clear_degraded(&self) {
        if self.status.snapshot().degraded {
            tracing::info!("Backend recovered, leaving degraded mode");
            self.status.update(|state| state.degraded = false);
        }
    }
}
