//! Quota gate seam. The real credit ledger is an external service;
//! the engine only depends on this trait so tests (and the unmetered
//! default) can stand in for it.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Consulted before every paid model call.
    async fn can_proceed(&self) -> Result<bool>;

    /// Best-effort deduction after a successful generation. Errors are
    /// logged by the caller, never surfaced to the user.
    async fn deduct(&self, amount: u32) -> Result<()>;
}

/// Default gate when no ledger is configured: everything is allowed and
/// deductions are no-ops.
pub struct UnmeteredGate;

#[async_trait]
impl QuotaGate for UnmeteredGate {
    async fn can_proceed(&self) -> Result<bool> {
        Ok(true)
    }

    async fn deduct(&self, _amount: u32) -> Result<()> {
        Ok(())
    }
}
