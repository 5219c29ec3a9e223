//! Outcome of a fire-and-forget side effect.
//!
//! Popularity bumps and click tracking must never abort a checkout. They
//! report a [`BestEffort`] instead of an error: failures are logged at
//! `warn` and otherwise ignored by the caller.

use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    Applied,
    Failed(String),
}

impl BestEffort {
    /// Await `effect`, logging and swallowing any error.
    pub async fn run<F>(effect: &'static str, fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match fut.await {
            Ok(()) => BestEffort::Applied,
            Err(e) => {
                tracing::warn!(effect, error = %e, "best-effort side effect failed");
                BestEffort::Failed(e.to_string())
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, BestEffort::Applied)
    }
}
