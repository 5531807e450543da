//! Post-action verification seam

use crate::error::VerifierError;
use remedy_actions::ActionResult;
use remedy_rollback::VerificationResult;

/// Collects health, metric and log signals after an action ran
#[async_trait::async_trait]
pub trait Verifier: Send + Sync {
    /// Judge whether the target recovered after `result`
    async fn verify(&self, result: &ActionResult) -> Result<VerificationResult, VerifierError>;
}
