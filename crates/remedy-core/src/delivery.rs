//! Delivery back-end seam for the regeneration pipeline
//!
//! Tests, builds, deploys and post-deploy checks are delegated to a
//! [`DeliveryBackend`] (CI system, build farm, deploy controller).

use crate::error::DeliveryError;
use remedy_actions::Target;
use remedy_rollback::VerificationResult;
use serde::{Deserialize, Serialize};

/// Outcome of running the test suite against generated code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl TestReport {
    #[must_use]
    pub fn passing(passed: u32) -> Self {
        Self {
            passed,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing(passed: u32, failures: Vec<String>) -> Self {
        Self {
            passed,
            failed: u32::try_from(failures.len()).unwrap_or(u32::MAX),
            failures,
        }
    }

    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Deployable build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub id: String,
    /// Image reference or package location
    pub location: String,
}

/// CI and deploy operations used by the regeneration driver
#[async_trait::async_trait]
pub trait DeliveryBackend: Send + Sync {
    async fn run_tests(&self, code: &str) -> Result<TestReport, DeliveryError>;

    async fn build(&self, code: &str) -> Result<BuildArtifact, DeliveryError>;

    async fn deploy(&self, artifact: &BuildArtifact, target: &Target) -> Result<(), DeliveryError>;

    /// Post-deploy health of `target`
    async fn verify_deployment(&self, target: &Target) -> Result<VerificationResult, DeliveryError>;
}
