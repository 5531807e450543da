//! Cluster client seam
//!
//! The cluster API implementation lives outside this workspace. Everything
//! effectful goes through [`ClusterClient`], which is injected and mockable.

use crate::error::ClusterError;
use crate::types::Target;
use serde::{Deserialize, Serialize};

/// Outcome of a deployment rollback
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub from_revision: Option<i64>,
    pub to_revision: Option<i64>,
    pub dry_run: bool,
    pub error: Option<String>,
}

/// Deployment status as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub namespace: String,
    pub name: String,
    pub replicas: u32,
    pub ready_replicas: u32,
    pub revision: i64,
    pub image: Option<String>,
}

impl DeploymentInfo {
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_replicas >= self.replicas
    }
}

/// Container orchestration API used by executors and the rollback engine
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Revert a deployment, to `revision` or the previous one
    async fn rollback(
        &self,
        target: &Target,
        revision: Option<i64>,
        reason: &str,
        dry_run: bool,
    ) -> Result<RollbackOutcome, ClusterError>;

    async fn get_deployment(&self, name: &str, namespace: &str) -> Result<DeploymentInfo, ClusterError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, ClusterError>;

    async fn restart_deployment(&self, target: &Target, dry_run: bool) -> Result<(), ClusterError>;

    async fn scale_deployment(&self, target: &Target, replicas: u32, dry_run: bool) -> Result<(), ClusterError>;

    async fn delete_pod(&self, target: &Target, dry_run: bool) -> Result<(), ClusterError>;
}
