//! Release and milestone service contract.

use super::RemoteError;
use crate::core::ComponentBuild;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Milestone lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneState {
    /// Builds can still be promoted.
    Open,
    /// The milestone was released.
    Closed,
}

/// Request to promote builds to permanent storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    /// Target milestone id.
    pub milestone_id: String,
    /// Builds to promote.
    pub builds: Vec<ComponentBuild>,
}

/// Result of a promotion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionReceipt {
    /// Name-version-release identifiers of the promoted deliverables.
    pub nvrs: Vec<String>,
}

/// Contract of the milestone/release-promotion service.
#[async_trait]
pub trait ReleaseService: Send + Sync {
    /// Returns the milestone state.
    async fn milestone_state(&self, milestone_id: &str) -> Result<MilestoneState, RemoteError>;

    /// Returns the promotion already recorded for a milestone, if any.
    async fn promotion(&self, milestone_id: &str) -> Result<Option<PromotionReceipt>, RemoteError>;

    /// Promotes builds to the permanent artifact store.
    async fn promote(&self, request: &PromotionRequest) -> Result<PromotionReceipt, RemoteError>;

    /// Closes a milestone; closing an already closed one is a conflict.
    async fn close_milestone(&self, milestone_id: &str) -> Result<(), RemoteError>;
}
