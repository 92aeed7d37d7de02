use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Interaction, Lead, LeadPatch, Stage, StageRecordPatch};

/// Abstraction over the backing store for stages and leads.
/// Real implementation: `db::DbHandle`. Engine tests wrap it to inject failures.
///
/// Ordinary failures (I/O, constraint violations) come back as `Err`.
/// A missing row is `Ok(None)` / `Ok(false)` so callers can map it to NotFound.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// All stages of `owner`, ordered by position.
    async fn fetch_stages(&self, owner: &str) -> Result<Vec<Stage>>;

    async fn fetch_stage(&self, id: Uuid) -> Result<Option<Stage>>;

    async fn insert_stage(&self, stage: &Stage) -> Result<Stage>;

    /// Inserts every stage or none of them.
    async fn insert_stages(&self, stages: &[Stage]) -> Result<Vec<Stage>>;

    async fn update_stage_record(&self, id: Uuid, patch: &StageRecordPatch)
    -> Result<Option<Stage>>;

    async fn delete_stage_record(&self, id: Uuid) -> Result<bool>;

    /// Apply `patch` to a stage and point the owner's leads that reference it by
    /// any of `from_refs` at the stage's resulting key, in one transaction.
    /// Returns the updated stage and the number of leads moved.
    async fn rename_stage(
        &self,
        id: Uuid,
        patch: &StageRecordPatch,
        from_refs: &[String],
        at: DateTime<Utc>,
    ) -> Result<Option<(Stage, u64)>>;

    /// All leads of `owner`, newest first.
    async fn fetch_leads(&self, owner: &str) -> Result<Vec<Lead>>;

    async fn fetch_lead(&self, id: Uuid) -> Result<Option<Lead>>;

    async fn insert_lead(&self, lead: &Lead) -> Result<Lead>;

    /// Applies `patch` and stamps `updated_at = at`.
    async fn update_lead_record(
        &self,
        id: Uuid,
        patch: &LeadPatch,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>>;

    async fn delete_lead_record(&self, id: Uuid) -> Result<bool>;

    /// Point every lead of `owner` whose stage reference is one of `from_refs`
    /// at `to_key`. Returns the number of leads moved.
    async fn reassign_leads_by_stage(
        &self,
        owner: &str,
        from_refs: &[String],
        to_key: &str,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    async fn append_interaction(
        &self,
        id: Uuid,
        interaction: &Interaction,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>>;
}
