//! Stage registry: the per-owner ordered set of pipeline columns.
//!
//! Keys are derived from names with [`slugify`] and are unique per owner.
//! The registry checks collisions before writing; the `UNIQUE(owner_id, key)`
//! constraint in the database catches whatever slips past under races.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::client::PersistenceClient;
use super::clock::Clock;
use super::models::{NewStage, Stage, StageColor, StagePatch, StageRecordPatch};
use super::slug::slugify;
use crate::errors::{BoardError, BoardResult};

/// Seed stage template: key, name, icon, color.
pub struct DefaultStage {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: StageColor,
}

/// Created in one batch the first time an owner has no stages. Positions follow array order.
pub const DEFAULT_STAGES: [DefaultStage; 6] = [
    DefaultStage {
        key: "lead",
        name: "Lead Gerado",
        icon: "📥",
        color: StageColor::Blue,
    },
    DefaultStage {
        key: "qualified",
        name: "Qualificado",
        icon: "✓",
        color: StageColor::Cyan,
    },
    DefaultStage {
        key: "diagnostic",
        name: "Diagnóstico",
        icon: "🔍",
        color: StageColor::Purple,
    },
    DefaultStage {
        key: "proposal",
        name: "Proposta",
        icon: "📋",
        color: StageColor::Orange,
    },
    DefaultStage {
        key: "negotiation",
        name: "Negociação",
        icon: "💬",
        color: StageColor::Yellow,
    },
    DefaultStage {
        key: "closed",
        name: "Fechado",
        icon: "🤝",
        color: StageColor::Green,
    },
];

/// What `delete_stage` did.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDeletion {
    pub deleted: Stage,
    pub reassigned_to: Option<String>,
    pub leads_moved: u64,
}

/// What `update_stage` did. `leads_moved` counts leads carried along by a rename.
#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    pub stage: Stage,
    pub previous_key: String,
    pub leads_moved: u64,
}

impl StageUpdate {
    pub fn key_changed(&self) -> bool {
        self.stage.key != self.previous_key
    }
}

pub struct StageRegistry {
    client: Arc<dyn PersistenceClient>,
    clock: Arc<dyn Clock>,
}

impl StageRegistry {
    pub fn new(client: Arc<dyn PersistenceClient>, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    pub async fn list_stages(&self, owner: &str) -> BoardResult<Vec<Stage>> {
        check_owner(owner)?;
        let mut stages = self
            .client
            .fetch_stages(owner)
            .await
            .map_err(BoardError::Persistence)?;
        stages.sort_by_key(|s| s.position);
        Ok(stages)
    }

    /// Seed the default stages if `owner` has none. Returns the owner's stages either way.
    pub async fn ensure_default_stages(&self, owner: &str) -> BoardResult<Vec<Stage>> {
        let existing = self.list_stages(owner).await?;
        if !existing.is_empty() {
            debug!(owner, count = existing.len(), "stages already present, skipping seed");
            return Ok(existing);
        }

        let now = self.clock.now();
        let seed: Vec<Stage> = DEFAULT_STAGES
            .iter()
            .enumerate()
            .map(|(position, d)| Stage {
                id: Uuid::new_v4(),
                owner_id: owner.to_string(),
                key: d.key.to_string(),
                name: d.name.to_string(),
                icon: d.icon.to_string(),
                color: d.color,
                position: position as i32,
                is_default: true,
                created_at: now,
            })
            .collect();

        let mut inserted = self
            .client
            .insert_stages(&seed)
            .await
            .map_err(BoardError::Persistence)?;
        inserted.sort_by_key(|s| s.position);
        info!(owner, count = inserted.len(), "seeded default stages");
        Ok(inserted)
    }

    pub async fn create_stage(&self, owner: &str, new: NewStage) -> BoardResult<Stage> {
        let name = check_name(&new.name)?;
        let key = derive_key(&name)?;
        let existing = self.list_stages(owner).await?;
        if existing.iter().any(|s| s.key == key) {
            return Err(BoardError::StageKeyConflict { key });
        }

        let position = new
            .position
            .unwrap_or_else(|| existing.iter().map(|s| s.position + 1).max().unwrap_or(0));
        let stage = Stage {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            key,
            name,
            icon: new.icon.trim().to_string(),
            color: new.color,
            position,
            is_default: false,
            created_at: self.clock.now(),
        };

        let created = self
            .client
            .insert_stage(&stage)
            .await
            .map_err(BoardError::Persistence)?;
        info!(owner, key = %created.key, position = created.position, "created stage");
        Ok(created)
    }

    /// Update a stage in place. A new name re-derives the key, re-checks it for
    /// collisions, and moves the owner's leads that reference the stage by its
    /// old key, old name, or id onto the new key in the same transaction.
    pub async fn update_stage(&self, stage_id: Uuid, patch: StagePatch) -> BoardResult<StageUpdate> {
        let current = self.get_stage(stage_id).await?;
        let mut record = StageRecordPatch {
            icon: patch.icon.map(|i| i.trim().to_string()),
            color: patch.color,
            position: patch.position,
            ..StageRecordPatch::default()
        };

        if let Some(raw_name) = &patch.name {
            let name = check_name(raw_name)?;
            let key = derive_key(&name)?;
            if key != current.key {
                let siblings = self.list_stages(&current.owner_id).await?;
                if siblings.iter().any(|s| s.id != stage_id && s.key == key) {
                    return Err(BoardError::StageKeyConflict { key });
                }
                record.key = Some(key);
            }
            record.name = Some(name);
        }

        let renamed =
            record.key.is_some() || record.name.as_ref().is_some_and(|n| *n != current.name);
        let (updated, leads_moved) = if renamed {
            self.client
                .rename_stage(stage_id, &record, &stage_refs(&current), self.clock.now())
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::StageNotFound { id: stage_id })?
        } else {
            let updated = self
                .client
                .update_stage_record(stage_id, &record)
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::StageNotFound { id: stage_id })?;
            (updated, 0)
        };

        info!(
            owner = %updated.owner_id,
            key = %updated.key,
            previous_key = %current.key,
            leads_moved,
            "updated stage"
        );
        Ok(StageUpdate {
            stage: updated,
            previous_key: current.key,
            leads_moved,
        })
    }

    /// Delete a stage, first moving its leads to `reassign_to` when it has any.
    pub async fn delete_stage(
        &self,
        stage_id: Uuid,
        reassign_to: Option<Uuid>,
    ) -> BoardResult<StageDeletion> {
        let stage = self.get_stage(stage_id).await?;
        let owner = stage.owner_id.clone();

        let target = match reassign_to {
            Some(target_id) => {
                let target = self
                    .client
                    .fetch_stage(target_id)
                    .await
                    .map_err(BoardError::Persistence)?;
                match target {
                    Some(t) if t.owner_id == owner && t.id != stage.id => Some(t),
                    _ => return Err(BoardError::InvalidReassignTarget { id: target_id }),
                }
            }
            None => None,
        };

        let refs = stage_refs(&stage);
        let attached = self
            .client
            .fetch_leads(&owner)
            .await
            .map_err(BoardError::Persistence)?
            .iter()
            .filter(|l| refs.contains(&l.stage_key))
            .count();

        let mut leads_moved = 0;
        if attached > 0 {
            let Some(target) = &target else {
                return Err(BoardError::StageNotEmpty {
                    key: stage.key.clone(),
                    leads: attached,
                });
            };
            leads_moved = self
                .client
                .reassign_leads_by_stage(&owner, &refs, &target.key, self.clock.now())
                .await
                .map_err(BoardError::Persistence)?;
        }

        let removed = self
            .client
            .delete_stage_record(stage_id)
            .await
            .map_err(BoardError::Persistence)?;
        if !removed {
            return Err(BoardError::StageNotFound { id: stage_id });
        }

        info!(owner = %owner, key = %stage.key, leads_moved, "deleted stage");
        Ok(StageDeletion {
            reassigned_to: target.map(|t| t.key),
            deleted: stage,
            leads_moved,
        })
    }

    /// Renumber positions 0..n in the given order. `ordered_ids` must be exactly the owner's stages.
    pub async fn reorder_stages(&self, owner: &str, ordered_ids: &[Uuid]) -> BoardResult<Vec<Stage>> {
        let existing = self.list_stages(owner).await?;
        let mut expected: Vec<Uuid> = existing.iter().map(|s| s.id).collect();
        let mut given = ordered_ids.to_vec();
        expected.sort();
        given.sort();
        if expected != given {
            return Err(BoardError::validation(
                "stage order",
                "must list every stage of the owner exactly once",
            ));
        }

        for (position, id) in ordered_ids.iter().enumerate() {
            let position = position as i32;
            let unchanged = existing
                .iter()
                .any(|s| s.id == *id && s.position == position);
            if unchanged {
                continue;
            }
            let record = StageRecordPatch {
                position: Some(position),
                ..StageRecordPatch::default()
            };
            self.client
                .update_stage_record(*id, &record)
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::StageNotFound { id: *id })?;
        }

        info!(owner, count = ordered_ids.len(), "reordered stages");
        self.list_stages(owner).await
    }

    async fn get_stage(&self, stage_id: Uuid) -> BoardResult<Stage> {
        self.client
            .fetch_stage(stage_id)
            .await
            .map_err(BoardError::Persistence)?
            .ok_or(BoardError::StageNotFound { id: stage_id })
    }
}

/// Stage references a lead row may hold: the key, plus legacy name and id.
pub fn stage_refs(stage: &Stage) -> Vec<String> {
    let mut refs = vec![stage.key.clone()];
    for legacy in [stage.name.clone(), stage.id.to_string()] {
        if !refs.contains(&legacy) {
            refs.push(legacy);
        }
    }
    refs
}

pub(crate) fn check_owner(owner: &str) -> BoardResult<()> {
    if owner.trim().is_empty() {
        return Err(BoardError::InvalidOwner {
            owner: owner.to_string(),
        });
    }
    Ok(())
}

fn check_name(name: &str) -> BoardResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardError::validation("stage name", "must not be empty"));
    }
    Ok(name.to_string())
}

fn derive_key(name: &str) -> BoardResult<String> {
    let key = slugify(name);
    if key.is_empty() {
        return Err(BoardError::validation(
            "stage name",
            format!("'{}' has no letters or digits to build a key from", name),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::clock::FixedClock;
    use crate::board::db::DbHandle;
    use crate::board::models::{Lead, StageColor};
    use crate::errors::ErrorKind;
    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    fn registry() -> Result<(StageRegistry, DbHandle)> {
        let db = DbHandle::in_memory()?;
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 28, 12, 0, 0).unwrap());
        Ok((StageRegistry::new(Arc::new(db.clone()), Arc::new(clock)), db))
    }

    fn new_stage(name: &str) -> NewStage {
        NewStage {
            name: name.into(),
            icon: "⭐".into(),
            color: StageColor::Red,
            position: None,
        }
    }

    async fn add_lead(db: &DbHandle, owner: &str, stage_key: &str) -> Result<Lead> {
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            name: "Ana Silva".into(),
            company: None,
            email: None,
            contact_number: None,
            estimated_value: 0.0,
            next_action: None,
            stage_key: stage_key.into(),
            interactions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        db.insert_lead(&lead).await
    }

    #[tokio::test]
    async fn ensure_default_stages_seeds_six_once() -> Result<()> {
        let (registry, _db) = registry()?;

        let first = registry.ensure_default_stages("u1").await?;
        let second = registry.ensure_default_stages("u1").await?;
        assert_eq!(first.len(), 6);
        assert_eq!(second.len(), 6);

        let stages = registry.list_stages("u1").await?;
        assert_eq!(stages.len(), 6);
        let positions: Vec<i32> = stages.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
        assert!(stages.iter().all(|s| s.is_default));
        assert_eq!(stages[0].key, "lead");
        assert_eq!(stages[0].name, "Lead Gerado");
        assert_eq!(stages[5].key, "closed");
        Ok(())
    }

    #[tokio::test]
    async fn ensure_default_stages_leaves_custom_sets_alone() -> Result<()> {
        let (registry, _db) = registry()?;
        registry.create_stage("u1", new_stage("Inbox")).await?;

        let stages = registry.ensure_default_stages("u1").await?;
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].key, "inbox");
        Ok(())
    }

    #[tokio::test]
    async fn blank_owner_is_not_found() -> Result<()> {
        let (registry, _db) = registry()?;
        let err = registry.list_stages("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // An owner with no stages is a valid, empty result.
        assert!(registry.list_stages("u1").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn create_stage_rejects_slug_collision() -> Result<()> {
        let (registry, _db) = registry()?;
        let created = registry
            .create_stage("u1", new_stage("Diagnóstico Inicial"))
            .await?;
        assert_eq!(created.key, "diagnostico-inicial");
        assert!(!created.is_default);

        let err = registry
            .create_stage("u1", new_stage("Diagnostico Inicial!!"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(err, BoardError::StageKeyConflict { ref key } if key == "diagnostico-inicial"));

        // Another owner may reuse the key.
        registry
            .create_stage("u2", new_stage("Diagnostico Inicial"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn create_stage_appends_when_position_omitted() -> Result<()> {
        let (registry, _db) = registry()?;
        registry.ensure_default_stages("u1").await?;
        let created = registry.create_stage("u1", new_stage("Perdido")).await?;
        assert_eq!(created.position, 6);

        let explicit = registry
            .create_stage(
                "u1",
                NewStage {
                    position: Some(2),
                    ..new_stage("Follow up")
                },
            )
            .await?;
        assert_eq!(explicit.position, 2);
        Ok(())
    }

    #[tokio::test]
    async fn create_stage_requires_a_sluggable_name() -> Result<()> {
        let (registry, _db) = registry()?;
        for name in ["", "   ", "!!!"] {
            let err = registry.create_stage("u1", new_stage(name)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "name {:?}", name);
        }
        Ok(())
    }

    #[tokio::test]
    async fn rename_rederives_key_and_moves_leads() -> Result<()> {
        let (registry, db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let proposal = stages.iter().find(|s| s.key == "proposal").unwrap().clone();
        add_lead(&db, "u1", "proposal").await?;

        let update = registry
            .update_stage(
                proposal.id,
                StagePatch {
                    name: Some("Proposta Enviada".into()),
                    ..StagePatch::default()
                },
            )
            .await?;
        assert!(update.key_changed());
        assert_eq!(update.stage.key, "proposta-enviada");
        assert_eq!(update.leads_moved, 1);

        let leads = db.fetch_leads("u1").await?;
        assert_eq!(leads[0].stage_key, "proposta-enviada");
        Ok(())
    }

    #[tokio::test]
    async fn rename_carries_leads_stored_under_the_old_name() -> Result<()> {
        let (registry, db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let proposal = stages.iter().find(|s| s.key == "proposal").unwrap().clone();
        add_lead(&db, "u1", "Proposta").await?;
        add_lead(&db, "u1", &proposal.id.to_string()).await?;
        add_lead(&db, "u1", "lead").await?;

        let update = registry
            .update_stage(
                proposal.id,
                StagePatch {
                    name: Some("Proposta Enviada".into()),
                    ..StagePatch::default()
                },
            )
            .await?;
        assert_eq!(update.leads_moved, 2);

        let leads = db.fetch_leads("u1").await?;
        let moved = leads
            .iter()
            .filter(|l| l.stage_key == "proposta-enviada")
            .count();
        assert_eq!(moved, 2);
        assert!(leads.iter().any(|l| l.stage_key == "lead"));
        Ok(())
    }

    #[tokio::test]
    async fn rename_into_existing_key_conflicts() -> Result<()> {
        let (registry, _db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let err = registry
            .update_stage(
                stages[1].id,
                StagePatch {
                    name: Some("Closed".into()),
                    ..StagePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        Ok(())
    }

    #[tokio::test]
    async fn cosmetic_update_keeps_key() -> Result<()> {
        let (registry, _db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let update = registry
            .update_stage(
                stages[0].id,
                StagePatch {
                    name: Some("  LEAD  ".into()),
                    color: Some(StageColor::Pink),
                    ..StagePatch::default()
                },
            )
            .await?;
        assert!(!update.key_changed());
        assert_eq!(update.stage.name, "LEAD");
        assert_eq!(update.stage.color, StageColor::Pink);
        assert_eq!(update.leads_moved, 0);
        Ok(())
    }

    #[tokio::test]
    async fn update_unknown_stage_is_not_found() -> Result<()> {
        let (registry, _db) = registry()?;
        let err = registry
            .update_stage(Uuid::new_v4(), StagePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn delete_empty_stage_needs_no_target() -> Result<()> {
        let (registry, _db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let deletion = registry.delete_stage(stages[2].id, None).await?;
        assert_eq!(deletion.deleted.key, "diagnostic");
        assert_eq!(deletion.leads_moved, 0);
        assert_eq!(registry.list_stages("u1").await?.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn delete_populated_stage_without_target_conflicts() -> Result<()> {
        let (registry, db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        add_lead(&db, "u1", "qualified").await?;

        let err = registry.delete_stage(stages[1].id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(err, BoardError::StageNotEmpty { leads: 1, .. }));
        assert_eq!(registry.list_stages("u1").await?.len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn delete_populated_stage_reassigns_first() -> Result<()> {
        let (registry, db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        add_lead(&db, "u1", "qualified").await?;
        // Legacy row that still references the display name.
        add_lead(&db, "u1", "Qualificado").await?;

        let deletion = registry
            .delete_stage(stages[1].id, Some(stages[3].id))
            .await?;
        assert_eq!(deletion.leads_moved, 2);
        assert_eq!(deletion.reassigned_to.as_deref(), Some("proposal"));

        let leads = db.fetch_leads("u1").await?;
        assert!(leads.iter().all(|l| l.stage_key == "proposal"));
        Ok(())
    }

    #[tokio::test]
    async fn reassign_target_must_share_owner() -> Result<()> {
        let (registry, _db) = registry()?;
        let mine = registry.ensure_default_stages("u1").await?;
        let theirs = registry.ensure_default_stages("u2").await?;

        let err = registry
            .delete_stage(mine[0].id, Some(theirs[1].id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = registry
            .delete_stage(mine[0].id, Some(mine[0].id))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidReassignTarget { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn reorder_renumbers_contiguously() -> Result<()> {
        let (registry, _db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        registry.delete_stage(stages[2].id, None).await?;

        let mut order: Vec<Uuid> = registry
            .list_stages("u1")
            .await?
            .iter()
            .map(|s| s.id)
            .collect();
        order.reverse();

        let reordered = registry.reorder_stages("u1", &order).await?;
        let keys: Vec<&str> = reordered.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["closed", "negotiation", "proposal", "qualified", "lead"]);
        let positions: Vec<i32> = reordered.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn reorder_rejects_partial_lists() -> Result<()> {
        let (registry, _db) = registry()?;
        let stages = registry.ensure_default_stages("u1").await?;
        let partial: Vec<Uuid> = stages.iter().take(3).map(|s| s.id).collect();
        let err = registry.reorder_stages("u1", &partial).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[test]
    fn stage_refs_include_legacy_forms() {
        let stage = Stage {
            id: Uuid::nil(),
            owner_id: "u1".into(),
            key: "proposal".into(),
            name: "Proposta".into(),
            icon: String::new(),
            color: StageColor::Orange,
            position: 3,
            is_default: true,
            created_at: Utc::now(),
        };
        assert_eq!(
            stage_refs(&stage),
            vec!["proposal".to_string(), "Proposta".to_string(), Uuid::nil().to_string()]
        );
    }
}
