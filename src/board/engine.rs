//! Sync engine: keeps the in-memory board consistent with the backing store.
//!
//! Mutations follow one of two shapes:
//!
//! ```text
//! change_stage:  Idle → Pending (optimistic move applied) ─ok──> Idle
//!                                                         └err─> Reconciling (load_all) → Idle
//! create/update/delete/add_interaction:
//!                Idle → Pending ─ok──> store patched → Idle
//!                               └err─> error surfaced, store untouched → Idle
//! ```
//!
//! The store lock is never held across a persistence call. Two mutations of
//! the same lead may reach the backend in either order; a reconciling reload
//! re-establishes whatever the backend recorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::PersistenceClient;
use super::clock::Clock;
use super::events::{BoardEvent, EVENT_CHANNEL_CAPACITY, publish};
use super::identity::IdentityProvider;
use super::models::{
    Interaction, InteractionKind, Lead, LeadCard, LeadPatch, NewLead, NewStage, Stage, StagePatch,
    non_blank,
};
use super::stages::{StageDeletion, StageRegistry, StageUpdate, check_owner};
use super::store::{LeadStore, group_leads, intake_stage};
use crate::errors::{BoardError, BoardResult, LoadPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
    Reconciling,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Pending => write!(f, "pending"),
            SyncState::Reconciling => write!(f, "reconciling"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Stage key new leads land in. Falls back to the first default stage.
    pub intake_stage: Option<String>,
    /// Seed the default stages when a session opens for an owner with none.
    pub seed_defaults: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            intake_stage: None,
            seed_defaults: true,
        }
    }
}

pub struct SyncEngine {
    client: Arc<dyn PersistenceClient>,
    registry: StageRegistry,
    clock: Arc<dyn Clock>,
    store: RwLock<LeadStore>,
    pending: AtomicUsize,
    reconciling: AtomicBool,
    events: broadcast::Sender<BoardEvent>,
    options: EngineOptions,
}

/// Counts an in-flight persistence call for `SyncEngine::state`.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(client: Arc<dyn PersistenceClient>, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(client, clock, EngineOptions::default())
    }

    pub fn with_options(
        client: Arc<dyn PersistenceClient>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: StageRegistry::new(client.clone(), clock.clone()),
            client,
            clock,
            store: RwLock::new(LeadStore::default()),
            pending: AtomicUsize::new(0),
            reconciling: AtomicBool::new(false),
            events,
            options,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SyncState {
        if self.reconciling.load(Ordering::SeqCst) {
            SyncState::Reconciling
        } else if self.pending.load(Ordering::SeqCst) > 0 {
            SyncState::Pending
        } else {
            SyncState::Idle
        }
    }

    /// Read-only copy of the current board.
    pub async fn snapshot(&self) -> LeadStore {
        self.store.read().await.clone()
    }

    /// Resolve the owner from `identity`, seed stages if configured, and load.
    /// Returns `None` without touching the store when there is no valid session.
    pub async fn open_session(
        &self,
        identity: &dyn IdentityProvider,
    ) -> BoardResult<Option<LeadStore>> {
        let owner = match identity.current_owner() {
            Some(owner) if identity.session_valid() => owner,
            _ => {
                debug!("no authenticated owner, nothing to load");
                return Ok(None);
            }
        };
        if self.options.seed_defaults {
            self.registry.ensure_default_stages(&owner).await?;
        }
        self.load_all(&owner).await.map(Some)
    }

    /// Fetch stages and leads concurrently and replace the whole store.
    /// If either fetch fails the previous store is kept as is.
    pub async fn load_all(&self, owner: &str) -> BoardResult<LeadStore> {
        check_owner(owner)?;
        let (stages, leads) = tokio::join!(
            self.registry.list_stages(owner),
            self.client.fetch_leads(owner)
        );

        let (stages, leads) = match (stages, leads) {
            (Ok(stages), Ok(leads)) => (stages, leads),
            (Err(stage_err), Ok(_)) => {
                warn!(owner, error = %stage_err, "stage fetch failed, keeping previous board");
                return Err(BoardError::PartialLoad {
                    part: LoadPart::Stages,
                    source: stage_err.into(),
                });
            }
            (Ok(_), Err(lead_err)) => {
                warn!(owner, error = %lead_err, "lead fetch failed, keeping previous board");
                return Err(BoardError::PartialLoad {
                    part: LoadPart::Leads,
                    source: lead_err,
                });
            }
            (Err(stage_err), Err(lead_err)) => {
                warn!(owner, error = %stage_err, "stage and lead fetches failed");
                return Err(BoardError::PartialLoad {
                    part: LoadPart::Both,
                    source: lead_err.context(stage_err.to_string()),
                });
            }
        };

        let grouped = group_leads(&leads, &stages, self.clock.now()).for_owner(owner);
        {
            let mut store = self.store.write().await;
            *store = grouped.clone();
        }
        info!(owner, stages = stages.len(), leads = leads.len(), "loaded board");
        publish(
            &self.events,
            BoardEvent::Loaded {
                owner: owner.to_string(),
                stage_count: stages.len(),
                lead_count: leads.len(),
            },
        );
        Ok(grouped)
    }

    // ── Leads ─────────────────────────────────────────────────────────

    /// Move a lead between stages, optimistically. On persistence failure the
    /// board is reloaded from the backing store and the error is returned.
    pub async fn change_stage(&self, lead_id: Uuid, from: &str, to: &str) -> BoardResult<()> {
        if from == to {
            debug!(%lead_id, stage = from, "move within the same stage, nothing to do");
            return Ok(());
        }

        let owner = {
            let mut store = self.store.write().await;
            if store.stage(to).is_none() {
                return Err(BoardError::StageKeyNotFound { key: to.to_string() });
            }
            if !store.move_lead(lead_id, from, to) {
                return Err(BoardError::LeadNotFound { id: lead_id });
            }
            store.owner.clone().unwrap_or_default()
        };
        debug!(%lead_id, from, to, "applied optimistic move");
        publish(
            &self.events,
            BoardEvent::LeadMoved {
                lead_id,
                from_stage: from.to_string(),
                to_stage: to.to_string(),
            },
        );

        let result = {
            let _pending = PendingGuard::enter(&self.pending);
            self.client
                .update_lead_record(lead_id, &LeadPatch::stage_only(to), self.clock.now())
                .await
        };

        match result {
            Ok(Some(lead)) => {
                self.store.write().await.replace(lead);
                info!(%lead_id, from, to, "moved lead");
                Ok(())
            }
            Ok(None) => {
                warn!(%lead_id, "lead vanished while moving, reconciling");
                self.reconcile(&owner).await;
                Err(BoardError::LeadNotFound { id: lead_id })
            }
            Err(e) => {
                warn!(%lead_id, from, to, error = %e, "move failed, reconciling");
                self.reconcile(&owner).await;
                Err(BoardError::Persistence(e))
            }
        }
    }

    pub async fn create_lead(&self, owner: &str, new: NewLead) -> BoardResult<Lead> {
        check_owner(owner)?;
        let name = required_name(&new.name)?;
        check_value(new.estimated_value)?;

        let stages = self.stages_for(owner).await?;
        let refs: Vec<&Stage> = stages.iter().collect();
        let landing = match new.stage_key.as_deref() {
            Some(key) => refs
                .iter()
                .copied()
                .find(|s| s.key == key)
                .ok_or_else(|| BoardError::StageKeyNotFound { key: key.to_string() })?,
            None => intake_stage(&refs, self.options.intake_stage.as_deref()).ok_or_else(
                || BoardError::validation("stage", "owner has no pipeline stages yet"),
            )?,
        };

        let now = self.clock.now();
        let lead = Lead {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            name,
            company: new.company.as_deref().and_then(non_blank),
            email: new.email.as_deref().and_then(non_blank),
            contact_number: new.contact_number.as_deref().and_then(non_blank),
            estimated_value: new.estimated_value,
            next_action: new.next_action.as_deref().and_then(non_blank),
            stage_key: landing.key.clone(),
            interactions: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let created = {
            let _pending = PendingGuard::enter(&self.pending);
            self.client
                .insert_lead(&lead)
                .await
                .map_err(BoardError::Persistence)?
        };

        {
            let mut store = self.store.write().await;
            if store.is_loaded_for(owner) {
                let card = LeadCard {
                    lead: created.clone(),
                    age_in_days: 0,
                };
                store.prepend(&created.stage_key, card);
            }
        }
        info!(owner, lead_id = %created.id, stage = %created.stage_key, "created lead");
        publish(
            &self.events,
            BoardEvent::LeadCreated {
                lead: created.clone(),
            },
        );
        Ok(created)
    }

    /// Update lead fields. The lead changes bucket only if `patch` names a new stage.
    pub async fn update_lead(&self, lead_id: Uuid, mut patch: LeadPatch) -> BoardResult<Lead> {
        if let Some(name) = &patch.name {
            patch.name = Some(required_name(name)?);
        }
        if let Some(value) = patch.estimated_value {
            check_value(value)?;
        }
        if let Some(key) = &patch.stage_key {
            let lead = self
                .client
                .fetch_lead(lead_id)
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::LeadNotFound { id: lead_id })?;
            let stages = self.stages_for(&lead.owner_id).await?;
            if !stages.iter().any(|s| s.key == *key) {
                return Err(BoardError::StageKeyNotFound { key: key.clone() });
            }
        }

        let updated = {
            let _pending = PendingGuard::enter(&self.pending);
            self.client
                .update_lead_record(lead_id, &patch, self.clock.now())
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::LeadNotFound { id: lead_id })?
        };

        self.store.write().await.replace(updated.clone());
        info!(%lead_id, "updated lead");
        publish(
            &self.events,
            BoardEvent::LeadUpdated {
                lead: updated.clone(),
            },
        );
        Ok(updated)
    }

    pub async fn delete_lead(&self, lead_id: Uuid) -> BoardResult<()> {
        let removed = {
            let _pending = PendingGuard::enter(&self.pending);
            self.client
                .delete_lead_record(lead_id)
                .await
                .map_err(BoardError::Persistence)?
        };
        if !removed {
            return Err(BoardError::LeadNotFound { id: lead_id });
        }

        self.store.write().await.remove(lead_id);
        info!(%lead_id, "deleted lead");
        publish(&self.events, BoardEvent::LeadDeleted { lead_id });
        Ok(())
    }

    /// Append to a lead's contact history.
    pub async fn add_interaction(
        &self,
        lead_id: Uuid,
        kind: InteractionKind,
        description: &str,
        next_step: &str,
    ) -> BoardResult<Lead> {
        let description = description.trim();
        if description.is_empty() {
            return Err(BoardError::validation(
                "interaction description",
                "must not be empty",
            ));
        }
        let now = self.clock.now();
        let interaction = Interaction {
            at: now,
            kind,
            description: description.to_string(),
            next_step: next_step.trim().to_string(),
        };

        let updated = {
            let _pending = PendingGuard::enter(&self.pending);
            self.client
                .append_interaction(lead_id, &interaction, now)
                .await
                .map_err(BoardError::Persistence)?
                .ok_or(BoardError::LeadNotFound { id: lead_id })?
        };

        self.store.write().await.replace(updated.clone());
        info!(%lead_id, kind = kind.as_str(), "recorded interaction");
        publish(
            &self.events,
            BoardEvent::LeadUpdated {
                lead: updated.clone(),
            },
        );
        Ok(updated)
    }

    // ── Stages ────────────────────────────────────────────────────────

    pub async fn list_stages(&self, owner: &str) -> BoardResult<Vec<Stage>> {
        self.registry.list_stages(owner).await
    }

    pub async fn ensure_default_stages(&self, owner: &str) -> BoardResult<Vec<Stage>> {
        let stages = self.registry.ensure_default_stages(owner).await?;
        self.refresh(owner, false).await;
        Ok(stages)
    }

    pub async fn create_stage(&self, owner: &str, new: NewStage) -> BoardResult<Stage> {
        let stage = self.registry.create_stage(owner, new).await?;
        self.refresh(owner, false).await;
        Ok(stage)
    }

    pub async fn update_stage(&self, stage_id: Uuid, patch: StagePatch) -> BoardResult<StageUpdate> {
        let update = self.registry.update_stage(stage_id, patch).await?;
        self.refresh(&update.stage.owner_id, update.leads_moved > 0)
            .await;
        Ok(update)
    }

    pub async fn delete_stage(
        &self,
        stage_id: Uuid,
        reassign_to: Option<Uuid>,
    ) -> BoardResult<StageDeletion> {
        let deletion = self.registry.delete_stage(stage_id, reassign_to).await?;
        self.refresh(&deletion.deleted.owner_id, deletion.leads_moved > 0)
            .await;
        Ok(deletion)
    }

    pub async fn reorder_stages(&self, owner: &str, ordered_ids: &[Uuid]) -> BoardResult<Vec<Stage>> {
        let stages = self.registry.reorder_stages(owner, ordered_ids).await?;
        self.refresh(owner, false).await;
        Ok(stages)
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// Stages for `owner`, from the loaded store when possible.
    async fn stages_for(&self, owner: &str) -> BoardResult<Vec<Stage>> {
        {
            let store = self.store.read().await;
            if store.is_loaded_for(owner) {
                return Ok(store.stages());
            }
        }
        self.registry.list_stages(owner).await
    }

    /// Re-bucket the loaded leads under a fresh stage list.
    async fn regroup(&self, owner: &str) -> BoardResult<()> {
        if !self.store.read().await.is_loaded_for(owner) {
            return Ok(());
        }
        let stages = self.registry.list_stages(owner).await?;
        {
            let mut store = self.store.write().await;
            if !store.is_loaded_for(owner) {
                return Ok(());
            }
            let leads = store.all_leads();
            *store = group_leads(&leads, &stages, self.clock.now()).for_owner(owner);
        }
        debug!(owner, stages = stages.len(), "regrouped board");
        publish(&self.events, BoardEvent::StagesChanged { stages });
        Ok(())
    }

    async fn reload_if_loaded(&self, owner: &str) -> BoardResult<()> {
        if self.store.read().await.is_loaded_for(owner) {
            self.load_all(owner).await?;
        }
        Ok(())
    }

    /// Bring the loaded board in line after a committed stage change: a full
    /// reload when leads moved, a regroup otherwise. A failure here is logged
    /// and leaves the board stale until the next load.
    async fn refresh(&self, owner: &str, leads_moved: bool) {
        let result = if leads_moved {
            self.reload_if_loaded(owner).await
        } else {
            self.regroup(owner).await
        };
        if let Err(e) = result {
            warn!(owner, error = %e, "board refresh after stage change failed");
        }
    }

    /// Discard speculative state by reloading. A failed reload is logged; the
    /// caller still reports the original error.
    async fn reconcile(&self, owner: &str) {
        if owner.is_empty() {
            return;
        }
        self.reconciling.store(true, Ordering::SeqCst);
        match self.load_all(owner).await {
            Ok(_) => {
                info!(owner, "reconciled board with backing store");
                publish(
                    &self.events,
                    BoardEvent::Reconciled {
                        owner: owner.to_string(),
                    },
                );
            }
            Err(e) => warn!(owner, error = %e, "reconciling reload failed"),
        }
        self.reconciling.store(false, Ordering::SeqCst);
    }
}

fn required_name(name: &str) -> BoardResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardError::validation("name", "must not be empty"));
    }
    Ok(name.to_string())
}

fn check_value(value: f64) -> BoardResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(BoardError::validation(
            "estimated value",
            format!("must be a non-negative amount, got {}", value),
        ));
    }
    Ok(())
}
