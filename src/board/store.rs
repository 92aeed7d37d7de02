//! In-memory board: leads grouped into per-stage buckets.
//!
//! A `LeadStore` is always derived from a flat lead list plus the owner's
//! stage list via [`group_leads`]; it is never persisted. The sync engine
//! owns the only mutable instance and hands out clones for rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{BoardSummary, Lead, LeadCard, Stage, StageSummary};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days between `created_at` and `now`, floored. Future timestamps count as 0.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (now - created_at).num_seconds();
    seconds.div_euclid(SECONDS_PER_DAY).max(0)
}

/// Resolve a lead's stage reference against `stages` (sorted by position).
///
/// Order: exact key, then display name, then stage id, then the first stage.
/// The name and id rungs only exist for rows written before keys were canonical.
pub fn resolve_stage<'a>(stage_ref: &str, stages: &'a [Stage]) -> Option<&'a Stage> {
    stages
        .iter()
        .find(|s| s.key == stage_ref)
        .or_else(|| stages.iter().find(|s| s.name == stage_ref))
        .or_else(|| stages.iter().find(|s| s.id.to_string() == stage_ref))
        .or_else(|| stages.first())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bucket {
    pub stage: Stage,
    pub leads: Vec<LeadCard>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeadStore {
    pub owner: Option<String>,
    buckets: Vec<Bucket>,
    /// Leads that could not be placed because the owner has no stages at all.
    unplaced: Vec<LeadCard>,
}

/// Group `leads` under `stages`. Pure: identical inputs and `now` give an identical store.
///
/// Every stage gets a bucket, empty or not, in position order. Each lead lands
/// in exactly one bucket, keeping its order from `leads`.
pub fn group_leads(leads: &[Lead], stages: &[Stage], now: DateTime<Utc>) -> LeadStore {
    let mut ordered = stages.to_vec();
    ordered.sort_by_key(|s| s.position);

    let mut store = LeadStore {
        owner: None,
        buckets: ordered
            .iter()
            .map(|stage| Bucket {
                stage: stage.clone(),
                leads: Vec::new(),
            })
            .collect(),
        unplaced: Vec::new(),
    };

    for lead in leads {
        let card = LeadCard {
            lead: lead.clone(),
            age_in_days: age_in_days(lead.created_at, now),
        };
        match resolve_stage(&lead.stage_key, &ordered) {
            Some(stage) => {
                let key = stage.key.clone();
                if let Some(bucket) = store.bucket_mut(&key) {
                    bucket.leads.push(card);
                }
            }
            None => store.unplaced.push(card),
        }
    }
    store
}

impl LeadStore {
    pub fn for_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn is_loaded_for(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.buckets.iter().map(|b| b.stage.clone()).collect()
    }

    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.bucket(key).map(|b| &b.stage)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, key: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.stage.key == key)
    }

    fn bucket_mut(&mut self, key: &str) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.stage.key == key)
    }

    pub fn leads_in(&self, key: &str) -> &[LeadCard] {
        self.bucket(key).map(|b| b.leads.as_slice()).unwrap_or(&[])
    }

    pub fn unplaced(&self) -> &[LeadCard] {
        &self.unplaced
    }

    /// Flat lead list, bucket by bucket. Feed back into `group_leads` to regroup.
    pub fn all_leads(&self) -> Vec<Lead> {
        self.buckets
            .iter()
            .flat_map(|b| b.leads.iter())
            .chain(self.unplaced.iter())
            .map(|c| c.lead.clone())
            .collect()
    }

    pub fn lead_count(&self) -> usize {
        self.buckets.iter().map(|b| b.leads.len()).sum::<usize>() + self.unplaced.len()
    }

    /// Locate a lead by id across every bucket, then among the unplaced.
    /// The stage is `None` for an unplaced lead.
    pub fn find(&self, id: Uuid) -> Option<(Option<&Stage>, &LeadCard)> {
        self.cards().find(|(_, c)| c.lead.id == id)
    }

    /// Every card with its bucket's stage, bucket by bucket, unplaced last.
    pub fn cards(&self) -> impl Iterator<Item = (Option<&Stage>, &LeadCard)> {
        self.buckets
            .iter()
            .flat_map(|b| b.leads.iter().map(move |c| (Some(&b.stage), c)))
            .chain(self.unplaced.iter().map(|c| (None, c)))
    }

    /// Landing stage for new leads: `preferred` if present, else the first
    /// default-seeded stage, else the first stage.
    pub fn intake_stage(&self, preferred: Option<&str>) -> Option<&Stage> {
        intake_stage(&self.buckets.iter().map(|b| &b.stage).collect::<Vec<_>>(), preferred)
    }

    pub fn prepend(&mut self, key: &str, card: LeadCard) -> bool {
        match self.bucket_mut(key) {
            Some(bucket) => {
                bucket.leads.insert(0, card);
                true
            }
            None => false,
        }
    }

    /// Take a lead off the board. Returns the key of the bucket it sat in, or
    /// its stored stage reference if it was unplaced.
    pub fn remove(&mut self, id: Uuid) -> Option<(String, LeadCard)> {
        for bucket in &mut self.buckets {
            if let Some(idx) = bucket.leads.iter().position(|c| c.lead.id == id) {
                let card = bucket.leads.remove(idx);
                return Some((bucket.stage.key.clone(), card));
            }
        }
        let idx = self.unplaced.iter().position(|c| c.lead.id == id)?;
        let card = self.unplaced.remove(idx);
        Some((card.lead.stage_key.clone(), card))
    }

    /// Move a lead into the `to` bucket, appending it. Looks in `from` first,
    /// then everywhere. Returns false if the lead or the target bucket is unknown.
    pub fn move_lead(&mut self, id: Uuid, from: &str, to: &str) -> bool {
        if self.bucket(to).is_none() {
            return false;
        }
        let taken = self
            .bucket_mut(from)
            .and_then(|b| {
                b.leads
                    .iter()
                    .position(|c| c.lead.id == id)
                    .map(|idx| b.leads.remove(idx))
            })
            .or_else(|| self.remove(id).map(|(_, card)| card));
        let Some(mut card) = taken else {
            return false;
        };
        card.lead.stage_key = to.to_string();
        if let Some(bucket) = self.bucket_mut(to) {
            bucket.leads.push(card);
        }
        true
    }

    /// Replace a lead's fields in place, keeping its age. If its stage key now
    /// names a different bucket, it moves there.
    pub fn replace(&mut self, lead: Lead) -> bool {
        if let Some(slot) = self.unplaced.iter_mut().find(|c| c.lead.id == lead.id) {
            slot.lead = lead;
            return true;
        }
        let Some((current_key, mut card)) = self.peek_key_and_card(lead.id) else {
            return false;
        };
        card.lead = lead;
        if card.lead.stage_key != current_key && self.bucket(&card.lead.stage_key).is_some() {
            let target = card.lead.stage_key.clone();
            self.remove(card.lead.id);
            if let Some(bucket) = self.bucket_mut(&target) {
                bucket.leads.push(card);
            }
            return true;
        }
        for bucket in &mut self.buckets {
            if let Some(slot) = bucket.leads.iter_mut().find(|c| c.lead.id == card.lead.id) {
                *slot = card;
                return true;
            }
        }
        false
    }

    fn peek_key_and_card(&self, id: Uuid) -> Option<(String, LeadCard)> {
        let (stage, card) = self.find(id)?;
        Some((stage?.key.clone(), card.clone()))
    }

    /// Case-insensitive substring search over name, company, email, and
    /// contact number. A blank term matches nothing.
    pub fn search(&self, term: &str) -> Vec<(Option<&Stage>, &LeadCard)> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(&needle));
        self.cards()
            .filter(|(_, c)| {
                hit(Some(c.lead.name.as_str()))
                    || hit(c.lead.company.as_deref())
                    || hit(c.lead.email.as_deref())
                    || hit(c.lead.contact_number.as_deref())
            })
            .collect()
    }

    pub fn summary(&self) -> BoardSummary {
        let stages: Vec<StageSummary> = self
            .buckets
            .iter()
            .map(|b| StageSummary {
                key: b.stage.key.clone(),
                name: b.stage.name.clone(),
                lead_count: b.leads.len(),
                total_value: b.leads.iter().map(|c| c.lead.estimated_value).sum(),
            })
            .collect();
        BoardSummary {
            lead_count: stages.iter().map(|s| s.lead_count).sum(),
            total_value: stages.iter().map(|s| s.total_value).sum(),
            stages,
        }
    }
}

pub(crate) fn intake_stage<'a>(stages: &[&'a Stage], preferred: Option<&str>) -> Option<&'a Stage> {
    if let Some(key) = preferred
        && let Some(stage) = stages.iter().copied().find(|s| s.key == key)
    {
        return Some(stage);
    }
    let mut ordered: Vec<&Stage> = stages.to_vec();
    ordered.sort_by_key(|s| s.position);
    ordered
        .iter()
        .find(|s| s.is_default)
        .or_else(|| ordered.first())
        .copied()
}
