use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::client::PersistenceClient;
use super::models::*;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BoardDb::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(BoardDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BoardDb {
    conn: Connection,
}

const STAGE_COLUMNS: &str = "id, owner_id, key, name, icon, color, position, is_default, created_at";
const LEAD_COLUMNS: &str = "id, owner_id, name, company, email, contact_number, estimated_value, next_action, stage_key, interactions, created_at, updated_at";

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS stages (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    name TEXT NOT NULL,
                    icon TEXT NOT NULL DEFAULT '',
                    color TEXT NOT NULL DEFAULT 'blue',
                    position INTEGER NOT NULL DEFAULT 0,
                    is_default INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    UNIQUE (owner_id, key)
                );

                CREATE TABLE IF NOT EXISTS leads (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    company TEXT,
                    email TEXT,
                    contact_number TEXT,
                    estimated_value REAL NOT NULL DEFAULT 0,
                    next_action TEXT,
                    stage_key TEXT NOT NULL,
                    interactions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_stages_owner ON stages(owner_id, position);
                CREATE INDEX IF NOT EXISTS idx_leads_owner ON leads(owner_id);
                CREATE INDEX IF NOT EXISTS idx_leads_stage ON leads(owner_id, stage_key);
                ",
            )
            .context("Failed to run migrations")?;
        Ok(())
    }

    // ── Stages ────────────────────────────────────────────────────────

    pub fn list_stages(&self, owner: &str) -> Result<Vec<Stage>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {STAGE_COLUMNS} FROM stages WHERE owner_id = ?1 ORDER BY position, rowid"
            ))
            .context("Failed to prepare list_stages")?;
        let rows = stmt
            .query_map(params![owner], StageRow::from_row)
            .context("Failed to query stages")?;
        let mut stages = Vec::new();
        for row in rows {
            stages.push(row.context("Failed to read stage row")?.into_stage()?);
        }
        Ok(stages)
    }

    pub fn get_stage(&self, id: Uuid) -> Result<Option<Stage>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {STAGE_COLUMNS} FROM stages WHERE id = ?1"),
                params![id.to_string()],
                StageRow::from_row,
            )
            .optional()
            .context("Failed to query stage")?;
        row.map(StageRow::into_stage).transpose()
    }

    pub fn insert_stage(&self, stage: &Stage) -> Result<Stage> {
        insert_stage_row(&self.conn, stage)?;
        self.get_stage(stage.id)?
            .context("Stage not found after insert")
    }

    pub fn insert_stages(&self, stages: &[Stage]) -> Result<Vec<Stage>> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        for stage in stages {
            insert_stage_row(&tx, stage)?;
        }
        tx.commit().context("Failed to commit stage batch")?;

        let mut inserted = Vec::with_capacity(stages.len());
        for stage in stages {
            inserted.push(
                self.get_stage(stage.id)?
                    .context("Stage not found after batch insert")?,
            );
        }
        Ok(inserted)
    }

    pub fn update_stage(&self, id: Uuid, patch: &StageRecordPatch) -> Result<Option<Stage>> {
        if self.get_stage(id)?.is_none() {
            return Ok(None);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        apply_stage_patch(&tx, id, patch)?;
        tx.commit().context("Failed to commit stage update")?;
        self.get_stage(id)
    }

    /// Patch a stage and move the leads that point at any of `from_refs` onto
    /// its resulting key. Both happen or neither does.
    pub fn rename_stage(
        &self,
        id: Uuid,
        patch: &StageRecordPatch,
        from_refs: &[String],
        at: DateTime<Utc>,
    ) -> Result<Option<(Stage, u64)>> {
        let Some(current) = self.get_stage(id)? else {
            return Ok(None);
        };
        let to_key = patch.key.as_deref().unwrap_or(&current.key);
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        apply_stage_patch(&tx, id, patch)?;
        let moved = reassign_lead_rows(&tx, &current.owner_id, from_refs, to_key, at)?;
        tx.commit().context("Failed to commit stage rename")?;
        Ok(self.get_stage(id)?.map(|stage| (stage, moved)))
    }

    pub fn delete_stage(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM stages WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete stage")?;
        Ok(count > 0)
    }

    // ── Leads ─────────────────────────────────────────────────────────

    pub fn list_leads(&self, owner: &str) -> Result<Vec<Lead>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
            ))
            .context("Failed to prepare list_leads")?;
        let rows = stmt
            .query_map(params![owner], LeadRow::from_row)
            .context("Failed to query leads")?;
        let mut leads = Vec::new();
        for row in rows {
            leads.push(row.context("Failed to read lead row")?.into_lead()?);
        }
        Ok(leads)
    }

    pub fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
                LeadRow::from_row,
            )
            .optional()
            .context("Failed to query lead")?;
        row.map(LeadRow::into_lead).transpose()
    }

    pub fn insert_lead(&self, lead: &Lead) -> Result<Lead> {
        let interactions =
            serde_json::to_string(&lead.interactions).context("Failed to encode interactions")?;
        self.conn
            .execute(
                "INSERT INTO leads (id, owner_id, name, company, email, contact_number, estimated_value, next_action, stage_key, interactions, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    lead.id.to_string(),
                    lead.owner_id,
                    lead.name,
                    lead.company,
                    lead.email,
                    lead.contact_number,
                    lead.estimated_value,
                    lead.next_action,
                    lead.stage_key,
                    interactions,
                    timestamp(&lead.created_at),
                    timestamp(&lead.updated_at),
                ],
            )
            .context("Failed to insert lead")?;
        self.get_lead(lead.id)?.context("Lead not found after insert")
    }

    pub fn update_lead(
        &self,
        id: Uuid,
        patch: &LeadPatch,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        let Some(mut lead) = self.get_lead(id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut lead);
        self.conn
            .execute(
                "UPDATE leads SET name = ?1, company = ?2, email = ?3, contact_number = ?4, estimated_value = ?5,
                 next_action = ?6, stage_key = ?7, updated_at = ?8 WHERE id = ?9",
                params![
                    lead.name,
                    lead.company,
                    lead.email,
                    lead.contact_number,
                    lead.estimated_value,
                    lead.next_action,
                    lead.stage_key,
                    timestamp(&at),
                    id.to_string(),
                ],
            )
            .context("Failed to update lead")?;
        self.get_lead(id)
    }

    pub fn delete_lead(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM leads WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete lead")?;
        Ok(count > 0)
    }

    pub fn reassign_leads(
        &self,
        owner: &str,
        from_refs: &[String],
        to_key: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let moved = reassign_lead_rows(&tx, owner, from_refs, to_key, at)?;
        tx.commit().context("Failed to commit lead reassignment")?;
        Ok(moved)
    }

    pub fn append_interaction(
        &self,
        id: Uuid,
        interaction: &Interaction,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        let Some(mut lead) = self.get_lead(id)? else {
            return Ok(None);
        };
        lead.interactions.push(interaction.clone());
        let interactions =
            serde_json::to_string(&lead.interactions).context("Failed to encode interactions")?;
        self.conn
            .execute(
                "UPDATE leads SET interactions = ?1, updated_at = ?2 WHERE id = ?3",
                params![interactions, timestamp(&at), id.to_string()],
            )
            .context("Failed to append interaction")?;
        self.get_lead(id)
    }
}

fn apply_stage_patch(conn: &Connection, id: Uuid, patch: &StageRecordPatch) -> Result<()> {
    let id_str = id.to_string();
    if let Some(key) = &patch.key {
        conn.execute(
            "UPDATE stages SET key = ?1 WHERE id = ?2",
            params![key, id_str],
        )
        .context("Failed to update stage key")?;
    }
    if let Some(name) = &patch.name {
        conn.execute(
            "UPDATE stages SET name = ?1 WHERE id = ?2",
            params![name, id_str],
        )
        .context("Failed to update stage name")?;
    }
    if let Some(icon) = &patch.icon {
        conn.execute(
            "UPDATE stages SET icon = ?1 WHERE id = ?2",
            params![icon, id_str],
        )
        .context("Failed to update stage icon")?;
    }
    if let Some(color) = &patch.color {
        conn.execute(
            "UPDATE stages SET color = ?1 WHERE id = ?2",
            params![color.as_str(), id_str],
        )
        .context("Failed to update stage color")?;
    }
    if let Some(position) = patch.position {
        conn.execute(
            "UPDATE stages SET position = ?1 WHERE id = ?2",
            params![position, id_str],
        )
        .context("Failed to update stage position")?;
    }
    Ok(())
}

fn reassign_lead_rows(
    conn: &Connection,
    owner: &str,
    from_refs: &[String],
    to_key: &str,
    at: DateTime<Utc>,
) -> Result<u64> {
    let mut moved = 0u64;
    for from in from_refs.iter().filter(|r| r.as_str() != to_key) {
        let count = conn
            .execute(
                "UPDATE leads SET stage_key = ?1, updated_at = ?2 WHERE owner_id = ?3 AND stage_key = ?4",
                params![to_key, timestamp(&at), owner, from],
            )
            .context("Failed to reassign leads")?;
        moved += count as u64;
    }
    Ok(moved)
}

fn insert_stage_row(conn: &Connection, stage: &Stage) -> Result<()> {
    conn.execute(
        "INSERT INTO stages (id, owner_id, key, name, icon, color, position, is_default, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            stage.id.to_string(),
            stage.owner_id,
            stage.key,
            stage.name,
            stage.icon,
            stage.color.as_str(),
            stage.position,
            stage.is_default,
            timestamp(&stage.created_at),
        ],
    )
    .with_context(|| format!("Failed to insert stage '{}'", stage.key))?;
    Ok(())
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid id '{}'", raw))
}

// ── Row types ─────────────────────────────────────────────────────────

/// Intermediate row struct for stages.
struct StageRow {
    id: String,
    owner_id: String,
    key: String,
    name: String,
    icon: String,
    color: String,
    position: i32,
    is_default: bool,
    created_at: String,
}

impl StageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            key: row.get(2)?,
            name: row.get(3)?,
            icon: row.get(4)?,
            color: row.get(5)?,
            position: row.get(6)?,
            is_default: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_stage(self) -> Result<Stage> {
        let color = StageColor::from_str(&self.color)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse stage color")?;
        Ok(Stage {
            id: parse_uuid(&self.id)?,
            owner_id: self.owner_id,
            key: self.key,
            name: self.name,
            icon: self.icon,
            color,
            position: self.position,
            is_default: self.is_default,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Intermediate row struct for leads.
struct LeadRow {
    id: String,
    owner_id: String,
    name: String,
    company: Option<String>,
    email: Option<String>,
    contact_number: Option<String>,
    estimated_value: f64,
    next_action: Option<String>,
    stage_key: String,
    interactions: String,
    created_at: String,
    updated_at: String,
}

impl LeadRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            company: row.get(3)?,
            email: row.get(4)?,
            contact_number: row.get(5)?,
            estimated_value: row.get(6)?,
            next_action: row.get(7)?,
            stage_key: row.get(8)?,
            interactions: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_lead(self) -> Result<Lead> {
        let interactions: Vec<Interaction> = serde_json::from_str(&self.interactions)
            .context("Failed to parse lead interactions JSON")?;
        Ok(Lead {
            id: parse_uuid(&self.id)?,
            owner_id: self.owner_id,
            name: self.name,
            company: self.company,
            email: self.email,
            contact_number: self.contact_number,
            estimated_value: self.estimated_value,
            next_action: self.next_action,
            stage_key: self.stage_key,
            interactions,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

// ── PersistenceClient ─────────────────────────────────────────────────

#[async_trait]
impl PersistenceClient for DbHandle {
    async fn fetch_stages(&self, owner: &str) -> Result<Vec<Stage>> {
        let owner = owner.to_string();
        self.call(move |db| db.list_stages(&owner)).await
    }

    async fn fetch_stage(&self, id: Uuid) -> Result<Option<Stage>> {
        self.call(move |db| db.get_stage(id)).await
    }

    async fn insert_stage(&self, stage: &Stage) -> Result<Stage> {
        let stage = stage.clone();
        self.call(move |db| db.insert_stage(&stage)).await
    }

    async fn insert_stages(&self, stages: &[Stage]) -> Result<Vec<Stage>> {
        let stages = stages.to_vec();
        self.call(move |db| db.insert_stages(&stages)).await
    }

    async fn update_stage_record(
        &self,
        id: Uuid,
        patch: &StageRecordPatch,
    ) -> Result<Option<Stage>> {
        let patch = patch.clone();
        self.call(move |db| db.update_stage(id, &patch)).await
    }

    async fn delete_stage_record(&self, id: Uuid) -> Result<bool> {
        self.call(move |db| db.delete_stage(id)).await
    }

    async fn rename_stage(
        &self,
        id: Uuid,
        patch: &StageRecordPatch,
        from_refs: &[String],
        at: DateTime<Utc>,
    ) -> Result<Option<(Stage, u64)>> {
        let patch = patch.clone();
        let from_refs = from_refs.to_vec();
        self.call(move |db| db.rename_stage(id, &patch, &from_refs, at))
            .await
    }

    async fn fetch_leads(&self, owner: &str) -> Result<Vec<Lead>> {
        let owner = owner.to_string();
        self.call(move |db| db.list_leads(&owner)).await
    }

    async fn fetch_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        self.call(move |db| db.get_lead(id)).await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<Lead> {
        let lead = lead.clone();
        self.call(move |db| db.insert_lead(&lead)).await
    }

    async fn update_lead_record(
        &self,
        id: Uuid,
        patch: &LeadPatch,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        let patch = patch.clone();
        self.call(move |db| db.update_lead(id, &patch, at)).await
    }

    async fn delete_lead_record(&self, id: Uuid) -> Result<bool> {
        self.call(move |db| db.delete_lead(id)).await
    }

    async fn reassign_leads_by_stage(
        &self,
        owner: &str,
        from_refs: &[String],
        to_key: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let owner = owner.to_string();
        let from_refs = from_refs.to_vec();
        let to_key = to_key.to_string();
        self.call(move |db| db.reassign_leads(&owner, &from_refs, &to_key, at))
            .await
    }

    async fn append_interaction(
        &self,
        id: Uuid,
        interaction: &Interaction,
        at: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        let interaction = interaction.clone();
        self.call(move |db| db.append_interaction(id, &interaction, at))
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 28, 17, 0, 0).unwrap()
    }

    fn stage(owner: &str, key: &str, position: i32) -> Stage {
        Stage {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            key: key.into(),
            name: key.to_uppercase(),
            icon: "•".into(),
            color: StageColor::Blue,
            position,
            is_default: false,
            created_at: t0(),
        }
    }

    fn lead(owner: &str, name: &str, stage_key: &str, created_at: DateTime<Utc>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            name: name.into(),
            company: None,
            email: None,
            contact_number: None,
            estimated_value: 0.0,
            next_action: None,
            stage_key: stage_key.into(),
            interactions: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;

        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('stages', 'leads')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 2, "Expected 2 tables to exist");

        let index_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name IN ('idx_stages_owner', 'idx_leads_owner', 'idx_leads_stage')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(index_count, 3, "Expected 3 indexes to exist");

        Ok(())
    }

    #[test]
    fn test_migrations_are_rerunnable() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.init()?;
        Ok(())
    }

    #[test]
    fn test_list_stages_orders_by_position_and_scopes_owner() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_stage(&stage("u1", "closed", 5))?;
        db.insert_stage(&stage("u1", "lead", 0))?;
        db.insert_stage(&stage("u2", "other", 0))?;

        let stages = db.list_stages("u1")?;
        let keys: Vec<_> = stages.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["lead", "closed"]);
        assert_eq!(db.list_stages("u2")?.len(), 1);
        assert!(db.list_stages("nobody")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_duplicate_stage_key_is_rejected() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_stage(&stage("u1", "lead", 0))?;
        assert!(db.insert_stage(&stage("u1", "lead", 1)).is_err());
        // Same key for a different owner is fine.
        db.insert_stage(&stage("u2", "lead", 0))?;
        Ok(())
    }

    #[test]
    fn test_insert_stages_is_all_or_nothing() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let batch = vec![stage("u1", "a", 0), stage("u1", "b", 1), stage("u1", "a", 2)];
        assert!(db.insert_stages(&batch).is_err());
        assert!(db.list_stages("u1")?.is_empty());

        let batch = vec![stage("u1", "a", 0), stage("u1", "b", 1)];
        let inserted = db.insert_stages(&batch)?;
        assert_eq!(inserted.len(), 2);
        assert_eq!(db.list_stages("u1")?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_update_stage_fields() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let s = db.insert_stage(&stage("u1", "lead", 0))?;

        let patch = StageRecordPatch {
            key: Some("inbox".into()),
            name: Some("Inbox".into()),
            color: Some(StageColor::Pink),
            position: Some(3),
            ..StageRecordPatch::default()
        };
        let updated = db.update_stage(s.id, &patch)?.expect("stage should exist");
        assert_eq!(updated.key, "inbox");
        assert_eq!(updated.name, "Inbox");
        assert_eq!(updated.color, StageColor::Pink);
        assert_eq!(updated.position, 3);
        assert_eq!(updated.icon, "•");

        assert!(db.update_stage(Uuid::new_v4(), &patch)?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_stage() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let s = db.insert_stage(&stage("u1", "lead", 0))?;
        assert!(db.delete_stage(s.id)?);
        assert!(!db.delete_stage(s.id)?);
        assert!(db.get_stage(s.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_lead_round_trip_preserves_timestamps() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let created = t0() + Duration::nanoseconds(123_456_789);
        let mut l = lead("u1", "Ana Silva", "lead", created);
        l.company = Some("Tech Solutions".into());
        l.estimated_value = 5000.0;

        let stored = db.insert_lead(&l)?;
        assert_eq!(stored, l);
        Ok(())
    }

    #[test]
    fn test_list_leads_newest_first() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_lead(&lead("u1", "old", "lead", t0()))?;
        db.insert_lead(&lead("u1", "new", "lead", t0() + Duration::days(1)))?;
        db.insert_lead(&lead("u2", "foreign", "lead", t0()))?;

        let leads = db.list_leads("u1")?;
        let names: Vec<_> = leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["new", "old"]);
        Ok(())
    }

    #[test]
    fn test_update_lead_stamps_updated_at() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let l = db.insert_lead(&lead("u1", "Ana", "lead", t0()))?;
        let later = t0() + Duration::hours(4);

        let updated = db
            .update_lead(l.id, &LeadPatch::stage_only("proposal"), later)?
            .expect("lead should exist");
        assert_eq!(updated.stage_key, "proposal");
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, t0());

        assert!(
            db.update_lead(Uuid::new_v4(), &LeadPatch::default(), later)?
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn test_reassign_leads_matches_key_and_legacy_name() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_lead(&lead("u1", "by key", "proposal", t0()))?;
        db.insert_lead(&lead("u1", "by name", "Proposta", t0()))?;
        db.insert_lead(&lead("u1", "elsewhere", "lead", t0()))?;
        db.insert_lead(&lead("u2", "other owner", "proposal", t0()))?;

        let moved = db.reassign_leads(
            "u1",
            &["proposal".to_string(), "Proposta".to_string()],
            "negotiation",
            t0(),
        )?;
        assert_eq!(moved, 2);

        let leads = db.list_leads("u1")?;
        let in_negotiation = leads
            .iter()
            .filter(|l| l.stage_key == "negotiation")
            .count();
        assert_eq!(in_negotiation, 2);
        assert_eq!(db.list_leads("u2")?[0].stage_key, "proposal");
        Ok(())
    }

    #[test]
    fn test_rename_stage_moves_key_and_name_references() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let mut proposal = stage("u1", "proposal", 3);
        proposal.name = "Proposta".into();
        let proposal = db.insert_stage(&proposal)?;
        db.insert_lead(&lead("u1", "by key", "proposal", t0()))?;
        db.insert_lead(&lead("u1", "by name", "Proposta", t0()))?;
        db.insert_lead(&lead("u2", "other owner", "Proposta", t0()))?;

        let patch = StageRecordPatch {
            key: Some("proposta-enviada".into()),
            name: Some("Proposta Enviada".into()),
            ..StageRecordPatch::default()
        };
        let refs = vec![
            "proposal".to_string(),
            "Proposta".to_string(),
            proposal.id.to_string(),
        ];
        let (renamed, moved) = db
            .rename_stage(proposal.id, &patch, &refs, t0())?
            .expect("stage should exist");
        assert_eq!(renamed.key, "proposta-enviada");
        assert_eq!(moved, 2);
        assert!(
            db.list_leads("u1")?
                .iter()
                .all(|l| l.stage_key == "proposta-enviada")
        );
        assert_eq!(db.list_leads("u2")?[0].stage_key, "Proposta");

        assert!(
            db.rename_stage(Uuid::new_v4(), &patch, &refs, t0())?
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn test_rename_stage_rolls_back_when_leads_cannot_move() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let s = db.insert_stage(&stage("u1", "lead", 0))?;
        db.insert_lead(&lead("u1", "Ana", "lead", t0()))?;
        db.conn.execute_batch(
            "CREATE TRIGGER freeze_leads BEFORE UPDATE OF stage_key ON leads
             BEGIN SELECT RAISE(ABORT, 'leads are frozen'); END;",
        )?;

        let patch = StageRecordPatch {
            key: Some("entrada".into()),
            name: Some("Entrada".into()),
            ..StageRecordPatch::default()
        };
        let result = db.rename_stage(s.id, &patch, &["lead".to_string()], t0());
        assert!(result.is_err());

        let kept = db.get_stage(s.id)?.expect("stage should exist");
        assert_eq!(kept.key, "lead");
        assert_eq!(db.list_leads("u1")?[0].stage_key, "lead");
        Ok(())
    }

    #[test]
    fn test_append_interaction() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let l = db.insert_lead(&lead("u1", "Ana", "lead", t0()))?;
        let interaction = Interaction {
            at: t0(),
            kind: InteractionKind::Call,
            description: "Intro call".into(),
            next_step: "Send deck".into(),
        };

        let updated = db
            .append_interaction(l.id, &interaction, t0() + Duration::minutes(30))?
            .expect("lead should exist");
        assert_eq!(updated.interactions, vec![interaction]);
        assert_eq!(updated.updated_at, t0() + Duration::minutes(30));
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_runs_queries_off_the_runtime() -> Result<()> {
        let handle = DbHandle::in_memory()?;
        handle.insert_stage(&stage("u1", "lead", 0)).await?;
        let stages = handle.fetch_stages("u1").await?;
        assert_eq!(stages.len(), 1);
        assert!(handle.fetch_leads("u1").await?.is_empty());
        Ok(())
    }
}
