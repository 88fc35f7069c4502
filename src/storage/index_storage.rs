//! Off-chain study index
//!
//! SQLite persistence for wizard sessions, step attempts and confirmed steps,
//! with an in-memory cache of index entries for fast reads.
//!
//! Uniqueness is enforced by the schema, not by application locks:
//! - `recorded_steps UNIQUE(step, tx_hash)` makes re-recording a no-op
//! - `recorded_steps UNIQUE(session_id, step)` allows one id per step
//! - a partial unique index allows one in-flight attempt per session

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::contracts::{ExtractedId, StepInput};
use crate::storage::models::{
    AttemptStatus, IndexResult, RecordedStep, SessionRecord, SessionSnapshot, SessionSummary,
    StepAttempt, StepConfirmation, StudyIndexEntry, StudyStatus,
};
use crate::types::{FailureKind, WizardStep};

/// Database file name inside the data directory
pub const INDEX_DB_FILE: &str = "study_index.db";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Why the index refused a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexConflict {
    #[error("{step} cannot be recorded before {dependency}")]
    MissingDependency {
        step: WizardStep,
        dependency: WizardStep,
    },

    #[error("{step} is already recorded with transaction {existing_tx}")]
    StepAlreadyRecorded { step: WizardStep, existing_tx: B256 },

    #[error("Transaction {tx_hash} is already recorded for {recorded_step} in another context")]
    TransactionReused {
        tx_hash: B256,
        recorded_step: WizardStep,
    },

    #[error("{step} at block {block_number} precedes {previous_step} at block {previous_block}")]
    BlockOrder {
        step: WizardStep,
        block_number: u64,
        previous_step: WizardStep,
        previous_block: u64,
    },

    #[error("{step} echoed id {found}, expected {expected}")]
    IdMismatch {
        step: WizardStep,
        expected: U256,
        found: U256,
    },

    #[error("{step} transaction {tx_hash} is still awaiting confirmation")]
    StepInFlight { step: WizardStep, tx_hash: B256 },
}

/// Step indexer errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index conflict: {0}")]
    Conflict(#[from] IndexConflict),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<rusqlite::Error> for IndexError {
    fn from(e: rusqlite::Error) -> Self {
        IndexError::Storage(StorageError::Sqlite(e))
    }
}

/// Hybrid storage with SQLite persistence + in-memory entry cache
pub struct StepIndexer {
    /// SQLite connection for durable persistence
    conn: Connection,

    /// In-memory cache: session id → index entry
    cache: RwLock<HashMap<Uuid, StudyIndexEntry>>,
}

impl StepIndexer {
    /// Open (or create) the index in a data directory
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory the database file is created in
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let db_path = data_dir.as_ref().join(INDEX_DB_FILE);

        log::info!("Opening study index: {}", db_path.display());

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Initialize database schema
    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS wizard_sessions (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                chain_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS step_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES wizard_sessions(id),
                step TEXT NOT NULL CHECK(step IN ('escrow', 'registry', 'criteria', 'milestones')),
                attempt_no INTEGER NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('awaiting_confirmation', 'confirmed', 'failed')),
                tx_hash TEXT,
                input_json TEXT,
                error TEXT,
                failure_kind TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(session_id, step, attempt_no)
            )",
            [],
        )?;

        // One in-flight transaction per session
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_step_attempts_in_flight
             ON step_attempts(session_id) WHERE status = 'awaiting_confirmation'",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS recorded_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES wizard_sessions(id),
                step TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                extracted_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                UNIQUE(step, tx_hash),
                UNIQUE(session_id, step)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recorded_steps_tx ON recorded_steps(tx_hash)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS study_index (
                session_id TEXT PRIMARY KEY REFERENCES wizard_sessions(id),
                chain_id INTEGER NOT NULL,
                researcher_address TEXT NOT NULL,
                title TEXT,
                description TEXT,
                total_funding TEXT,
                escrow_id TEXT,
                escrow_tx_hash TEXT,
                escrow_block_number INTEGER,
                registry_id TEXT,
                registry_tx_hash TEXT,
                registry_block_number INTEGER,
                criteria_tx_hash TEXT,
                criteria_block_number INTEGER,
                milestone_ids TEXT NOT NULL DEFAULT '',
                milestones_tx_hash TEXT,
                milestones_block_number INTEGER,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(registry_id, escrow_id, chain_id)
            )",
            [],
        )?;

        log::debug!("✓ Index schema initialized");

        Ok(())
    }

    /// Create a new wizard session
    pub fn create_session(
        &mut self,
        owner: Address,
        chain_id: u64,
    ) -> Result<SessionRecord, StorageError> {
        let now = now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            owner,
            chain_id,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO wizard_sessions (id, owner, chain_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id.to_string(),
                session.owner.to_string(),
                session.chain_id,
                session.created_at.timestamp(),
                session.updated_at.timestamp(),
            ],
        )?;

        log::debug!("✓ Created session {} for {}", session.id, owner);

        Ok(session)
    }

    /// Session row by id
    pub fn session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StorageError> {
        query_session(&self.conn, session_id)
    }

    /// Everything persisted about a session
    pub fn load_session(&self, session_id: Uuid) -> Result<SessionSnapshot, IndexError> {
        let session = query_session(&self.conn, session_id)?
            .ok_or(IndexError::SessionNotFound(session_id))?;

        let mut recorded = query_recorded_for_session(&self.conn, session_id)?;
        recorded.sort_by_key(|r| r.step.index());

        let mut latest_attempts = query_latest_attempts(&self.conn, session_id)?;
        latest_attempts.sort_by_key(|a| a.step.index());

        let entry = self.refresh_entry(session_id)?;

        Ok(SessionSnapshot {
            session,
            recorded,
            latest_attempts,
            entry,
        })
    }

    /// All sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.owner, s.chain_id, s.created_at, s.updated_at, e.title, e.status
             FROM wizard_sessions s
             LEFT JOIN study_index e ON e.session_id = s.id
             ORDER BY s.created_at DESC, s.id",
        )?;

        let rows = stmt.query_map([], |row| {
            let status = match row.get::<_, Option<String>>(6)? {
                Some(s) => conv(6, StudyStatus::from_db_string(&s))?,
                None => StudyStatus::Draft,
            };
            Ok(SessionSummary {
                session: session_from_row(row)?,
                title: row.get(5)?,
                status,
            })
        })?;

        let result: Result<Vec<_>, _> = rows.collect();
        Ok(result?)
    }

    /// Record that a step's transaction was broadcast
    ///
    /// Re-submitting the same hash for the same step is a no-op returning the
    /// existing attempt.
    pub fn record_submission(
        &mut self,
        session_id: Uuid,
        step: WizardStep,
        tx_hash: B256,
        input: &StepInput,
    ) -> Result<StepAttempt, IndexError> {
        let input_json = serde_json::to_string(input).map_err(StorageError::from)?;
        let now = now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        query_session(&tx, session_id)?.ok_or(IndexError::SessionNotFound(session_id))?;

        if let Some(recorded) = query_recorded_by_hash(&tx, tx_hash)? {
            return Err(IndexConflict::TransactionReused {
                tx_hash,
                recorded_step: recorded.step,
            }
            .into());
        }
        if let Some(recorded) = query_recorded_for_step(&tx, session_id, step)? {
            return Err(IndexConflict::StepAlreadyRecorded {
                step,
                existing_tx: recorded.tx_hash,
            }
            .into());
        }

        let entry = query_entry(&tx, session_id)?;
        check_dependencies(step, entry.as_ref())?;

        if let Some(pending) = query_in_flight(&tx, session_id)? {
            if pending.step == step && pending.tx_hash == Some(tx_hash) {
                log::debug!("Submission of {} already recorded", tx_hash);
                return Ok(pending);
            }
            return Err(IndexConflict::StepInFlight {
                step: pending.step,
                tx_hash: pending.tx_hash.unwrap_or_default(),
            }
            .into());
        }

        let attempt_no = next_attempt_no(&tx, session_id, step)?;
        tx.execute(
            "INSERT INTO step_attempts (session_id, step, attempt_no, status, tx_hash,
             input_json, error, failure_kind, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)",
            params![
                session_id.to_string(),
                step.as_str(),
                attempt_no,
                AttemptStatus::AwaitingConfirmation.to_db_string(),
                tx_hash.to_string(),
                input_json,
                now.timestamp(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        touch_session(&tx, session_id, now)?;
        let attempt = query_attempt(&tx, id)?;
        tx.commit()?;

        log::debug!(
            "✓ Recorded submission of {} (attempt {}) for session {}",
            step,
            attempt_no,
            session_id
        );

        Ok(attempt)
    }

    /// Record a failed step attempt
    ///
    /// Settles the in-flight attempt for `step` when there is one, otherwise
    /// inserts a new failed attempt (e.g. for a validation failure).
    pub fn record_failure(
        &mut self,
        session_id: Uuid,
        step: WizardStep,
        kind: FailureKind,
        reason: &str,
        tx_hash: Option<B256>,
        input: Option<&StepInput>,
    ) -> Result<StepAttempt, IndexError> {
        let input_json = input
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;
        let now = now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        query_session(&tx, session_id)?.ok_or(IndexError::SessionNotFound(session_id))?;

        let pending = query_in_flight(&tx, session_id)?
            .filter(|p| p.step == step && (tx_hash.is_none() || p.tx_hash == tx_hash));

        let id = match pending {
            Some(pending) => {
                tx.execute(
                    "UPDATE step_attempts SET status = ?1, error = ?2, failure_kind = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        AttemptStatus::Failed.to_db_string(),
                        reason,
                        kind.to_db_string(),
                        now.timestamp(),
                        pending.id,
                    ],
                )?;
                pending.id
            }
            None => {
                let attempt_no = next_attempt_no(&tx, session_id, step)?;
                tx.execute(
                    "INSERT INTO step_attempts (session_id, step, attempt_no, status, tx_hash,
                     input_json, error, failure_kind, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                    params![
                        session_id.to_string(),
                        step.as_str(),
                        attempt_no,
                        AttemptStatus::Failed.to_db_string(),
                        tx_hash.map(|h| h.to_string()),
                        input_json,
                        reason,
                        kind.to_db_string(),
                        now.timestamp(),
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        touch_session(&tx, session_id, now)?;
        let attempt = query_attempt(&tx, id)?;
        tx.commit()?;

        log::debug!(
            "✓ Recorded {} failure of {} for session {}",
            kind,
            step,
            session_id
        );

        Ok(attempt)
    }

    /// Record a confirmed step
    ///
    /// Idempotent on `(step, tx_hash)`: a repeat returns the stored result
    /// with `already_recorded = true` and leaves the index unchanged. The
    /// entry is never modified when the record is refused.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = indexer.record_step(session_id, &StepConfirmation {
    ///     step: WizardStep::Escrow,
    ///     tx_hash,
    ///     extracted_id: ExtractedId::Escrow(U256::from(42)),
    ///     block_number: 100,
    ///     input: Some(input),
    /// })?;
    /// assert_eq!(result.entry.escrow_id, Some(U256::from(42)));
    /// ```
    pub fn record_step(
        &mut self,
        session_id: Uuid,
        confirmation: &StepConfirmation,
    ) -> Result<IndexResult, IndexError> {
        if confirmation.extracted_id.step() != confirmation.step {
            return Err(IndexError::Malformed(format!(
                "{} id supplied for the {} step",
                confirmation.extracted_id.step(),
                confirmation.step
            )));
        }

        match self.try_record_step(session_id, confirmation) {
            Err(IndexError::Storage(StorageError::Sqlite(e))) if is_constraint_violation(&e) => {
                // Another writer got there first; report its row
                log::debug!(
                    "Unique constraint hit recording {} {}, re-reading",
                    confirmation.step,
                    confirmation.tx_hash
                );
                match query_recorded(&self.conn, confirmation.step, confirmation.tx_hash)? {
                    Some(existing) => self.resolve_duplicate(session_id, confirmation, existing),
                    None => Err(StorageError::Sqlite(e).into()),
                }
            }
            other => other,
        }
    }

    fn try_record_step(
        &mut self,
        session_id: Uuid,
        confirmation: &StepConfirmation,
    ) -> Result<IndexResult, IndexError> {
        let step = confirmation.step;
        let now = now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session =
            query_session(&tx, session_id)?.ok_or(IndexError::SessionNotFound(session_id))?;

        if let Some(existing) = query_recorded(&tx, step, confirmation.tx_hash)? {
            drop(tx);
            return self.resolve_duplicate(session_id, confirmation, existing);
        }

        if let Some(other) = query_recorded_by_hash(&tx, confirmation.tx_hash)? {
            return Err(IndexConflict::TransactionReused {
                tx_hash: confirmation.tx_hash,
                recorded_step: other.step,
            }
            .into());
        }

        if let Some(existing) = query_recorded_for_step(&tx, session_id, step)? {
            return Err(IndexConflict::StepAlreadyRecorded {
                step,
                existing_tx: existing.tx_hash,
            }
            .into());
        }

        let existing_entry = query_entry(&tx, session_id)?;
        check_dependencies(step, existing_entry.as_ref())?;
        check_block_order(step, confirmation.block_number, existing_entry.as_ref())?;

        if let (ExtractedId::Criteria(echo), Some(entry)) =
            (&confirmation.extracted_id, existing_entry.as_ref())
        {
            if let Some(registry_id) = entry.registry_id {
                if *echo != registry_id {
                    return Err(IndexConflict::IdMismatch {
                        step,
                        expected: registry_id,
                        found: *echo,
                    }
                    .into());
                }
            }
        }

        let is_new = existing_entry.is_none();
        let entry = apply_step(existing_entry, &session, confirmation, now);
        write_entry(&tx, &entry, is_new)?;

        tx.execute(
            "INSERT INTO recorded_steps (session_id, step, tx_hash, extracted_id, block_number, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.to_string(),
                step.as_str(),
                confirmation.tx_hash.to_string(),
                confirmation.extracted_id.to_db_string(),
                confirmation.block_number,
                now.timestamp(),
            ],
        )?;

        settle_attempt(&tx, session_id, confirmation, now)?;
        touch_session(&tx, session_id, now)?;

        tx.commit()?;

        self.cache_write()?.insert(session_id, entry.clone());

        log::info!(
            "✓ Indexed {} for session {} (id {}, block {})",
            step,
            session_id,
            confirmation.extracted_id,
            confirmation.block_number
        );

        Ok(IndexResult {
            entry,
            recorded: RecordedStep {
                session_id,
                step,
                tx_hash: confirmation.tx_hash,
                extracted_id: confirmation.extracted_id.clone(),
                block_number: confirmation.block_number,
                recorded_at: truncate_to_secs(now),
            },
            already_recorded: false,
        })
    }

    /// An identical `(step, tx_hash)` is already stored: no-op or conflict
    fn resolve_duplicate(
        &self,
        session_id: Uuid,
        confirmation: &StepConfirmation,
        existing: RecordedStep,
    ) -> Result<IndexResult, IndexError> {
        if existing.session_id != session_id || existing.extracted_id != confirmation.extracted_id
        {
            return Err(IndexConflict::TransactionReused {
                tx_hash: confirmation.tx_hash,
                recorded_step: existing.step,
            }
            .into());
        }

        let entry = self.refresh_entry(session_id)?.ok_or_else(|| {
            IndexError::Malformed(format!("Session {} has steps but no index entry", session_id))
        })?;

        log::debug!(
            "{} {} already recorded for session {}",
            confirmation.step,
            confirmation.tx_hash,
            session_id
        );

        Ok(IndexResult {
            entry,
            recorded: existing,
            already_recorded: true,
        })
    }

    /// Index entry for a session (cache-first)
    pub fn get_entry(&self, session_id: Uuid) -> Result<Option<StudyIndexEntry>, StorageError> {
        if let Some(entry) = self.cache_read()?.get(&session_id) {
            return Ok(Some(entry.clone()));
        }

        let entry = query_entry(&self.conn, session_id)?;
        if let Some(entry) = &entry {
            self.cache_write()?.insert(session_id, entry.clone());
        }
        Ok(entry)
    }

    /// Index entry read from the database, replacing any cached copy
    ///
    /// Other writers may have recorded steps since this instance cached the
    /// entry.
    fn refresh_entry(&self, session_id: Uuid) -> Result<Option<StudyIndexEntry>, StorageError> {
        let entry = query_entry(&self.conn, session_id)?;
        let mut cache = self.cache_write()?;
        match &entry {
            Some(entry) => {
                cache.insert(session_id, entry.clone());
            }
            None => {
                cache.remove(&session_id);
            }
        }
        Ok(entry)
    }

    /// Index entry by its composite identity
    pub fn get_entry_by_key(
        &self,
        registry_id: U256,
        escrow_id: U256,
        chain_id: u64,
    ) -> Result<Option<StudyIndexEntry>, StorageError> {
        let session_id: Option<String> = self
            .conn
            .query_row(
                "SELECT session_id FROM study_index
                 WHERE registry_id = ?1 AND escrow_id = ?2 AND chain_id = ?3",
                params![registry_id.to_string(), escrow_id.to_string(), chain_id],
                |row| row.get(0),
            )
            .optional()?;

        match session_id {
            Some(id) => self.get_entry(parse_uuid(&id)?),
            None => Ok(None),
        }
    }

    /// Index entry containing a recorded transaction
    pub fn get_entry_by_tx_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<StudyIndexEntry>, StorageError> {
        match query_recorded_by_hash(&self.conn, tx_hash)? {
            Some(recorded) => self.get_entry(recorded.session_id),
            None => Ok(None),
        }
    }

    /// Recorded steps of a session in wizard order
    pub fn recorded_steps(&self, session_id: Uuid) -> Result<Vec<RecordedStep>, StorageError> {
        let mut recorded = query_recorded_for_session(&self.conn, session_id)?;
        recorded.sort_by_key(|r| r.step.index());
        Ok(recorded)
    }

    /// Invalidate cache (rebuilt from the database on the next query)
    pub fn invalidate_cache(&self) -> Result<(), StorageError> {
        self.cache_write()?.clear();
        log::debug!("✓ Cache invalidated (will rebuild on next query)");
        Ok(())
    }

    fn cache_read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, StudyIndexEntry>>, StorageError> {
        self.cache
            .read()
            .map_err(|e| StorageError::Cache(e.to_string()))
    }

    fn cache_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, StudyIndexEntry>>, StorageError> {
        self.cache
            .write()
            .map_err(|e| StorageError::Cache(e.to_string()))
    }
}

impl std::fmt::Debug for StepIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepIndexer")
            .field("path", &self.conn.path())
            .finish()
    }
}

fn check_dependencies(
    step: WizardStep,
    entry: Option<&StudyIndexEntry>,
) -> Result<(), IndexConflict> {
    for &dependency in step.dependencies() {
        if !entry.is_some_and(|e| e.has_step(dependency)) {
            return Err(IndexConflict::MissingDependency { step, dependency });
        }
    }
    Ok(())
}

fn check_block_order(
    step: WizardStep,
    block_number: u64,
    entry: Option<&StudyIndexEntry>,
) -> Result<(), IndexConflict> {
    let Some(entry) = entry else {
        return Ok(());
    };
    for &previous_step in step.dependencies() {
        if let Some(previous_block) = entry.block_number(previous_step) {
            if previous_block > block_number {
                return Err(IndexConflict::BlockOrder {
                    step,
                    block_number,
                    previous_step,
                    previous_block,
                });
            }
        }
    }
    Ok(())
}

/// Fold a confirmation into the session's entry
fn apply_step(
    existing: Option<StudyIndexEntry>,
    session: &SessionRecord,
    confirmation: &StepConfirmation,
    now: DateTime<Utc>,
) -> StudyIndexEntry {
    let mut entry = existing.unwrap_or_else(|| StudyIndexEntry {
        session_id: session.id,
        chain_id: session.chain_id,
        researcher_address: session.owner,
        title: None,
        description: None,
        total_funding: None,
        escrow_id: None,
        escrow_tx_hash: None,
        escrow_block_number: None,
        registry_id: None,
        registry_tx_hash: None,
        registry_block_number: None,
        criteria_tx_hash: None,
        criteria_block_number: None,
        milestone_ids: Vec::new(),
        milestones_tx_hash: None,
        milestones_block_number: None,
        status: StudyStatus::Draft,
        created_at: truncate_to_secs(now),
        updated_at: truncate_to_secs(now),
    });

    let tx_hash = Some(confirmation.tx_hash);
    let block = Some(confirmation.block_number);

    match &confirmation.extracted_id {
        ExtractedId::Escrow(id) => {
            entry.escrow_id = Some(*id);
            entry.escrow_tx_hash = tx_hash;
            entry.escrow_block_number = block;
            if let Some(StepInput::Escrow(input)) = &confirmation.input {
                entry.title = Some(input.title.trim().to_string());
                entry.total_funding = Some(input.total_funding);
            }
        }
        ExtractedId::Registry(id) => {
            entry.registry_id = Some(*id);
            entry.registry_tx_hash = tx_hash;
            entry.registry_block_number = block;
            if let Some(StepInput::Registry(input)) = &confirmation.input {
                entry.title = Some(input.title.trim().to_string());
                entry.description = Some(input.description.clone());
            }
        }
        ExtractedId::Criteria(_) => {
            entry.criteria_tx_hash = tx_hash;
            entry.criteria_block_number = block;
        }
        ExtractedId::Milestones(ids) => {
            entry.milestone_ids = ids.clone();
            entry.milestones_tx_hash = tx_hash;
            entry.milestones_block_number = block;
        }
    }

    entry.status = StudyStatus::after(confirmation.step);
    entry.updated_at = truncate_to_secs(now);
    entry
}

fn write_entry(conn: &Connection, entry: &StudyIndexEntry, is_new: bool) -> Result<(), StorageError> {
    let milestone_ids = entry
        .milestone_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let sql = if is_new {
        "INSERT INTO study_index (chain_id, researcher_address, title, description, total_funding,
         escrow_id, escrow_tx_hash, escrow_block_number, registry_id, registry_tx_hash,
         registry_block_number, criteria_tx_hash, criteria_block_number, milestone_ids,
         milestones_tx_hash, milestones_block_number, status, created_at, updated_at, session_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
    } else {
        "UPDATE study_index SET chain_id = ?1, researcher_address = ?2, title = ?3, description = ?4,
         total_funding = ?5, escrow_id = ?6, escrow_tx_hash = ?7, escrow_block_number = ?8,
         registry_id = ?9, registry_tx_hash = ?10, registry_block_number = ?11,
         criteria_tx_hash = ?12, criteria_block_number = ?13, milestone_ids = ?14,
         milestones_tx_hash = ?15, milestones_block_number = ?16, status = ?17,
         created_at = ?18, updated_at = ?19
         WHERE session_id = ?20"
    };

    conn.execute(
        sql,
        params![
            entry.chain_id,
            entry.researcher_address.to_string(),
            entry.title,
            entry.description,
            entry.total_funding.map(|v| v.to_string()),
            entry.escrow_id.map(|v| v.to_string()),
            entry.escrow_tx_hash.map(|h| h.to_string()),
            entry.escrow_block_number,
            entry.registry_id.map(|v| v.to_string()),
            entry.registry_tx_hash.map(|h| h.to_string()),
            entry.registry_block_number,
            entry.criteria_tx_hash.map(|h| h.to_string()),
            entry.criteria_block_number,
            milestone_ids,
            entry.milestones_tx_hash.map(|h| h.to_string()),
            entry.milestones_block_number,
            entry.status.to_db_string(),
            entry.created_at.timestamp(),
            entry.updated_at.timestamp(),
            entry.session_id.to_string(),
        ],
    )?;

    Ok(())
}

/// Mark the matching in-flight attempt confirmed, or log a confirmed attempt
///
/// An in-flight attempt for the same step under another hash (a replaced
/// transaction) is failed as superseded so it no longer blocks the session.
fn settle_attempt(
    conn: &Connection,
    session_id: Uuid,
    confirmation: &StepConfirmation,
    now: DateTime<Utc>,
) -> Result<(), IndexError> {
    let superseded = conn.execute(
        "UPDATE step_attempts SET status = ?1, error = ?2, updated_at = ?3
         WHERE session_id = ?4 AND step = ?5 AND tx_hash != ?6 AND status = ?7",
        params![
            AttemptStatus::Failed.to_db_string(),
            format!("Superseded by {}", confirmation.tx_hash),
            now.timestamp(),
            session_id.to_string(),
            confirmation.step.as_str(),
            confirmation.tx_hash.to_string(),
            AttemptStatus::AwaitingConfirmation.to_db_string(),
        ],
    )?;
    if superseded > 0 {
        log::warn!(
            "{} confirmed under {}; superseded the pending attempt",
            confirmation.step,
            confirmation.tx_hash
        );
    }

    let updated = conn.execute(
        "UPDATE step_attempts SET status = ?1, error = NULL, failure_kind = NULL, updated_at = ?2
         WHERE session_id = ?3 AND step = ?4 AND tx_hash = ?5 AND status = ?6",
        params![
            AttemptStatus::Confirmed.to_db_string(),
            now.timestamp(),
            session_id.to_string(),
            confirmation.step.as_str(),
            confirmation.tx_hash.to_string(),
            AttemptStatus::AwaitingConfirmation.to_db_string(),
        ],
    )?;

    if updated == 0 {
        let input_json = confirmation
            .input
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;
        let attempt_no = next_attempt_no(conn, session_id, confirmation.step)?;
        conn.execute(
            "INSERT INTO step_attempts (session_id, step, attempt_no, status, tx_hash,
             input_json, error, failure_kind, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)",
            params![
                session_id.to_string(),
                confirmation.step.as_str(),
                attempt_no,
                AttemptStatus::Confirmed.to_db_string(),
                confirmation.tx_hash.to_string(),
                input_json,
                now.timestamp(),
            ],
        )?;
    }

    Ok(())
}

fn touch_session(conn: &Connection, session_id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE wizard_sessions SET updated_at = ?1 WHERE id = ?2",
        params![now.timestamp(), session_id.to_string()],
    )?;
    Ok(())
}

fn next_attempt_no(conn: &Connection, session_id: Uuid, step: WizardStep) -> Result<u32, StorageError> {
    let max: Option<u32> = conn.query_row(
        "SELECT MAX(attempt_no) FROM step_attempts WHERE session_id = ?1 AND step = ?2",
        params![session_id.to_string(), step.as_str()],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

// Queries

const SESSION_COLUMNS: &str = "id, owner, chain_id, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, session_id, step, attempt_no, status, tx_hash, input_json, \
                               error, failure_kind, created_at, updated_at";

const RECORDED_COLUMNS: &str = "session_id, step, tx_hash, extracted_id, block_number, recorded_at";

const ENTRY_COLUMNS: &str = "session_id, chain_id, researcher_address, title, description, \
                             total_funding, escrow_id, escrow_tx_hash, escrow_block_number, \
                             registry_id, registry_tx_hash, registry_block_number, \
                             criteria_tx_hash, criteria_block_number, milestone_ids, \
                             milestones_tx_hash, milestones_block_number, status, created_at, \
                             updated_at";

fn query_session(conn: &Connection, session_id: Uuid) -> Result<Option<SessionRecord>, StorageError> {
    let sql = format!("SELECT {} FROM wizard_sessions WHERE id = ?1", SESSION_COLUMNS);
    Ok(conn
        .query_row(&sql, params![session_id.to_string()], session_from_row)
        .optional()?)
}

fn query_entry(conn: &Connection, session_id: Uuid) -> Result<Option<StudyIndexEntry>, StorageError> {
    let sql = format!("SELECT {} FROM study_index WHERE session_id = ?1", ENTRY_COLUMNS);
    Ok(conn
        .query_row(&sql, params![session_id.to_string()], entry_from_row)
        .optional()?)
}

fn query_recorded(
    conn: &Connection,
    step: WizardStep,
    tx_hash: B256,
) -> Result<Option<RecordedStep>, StorageError> {
    let sql = format!(
        "SELECT {} FROM recorded_steps WHERE step = ?1 AND tx_hash = ?2",
        RECORDED_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![step.as_str(), tx_hash.to_string()],
            recorded_from_row,
        )
        .optional()?)
}

fn query_recorded_by_hash(conn: &Connection, tx_hash: B256) -> Result<Option<RecordedStep>, StorageError> {
    let sql = format!(
        "SELECT {} FROM recorded_steps WHERE tx_hash = ?1 ORDER BY id LIMIT 1",
        RECORDED_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![tx_hash.to_string()], recorded_from_row)
        .optional()?)
}

fn query_recorded_for_step(
    conn: &Connection,
    session_id: Uuid,
    step: WizardStep,
) -> Result<Option<RecordedStep>, StorageError> {
    let sql = format!(
        "SELECT {} FROM recorded_steps WHERE session_id = ?1 AND step = ?2",
        RECORDED_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![session_id.to_string(), step.as_str()],
            recorded_from_row,
        )
        .optional()?)
}

fn query_recorded_for_session(
    conn: &Connection,
    session_id: Uuid,
) -> Result<Vec<RecordedStep>, StorageError> {
    let sql = format!(
        "SELECT {} FROM recorded_steps WHERE session_id = ?1",
        RECORDED_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![session_id.to_string()], recorded_from_row)?;
    let result: Result<Vec<_>, _> = rows.collect();
    Ok(result?)
}

fn query_attempt(conn: &Connection, id: i64) -> Result<StepAttempt, StorageError> {
    let sql = format!("SELECT {} FROM step_attempts WHERE id = ?1", ATTEMPT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], attempt_from_row)?)
}

fn query_in_flight(conn: &Connection, session_id: Uuid) -> Result<Option<StepAttempt>, StorageError> {
    let sql = format!(
        "SELECT {} FROM step_attempts WHERE session_id = ?1 AND status = ?2",
        ATTEMPT_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![
                session_id.to_string(),
                AttemptStatus::AwaitingConfirmation.to_db_string()
            ],
            attempt_from_row,
        )
        .optional()?)
}

fn query_latest_attempts(conn: &Connection, session_id: Uuid) -> Result<Vec<StepAttempt>, StorageError> {
    let sql = format!(
        "SELECT {} FROM step_attempts a
         WHERE a.session_id = ?1
           AND a.attempt_no = (SELECT MAX(b.attempt_no) FROM step_attempts b
                               WHERE b.session_id = a.session_id AND b.step = a.step)",
        ATTEMPT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![session_id.to_string()], attempt_from_row)?;
    let result: Result<Vec<_>, _> = rows.collect();
    Ok(result?)
}

// Row decoding

fn session_from_row(row: &Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: parsed(row, 0)?,
        owner: parsed(row, 1)?,
        chain_id: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn attempt_from_row(row: &Row) -> rusqlite::Result<StepAttempt> {
    let input = match row.get::<_, Option<String>>(6)? {
        Some(json) => Some(conv(6, serde_json::from_str::<StepInput>(&json))?),
        None => None,
    };
    let failure_kind = match row.get::<_, Option<String>>(8)? {
        Some(s) => Some(conv(
            8,
            FailureKind::from_db_string(&s).ok_or_else(|| format!("Invalid failure kind: {}", s)),
        )?),
        None => None,
    };

    Ok(StepAttempt {
        id: row.get(0)?,
        session_id: parsed(row, 1)?,
        step: parsed(row, 2)?,
        attempt_no: row.get(3)?,
        status: conv(4, AttemptStatus::from_db_string(&row.get::<_, String>(4)?))?,
        tx_hash: parsed_opt(row, 5)?,
        input,
        error: row.get(7)?,
        failure_kind,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}

fn recorded_from_row(row: &Row) -> rusqlite::Result<RecordedStep> {
    let step: WizardStep = parsed(row, 1)?;
    Ok(RecordedStep {
        session_id: parsed(row, 0)?,
        step,
        tx_hash: parsed(row, 2)?,
        extracted_id: conv(3, ExtractedId::from_db_string(step, &row.get::<_, String>(3)?))?,
        block_number: row.get(4)?,
        recorded_at: timestamp(row, 5)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<StudyIndexEntry> {
    let milestone_ids = row
        .get::<_, String>(14)?
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| conv(14, U256::from_str(s)))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(StudyIndexEntry {
        session_id: parsed(row, 0)?,
        chain_id: row.get(1)?,
        researcher_address: parsed(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        total_funding: parsed_opt(row, 5)?,
        escrow_id: parsed_opt(row, 6)?,
        escrow_tx_hash: parsed_opt(row, 7)?,
        escrow_block_number: row.get(8)?,
        registry_id: parsed_opt(row, 9)?,
        registry_tx_hash: parsed_opt(row, 10)?,
        registry_block_number: row.get(11)?,
        criteria_tx_hash: parsed_opt(row, 12)?,
        criteria_block_number: row.get(13)?,
        milestone_ids,
        milestones_tx_hash: parsed_opt(row, 15)?,
        milestones_block_number: row.get(16)?,
        status: conv(17, StudyStatus::from_db_string(&row.get::<_, String>(17)?))?,
        created_at: timestamp(row, 18)?,
        updated_at: timestamp(row, 19)?,
    })
}

/// Map a decoding failure into a rusqlite conversion error for `column`
fn conv<T, E: std::fmt::Display>(column: usize, result: Result<T, E>) -> rusqlite::Result<T> {
    result.map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            Box::new(StorageError::InvalidData(e.to_string())),
        )
    })
}

fn parsed<T>(row: &Row, column: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    conv(column, row.get::<_, String>(column)?.parse::<T>())
}

fn parsed_opt<T>(row: &Row, column: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    row.get::<_, Option<String>>(column)?
        .map(|s| conv(column, s.parse::<T>()))
        .transpose()
}

fn timestamp(row: &Row, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(column)?;
    conv(
        column,
        DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| format!("Invalid timestamp: {}", secs)),
    )
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::InvalidData(format!("Invalid session id {}: {}", s, e)))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn now() -> DateTime<Utc> {
    truncate_to_secs(Utc::now())
}

/// Timestamps are stored with second precision
fn truncate_to_secs(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}
