//! Storage layer for the study index
//!
//! Manages the data directory and SQLite persistence of sessions, attempts
//! and confirmed steps.

pub mod file_system;
pub mod index_storage;
pub mod models;

pub use index_storage::{IndexConflict, IndexError, StepIndexer, StorageError};
pub use models::{
    AttemptStatus, IndexResult, RecordedStep, SessionRecord, SessionSnapshot, SessionSummary,
    StepAttempt, StepConfirmation, StudyIndexEntry, StudyStatus,
};
