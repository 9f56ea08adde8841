//! The durable persistence interface for runs and snapshots (§6).
//!
//! Grounded on `everruns-durable`'s `WorkflowEventStore`/`InMemoryWorkflowEventStore`
//! split: one trait for the storage contract, one in-memory reference
//! implementation good enough for tests and single-process deployments.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::workflow::snapshot::{Run, Snapshot};

/// Filter/pagination parameters for [`WorkflowStore::list_runs`] (spec §6).
#[derive(Debug, Clone, Default)]
pub struct ListRunsQuery {
    /// Restrict to runs owned by this agent id.
    pub agent_id: Option<String>,
    /// Restrict to runs created at or after this time.
    pub from_date: Option<DateTime<Utc>>,
    /// Restrict to runs created at or before this time.
    pub to_date: Option<DateTime<Utc>>,
    /// Restrict to runs with this `resource_id`.
    pub resource_id: Option<String>,
    /// Zero-based page index.
    pub page: u32,
    /// Page size.
    pub per_page: u32,
}

/// One page of `list_runs` results plus the total number of matching runs
/// across all pages (not just this one), so callers can render pagination.
#[derive(Debug, Clone)]
pub struct RunPage {
    /// The runs in this page, newest-created first.
    pub runs: Vec<Run>,
    /// Total number of runs matching the query, ignoring pagination.
    pub total: usize,
}

/// Errors raised by a [`WorkflowStore`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No run exists under the given id.
    #[error("no run found with id {0}")]
    RunNotFound(Uuid),

    /// A snapshot was appended out of sequence (its `sequence` did not equal
    /// the store's expected next value), which would indicate a concurrent
    /// writer or a replay bug.
    #[error("snapshot for run {run_id} had sequence {got}, expected {expected}")]
    OutOfSequence {
        /// The run the snapshot belongs to.
        run_id: Uuid,
        /// The sequence number actually supplied.
        got: u64,
        /// The sequence number the store expected next.
        expected: u64,
    },

    /// An implementation-specific backend failure (I/O, serialization).
    #[error("workflow store backend error: {0}")]
    Backend(String),
}

/// The durable persistence contract: create runs, append snapshots, and read
/// them back. Every mutating operation on `facade::DurableAgent` goes
/// through one of these calls so a crash between steps leaves the store in
/// a consistent, resumable state.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a freshly created run.
    async fn create_run(&self, run: Run) -> Result<(), StoreError>;

    /// Append a snapshot to a run, enforcing that `snapshot.sequence` is
    /// exactly one past the run's current latest sequence (or `0` for the
    /// first snapshot). This is the memoization boundary: replaying the same
    /// step twice must not append a duplicate snapshot.
    async fn append_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Fetch a run's current durable record.
    async fn get_run(&self, run_id: Uuid) -> Result<Run, StoreError>;

    /// Fetch a specific snapshot by sequence number, used by
    /// `engine::nested`'s time-travel re-execution to reconstruct context as
    /// of an earlier step.
    async fn get_snapshot(&self, run_id: Uuid, sequence: u64) -> Result<Snapshot, StoreError>;

    /// Fetch every snapshot for a run, in sequence order.
    async fn list_snapshots(&self, run_id: Uuid) -> Result<Vec<Snapshot>, StoreError>;

    /// List runs matching `query`, newest-created first, paginated.
    async fn list_runs(&self, query: ListRunsQuery) -> Result<RunPage, StoreError>;

    /// Mark a run canceled directly, independent of whatever step is in
    /// flight (spec §5's `workflow.cancel.{workflowId}` handling).
    async fn cancel_run(&self, run_id: Uuid) -> Result<(), StoreError>;
}
