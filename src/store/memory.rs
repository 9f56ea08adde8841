//! An in-memory [`WorkflowStore`], the reference implementation used by
//! tests and grounded on `everruns-durable`'s `InMemoryWorkflowEventStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{ListRunsQuery, RunPage, StoreError, WorkflowStore};
use crate::workflow::snapshot::{Run, Snapshot};

struct RunRecord {
    run: Run,
    snapshots: Vec<Snapshot>,
}

/// An in-memory, process-local implementation of [`WorkflowStore`].
///
/// Not durable across process restarts — suitable for tests and for
/// embedding applications that accept losing in-flight runs on crash. A
/// production deployment swaps this for a real backend (e.g. Postgres, the
/// way `everruns-durable` offers `PostgresWorkflowEventStore` alongside its
/// in-memory one) without changing any caller of [`WorkflowStore`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    runs: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn create_run(&self, run: Run) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        runs.insert(
            run.id,
            RunRecord {
                run,
                snapshots: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs
            .get_mut(&snapshot.run_id)
            .ok_or(StoreError::RunNotFound(snapshot.run_id))?;

        let expected = record.snapshots.len() as u64;
        if snapshot.sequence != expected {
            return Err(StoreError::OutOfSequence {
                run_id: snapshot.run_id,
                got: snapshot.sequence,
                expected,
            });
        }

        record.run.apply_snapshot(snapshot.clone());
        record.snapshots.push(snapshot);
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Run, StoreError> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .map(|record| record.run.clone())
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn get_snapshot(&self, run_id: Uuid, sequence: u64) -> Result<Snapshot, StoreError> {
        let runs = self.runs.read().await;
        let record = runs.get(&run_id).ok_or(StoreError::RunNotFound(run_id))?;
        record
            .snapshots
            .get(sequence as usize)
            .cloned()
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn list_snapshots(&self, run_id: Uuid) -> Result<Vec<Snapshot>, StoreError> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .map(|record| record.snapshots.clone())
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn list_runs(&self, query: ListRunsQuery) -> Result<RunPage, StoreError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<Run> = runs
            .values()
            .map(|record| record.run.clone())
            .filter(|run| query.agent_id.as_deref().map_or(true, |id| id == run.agent_id))
            .filter(|run| {
                query
                    .resource_id
                    .as_deref()
                    .map_or(true, |id| run.resource_id.as_deref() == Some(id))
            })
            .filter(|run| query.from_date.map_or(true, |from| run.created_at >= from))
            .filter(|run| query.to_date.map_or(true, |to| run.created_at <= to))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let per_page = query.per_page.max(1) as usize;
        let start = (query.page as usize).saturating_mul(per_page);
        let page = matching.into_iter().skip(start).take(per_page).collect();

        Ok(RunPage { runs: page, total })
    }

    async fn cancel_run(&self, run_id: Uuid) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(&run_id).ok_or(StoreError::RunNotFound(run_id))?;
        record.run.cancel();
        Ok(())
    }
}
