//! In-process remote store.
//!
//! Behaves like the hosted store closely enough to drive the engine without a
//! database: rows get ids and positions, every write publishes change events,
//! and failures can be queued to exercise the recovery paths.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use crewgrid_core::{AllocationTable, Assignment, RegistryEntry, UserId, WeekKey};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::error::RemoteError;
use crate::feed::{ChangeEvent, ChangeFeed, ChangeOperation};
use crate::remote::{AllocationRow, RemoteStore, WriteAck};

#[derive(Default)]
struct MemoryState {
    rows: Vec<(AllocationTable, AllocationRow)>,
    next_id: i64,
    last_commit: Option<DateTime<Utc>>,
    registry: HashMap<AllocationTable, Vec<RegistryEntry>>,
    users: HashMap<UserId, String>,
    resources: HashMap<AllocationTable, HashMap<i64, String>>,
    /// Failures keyed by the write number they hit
    write_failures: Vec<(usize, RemoteError)>,
    read_failures: VecDeque<RemoteError>,
    writes: usize,
    minimal_delete_events: bool,
}

impl MemoryState {
    /// Strictly increasing commit clock
    fn commit_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(at);
        at
    }
}

/// Remote store kept in memory
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn row_json(row: &AllocationRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "user_id": row.user_id.to_string(),
        "date": row.date.format("%Y-%m-%d").to_string(),
        "position": row.position,
        "assignment": row.assignment,
    })
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge the other assertions
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, table: AllocationTable, operation: ChangeOperation, record: Option<serde_json::Value>, old_record: Option<serde_json::Value>, at: DateTime<Utc>) {
        // Ignore errors if no receivers
        let _ = self.events.send(ChangeEvent {
            table: table.name().to_string(),
            operation,
            record,
            old_record,
            commit_timestamp: at,
        });
    }

    /// Publish an event for a table the engine does not write, e.g. a renamed project
    pub fn touch_table(&self, table: &str) {
        let at = self.lock().commit_time();
        let _ = self.events.send(ChangeEvent {
            table: table.to_string(),
            operation: ChangeOperation::Update,
            record: Some(json!({})),
            old_record: None,
            commit_timestamp: at,
        });
    }

    /// Make the next write fail with the given error
    pub fn fail_next_write(&self, err: RemoteError) {
        self.fail_nth_write(1, err);
    }

    /// Make the `n`th write from now fail, counting from 1
    pub fn fail_nth_write(&self, n: usize, err: RemoteError) {
        let mut state = self.lock();
        let at = state.writes + n.max(1);
        state.write_failures.push((at, err));
    }

    /// Make the next read fail with the given error
    pub fn fail_next_read(&self, err: RemoteError) {
        self.lock().read_failures.push_back(err);
    }

    /// Emit delete events carrying only the row id
    pub fn set_minimal_delete_events(&self, minimal: bool) {
        self.lock().minimal_delete_events = minimal;
    }

    /// Insert rows directly, without events or failure injection
    pub fn seed(&self, table: AllocationTable, user: UserId, date: NaiveDate, assignments: &[Assignment]) {
        let mut state = self.lock();
        let at = state.commit_time();
        Self::append(&mut state, table, user, date, assignments, at);
    }

    pub fn set_registry(&self, table: AllocationTable, entries: Vec<RegistryEntry>) {
        self.lock().registry.insert(table, entries);
    }

    pub fn set_user_name(&self, user: UserId, name: impl Into<String>) {
        self.lock().users.insert(user, name.into());
    }

    pub fn set_resource_name(&self, table: AllocationTable, id: i64, name: impl Into<String>) {
        self.lock().resources.entry(table).or_default().insert(id, name.into());
    }

    /// Assignments of a cell in stored order
    pub fn cell(&self, table: AllocationTable, user: UserId, date: NaiveDate) -> Vec<Assignment> {
        let state = self.lock();
        let mut rows: Vec<&AllocationRow> = state
            .rows
            .iter()
            .filter(|(t, row)| *t == table && row.user_id == user && row.date == date)
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| (row.position, row.id));
        rows.into_iter().map(|row| row.assignment.clone()).collect()
    }

    /// Number of stored rows in a table
    pub fn row_count(&self, table: AllocationTable) -> usize {
        self.lock().rows.iter().filter(|(t, _)| *t == table).count()
    }

    /// Number of write calls that reached the store, failed ones included
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn append(
        state: &mut MemoryState,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
        at: DateTime<Utc>,
    ) -> Vec<AllocationRow> {
        let mut position = state
            .rows
            .iter()
            .filter(|(t, row)| *t == table && row.user_id == user && row.date == date)
            .map(|(_, row)| row.position + 1)
            .max()
            .unwrap_or(0);

        let mut inserted = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let row = AllocationRow {
                id: state.next_id,
                user_id: user,
                date,
                position,
                assignment: assignment.clone(),
                updated_at: at,
            };
            state.next_id += 1;
            position += 1;
            state.rows.push((table, row.clone()));
            inserted.push(row);
        }
        inserted
    }

    fn begin_write(&self) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.writes += 1;
        let current = state.writes;
        match state.write_failures.iter().position(|(at, _)| *at == current) {
            Some(pos) => Err(state.write_failures.remove(pos).1),
            None => Ok(()),
        }
    }

    fn begin_read(&self) -> Result<(), RemoteError> {
        match self.lock().read_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ChangeFeed for MemoryRemoteStore {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_week(&self, table: AllocationTable, week: WeekKey) -> Result<Vec<AllocationRow>, RemoteError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(state
            .rows
            .iter()
            .filter(|(t, row)| *t == table && row.date >= week.start() && row.date <= week.end())
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn fetch_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Vec<AllocationRow>, RemoteError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(state
            .rows
            .iter()
            .filter(|(t, row)| *t == table && row.user_id == user && row.date == date)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn delete_cell(&self, table: AllocationTable, user: UserId, date: NaiveDate) -> Result<WriteAck, RemoteError> {
        self.begin_write()?;
        let (removed, at, minimal) = {
            let mut state = self.lock();
            let at = state.commit_time();
            let mut removed = Vec::new();
            state.rows.retain(|(t, row)| {
                let hit = *t == table && row.user_id == user && row.date == date;
                if hit {
                    removed.push(row.clone());
                }
                !hit
            });
            (removed, at, state.minimal_delete_events)
        };

        for row in &removed {
            let old = if minimal {
                json!({ "id": row.id })
            } else {
                row_json(row)
            };
            self.publish(table, ChangeOperation::Delete, None, Some(old), at);
        }
        Ok(WriteAck { committed_at: at })
    }

    async fn insert_rows(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
    ) -> Result<WriteAck, RemoteError> {
        self.begin_write()?;
        let (inserted, at) = {
            let mut state = self.lock();
            let at = state.commit_time();
            (Self::append(&mut state, table, user, date, assignments, at), at)
        };

        for row in &inserted {
            self.publish(table, ChangeOperation::Insert, Some(row_json(row)), None, at);
        }
        Ok(WriteAck { committed_at: at })
    }

    async fn active_registry(&self, table: AllocationTable) -> Result<Vec<RegistryEntry>, RemoteError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(state
            .registry
            .get(&table)
            .map(|entries| entries.iter().filter(|e| e.is_active()).cloned().collect())
            .unwrap_or_default())
    }

    async fn user_names(&self, ids: &[UserId]) -> Result<HashMap<UserId, String>, RemoteError> {
        self.begin_read()?;
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|name| (*id, name.clone())))
            .collect())
    }

    async fn resource_names(&self, table: AllocationTable, ids: &[i64]) -> Result<HashMap<i64, String>, RemoteError> {
        self.begin_read()?;
        let state = self.lock();
        let Some(names) = state.resources.get(&table) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TABLE: AllocationTable = AllocationTable::Allocations;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_replace_cell_deletes_then_inserts() {
        let store = MemoryRemoteStore::new();
        let user = Uuid::new_v4();
        store.seed(TABLE, user, date(), &[Assignment::leave("Vacation")]);
        let mut feed = store.subscribe();

        store
            .replace_cell(TABLE, user, date(), &[Assignment::project(1, "P-1", "One")])
            .await
            .unwrap();

        assert_eq!(store.cell(TABLE, user, date()), vec![Assignment::project(1, "P-1", "One")]);
        assert_eq!(feed.recv().await.unwrap().operation, ChangeOperation::Delete);
        assert_eq!(feed.recv().await.unwrap().operation, ChangeOperation::Insert);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_appends_positions() {
        let store = MemoryRemoteStore::new();
        let user = Uuid::new_v4();
        store.seed(TABLE, user, date(), &[Assignment::project(1, "P-1", "One")]);
        store
            .insert_rows(TABLE, user, date(), &[Assignment::project(2, "P-2", "Two")])
            .await
            .unwrap();

        let rows = store.fetch_cell(TABLE, user, date()).await.unwrap();
        let mut positions: Vec<i32> = rows.iter().map(|r| r.position).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_queued_failure_is_returned_once() {
        let store = MemoryRemoteStore::new();
        let user = Uuid::new_v4();
        store.fail_next_write(RemoteError::privilege("row-level security"));

        let err = store.delete_cell(TABLE, user, date()).await.unwrap_err();
        assert_eq!(err, RemoteError::privilege("row-level security"));
        assert!(store.delete_cell(TABLE, user, date()).await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_clock_is_monotonic() {
        let store = MemoryRemoteStore::new();
        let user = Uuid::new_v4();
        let first = store.delete_cell(TABLE, user, date()).await.unwrap();
        let second = store.delete_cell(TABLE, user, date()).await.unwrap();
        assert!(second.committed_at > first.committed_at);
    }
}
