use chrono::{DateTime, Utc};
use crewgrid_core::{CellId, GridFlavor, WeekKey};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::{AllocationGridEngine, GridEvent};
use crate::error::SyncError;
use crate::feed::ChangeEvent;
use crate::remote::{cell_from_rows, rows_to_cells, RemoteStore};

/// Monotonic token attached to a locally issued write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteVersion(u64);

#[derive(Debug, Default)]
struct CellVersion {
    in_flight: BTreeSet<WriteVersion>,
    /// Latest acknowledged write and its commit time
    acknowledged: Option<(WriteVersion, DateTime<Utc>)>,
}

/// How to converge after a change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    Ignore,
    /// Refetch just these cells
    Patch(Vec<CellId>),
    /// Rebuild every loaded week
    Refresh,
}

/// Tracks local writes per cell and decides what each change event needs.
///
/// An event older than the last acknowledged local write of a cell carries
/// nothing the engine does not already hold, so it is dropped instead of
/// briefly reverting the cell.
#[derive(Debug, Default)]
pub struct SyncReconciler {
    next_version: u64,
    cells: HashMap<CellId, CellVersion>,
}

impl SyncReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a version for a write about to be sent
    pub fn begin_write(&mut self, cell: CellId) -> WriteVersion {
        self.next_version += 1;
        let version = WriteVersion(self.next_version);
        self.cells.entry(cell).or_default().in_flight.insert(version);
        version
    }

    /// Record the server commit time of a finished write
    pub fn acknowledge(&mut self, cell: CellId, version: WriteVersion, committed_at: DateTime<Utc>) {
        let entry = self.cells.entry(cell).or_default();
        entry.in_flight.remove(&version);
        let newer = match entry.acknowledged {
            Some((acked, at)) => version > acked && committed_at >= at,
            None => true,
        };
        if newer {
            entry.acknowledged = Some((version, committed_at));
        }
    }

    /// Forget a write that failed
    pub fn abandon(&mut self, cell: CellId, version: WriteVersion) {
        if let Some(entry) = self.cells.get_mut(&cell) {
            entry.in_flight.remove(&version);
        }
    }

    pub fn has_pending_writes(&self, cell: &CellId) -> bool {
        self.cells
            .get(cell)
            .is_some_and(|entry| !entry.in_flight.is_empty())
    }

    pub fn last_acknowledged(&self, cell: &CellId) -> Option<DateTime<Utc>> {
        self.cells.get(cell).and_then(|entry| entry.acknowledged).map(|(_, at)| at)
    }

    /// The event predates the last acknowledged local write of the cell
    pub fn is_stale(&self, cell: &CellId, committed_at: DateTime<Utc>) -> bool {
        self.last_acknowledged(cell)
            .is_some_and(|acked| committed_at < acked)
    }

    /// Decide what a change event needs, given the weeks currently loaded
    pub fn classify<F: GridFlavor>(&self, event: &ChangeEvent, loaded: &BTreeSet<WeekKey>) -> Reconcile {
        if event.table == F::TABLE.name() {
            let Some(keys) = event.affected_keys() else {
                return Reconcile::Refresh;
            };
            let cells: Vec<CellId> = keys
                .into_iter()
                .map(|(user, date)| CellId::for_date(user, date))
                .filter(|cell| loaded.contains(&cell.week))
                .filter(|cell| !self.is_stale(cell, event.commit_timestamp))
                .collect();
            if cells.is_empty() {
                Reconcile::Ignore
            } else {
                Reconcile::Patch(cells)
            }
        } else if F::CROSS_CUTTING_TABLES.contains(&event.table.as_str()) {
            Reconcile::Refresh
        } else {
            Reconcile::Ignore
        }
    }
}

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    /// Converge the local store after one change event
    pub async fn handle_change(&mut self, event: &ChangeEvent) -> Result<(), SyncError> {
        match self.reconciler.classify::<F>(event, &self.loaded_weeks) {
            Reconcile::Ignore => {
                tracing::trace!("Ignoring {:?} on {}", event.operation, event.table);
                Ok(())
            }
            Reconcile::Patch(cells) => {
                for cell in &cells {
                    if let Err(err) = self.patch_cell(*cell).await {
                        tracing::warn!("Patch of {} failed, refreshing: {}", cell, err);
                        return self.refresh_all().await;
                    }
                }
                self.emit(GridEvent::CellsChanged { cells });
                Ok(())
            }
            Reconcile::Refresh => {
                tracing::info!("Change on {} forces a refresh of the {} grid", event.table, F::NAME);
                self.refresh_all().await
            }
        }
    }

    async fn patch_cell(&mut self, cell: CellId) -> Result<(), SyncError> {
        let rows = self.remote.fetch_cell(F::TABLE, cell.user, cell.date()).await?;
        let content = cell_from_rows(rows);
        tracing::debug!("Patched {} with {} items", cell, content.len());
        self.store.set(cell, content);
        Ok(())
    }

    /// Rebuild every loaded week from the remote store without moving the view
    pub async fn refresh_all(&mut self) -> Result<(), SyncError> {
        let offset = self.view.scroll_offset();
        let weeks: Vec<WeekKey> = self.loaded_weeks.iter().copied().collect();

        let mut result = Ok(());
        for week in weeks {
            match self.remote.fetch_week(F::TABLE, week).await {
                Ok(rows) => {
                    self.store.replace_week(week, rows_to_cells(rows));
                    self.emit(GridEvent::WeekRefreshed { week });
                }
                Err(err) => {
                    tracing::error!("Refresh of {} week {} failed: {}", F::NAME, week, err);
                    result = Err(SyncError::from(err));
                    break;
                }
            }
        }

        self.view.restore_scroll(offset);
        tracing::info!("Refreshed {} weeks of the {} grid", self.loaded_weeks.len(), F::NAME);
        result
    }

    /// Process change events until the feed closes
    pub async fn run(&mut self, mut feed: broadcast::Receiver<ChangeEvent>) {
        loop {
            let outcome = match feed.recv().await {
                Ok(event) => self.handle_change(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Change feed lagged by {} events, refreshing", skipped);
                    self.refresh_all().await
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(err) = outcome {
                tracing::error!("Failed to reconcile {} grid: {}", F::NAME, err);
            }
        }
        tracing::debug!("Change feed closed for the {} grid", F::NAME);
    }

    /// Process the events already queued on the feed, returning how many were handled
    pub async fn drain(&mut self, feed: &mut broadcast::Receiver<ChangeEvent>) -> Result<usize, SyncError> {
        let mut handled = 0;
        loop {
            match feed.try_recv() {
                Ok(event) => {
                    self.handle_change(&event).await?;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Change feed lagged by {} events, refreshing", skipped);
                    self.refresh_all().await?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(handled),
            }
        }
    }
}
