use crewgrid_core::{Assignment, CellContent, CellId, GridError, GridFlavor};
use crewgrid_history::Transaction;

use super::{AllocationGridEngine, GridEvent};
use crate::error::SyncError;
use crate::remote::{RemoteStore, WriteAck};

/// Remote side of a cell mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteWrite {
    /// Delete every row of the cell, then insert these
    Replace(Vec<Assignment>),
    /// Append rows after the existing ones
    Insert(Vec<Assignment>),
}

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    /// Replace the whole cell. `None` clears it.
    pub async fn assign(&mut self, cell: CellId, assignment: Option<Assignment>) -> Result<(), SyncError> {
        if let Some(assignment) = &assignment {
            F::check(assignment)?;
        }
        let content = CellContent::from(assignment);
        let rows = content.to_vec();
        let description = if content.is_empty() { "Clear" } else { "Assign" };

        self.apply_local(Transaction::set(description, cell, content));
        self.persist(cell, RemoteWrite::Replace(rows)).await
    }

    /// Add a project or equipment item next to what the cell already holds
    pub async fn append_second(&mut self, cell: CellId, assignment: Assignment) -> Result<(), SyncError> {
        F::check(&assignment)?;
        if !assignment.is_mergeable() {
            return Err(GridError::NotMergeable(assignment.kind()).into());
        }

        let current = self.store.get(&cell);
        if current.is_empty() {
            return self.assign(cell, Some(assignment)).await;
        }
        let next = current.appended(assignment.clone())?;

        self.apply_local(Transaction::set("Add assignment", cell, next));
        self.persist(cell, RemoteWrite::Insert(vec![assignment])).await
    }

    /// Replace one item of the cell
    pub async fn edit_at(&mut self, cell: CellId, index: usize, assignment: Assignment) -> Result<(), SyncError> {
        F::check(&assignment)?;
        let next = self.store.get(&cell).replaced_at(index, assignment)?;
        let rows = next.to_vec();

        self.apply_local(Transaction::set("Edit assignment", cell, next));
        self.persist(cell, RemoteWrite::Replace(rows)).await
    }

    /// Remove one item of a multi-item cell. Empty and single-item cells are left alone.
    pub async fn delete_at(&mut self, cell: CellId, index: usize) -> Result<(), SyncError> {
        let current = self.store.get(&cell);
        if !matches!(current, CellContent::Multiple(_)) {
            return Ok(());
        }
        let (next, _) = current.removed_at(index)?;
        let rows = next.to_vec();

        self.apply_local(Transaction::set("Remove assignment", cell, next));
        self.persist(cell, RemoteWrite::Replace(rows)).await
    }

    pub async fn clear(&mut self, cell: CellId) -> Result<(), SyncError> {
        self.assign(cell, None).await
    }

    /// Record and apply a transaction to the local store
    pub(crate) fn apply_local(&mut self, tx: Transaction) -> Vec<CellId> {
        let cells = self.history.execute(tx, &mut self.store);
        self.emit(GridEvent::CellsChanged { cells: cells.clone() });
        cells
    }

    /// Send one cell write, tracking its version
    pub(crate) async fn write_remote(&mut self, cell: CellId, write: RemoteWrite) -> Result<WriteAck, SyncError> {
        let version = self.reconciler.begin_write(cell);
        let (user, date) = (cell.user, cell.date());
        let result = match &write {
            RemoteWrite::Replace(rows) => self.remote.replace_cell(F::TABLE, user, date, rows).await,
            RemoteWrite::Insert(rows) => self.remote.insert_rows(F::TABLE, user, date, rows).await,
        };

        match result {
            Ok(ack) => {
                self.reconciler.acknowledge(cell, version, ack.committed_at);
                tracing::debug!("Write to {} acknowledged at {}", cell, ack.committed_at);
                Ok(ack)
            }
            Err(err) => {
                self.reconciler.abandon(cell, version);
                Err(err.into())
            }
        }
    }

    /// Write a cell, recovering through [`Self::fail`] on error
    pub(crate) async fn persist(&mut self, cell: CellId, write: RemoteWrite) -> Result<(), SyncError> {
        match self.write_remote(cell, write).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Report a remote failure and resync. The local store is not rolled back.
    pub(crate) async fn fail(&mut self, err: SyncError) -> SyncError {
        match &err {
            SyncError::Privilege(_) => tracing::warn!("{} grid write denied: {}", F::NAME, err),
            _ => tracing::error!("{} grid write failed: {}", F::NAME, err),
        }
        self.notify(&err);

        if self.config.refresh_on_failure {
            if let Err(refresh_err) = self.refresh_all().await {
                tracing::error!("Resync after failure also failed: {}", refresh_err);
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{date, p, project_engine};
    use crate::error::{ErrorCategory, RemoteError};
    use crewgrid_core::{AllocationTable, AssignmentKind};
    use uuid::Uuid;

    const TABLE: AllocationTable = AllocationTable::Allocations;

    #[tokio::test]
    async fn test_assign_then_get() {
        let (remote, mut engine) = project_engine().await;
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date());

        engine.assign(cell, Some(Assignment::leave("Vacation"))).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Single(Assignment::leave("Vacation")));
        assert_eq!(remote.cell(TABLE, user, date()), vec![Assignment::leave("Vacation")]);

        engine.assign(cell, None).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Empty);
        assert!(remote.cell(TABLE, user, date()).is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_multi_item_cell() {
        let (remote, mut engine) = project_engine().await;
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date());

        engine.assign(cell, Some(p(100))).await.unwrap();
        engine.append_second(cell, p(200)).await.unwrap();
        engine.clear(cell).await.unwrap();

        assert!(engine.store().get(&cell).is_empty());
        assert_eq!(remote.row_count(TABLE), 0);
        assert_eq!(engine.history().undo_description(), Some("Clear"));
    }

    #[tokio::test]
    async fn test_append_then_delete_collapses() {
        let (remote, mut engine) = project_engine().await;
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date());

        engine.assign(cell, Some(p(100))).await.unwrap();
        engine.append_second(cell, p(200)).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Multiple(vec![p(100), p(200)]));
        assert_eq!(remote.cell(TABLE, user, date()), vec![p(100), p(200)]);

        engine.delete_at(cell, 0).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Single(p(200)));
        assert_eq!(remote.cell(TABLE, user, date()), vec![p(200)]);
    }

    #[tokio::test]
    async fn test_append_to_empty_assigns() {
        let (_remote, mut engine) = project_engine().await;
        let cell = CellId::for_date(Uuid::new_v4(), date());

        engine.append_second(cell, p(100)).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Single(p(100)));
    }

    #[tokio::test]
    async fn test_delete_at_on_empty_or_single_is_noop() {
        let (remote, mut engine) = project_engine().await;
        let cell = CellId::for_date(Uuid::new_v4(), date());

        engine.delete_at(cell, 0).await.unwrap();
        engine.assign(cell, Some(p(100))).await.unwrap();
        let writes = remote.write_count();
        let undo_steps = engine.history().undo_count();

        engine.delete_at(cell, 3).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Single(p(100)));
        assert_eq!(remote.write_count(), writes);
        assert_eq!(engine.history().undo_count(), undo_steps);
    }

    #[tokio::test]
    async fn test_edit_at_replaces_item() {
        let (remote, mut engine) = project_engine().await;
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date());

        engine.assign(cell, Some(p(100))).await.unwrap();
        engine.append_second(cell, p(200)).await.unwrap();
        engine.edit_at(cell, 1, p(300)).await.unwrap();
        assert_eq!(remote.cell(TABLE, user, date()), vec![p(100), p(300)]);

        // A leave replaces the whole cell
        engine.edit_at(cell, 0, Assignment::leave("Sick")).await.unwrap();
        assert_eq!(engine.store().get(&cell), &CellContent::Single(Assignment::leave("Sick")));
        assert_eq!(remote.cell(TABLE, user, date()), vec![Assignment::leave("Sick")]);
    }

    #[tokio::test]
    async fn test_validation_errors_touch_nothing() {
        let (remote, mut engine) = project_engine().await;
        let cell = CellId::for_date(Uuid::new_v4(), date());
        engine.assign(cell, Some(Assignment::status("Office"))).await.unwrap();
        let writes = remote.write_count();

        let err = engine.append_second(cell, p(100)).await.unwrap_err();
        assert_eq!(err, SyncError::Validation(GridError::NotMergeable(AssignmentKind::Status)));

        let err = engine.assign(cell, Some(Assignment::equipment(3))).await.unwrap_err();
        assert!(err.is_validation());

        let err = engine.append_second(cell, Assignment::leave("Sick")).await.unwrap_err();
        assert!(err.is_validation());

        assert_eq!(remote.write_count(), writes);
        assert_eq!(engine.history().undo_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_notifies_and_resyncs() {
        let (remote, mut engine) = project_engine().await;
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date());
        let mut events = engine.subscribe();

        remote.fail_next_write(RemoteError::privilege("new row violates row-level security policy"));
        let err = engine.assign(cell, Some(p(100))).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Privilege);

        // The optimistic value is replaced by what the remote holds
        assert!(engine.store().get(&cell).is_empty());

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let GridEvent::Failed { notification } = event {
                assert_eq!(notification.category, ErrorCategory::Privilege);
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }
}
