//! Drag-and-drop relocation.
//!
//! A move is two remote writes: the dragged item is inserted under the target
//! (phase A), then the source is rewritten without it (phase B). If phase B
//! fails, the target is put back to its rows from before the move so the
//! item is not left in both cells.

use crewgrid_core::{Assignment, CellContent, CellId, DragSource, DropTarget, GridError, GridFlavor};
use crewgrid_history::Transaction;

use super::mutation::RemoteWrite;
use super::AllocationGridEngine;
use crate::error::SyncError;
use crate::remote::RemoteStore;

/// The remote steps of one move and the write that compensates phase A
#[derive(Debug, Clone)]
struct MoveSaga {
    dragged: Assignment,
    source: CellId,
    remaining: CellContent,
    target: CellId,
    target_before: CellContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SagaStep {
    InsertAtTarget,
    RewriteSource,
    Compensate,
}

impl MoveSaga {
    /// Plan a move against the current local contents
    fn plan(
        source: DragSource,
        target: DropTarget,
        source_content: &CellContent,
        target_content: &CellContent,
    ) -> Result<Self, GridError> {
        if source.cell == target.cell {
            return Err(GridError::NoOpMove);
        }

        let (remaining, dragged) = match source_content {
            CellContent::Empty => return Err(GridError::EmptyCell),
            CellContent::Single(item) => (CellContent::Empty, item.clone()),
            CellContent::Multiple(_) => source_content.removed_at(source.index)?,
        };

        // Never overwrite the target: whatever it holds must take the item alongside
        if !target_content.is_empty() {
            target_content.appended(dragged.clone())?;
        }

        Ok(Self {
            dragged,
            source: source.cell,
            remaining,
            target: target.cell,
            target_before: target_content.clone(),
        })
    }

    fn target_after(&self) -> CellContent {
        match self.target_before.appended(self.dragged.clone()) {
            Ok(content) => content,
            Err(_) => CellContent::Single(self.dragged.clone()),
        }
    }

    fn write_for(&self, step: SagaStep) -> (CellId, RemoteWrite) {
        match step {
            SagaStep::InsertAtTarget => (self.target, RemoteWrite::Insert(vec![self.dragged.clone()])),
            SagaStep::RewriteSource => (self.source, RemoteWrite::Replace(self.remaining.to_vec())),
            SagaStep::Compensate => (self.target, RemoteWrite::Replace(self.target_before.to_vec())),
        }
    }
}

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    /// Move an item named by drag-and-drop tokens
    pub async fn move_item(&mut self, source: &str, target: &str) -> Result<(), SyncError> {
        let source: DragSource = source.parse()?;
        let target: DropTarget = target.parse()?;
        self.relocate(source, target).await
    }

    /// Move one item from a cell to another cell
    pub async fn relocate(&mut self, source: DragSource, target: DropTarget) -> Result<(), SyncError> {
        let saga = MoveSaga::plan(
            source,
            target,
            self.store.get(&source.cell),
            self.store.get(&target.cell),
        )?;
        F::check(&saga.dragged)?;

        let mut tx = Transaction::new("Move assignment");
        tx.stage(saga.target, saga.target_after());
        tx.stage(saga.source, saga.remaining.clone());
        self.apply_local(tx);

        let (cell, write) = saga.write_for(SagaStep::InsertAtTarget);
        if let Err(err) = self.write_remote(cell, write).await {
            return Err(self.fail(err).await);
        }

        let (cell, write) = saga.write_for(SagaStep::RewriteSource);
        if let Err(err) = self.write_remote(cell, write).await {
            tracing::warn!("Move out of {} failed, restoring {}", saga.source, saga.target);
            let (cell, write) = saga.write_for(SagaStep::Compensate);
            if let Err(compensation_err) = self.write_remote(cell, write).await {
                tracing::error!("Could not restore {} after a failed move: {}", saga.target, compensation_err);
            }
            return Err(self.fail(err).await);
        }

        tracing::debug!("Moved {} from {} to {}", saga.dragged.label(), saga.source, saga.target);
        Ok(())
    }
}
