use crewgrid_core::GridFlavor;
use crewgrid_history::Reverted;

use super::mutation::RemoteWrite;
use super::{AllocationGridEngine, GridEvent};
use crate::error::SyncError;
use crate::remote::RemoteStore;

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    /// Revert the last recorded action and re-persist the cells it touched.
    ///
    /// The entry is consumed even when re-persisting fails; the failure is
    /// reported and the grid resyncs.
    pub async fn undo(&mut self) -> Result<(), SyncError> {
        let Some(reverted) = self.history.undo(&mut self.store) else {
            return Ok(());
        };
        tracing::debug!("Undo {}: {} cells", reverted.description, reverted.changed.len());
        self.replay(reverted).await
    }

    /// Re-apply the last undone action
    pub async fn redo(&mut self) -> Result<(), SyncError> {
        let Some(reverted) = self.history.redo(&mut self.store) else {
            return Ok(());
        };
        tracing::debug!("Redo {}: {} cells", reverted.description, reverted.changed.len());
        self.replay(reverted).await
    }

    /// Write every changed cell as it now stands locally
    async fn replay(&mut self, reverted: Reverted) -> Result<(), SyncError> {
        if reverted.changed.is_empty() {
            return Ok(());
        }
        self.emit(GridEvent::CellsChanged {
            cells: reverted.changed.clone(),
        });

        let mut first_error = None;
        for cell in reverted.changed {
            let rows = self.store.get(&cell).to_vec();
            if let Err(err) = self.write_remote(cell, RemoteWrite::Replace(rows)).await {
                tracing::warn!("Could not re-persist {} during {}: {}", cell, reverted.description, err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(self.fail(err).await),
            None => Ok(()),
        }
    }
}
