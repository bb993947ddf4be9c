use crewgrid_core::{CellContent, CellId, ClipboardEntry, ClipboardMode, GridFlavor};

use super::{AllocationGridEngine, GridEvent};
use crate::error::SyncError;
use crate::remote::RemoteStore;

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    /// Hold a copy of a cell, or of one item of a multi-item cell
    pub fn copy(&mut self, cell: CellId, index: Option<usize>) -> Result<(), SyncError> {
        self.clipboard.copy(cell, self.store.get(&cell), index)?;
        self.emit(GridEvent::ClipboardChanged {
            mode: ClipboardMode::Copy,
        });
        Ok(())
    }

    /// Like [`Self::copy`], but the source goes away once the paste lands
    pub fn cut(&mut self, cell: CellId, index: Option<usize>) -> Result<(), SyncError> {
        self.clipboard.cut(cell, self.store.get(&cell), index)?;
        self.emit(GridEvent::ClipboardChanged {
            mode: ClipboardMode::Cut,
        });
        Ok(())
    }

    /// Drop the held entry onto a cell.
    ///
    /// A project or equipment item joins a target holding only such items;
    /// anything else replaces the target. A cut is removed from its source
    /// afterwards and both writes undo as one step. Nothing held means
    /// nothing happens.
    pub async fn paste(&mut self, target: CellId) -> Result<(), SyncError> {
        let Some(entry) = self.clipboard.take_for_paste() else {
            return Ok(());
        };

        if entry.mode == ClipboardMode::Cut && entry.source == target {
            tracing::debug!("Cut pasted onto its own cell {}", target);
            self.emit(GridEvent::ClipboardChanged {
                mode: self.clipboard.mode(),
            });
            return Ok(());
        }

        if let Err(err) = F::check(&entry.payload) {
            self.clipboard.restore(entry);
            return Err(err.into());
        }

        let is_cut = entry.mode == ClipboardMode::Cut;
        if is_cut {
            self.history.begin_group("Cut and paste");
        }
        let result = self.paste_entry(&entry, target).await;
        if is_cut {
            self.history.end_group();
        }

        match result {
            Ok(()) => {
                self.emit(GridEvent::ClipboardChanged {
                    mode: self.clipboard.mode(),
                });
                Ok(())
            }
            Err(PasteError::Landing(err)) => {
                self.clipboard.restore(entry);
                Err(err)
            }
            Err(PasteError::SourceRemoval(err)) => Err(err),
        }
    }

    async fn paste_entry(&mut self, entry: &ClipboardEntry, target: CellId) -> Result<(), PasteError> {
        let current = self.store.get(&target);
        let merge = !current.is_empty() && entry.payload.is_mergeable() && current.contains_only_mergeable();
        let landed = if merge {
            self.append_second(target, entry.payload.clone()).await
        } else {
            self.assign(target, Some(entry.payload.clone())).await
        };
        landed.map_err(PasteError::Landing)?;

        if entry.mode == ClipboardMode::Cut {
            self.remove_cut_source(entry)
                .await
                .map_err(PasteError::SourceRemoval)?;
        }
        Ok(())
    }

    /// Take the cut item out of its source cell as it is now
    async fn remove_cut_source(&mut self, entry: &ClipboardEntry) -> Result<(), SyncError> {
        match self.store.get(&entry.source).clone() {
            CellContent::Empty => Ok(()),
            CellContent::Single(item) if item == entry.payload => self.clear(entry.source).await,
            CellContent::Single(_) => {
                tracing::debug!("Cut source {} changed since the cut, leaving it", entry.source);
                Ok(())
            }
            CellContent::Multiple(items) => {
                let index = entry
                    .source_index
                    .filter(|&i| items.get(i) == Some(&entry.payload))
                    .or_else(|| items.iter().position(|item| *item == entry.payload));
                match index {
                    Some(index) => self.delete_at(entry.source, index).await,
                    None => Ok(()),
                }
            }
        }
    }
}

enum PasteError {
    /// The target write failed; the entry stays held
    Landing(SyncError),
    /// The payload landed but the source could not be emptied
    SourceRemoval(SyncError),
}
