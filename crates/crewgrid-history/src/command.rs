use crewgrid_core::{AllocationStore, CellContent, CellId};

/// The content of one cell before and after an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub cell: CellId,
    pub before: CellContent,
    pub after: CellContent,
}

/// One undoable user action, possibly touching several cells.
///
/// Edits are kept per cell: a second edit of the same cell keeps the first
/// `before` and the latest `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    edits: Vec<CellEdit>,
    description: String,
}

impl Transaction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            edits: Vec::new(),
            description: description.into(),
        }
    }

    /// Single-cell transaction
    pub fn set(description: impl Into<String>, cell: CellId, after: CellContent) -> Self {
        let mut tx = Self::new(description);
        tx.stage(cell, after);
        tx
    }

    /// Queue a new content for a cell; `before` is captured on execute
    pub fn stage(&mut self, cell: CellId, after: CellContent) {
        match self.edits.iter_mut().find(|e| e.cell == cell) {
            Some(edit) => edit.after = after,
            None => self.edits.push(CellEdit {
                cell,
                before: CellContent::Empty,
                after,
            }),
        }
    }

    /// Apply the staged contents, capturing what each cell held before
    pub fn execute(&mut self, store: &mut AllocationStore) -> Vec<CellId> {
        let mut affected = Vec::with_capacity(self.edits.len());
        for edit in &mut self.edits {
            edit.before = store.get(&edit.cell).clone();
            store.set(edit.cell, edit.after.clone());
            affected.push(edit.cell);
        }
        affected
    }

    /// Put back `before` contents, returning only cells that actually changed
    pub fn undo(&self, store: &mut AllocationStore) -> Vec<CellId> {
        let mut changed = Vec::new();
        for edit in self.edits.iter().rev() {
            if store.get(&edit.cell) != &edit.before {
                store.set(edit.cell, edit.before.clone());
                changed.push(edit.cell);
            }
        }
        changed
    }

    /// Re-apply `after` contents, returning only cells that actually changed
    pub fn redo(&self, store: &mut AllocationStore) -> Vec<CellId> {
        let mut changed = Vec::new();
        for edit in &self.edits {
            if store.get(&edit.cell) != &edit.after {
                store.set(edit.cell, edit.after.clone());
                changed.push(edit.cell);
            }
        }
        changed
    }

    /// Fold a later transaction into this one
    pub fn absorb(&mut self, other: Transaction) {
        for edit in other.edits {
            match self.edits.iter_mut().find(|e| e.cell == edit.cell) {
                Some(existing) => existing.after = edit.after,
                None => self.edits.push(edit),
            }
        }
    }

    pub fn edits(&self) -> &[CellEdit] {
        &self.edits
    }

    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.edits.iter().map(|e| e.cell)
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}
