use crate::command::Transaction;
use crewgrid_core::{AllocationStore, CellId};

/// Number of undo levels kept when no other limit is configured
pub const DEFAULT_DEPTH: usize = 20;

/// What an undo or redo touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reverted {
    pub description: String,
    /// Cells whose content differs from before the step, in need of re-persisting
    pub changed: Vec<CellId>,
}

/// Manages undo/redo history for allocation grid edits
pub struct HistoryManager {
    /// Transactions that can be undone, oldest first
    undo_stack: Vec<Transaction>,
    /// Transactions that can be redone
    redo_stack: Vec<Transaction>,
    /// Maximum number of undo levels
    max_size: usize,
    /// Transactions executed while a group is open fold into it
    open_group: Option<Transaction>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl HistoryManager {
    /// Create a new history manager with the specified max undo levels
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
            open_group: None,
        }
    }

    /// Record a transaction and apply it to the store
    pub fn execute(&mut self, mut tx: Transaction, store: &mut AllocationStore) -> Vec<CellId> {
        let affected = tx.execute(store);

        // Clear redo stack on new action
        self.redo_stack.clear();

        match self.open_group.as_mut() {
            Some(group) => group.absorb(tx),
            None => self.push(tx),
        }

        affected
    }

    fn push(&mut self, tx: Transaction) {
        if tx.is_empty() {
            return;
        }
        self.undo_stack.push(tx);

        // Evict oldest entries past the limit
        while self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the last transaction. The entry is gone even if re-persisting fails later.
    pub fn undo(&mut self, store: &mut AllocationStore) -> Option<Reverted> {
        self.end_group();
        let tx = self.undo_stack.pop()?;
        let changed = tx.undo(store);
        let description = tx.description().to_string();
        self.redo_stack.push(tx);
        Some(Reverted {
            description,
            changed,
        })
    }

    /// Redo the last undone transaction
    pub fn redo(&mut self, store: &mut AllocationStore) -> Option<Reverted> {
        self.end_group();
        let tx = self.redo_stack.pop()?;
        let changed = tx.redo(store);
        let description = tx.description().to_string();
        self.undo_stack.push(tx);
        Some(Reverted {
            description,
            changed,
        })
    }

    /// Start folding subsequent transactions into one undo step
    pub fn begin_group(&mut self, description: impl Into<String>) {
        if self.open_group.is_none() {
            self.open_group = Some(Transaction::new(description));
        }
    }

    /// Close the current group and record it as a single step
    pub fn end_group(&mut self) {
        if let Some(group) = self.open_group.take() {
            self.push(group);
        }
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the description of the transaction that would be undone
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|tx| tx.description())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_group = None;
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("max_size", &self.max_size)
            .field("grouping", &self.open_group.is_some())
            .finish()
    }
}
