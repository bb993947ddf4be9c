use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, CellContent};
use crate::error::GridError;
use crate::identity::CellId;

/// Clipboard mode determines what happens to the source on paste
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClipboardMode {
    /// Clipboard is empty
    #[default]
    Empty,
    /// Source stays where it is
    Copy,
    /// Source is removed once the paste lands
    Cut,
}

/// One captured assignment and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    pub mode: ClipboardMode,
    pub payload: Assignment,
    pub source: CellId,
    /// Item position inside a multi-item source cell
    pub source_index: Option<usize>,
}

impl ClipboardEntry {
    /// Capture one assignment out of a cell.
    ///
    /// Multi-item cells need an index; single-item cells are captured whole and
    /// record no index.
    pub fn capture(
        mode: ClipboardMode,
        source: CellId,
        content: &CellContent,
        index: Option<usize>,
    ) -> Result<Self, GridError> {
        let (payload, source_index) = match content {
            CellContent::Empty => return Err(GridError::EmptyCell),
            CellContent::Single(item) => (item.clone(), None),
            CellContent::Multiple(items) => {
                let index = index.ok_or(GridError::IndexRequired { len: items.len() })?;
                let item = items.get(index).ok_or(GridError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })?;
                (item.clone(), Some(index))
            }
        };

        Ok(Self {
            mode,
            payload,
            source,
            source_index,
        })
    }
}

/// Manages the clipboard state: idle, or holding one entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardState {
    entry: Option<ClipboardEntry>,
}

impl ClipboardState {
    pub fn new() -> Self {
        Self { entry: None }
    }

    /// Copy an assignment to the clipboard
    pub fn copy(&mut self, source: CellId, content: &CellContent, index: Option<usize>) -> Result<(), GridError> {
        self.entry = Some(ClipboardEntry::capture(ClipboardMode::Copy, source, content, index)?);
        Ok(())
    }

    /// Cut an assignment to the clipboard. The source is not touched yet.
    pub fn cut(&mut self, source: CellId, content: &CellContent, index: Option<usize>) -> Result<(), GridError> {
        self.entry = Some(ClipboardEntry::capture(ClipboardMode::Cut, source, content, index)?);
        Ok(())
    }

    /// Peek at the held entry
    pub fn entry(&self) -> Option<&ClipboardEntry> {
        self.entry.as_ref()
    }

    /// Take the entry out for a cut paste, leaving a copy in place
    pub fn take_for_paste(&mut self) -> Option<ClipboardEntry> {
        match self.mode() {
            ClipboardMode::Cut => self.entry.take(),
            _ => self.entry.clone(),
        }
    }

    /// Put an entry back after a failed paste
    pub fn restore(&mut self, entry: ClipboardEntry) {
        if self.entry.is_none() {
            self.entry = Some(entry);
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn mode(&self) -> ClipboardMode {
        self.entry
            .as_ref()
            .map(|e| e.mode)
            .unwrap_or(ClipboardMode::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn is_cut(&self) -> bool {
        matches!(self.mode(), ClipboardMode::Cut)
    }
}
