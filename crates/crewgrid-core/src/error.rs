use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assignment::AssignmentKind;

/// Local invariant violations. These are detected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GridError {
    /// Element index does not exist in the cell
    #[error("item index {index} out of range for cell with {len} item(s)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The cell has nothing to operate on
    #[error("cell is empty")]
    EmptyCell,

    /// A multi-item cell was addressed without choosing an item
    #[error("cell holds {len} items; an item index is required")]
    IndexRequired { len: usize },

    /// Leave and status assignments cannot share a cell
    #[error("{0} assignments cannot be merged into a multi-item cell")]
    NotMergeable(AssignmentKind),

    /// The grid does not carry this kind of assignment
    #[error("{kind} assignments are not accepted by the {grid} grid")]
    KindNotAccepted {
        kind: AssignmentKind,
        grid: String,
    },

    /// Drag source and target are the same cell
    #[error("source and target are the same cell")]
    NoOpMove,

    /// Day index outside the seven days of a week
    #[error("day index {0} is outside the week")]
    DayOutOfRange(u8),

    /// Malformed drag-and-drop identifier
    #[error("invalid cell token '{0}'")]
    InvalidToken(String),
}
