pub mod assignment;
pub mod clipboard;
pub mod discrepancy;
pub mod error;
pub mod flavor;
pub mod identity;
pub mod store;
pub mod token;

pub use assignment::{collapse, expand, is_mergeable, Assignment, AssignmentKind, CellContent};
pub use clipboard::{ClipboardEntry, ClipboardMode, ClipboardState};
pub use discrepancy::{calendar_pairs, detect, Discrepancy, RegistryEntry};
pub use error::GridError;
pub use flavor::{AllocationTable, EquipmentGrid, GridFlavor, ProjectGrid};
pub use identity::{day_index, CellId, UserId, WeekKey, DAYS_PER_WEEK};
pub use store::AllocationStore;
pub use token::{DragSource, DropTarget};
