pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod memory;
pub mod remote;
pub mod view;

pub use config::EngineConfig;
pub use engine::{
    AllocationGridEngine, EquipmentCalendar, GridAction, GridEvent, GridSnapshot, Notification, ProjectCalendar,
    Reconcile, SyncReconciler, WriteVersion,
};
pub use error::{ErrorCategory, RemoteError, RemoteErrorKind, SyncError};
pub use feed::{ChangeEvent, ChangeFeed, ChangeOperation};
pub use memory::MemoryRemoteStore;
pub use remote::{cell_from_rows, rows_to_cells, AllocationRow, RemoteStore, WriteAck};
pub use view::{DetachedView, ScrollOffset, ScrollSurface};
