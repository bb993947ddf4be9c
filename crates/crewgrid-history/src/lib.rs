pub mod command;
pub mod stack;

pub use command::{CellEdit, Transaction};
pub use stack::{HistoryManager, Reverted, DEFAULT_DEPTH};
