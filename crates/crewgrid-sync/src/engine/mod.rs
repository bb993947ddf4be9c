//! The allocation grid engine.
//!
//! One engine instance owns the local cell store of a calendar page, its undo
//! history and clipboard, and keeps them converged with the remote store. The
//! flavor parameter decides which assignments the grid accepts and which
//! tables it reads and writes.

mod clipboard;
mod mutation;
mod reconcile;
mod relocation;
mod undo;

pub use reconcile::{Reconcile, SyncReconciler, WriteVersion};

use crewgrid_core::{
    calendar_pairs, detect, AllocationStore, Assignment, CellId, ClipboardMode, ClipboardState, Discrepancy,
    EquipmentGrid, GridFlavor, ProjectGrid, UserId, WeekKey,
};
use crewgrid_history::HistoryManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::error::{ErrorCategory, SyncError};
use crate::remote::{rows_to_cells, RemoteStore};
use crate::view::{DetachedView, ScrollSurface};

/// Buffer of the engine's own event channel
const EVENT_CAPACITY: usize = 256;

/// A failure as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub category: ErrorCategory,
    pub message: String,
    pub detail: String,
}

impl From<&SyncError> for Notification {
    fn from(err: &SyncError) -> Self {
        Self {
            category: err.category(),
            message: err.user_message().to_string(),
            detail: err.to_string(),
        }
    }
}

/// What subscribers hear from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridEvent {
    /// Local content of these cells changed
    CellsChanged { cells: Vec<CellId> },
    /// A week was rebuilt from the remote store
    WeekRefreshed { week: WeekKey },
    ClipboardChanged { mode: ClipboardMode },
    Failed { notification: Notification },
}

/// User intents accepted by [`AllocationGridEngine::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridAction {
    LoadWeek { week: WeekKey },
    Assign { cell: CellId, assignment: Option<Assignment> },
    AppendSecond { cell: CellId, assignment: Assignment },
    EditAt { cell: CellId, index: usize, assignment: Assignment },
    DeleteAt { cell: CellId, index: usize },
    Clear { cell: CellId },
    Copy { cell: CellId, index: Option<usize> },
    Cut { cell: CellId, index: Option<usize> },
    Paste { target: CellId },
    /// Drag-and-drop with `"user::date::index"` and `"user::date"` tokens
    Move { source: String, target: String },
    Undo,
    Redo,
    Refresh,
}

/// Serializable view of the engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub grid: String,
    pub cells: AllocationStore,
    pub clipboard: ClipboardState,
    pub loaded_weeks: Vec<WeekKey>,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Optimistic allocation grid over a remote store
pub struct AllocationGridEngine<R: RemoteStore, F: GridFlavor> {
    remote: Arc<R>,
    store: AllocationStore,
    history: HistoryManager,
    clipboard: ClipboardState,
    reconciler: SyncReconciler,
    loaded_weeks: BTreeSet<WeekKey>,
    events: broadcast::Sender<GridEvent>,
    view: Box<dyn ScrollSurface>,
    config: EngineConfig,
    _flavor: PhantomData<F>,
}

/// Staff-to-project calendar page
pub type ProjectCalendar<R> = AllocationGridEngine<R, ProjectGrid>;

/// Equipment calendar page
pub type EquipmentCalendar<R> = AllocationGridEngine<R, EquipmentGrid>;

impl<R: RemoteStore, F: GridFlavor> AllocationGridEngine<R, F> {
    pub fn new(remote: Arc<R>) -> Self {
        Self::with_config(remote, EngineConfig::default())
    }

    pub fn with_config(remote: Arc<R>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            store: AllocationStore::new(),
            history: HistoryManager::new(config.history_depth),
            clipboard: ClipboardState::new(),
            reconciler: SyncReconciler::new(),
            loaded_weeks: BTreeSet::new(),
            events,
            view: Box::new(DetachedView),
            config,
            _flavor: PhantomData,
        }
    }

    /// Attach the surface whose scroll position survives silent refreshes
    pub fn attach_view(&mut self, view: Box<dyn ScrollSurface>) {
        self.view = view;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> GridSnapshot {
        GridSnapshot {
            grid: F::NAME.to_string(),
            cells: self.store.clone(),
            clipboard: self.clipboard.clone(),
            loaded_weeks: self.loaded_weeks.iter().copied().collect(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }

    pub fn store(&self) -> &AllocationStore {
        &self.store
    }

    pub fn clipboard(&self) -> &ClipboardState {
        &self.clipboard
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn reconciler(&self) -> &SyncReconciler {
        &self.reconciler
    }

    pub fn loaded_weeks(&self) -> &BTreeSet<WeekKey> {
        &self.loaded_weeks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one user intent
    pub async fn dispatch(&mut self, action: GridAction) -> Result<(), SyncError> {
        match action {
            GridAction::LoadWeek { week } => self.load_week(week).await,
            GridAction::Assign { cell, assignment } => self.assign(cell, assignment).await,
            GridAction::AppendSecond { cell, assignment } => self.append_second(cell, assignment).await,
            GridAction::EditAt {
                cell,
                index,
                assignment,
            } => self.edit_at(cell, index, assignment).await,
            GridAction::DeleteAt { cell, index } => self.delete_at(cell, index).await,
            GridAction::Clear { cell } => self.clear(cell).await,
            GridAction::Copy { cell, index } => self.copy(cell, index),
            GridAction::Cut { cell, index } => self.cut(cell, index),
            GridAction::Paste { target } => self.paste(target).await,
            GridAction::Move { source, target } => self.move_item(&source, &target).await,
            GridAction::Undo => self.undo().await,
            GridAction::Redo => self.redo().await,
            GridAction::Refresh => self.refresh_all().await,
        }
    }

    /// Fetch a week and start tracking it
    pub async fn load_week(&mut self, week: WeekKey) -> Result<(), SyncError> {
        let rows = match self.remote.fetch_week(F::TABLE, week).await {
            Ok(rows) => rows,
            Err(err) => {
                let err = SyncError::from(err);
                tracing::warn!("Failed to load {} week {}: {}", F::NAME, week, err);
                self.notify(&err);
                return Err(err);
            }
        };

        tracing::debug!("Loaded {} rows for {} week {}", rows.len(), F::NAME, week);
        self.store.replace_week(week, rows_to_cells(rows));
        self.loaded_weeks.insert(week);
        self.emit(GridEvent::WeekRefreshed { week });
        Ok(())
    }

    /// Calendar pairs of a week missing from the active registry
    pub async fn discrepancies(&self, week: WeekKey) -> Result<Vec<Discrepancy>, SyncError> {
        let calendar = calendar_pairs::<F>(&self.store, week);
        if calendar.is_empty() {
            return Ok(Vec::new());
        }

        let users: Vec<UserId> = calendar
            .iter()
            .map(|(user, _)| *user)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resources: Vec<i64> = calendar
            .iter()
            .map(|(_, resource)| *resource)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let registry = self.remote.active_registry(F::TABLE).await?;
        let user_names = self.remote.user_names(&users).await?;
        let resource_names = self.remote.resource_names(F::TABLE, &resources).await?;

        Ok(detect(&calendar, &registry, &user_names, &resource_names))
    }

    fn emit(&self, event: GridEvent) {
        // Ignore errors if no receivers
        let _ = self.events.send(event);
    }

    fn notify(&self, err: &SyncError) {
        self.emit(GridEvent::Failed {
            notification: Notification::from(err),
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MemoryRemoteStore;
    use chrono::NaiveDate;
    use crewgrid_core::{AllocationTable, CellContent, RegistryEntry};
    use uuid::Uuid;

    pub(crate) fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    pub(crate) fn week() -> WeekKey {
        WeekKey::containing(date())
    }

    pub(crate) fn p(id: i64) -> Assignment {
        Assignment::project(id, format!("P-{}", id), format!("Project {}", id))
    }

    pub(crate) async fn project_engine() -> (Arc<MemoryRemoteStore>, ProjectCalendar<MemoryRemoteStore>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let mut engine = ProjectCalendar::new(remote.clone());
        engine.load_week(week()).await.unwrap();
        (remote, engine)
    }

    #[tokio::test]
    async fn test_load_week_builds_cells() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let user = Uuid::new_v4();
        remote.seed(AllocationTable::Allocations, user, date(), &[p(100), p(200)]);
        remote.seed(AllocationTable::EquipmentAllocations, user, date(), &[Assignment::equipment(7)]);

        let mut engine = ProjectCalendar::new(remote.clone());
        let mut events = engine.subscribe();
        engine.dispatch(GridAction::LoadWeek { week: week() }).await.unwrap();

        let cell = CellId::for_date(user, date());
        assert_eq!(engine.store().get(&cell), &CellContent::Multiple(vec![p(100), p(200)]));
        assert_eq!(engine.store().len(), 1);
        assert_eq!(events.recv().await.unwrap(), GridEvent::WeekRefreshed { week: week() });

        let state = engine.state();
        assert_eq!(state.grid, "project");
        assert_eq!(state.loaded_weeks, vec![week()]);
        assert!(!state.can_undo);
    }

    #[tokio::test]
    async fn test_load_week_action_from_json_snaps_week() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let user = Uuid::new_v4();
        remote.seed(AllocationTable::Allocations, user, date(), &[p(100)]);

        // A Monday date names the week that starts on the Saturday before it
        let action: GridAction = serde_json::from_str(r#"{"type":"load_week","week":"2024-01-15"}"#).unwrap();
        let mut engine = ProjectCalendar::new(remote);
        engine.dispatch(action).await.unwrap();

        assert_eq!(engine.loaded_weeks().iter().copied().collect::<Vec<_>>(), vec![week()]);
        assert_eq!(engine.store().get(&CellId::for_date(user, date())), &CellContent::Single(p(100)));
    }

    #[tokio::test]
    async fn test_failed_load_notifies() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.fail_next_read(crate::error::RemoteError::network("timeout"));
        let mut engine = EquipmentCalendar::new(remote);
        let mut events = engine.subscribe();

        let err = engine.load_week(week()).await.unwrap_err();
        assert_eq!(err, SyncError::Network("timeout".to_string()));
        assert!(engine.loaded_weeks().is_empty());
        assert!(matches!(events.recv().await.unwrap(), GridEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_discrepancies_fetch_registry_and_names() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let table = AllocationTable::EquipmentAllocations;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        remote.seed(table, alice, date(), &[Assignment::equipment(1)]);
        remote.seed(table, alice, date().succ_opt().unwrap(), &[Assignment::equipment(1)]);
        remote.seed(table, bob, date(), &[Assignment::equipment(2)]);
        remote.set_registry(
            table,
            vec![RegistryEntry {
                resource_id: 2,
                user_id: bob,
                returned_at: None,
            }],
        );
        remote.set_user_name(alice, "Alice");
        remote.set_resource_name(table, 1, "Excavator");

        let mut engine = EquipmentCalendar::new(remote);
        engine.load_week(week()).await.unwrap();

        let found = engine.discrepancies(week()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_name, "Alice");
        assert_eq!(found[0].resource_name, "Excavator");
        assert!(engine.discrepancies(week().next()).await.unwrap().is_empty());
    }
}
