use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use crewgrid_core::{calendar_pairs, detect, AllocationStore, AllocationTable, Discrepancy, EquipmentGrid, ProjectGrid, UserId};
use crewgrid_sync::{rows_to_cells, RemoteStore};
use std::collections::BTreeSet;

use super::{parse_table, parse_week};
use crate::error::AppError;
use crate::AppState;

/// Calendar pairs of a week that the active registry does not hold
async fn get_discrepancies(
    State(state): State<AppState>,
    Path((table, week)): Path<(String, String)>,
) -> Result<Json<Vec<Discrepancy>>, AppError> {
    let table = parse_table(&table)?;
    let week = parse_week(&week)?;

    let rows = state.db.fetch_week(table, week).await?;
    let mut store = AllocationStore::new();
    store.replace_week(week, rows_to_cells(rows));

    let calendar = match table {
        AllocationTable::Allocations => calendar_pairs::<ProjectGrid>(&store, week),
        AllocationTable::EquipmentAllocations => calendar_pairs::<EquipmentGrid>(&store, week),
    };
    if calendar.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let users: Vec<UserId> = calendar.iter().map(|(user, _)| *user).collect::<BTreeSet<_>>().into_iter().collect();
    let resources: Vec<i64> = calendar.iter().map(|(_, id)| *id).collect::<BTreeSet<_>>().into_iter().collect();

    let registry = state.db.active_registry(table).await?;
    let user_names = state.db.user_names(&users).await?;
    let resource_names = state.db.resource_names(table, &resources).await?;

    let found = detect(&calendar, &registry, &user_names, &resource_names);
    tracing::debug!("{} discrepancies in {} for week {}", found.len(), table, week);
    Ok(Json(found))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/:table/weeks/:week/discrepancies", get(get_discrepancies))
}
