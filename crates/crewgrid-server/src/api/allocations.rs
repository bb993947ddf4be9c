use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDate;
use crewgrid_core::{AllocationTable, Assignment, EquipmentGrid, GridError, GridFlavor, ProjectGrid, UserId};
use crewgrid_sync::{AllocationRow, RemoteStore, WriteAck};
use serde::Deserialize;

use super::{parse_table, parse_week};
use crate::error::AppError;
use crate::AppState;

/// New content for one cell, in row order
#[derive(Debug, Deserialize)]
pub struct ReplaceCellRequest {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

/// Check a cell's rows against the grid that owns the table
fn validate_cell(table: AllocationTable, assignments: &[Assignment]) -> Result<(), GridError> {
    for assignment in assignments {
        match table {
            AllocationTable::Allocations => ProjectGrid::check(assignment)?,
            AllocationTable::EquipmentAllocations => EquipmentGrid::check(assignment)?,
        }
    }
    if assignments.len() > 1 {
        if let Some(blocker) = assignments.iter().find(|a| !a.is_mergeable()) {
            return Err(GridError::NotMergeable(blocker.kind()));
        }
    }
    Ok(())
}

/// Rows of one fiscal week
async fn get_week(
    State(state): State<AppState>,
    Path((table, week)): Path<(String, String)>,
) -> Result<Json<Vec<AllocationRow>>, AppError> {
    let table = parse_table(&table)?;
    let week = parse_week(&week)?;
    let rows = state.db.fetch_week(table, week).await?;
    Ok(Json(rows))
}

/// Replace every row of a cell
async fn replace_cell(
    State(state): State<AppState>,
    Path((table, user, date)): Path<(String, String, String)>,
    Json(req): Json<ReplaceCellRequest>,
) -> Result<Json<WriteAck>, AppError> {
    let table = parse_table(&table)?;
    let user: UserId = user
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid user id: {}", user)))?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {}", date)))?;
    validate_cell(table, &req.assignments)?;

    let ack = state.db.replace_cell(table, user, date, &req.assignments).await?;
    tracing::info!("Replaced {} {} on {} with {} rows", table, user, date, req.assignments.len());
    Ok(Json(ack))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/:table/weeks/:week", get(get_week))
        .route("/api/:table/cells/:user/:date", put(replace_cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cell() {
        let project = Assignment::project(1, "P-1", "One");
        let leave = Assignment::leave("Vacation");

        assert!(validate_cell(AllocationTable::Allocations, &[project.clone(), Assignment::project(2, "P-2", "Two")]).is_ok());
        assert!(validate_cell(AllocationTable::Allocations, &[]).is_ok());
        assert_eq!(
            validate_cell(AllocationTable::Allocations, &[project.clone(), leave.clone()]),
            Err(GridError::NotMergeable(leave.kind()))
        );
        assert!(matches!(
            validate_cell(AllocationTable::EquipmentAllocations, &[project]),
            Err(GridError::KindNotAccepted { .. })
        ));
    }
}
