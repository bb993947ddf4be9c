mod allocations;
mod discrepancies;
mod health;

use axum::Router;
use crewgrid_core::{AllocationTable, WeekKey};

use crate::error::AppError;
use crate::AppState;

/// Create the API router
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(allocations::router())
        .merge(discrepancies::router())
}

fn parse_table(raw: &str) -> Result<AllocationTable, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

fn parse_week(raw: &str) -> Result<WeekKey, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid week date: {}", raw)))
}
