use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crewgrid_core::{collapse, AllocationTable, Assignment, CellContent, CellId, RegistryEntry, UserId, WeekKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::RemoteError;

/// One stored row: a single assignment for a user on a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub id: i64,
    pub user_id: UserId,
    pub date: NaiveDate,
    /// Order of the row inside its cell
    pub position: i32,
    pub assignment: Assignment,
    pub updated_at: DateTime<Utc>,
}

/// Acknowledgement of a committed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// Server commit time of the write
    pub committed_at: DateTime<Utc>,
}

/// The hosted relational store as seen by the grid engine.
///
/// Writes are keyed by (user, date). Multi-row cells are never updated in
/// place: they are deleted and re-inserted.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All rows whose date falls inside the week
    async fn fetch_week(&self, table: AllocationTable, week: WeekKey) -> Result<Vec<AllocationRow>, RemoteError>;

    /// Rows of one cell
    async fn fetch_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Vec<AllocationRow>, RemoteError>;

    /// Delete every row of a cell
    async fn delete_cell(&self, table: AllocationTable, user: UserId, date: NaiveDate) -> Result<WriteAck, RemoteError>;

    /// Append rows after the cell's existing ones
    async fn insert_rows(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
    ) -> Result<WriteAck, RemoteError>;

    /// Delete the cell's rows, then insert the given ones
    async fn replace_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
    ) -> Result<WriteAck, RemoteError> {
        let ack = self.delete_cell(table, user, date).await?;
        if assignments.is_empty() {
            return Ok(ack);
        }
        self.insert_rows(table, user, date, assignments).await
    }

    /// Registry rows that have not been returned
    async fn active_registry(&self, table: AllocationTable) -> Result<Vec<RegistryEntry>, RemoteError>;

    async fn user_names(&self, ids: &[UserId]) -> Result<HashMap<UserId, String>, RemoteError>;

    async fn resource_names(&self, table: AllocationTable, ids: &[i64]) -> Result<HashMap<i64, String>, RemoteError>;
}

/// Content of one cell from its rows.
///
/// Rows are taken in (position, id) order. A leave or status row among
/// several rows wins the whole cell, the latest one if there are more.
pub fn cell_from_rows(mut rows: Vec<AllocationRow>) -> CellContent {
    rows.sort_by_key(|row| (row.position, row.id));
    let items: Vec<Assignment> = rows.into_iter().map(|row| row.assignment).collect();
    if items.len() > 1 {
        if let Some(winner) = items.iter().rev().find(|item| !item.is_mergeable()) {
            return CellContent::Single(winner.clone());
        }
    }
    collapse(items)
}

/// Group fetched rows into cells
pub fn rows_to_cells(rows: Vec<AllocationRow>) -> Vec<(CellId, CellContent)> {
    let mut grouped: BTreeMap<(UserId, NaiveDate), Vec<AllocationRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry((row.user_id, row.date)).or_default().push(row);
    }
    grouped
        .into_iter()
        .map(|((user, date), rows)| (CellId::for_date(user, date), cell_from_rows(rows)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn row(id: i64, user: Uuid, day: u32, position: i32, assignment: Assignment) -> AllocationRow {
        AllocationRow {
            id,
            user_id: user,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            position,
            assignment,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_rows_grouped_and_ordered() {
        let user = Uuid::new_v4();
        let rows = vec![
            row(3, user, 15, 1, Assignment::project(200, "P-200", "B")),
            row(1, user, 15, 0, Assignment::project(100, "P-100", "A")),
            row(2, user, 16, 0, Assignment::leave("Vacation")),
        ];

        let cells = rows_to_cells(rows);
        assert_eq!(cells.len(), 2);
        assert_eq!(
            cells[0].1,
            CellContent::Multiple(vec![
                Assignment::project(100, "P-100", "A"),
                Assignment::project(200, "P-200", "B"),
            ])
        );
        assert_eq!(cells[1].1, CellContent::Single(Assignment::leave("Vacation")));
        assert_eq!(cells[1].0.day, 3);
    }

    #[test]
    fn test_leave_row_wins_mixed_cell() {
        let user = Uuid::new_v4();
        let content = cell_from_rows(vec![
            row(1, user, 15, 0, Assignment::project(100, "P-100", "A")),
            row(2, user, 15, 1, Assignment::leave("Sick")),
        ]);
        assert_eq!(content, CellContent::Single(Assignment::leave("Sick")));
    }
}
