use chrono::{DateTime, NaiveDate, Utc};
use crewgrid_core::{Assignment, RegistryEntry};
use crewgrid_sync::AllocationRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Row of `allocations` or `equipment_allocations`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AllocationRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub position: i32,
    pub assignment: Json<Assignment>,
    pub updated_at: DateTime<Utc>,
}

impl From<AllocationRecord> for AllocationRow {
    fn from(record: AllocationRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            date: record.date,
            position: record.position,
            assignment: record.assignment.0,
            updated_at: record.updated_at,
        }
    }
}

/// Row of `project_assignments` or `equipment_assignments`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegistryRecord {
    pub resource_id: i64,
    pub user_id: Uuid,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<RegistryRecord> for RegistryEntry {
    fn from(record: RegistryRecord) -> Self {
        Self {
            resource_id: record.resource_id,
            user_id: record.user_id,
            returned_at: record.returned_at,
        }
    }
}
