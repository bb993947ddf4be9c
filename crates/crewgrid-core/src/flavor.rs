use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::assignment::{Assignment, AssignmentKind};
use crate::error::GridError;

/// Remote table holding one row per user/date/assignment
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationTable {
    Allocations,
    EquipmentAllocations,
}

impl AllocationTable {
    pub const fn name(self) -> &'static str {
        match self {
            AllocationTable::Allocations => "allocations",
            AllocationTable::EquipmentAllocations => "equipment_allocations",
        }
    }

    /// Independent registry of who currently holds which resource
    pub const fn registry(self) -> &'static str {
        match self {
            AllocationTable::Allocations => "project_assignments",
            AllocationTable::EquipmentAllocations => "equipment_assignments",
        }
    }

    /// Lookup table naming the resources this grid refers to
    pub const fn resources(self) -> &'static str {
        match self {
            AllocationTable::Allocations => "projects",
            AllocationTable::EquipmentAllocations => "equipment",
        }
    }
}

impl fmt::Display for AllocationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AllocationTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocations" => Ok(AllocationTable::Allocations),
            "equipment_allocations" => Ok(AllocationTable::EquipmentAllocations),
            other => Err(format!("unknown allocation table '{}'", other)),
        }
    }
}

/// The assignment tag set one calendar works with.
///
/// The resource calendar and the equipment calendar share the same engine and
/// differ only in what they accept and which tables they read.
pub trait GridFlavor: Send + Sync + 'static {
    /// Human-readable grid name
    const NAME: &'static str;
    /// Table this grid reads and writes
    const TABLE: AllocationTable;
    /// Tables whose changes invalidate the whole grid
    const CROSS_CUTTING_TABLES: &'static [&'static str];

    fn accepts(kind: AssignmentKind) -> bool;

    /// Resource this assignment ties the user to, for registry checks
    fn resource_id(assignment: &Assignment) -> Option<i64>;

    fn check(assignment: &Assignment) -> Result<(), GridError> {
        let kind = assignment.kind();
        if Self::accepts(kind) {
            Ok(())
        } else {
            Err(GridError::KindNotAccepted {
                kind,
                grid: Self::NAME.to_string(),
            })
        }
    }
}

/// Staff-to-project calendar
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectGrid;

impl GridFlavor for ProjectGrid {
    const NAME: &'static str = "project";
    const TABLE: AllocationTable = AllocationTable::Allocations;
    const CROSS_CUTTING_TABLES: &'static [&'static str] =
        &["projects", "profiles", "project_categories", "project_assignments"];

    fn accepts(kind: AssignmentKind) -> bool {
        !matches!(kind, AssignmentKind::Equipment)
    }

    fn resource_id(assignment: &Assignment) -> Option<i64> {
        match assignment {
            Assignment::Project { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Staff-to-equipment calendar
#[derive(Debug, Clone, Copy, Default)]
pub struct EquipmentGrid;

impl GridFlavor for EquipmentGrid {
    const NAME: &'static str = "equipment";
    const TABLE: AllocationTable = AllocationTable::EquipmentAllocations;
    const CROSS_CUTTING_TABLES: &'static [&'static str] =
        &["equipment", "profiles", "equipment_categories", "equipment_assignments"];

    fn accepts(kind: AssignmentKind) -> bool {
        !matches!(kind, AssignmentKind::Project)
    }

    fn resource_id(assignment: &Assignment) -> Option<i64> {
        match assignment {
            Assignment::Equipment { equipment_id, .. } => Some(*equipment_id),
            _ => None,
        }
    }
}
