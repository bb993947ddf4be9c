use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GridError;

/// Discriminant of an [`Assignment`]
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Project,
    Equipment,
    Leave,
    Status,
}

impl AssignmentKind {
    /// Only project and equipment assignments may share a cell
    pub fn is_mergeable(self) -> bool {
        matches!(self, AssignmentKind::Project | AssignmentKind::Equipment)
    }
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentKind::Project => write!(f, "project"),
            AssignmentKind::Equipment => write!(f, "equipment"),
            AssignmentKind::Leave => write!(f, "leave"),
            AssignmentKind::Status => write!(f, "status"),
        }
    }
}

/// What a user is doing on a given day
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Assignment {
    Project {
        id: i64,
        number: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        /// Day or night shift label
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shift: Option<String>,
        /// Free-form time range, e.g. "07:00-15:30"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    Equipment {
        equipment_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    Leave {
        leave_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    Status {
        status: String,
    },
}

impl Assignment {
    /// Create a bare project assignment
    pub fn project(id: i64, number: impl Into<String>, name: impl Into<String>) -> Self {
        Assignment::Project {
            id,
            number: number.into(),
            name: name.into(),
            client: None,
            task: None,
            shift: None,
            time: None,
            comment: None,
        }
    }

    /// Create a bare equipment assignment
    pub fn equipment(equipment_id: i64) -> Self {
        Assignment::Equipment {
            equipment_id,
            comment: None,
        }
    }

    pub fn leave(leave_type: impl Into<String>) -> Self {
        Assignment::Leave {
            leave_type: leave_type.into(),
            comment: None,
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Assignment::Status {
            status: status.into(),
        }
    }

    pub fn kind(&self) -> AssignmentKind {
        match self {
            Assignment::Project { .. } => AssignmentKind::Project,
            Assignment::Equipment { .. } => AssignmentKind::Equipment,
            Assignment::Leave { .. } => AssignmentKind::Leave,
            Assignment::Status { .. } => AssignmentKind::Status,
        }
    }

    pub fn is_mergeable(&self) -> bool {
        self.kind().is_mergeable()
    }

    /// Id of the project or equipment this assignment refers to
    pub fn resource_id(&self) -> Option<i64> {
        match self {
            Assignment::Project { id, .. } => Some(*id),
            Assignment::Equipment { equipment_id, .. } => Some(*equipment_id),
            _ => None,
        }
    }

    /// Short text shown in a grid cell
    pub fn label(&self) -> String {
        match self {
            Assignment::Project { number, name, .. } => format!("{} {}", number, name),
            Assignment::Equipment { equipment_id, .. } => format!("#{}", equipment_id),
            Assignment::Leave { leave_type, .. } => leave_type.clone(),
            Assignment::Status { status } => status.clone(),
        }
    }
}

/// Whether a kind may participate in a multi-item cell
pub fn is_mergeable(kind: AssignmentKind) -> bool {
    kind.is_mergeable()
}

/// The content of one allocation cell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", content = "items")]
pub enum CellContent {
    #[default]
    Empty,
    Single(Assignment),
    /// Always two or more project/equipment assignments, in row order
    Multiple(Vec<Assignment>),
}

/// Build cell content from an ordered list, collapsing to the smallest shape.
pub fn collapse(mut items: Vec<Assignment>) -> CellContent {
    match items.len() {
        0 => CellContent::Empty,
        1 => CellContent::Single(items.remove(0)),
        _ => CellContent::Multiple(items),
    }
}

/// Flatten cell content into its ordered list of assignments.
pub fn expand(content: &CellContent) -> Vec<Assignment> {
    match content {
        CellContent::Empty => Vec::new(),
        CellContent::Single(item) => vec![item.clone()],
        CellContent::Multiple(items) => items.clone(),
    }
}

impl CellContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }

    /// Number of assignments in the cell
    pub fn len(&self) -> usize {
        match self {
            CellContent::Empty => 0,
            CellContent::Single(_) => 1,
            CellContent::Multiple(items) => items.len(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Assignment> {
        match self {
            CellContent::Empty => None,
            CellContent::Single(item) => (index == 0).then_some(item),
            CellContent::Multiple(items) => items.get(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        let items: &[Assignment] = match self {
            CellContent::Empty => &[],
            CellContent::Single(item) => std::slice::from_ref(item),
            CellContent::Multiple(items) => items,
        };
        items.iter()
    }

    pub fn to_vec(&self) -> Vec<Assignment> {
        expand(self)
    }

    /// True when every item could take part in a multi-item cell
    pub fn contains_only_mergeable(&self) -> bool {
        self.iter().all(Assignment::is_mergeable)
    }

    /// Content after adding one more mergeable assignment
    pub fn appended(&self, incoming: Assignment) -> Result<CellContent, GridError> {
        if !incoming.is_mergeable() {
            return Err(GridError::NotMergeable(incoming.kind()));
        }
        if let Some(blocker) = self.iter().find(|item| !item.is_mergeable()) {
            return Err(GridError::NotMergeable(blocker.kind()));
        }
        let mut items = expand(self);
        items.push(incoming);
        Ok(collapse(items))
    }

    /// Content after replacing the item at `index`.
    ///
    /// A single-item cell ignores the index. A leave or status replacement
    /// takes over the whole cell.
    pub fn replaced_at(&self, index: usize, replacement: Assignment) -> Result<CellContent, GridError> {
        match self {
            CellContent::Empty => Err(GridError::EmptyCell),
            CellContent::Single(_) => Ok(CellContent::Single(replacement)),
            CellContent::Multiple(items) => {
                if index >= items.len() {
                    return Err(GridError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    });
                }
                if !replacement.is_mergeable() {
                    return Ok(CellContent::Single(replacement));
                }
                let mut items = items.clone();
                items[index] = replacement;
                Ok(collapse(items))
            }
        }
    }

    /// Content after removing the item at `index`, plus the removed item.
    pub fn removed_at(&self, index: usize) -> Result<(CellContent, Assignment), GridError> {
        let mut items = expand(self);
        if index >= items.len() {
            return Err(GridError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        let removed = items.remove(index);
        Ok((collapse(items), removed))
    }
}

impl From<Option<Assignment>> for CellContent {
    fn from(value: Option<Assignment>) -> Self {
        match value {
            Some(item) => CellContent::Single(item),
            None => CellContent::Empty,
        }
    }
}
