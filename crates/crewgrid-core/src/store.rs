use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::assignment::CellContent;
use crate::identity::{CellId, UserId, WeekKey};

static EMPTY: CellContent = CellContent::Empty;

/// In-memory allocation grid keyed by (week, user, day).
///
/// Only non-empty cells are stored. Reads of a missing cell yield `Empty`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStore {
    #[serde(default, with = "cell_map_serde")]
    cells: BTreeMap<CellId, CellContent>,
}

/// Serialize the cell map with "week|user|day" string keys for JSON compatibility
mod cell_map_serde {
    use super::*;
    use serde::ser::SerializeMap;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(cells: &BTreeMap<CellId, CellContent>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(cells.len()))?;
        for (id, content) in cells {
            let key = format!("{}|{}|{}", id.week, id.user, id.day);
            map.serialize_entry(&key, content)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<CellId, CellContent>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CellMapVisitor;

        impl<'de> de::Visitor<'de> for CellMapVisitor {
            type Value = BTreeMap<CellId, CellContent>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map with week|user|day keys")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let mut cells = BTreeMap::new();

                while let Some(key) = map.next_key::<String>()? {
                    let content: CellContent = map.next_value()?;
                    let parts: Vec<&str> = key.split('|').collect();
                    if parts.len() != 3 {
                        return Err(de::Error::custom(format!("invalid cell key '{}'", key)));
                    }
                    let week: WeekKey = parts[0].parse().map_err(de::Error::custom)?;
                    let user: UserId = parts[1].parse().map_err(de::Error::custom)?;
                    let day: u8 = parts[2].parse().map_err(de::Error::custom)?;
                    let id = CellId::try_new(week, user, day).map_err(de::Error::custom)?;
                    if !content.is_empty() {
                        cells.insert(id, content);
                    }
                }

                Ok(cells)
            }
        }

        deserializer.deserialize_map(CellMapVisitor)
    }
}

impl AllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a cell, `Empty` when never written
    pub fn get(&self, id: &CellId) -> &CellContent {
        self.cells.get(id).unwrap_or(&EMPTY)
    }

    /// Overwrite a cell. Writing `Empty` drops the entry.
    pub fn set(&mut self, id: CellId, content: CellContent) {
        if content.is_empty() {
            self.cells.remove(&id);
        } else {
            self.cells.insert(id, content);
        }
    }

    /// Visit every non-empty cell of a week in (user, day) order
    pub fn for_each_in_week<F>(&self, week: WeekKey, mut f: F)
    where
        F: FnMut(&CellId, &CellContent),
    {
        for (id, content) in self.week_range(week) {
            f(id, content);
        }
    }

    fn week_range(&self, week: WeekKey) -> impl Iterator<Item = (&CellId, &CellContent)> {
        let lower = CellId::new(week, UserId::nil(), 0);
        let upper = CellId::new(week.next(), UserId::nil(), 0);
        self.cells.range(lower..upper)
    }

    /// Swap in freshly fetched content for a whole week
    pub fn replace_week(&mut self, week: WeekKey, cells: impl IntoIterator<Item = (CellId, CellContent)>) {
        let stale: Vec<CellId> = self.week_range(week).map(|(id, _)| *id).collect();
        for id in stale {
            self.cells.remove(&id);
        }
        for (id, content) in cells {
            debug_assert_eq!(id.week, week);
            self.set(id, content);
        }
    }

    /// Weeks that currently hold at least one cell
    pub fn weeks(&self) -> BTreeSet<WeekKey> {
        self.cells.keys().map(|id| id.week).collect()
    }

    /// Total number of assignments across the grid
    pub fn total_assignments(&self) -> usize {
        self.cells.values().map(CellContent::len).sum()
    }

    /// Cells whose content differs between the two stores
    pub fn diff(&self, other: &AllocationStore) -> Vec<CellId> {
        let ids: BTreeSet<&CellId> = self.cells.keys().chain(other.cells.keys()).collect();
        ids.into_iter()
            .filter(|id| self.get(id) != other.get(id))
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &CellContent)> {
        self.cells.iter()
    }

    /// Number of non-empty cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
