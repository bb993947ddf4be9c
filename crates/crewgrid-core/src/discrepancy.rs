//! Cross-check between calendar cells and the active assignment registry.
//!
//! The calendar and the registry are edited independently. A user scheduled on
//! a resource in the calendar who does not hold it in the registry is reported
//! once per (user, resource) pair, however many days the pair appears.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::identity::{UserId, WeekKey};
use crate::store::AllocationStore;
use crate::flavor::GridFlavor;

/// One row of the independent registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub resource_id: i64,
    pub user_id: UserId,
    /// Set once the resource has been handed back
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
}

impl RegistryEntry {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// A calendar pair the registry does not know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub user_id: UserId,
    pub resource_id: i64,
    pub user_name: String,
    pub resource_name: String,
}

/// Distinct (user, resource) pairs referenced by a week's cells
pub fn calendar_pairs<F: GridFlavor>(store: &AllocationStore, week: WeekKey) -> BTreeSet<(UserId, i64)> {
    let mut pairs = BTreeSet::new();
    store.for_each_in_week(week, |id, content| {
        for assignment in content.iter() {
            if let Some(resource) = F::resource_id(assignment) {
                pairs.insert((id.user, resource));
            }
        }
    });
    pairs
}

/// Calendar pairs absent from the active registry, with resolved names.
///
/// Entries are ordered by user name, then resource name.
pub fn detect(
    calendar: &BTreeSet<(UserId, i64)>,
    registry: &[RegistryEntry],
    user_names: &HashMap<UserId, String>,
    resource_names: &HashMap<i64, String>,
) -> Vec<Discrepancy> {
    let active: HashSet<(UserId, i64)> = registry
        .iter()
        .filter(|entry| entry.is_active())
        .map(|entry| (entry.user_id, entry.resource_id))
        .collect();

    let mut found: Vec<Discrepancy> = calendar
        .iter()
        .filter(|pair| !active.contains(*pair))
        .map(|&(user_id, resource_id)| Discrepancy {
            user_id,
            resource_id,
            user_name: user_names
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| format!("Unknown user {}", user_id)),
            resource_name: resource_names
                .get(&resource_id)
                .cloned()
                .unwrap_or_else(|| format!("Unknown resource #{}", resource_id)),
        })
        .collect();

    found.sort_by(|a, b| {
        a.user_name
            .cmp(&b.user_name)
            .then_with(|| a.resource_name.cmp(&b.resource_name))
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{Assignment, CellContent};
    use crate::flavor::EquipmentGrid;
    use crate::identity::CellId;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn names(user: Uuid) -> (HashMap<Uuid, String>, HashMap<i64, String>) {
        (
            HashMap::from([(user, "Ada".to_string())]),
            HashMap::from([(1, "Excavator".to_string())]),
        )
    }

    fn active(user: Uuid, resource: i64) -> RegistryEntry {
        RegistryEntry {
            resource_id: resource,
            user_id: user,
            returned_at: None,
        }
    }

    #[test]
    fn test_registered_pair_is_clean() {
        let u1 = Uuid::new_v4();
        let mut store = AllocationStore::new();
        store.set(CellId::for_date(u1, day(15)), CellContent::Single(Assignment::equipment(1)));
        let week = WeekKey::containing(day(15));

        let pairs = calendar_pairs::<EquipmentGrid>(&store, week);
        let (users, resources) = names(u1);
        assert!(detect(&pairs, &[active(u1, 1)], &users, &resources).is_empty());
    }

    #[test]
    fn test_repeated_days_report_once() {
        let u1 = Uuid::new_v4();
        let mut store = AllocationStore::new();
        for d in [14, 15, 16] {
            store.set(CellId::for_date(u1, day(d)), CellContent::Single(Assignment::equipment(1)));
        }
        let week = WeekKey::containing(day(15));

        let pairs = calendar_pairs::<EquipmentGrid>(&store, week);
        let (users, resources) = names(u1);
        let found = detect(&pairs, &[], &users, &resources);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_name, "Ada");
        assert_eq!(found[0].resource_name, "Excavator");
    }

    #[test]
    fn test_empty_calendar_has_no_discrepancies() {
        let u1 = Uuid::new_v4();
        let (users, resources) = names(u1);
        let registry = vec![active(u1, 1), active(Uuid::new_v4(), 2)];
        assert!(detect(&BTreeSet::new(), &registry, &users, &resources).is_empty());
    }

    #[test]
    fn test_returned_entry_does_not_cover() {
        let u1 = Uuid::new_v4();
        let pairs = BTreeSet::from([(u1, 1)]);
        let returned = RegistryEntry {
            returned_at: Some(Utc::now()),
            ..active(u1, 1)
        };
        let found = detect(&pairs, &[returned], &HashMap::new(), &HashMap::new());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_name, "Unknown resource #1");
    }

    #[test]
    fn test_ordered_by_names_and_ignores_other_weeks() {
        let (zed, amy) = (Uuid::new_v4(), Uuid::new_v4());
        let mut store = AllocationStore::new();
        store.set(
            CellId::for_date(zed, day(15)),
            CellContent::Multiple(vec![Assignment::equipment(2), Assignment::equipment(1)]),
        );
        store.set(CellId::for_date(amy, day(16)), CellContent::Single(Assignment::equipment(1)));
        store.set(CellId::for_date(amy, day(22)), CellContent::Single(Assignment::equipment(9)));
        store.set(CellId::for_date(amy, day(17)), CellContent::Single(Assignment::leave("Sick")));

        let pairs = calendar_pairs::<EquipmentGrid>(&store, WeekKey::containing(day(15)));
        assert_eq!(pairs.len(), 3);

        let users = HashMap::from([(zed, "Zed".to_string()), (amy, "Amy".to_string())]);
        let resources = HashMap::from([(1, "Crane".to_string()), (2, "Auger".to_string())]);
        let found = detect(&pairs, &[], &users, &resources);
        let order: Vec<(&str, &str)> = found
            .iter()
            .map(|d| (d.user_name.as_str(), d.resource_name.as_str()))
            .collect();
        assert_eq!(order, vec![("Amy", "Crane"), ("Zed", "Auger"), ("Zed", "Crane")]);
    }
}
