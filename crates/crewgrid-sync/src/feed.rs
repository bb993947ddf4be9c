use chrono::{DateTime, NaiveDate, Utc};
use crewgrid_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Row operation carried by a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A pushed notification of one remote row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: ChangeOperation,
    /// Row after the change (insert, update)
    #[serde(default)]
    pub record: Option<Value>,
    /// Row before the change (update, delete); may only carry the primary key
    #[serde(default)]
    pub old_record: Option<Value>,
    pub commit_timestamp: DateTime<Utc>,
}

fn row_key(row: Option<&Value>) -> Option<(UserId, NaiveDate)> {
    let row = row?;
    let user = row.get("user_id")?.as_str()?.parse().ok()?;
    let date = NaiveDate::parse_from_str(row.get("date")?.as_str()?, "%Y-%m-%d").ok()?;
    Some((user, date))
}

impl ChangeEvent {
    /// The (user, date) cells this event touches, or `None` when the payload
    /// does not say which cells those are.
    pub fn affected_keys(&self) -> Option<Vec<(UserId, NaiveDate)>> {
        let new = row_key(self.record.as_ref());
        let old = row_key(self.old_record.as_ref());
        let mut keys = match self.operation {
            ChangeOperation::Insert => vec![new?],
            ChangeOperation::Delete => vec![old?],
            ChangeOperation::Update => vec![new?, old?],
        };
        keys.dedup();
        Some(keys)
    }
}

/// Source of pushed change events
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn event(operation: ChangeOperation, record: Option<Value>, old_record: Option<Value>) -> ChangeEvent {
        ChangeEvent {
            table: "allocations".to_string(),
            operation,
            record,
            old_record,
            commit_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_insert_maps_to_one_cell() {
        let user = Uuid::new_v4();
        let ev = event(
            ChangeOperation::Insert,
            Some(json!({"id": 1, "user_id": user.to_string(), "date": "2024-01-15"})),
            None,
        );
        let keys = ev.affected_keys().unwrap();
        assert_eq!(keys, vec![(user, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())]);
    }

    #[test]
    fn test_delete_with_only_id_is_ambiguous() {
        let ev = event(ChangeOperation::Delete, None, Some(json!({"id": 7})));
        assert!(ev.affected_keys().is_none());
    }

    #[test]
    fn test_update_moving_row_touches_both_cells() {
        let user = Uuid::new_v4();
        let ev = event(
            ChangeOperation::Update,
            Some(json!({"user_id": user.to_string(), "date": "2024-01-16"})),
            Some(json!({"user_id": user.to_string(), "date": "2024-01-15"})),
        );
        assert_eq!(ev.affected_keys().unwrap().len(), 2);

        let partial = event(
            ChangeOperation::Update,
            Some(json!({"user_id": user.to_string(), "date": "2024-01-16"})),
            Some(json!({"id": 3})),
        );
        assert!(partial.affected_keys().is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let ev: ChangeEvent = serde_json::from_str(
            r#"{"table":"profiles","operation":"UPDATE","record":{"id":"x"},"commit_timestamp":"2024-01-15T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ev.operation, ChangeOperation::Update);
        assert!(ev.old_record.is_none());
    }
}
