use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::GridError;

/// Identifier of a staff member (the hosted store's auth user id)
pub type UserId = Uuid;

/// Number of days in a fiscal week
pub const DAYS_PER_WEEK: u8 = 7;

/// Position of a date inside its fiscal week.
///
/// Fiscal weeks run Saturday through Friday, so Saturday is 0 and Friday is 6.
pub fn day_index(date: NaiveDate) -> u8 {
    ((date.weekday().num_days_from_sunday() + 1) % 7) as u8
}

/// The Saturday that starts a fiscal week.
///
/// Deserializing accepts any date and snaps it to its Saturday.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "NaiveDate", into = "NaiveDate")]
pub struct WeekKey(NaiveDate);

impl From<NaiveDate> for WeekKey {
    fn from(date: NaiveDate) -> Self {
        WeekKey::containing(date)
    }
}

impl From<WeekKey> for NaiveDate {
    fn from(week: WeekKey) -> Self {
        week.0
    }
}

impl WeekKey {
    /// Fiscal week containing the given date
    pub fn containing(date: NaiveDate) -> Self {
        WeekKey(date - Duration::days(day_index(date) as i64))
    }

    /// First day (Saturday) of the week
    pub fn start(&self) -> NaiveDate {
        self.0
    }

    /// Last day (Friday) of the week
    pub fn end(&self) -> NaiveDate {
        self.0 + Duration::days(DAYS_PER_WEEK as i64 - 1)
    }

    /// Date of the given day index within this week
    pub fn date_of(&self, day: u8) -> NaiveDate {
        self.0 + Duration::days(day as i64)
    }

    pub fn next(&self) -> Self {
        WeekKey(self.0 + Duration::days(DAYS_PER_WEEK as i64))
    }

    pub fn previous(&self) -> Self {
        WeekKey(self.0 - Duration::days(DAYS_PER_WEEK as i64))
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekKey {
    type Err = chrono::ParseError;

    /// Parses any date and snaps it to the Saturday starting its week
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?;
        Ok(WeekKey::containing(date))
    }
}

/// Identity of one allocation cell: one user on one day of one fiscal week
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCellId")]
pub struct CellId {
    pub week: WeekKey,
    pub user: UserId,
    pub day: u8,
}

#[derive(Deserialize)]
struct RawCellId {
    week: WeekKey,
    user: UserId,
    day: u8,
}

impl TryFrom<RawCellId> for CellId {
    type Error = GridError;

    fn try_from(raw: RawCellId) -> Result<Self, Self::Error> {
        CellId::try_new(raw.week, raw.user, raw.day)
    }
}

impl CellId {
    pub fn new(week: WeekKey, user: UserId, day: u8) -> Self {
        debug_assert!(day < DAYS_PER_WEEK);
        CellId { week, user, day }
    }

    /// Checked constructor for identities coming from outside
    pub fn try_new(week: WeekKey, user: UserId, day: u8) -> Result<Self, GridError> {
        if day >= DAYS_PER_WEEK {
            return Err(GridError::DayOutOfRange(day));
        }
        Ok(CellId { week, user, day })
    }

    /// Cell for a user on a calendar date
    pub fn for_date(user: UserId, date: NaiveDate) -> Self {
        CellId {
            week: WeekKey::containing(date),
            user,
            day: day_index(date),
        }
    }

    /// Calendar date this cell stands for
    pub fn date(&self) -> NaiveDate {
        self.week.date_of(self.day)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.date().format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_day_index_saturday_to_friday() {
        // 2024-01-13 is a Saturday
        assert_eq!(day_index(date("2024-01-13")), 0);
        assert_eq!(day_index(date("2024-01-14")), 1);
        assert_eq!(day_index(date("2024-01-15")), 2);
        assert_eq!(day_index(date("2024-01-19")), 6);
    }

    #[test]
    fn test_week_containing() {
        let week = WeekKey::containing(date("2024-01-15"));
        assert_eq!(week.start(), date("2024-01-13"));
        assert_eq!(week.end(), date("2024-01-19"));

        // Saturday starts its own week
        assert_eq!(WeekKey::containing(date("2024-01-13")), week);
        // Friday still belongs to it
        assert_eq!(WeekKey::containing(date("2024-01-19")), week);
        // The next Saturday does not
        assert_eq!(WeekKey::containing(date("2024-01-20")), week.next());
    }

    #[test]
    fn test_week_parse_snaps_to_saturday() {
        let week: WeekKey = "2024-01-17".parse().unwrap();
        assert_eq!(week.to_string(), "2024-01-13");
        assert!("not-a-date".parse::<WeekKey>().is_err());
    }

    #[test]
    fn test_cell_id_round_trips_date() {
        let user = Uuid::new_v4();
        let cell = CellId::for_date(user, date("2024-01-15"));
        assert_eq!(cell.day, 2);
        assert_eq!(cell.date(), date("2024-01-15"));
        assert_eq!(cell.week.previous().next(), cell.week);
    }

    #[test]
    fn test_week_deserialize_snaps_to_saturday() {
        let week: WeekKey = serde_json::from_str("\"2024-01-15\"").unwrap();
        assert_eq!(week.start(), date("2024-01-13"));
        assert_eq!(serde_json::to_string(&week).unwrap(), "\"2024-01-13\"");
    }

    #[test]
    fn test_cell_id_deserialize_rejects_bad_day() {
        let user = Uuid::new_v4();
        let bad = serde_json::json!({"week": "2024-01-13", "user": user, "day": 9});
        assert!(serde_json::from_value::<CellId>(bad).is_err());

        let ok = serde_json::json!({"week": "2024-01-15", "user": user, "day": 6});
        let cell: CellId = serde_json::from_value(ok).unwrap();
        assert_eq!(cell.week.start(), date("2024-01-13"));
        assert_eq!(cell.date(), date("2024-01-19"));
        assert!(CellId::try_new(cell.week, user, DAYS_PER_WEEK).is_err());
    }
}
