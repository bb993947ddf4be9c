//! Drag-and-drop identifiers.
//!
//! A dragged item is named `"user::date::itemIndex"` and a drop target
//! `"user::date"`, with dates written as `YYYY-MM-DD`.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;
use crate::identity::{CellId, UserId};

const SEPARATOR: &str = "::";

/// The item being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSource {
    pub cell: CellId,
    pub index: usize,
}

/// The cell an item is dropped on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub cell: CellId,
}

fn parse_cell(token: &str, user: &str, date: &str) -> Result<CellId, GridError> {
    let invalid = || GridError::InvalidToken(token.to_string());
    let user: UserId = user.parse().map_err(|_| invalid())?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
    Ok(CellId::for_date(user, date))
}

impl FromStr for DragSource {
    type Err = GridError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let [user, date, index] = parts.as_slice() else {
            return Err(GridError::InvalidToken(token.to_string()));
        };
        let index = index
            .parse()
            .map_err(|_| GridError::InvalidToken(token.to_string()))?;
        Ok(DragSource {
            cell: parse_cell(token, user, date)?,
            index,
        })
    }
}

impl FromStr for DropTarget {
    type Err = GridError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let [user, date] = parts.as_slice() else {
            return Err(GridError::InvalidToken(token.to_string()));
        };
        Ok(DropTarget {
            cell: parse_cell(token, user, date)?,
        })
    }
}

impl fmt::Display for DragSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.cell.user,
            self.cell.date().format("%Y-%m-%d"),
            self.index
        )
    }
}

impl fmt::Display for DropTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}",
            self.cell.user,
            self.cell.date().format("%Y-%m-%d")
        )
    }
}
