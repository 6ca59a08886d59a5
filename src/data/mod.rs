//! Core data models for the leaderboard caching proxy
//!
//! This module contains the data types used throughout the service for
//! representing time windows, leaderboard rows, and cached snapshots.

pub mod sheets;

pub use sheets::{parse_leaderboard, RangeSource, SheetsClient, SheetsError};

use serde::Serialize;

/// Named time windows for which a leaderboard snapshot is tracked
///
/// Each window maps to a fixed set of spreadsheet coordinates: the sheet
/// holding its leaderboard, the cell range of the leaderboard rows, and the
/// single cell holding the window's bonus sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Current day
    Today,
    /// Previous day
    Yesterday,
    /// Current week
    Week,
    /// Current month
    Month,
    /// Previous week
    LastWeek,
    /// Previous month
    LastMonth,
}

/// Which bonus figure a window carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCategory {
    /// Daily windows carry the daily bonus sum
    Daily,
    /// Weekly windows carry the weekly bonus sum
    Weekly,
    /// Monthly windows carry the monthly bonus
    Monthly,
}

/// Cell range of the leaderboard block on every window sheet
const LEADERBOARD_RANGE: &str = "C20:L29";

/// Cell holding the bonus sum on every window sheet
const BONUS_CELL: &str = "N2";

impl Window {
    /// Returns a slice containing all window variants.
    pub fn all() -> &'static [Window] {
        &[
            Window::Today,
            Window::Yesterday,
            Window::Week,
            Window::Month,
            Window::LastWeek,
            Window::LastMonth,
        ]
    }

    /// Returns the route-segment name for the window.
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Today => "today",
            Window::Yesterday => "yesterday",
            Window::Week => "week",
            Window::Month => "month",
            Window::LastWeek => "lastweek",
            Window::LastMonth => "lastmonth",
        }
    }

    /// Parses a route segment into a Window.
    ///
    /// Matching is case-insensitive. Returns `None` if the input doesn't
    /// match any window.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Window> {
        match s.to_lowercase().trim() {
            "today" => Some(Window::Today),
            "yesterday" => Some(Window::Yesterday),
            "week" => Some(Window::Week),
            "month" => Some(Window::Month),
            "lastweek" => Some(Window::LastWeek),
            "lastmonth" => Some(Window::LastMonth),
            _ => None,
        }
    }

    /// Returns the bonus category of the window.
    pub fn category(&self) -> WindowCategory {
        match self {
            Window::Today | Window::Yesterday => WindowCategory::Daily,
            Window::Week | Window::LastWeek => WindowCategory::Weekly,
            Window::Month | Window::LastMonth => WindowCategory::Monthly,
        }
    }

    /// Returns the spreadsheet sheet holding this window's data.
    pub fn sheet(&self) -> &'static str {
        match self {
            Window::Today => "DayMoney (today)",
            Window::Yesterday => "DayMoney (yesterday)",
            Window::Week => "WeekMoney (current)",
            Window::Month => "MonthMoney (current)",
            Window::LastWeek => "WeekMoney (previous)",
            Window::LastMonth => "MonthMoney (previous)",
        }
    }

    /// Returns the cell range of the window's leaderboard rows.
    pub fn range(&self) -> &'static str {
        LEADERBOARD_RANGE
    }

    /// Returns the cell holding the window's bonus sum.
    pub fn bonus_cell(&self) -> &'static str {
        BONUS_CELL
    }
}

/// One leaderboard row
///
/// All fields are raw cell strings exactly as the spreadsheet returns them;
/// the service does not interpret their business meaning. Field names on the
/// wire match the legacy payload format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// Position in the leaderboard
    pub rank: String,
    /// Courier phone number
    pub phone: String,
    /// Completed orders
    pub orders: String,
    /// Hours worked
    pub hours: String,
    /// Money earned
    pub money: String,
    /// Money per hour
    #[serde(rename = "moneyPerHour")]
    pub money_per_hour: String,
}

/// Column offsets within a leaderboard range row (C..L)
const COL_RANK: usize = 0;
const COL_PHONE: usize = 1;
const COL_ORDERS: usize = 5;
const COL_HOURS: usize = 6;
const COL_MONEY: usize = 9;
const COL_MONEY_PER_HOUR: usize = 8;

impl LeaderboardEntry {
    /// Builds an entry from one raw range row.
    ///
    /// Cells missing from the row (the sheet API omits empty trailing cells)
    /// map to empty strings.
    pub fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        Self {
            rank: cell(COL_RANK),
            phone: cell(COL_PHONE),
            orders: cell(COL_ORDERS),
            hours: cell(COL_HOURS),
            money: cell(COL_MONEY),
            money_per_hour: cell(COL_MONEY_PER_HOUR),
        }
    }
}

/// A complete cached snapshot for one window
///
/// The variant is fixed by the window's category and carries both the
/// leaderboard rows and the bonus figure from the same fetch cycle; a
/// snapshot is never assembled from two different fetches. Serializes to the
/// legacy wire shapes (`{topList, dailyBonuSum}` and friends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WindowSnapshot {
    Daily {
        #[serde(rename = "topList")]
        top_list: Vec<LeaderboardEntry>,
        #[serde(rename = "dailyBonuSum")]
        daily_bonus: String,
    },
    Weekly {
        #[serde(rename = "topList")]
        top_list: Vec<LeaderboardEntry>,
        #[serde(rename = "weeklyBonusSum")]
        weekly_bonus: String,
    },
    Monthly {
        #[serde(rename = "topList")]
        top_list: Vec<LeaderboardEntry>,
        #[serde(rename = "monthlyBonus")]
        monthly_bonus: String,
    },
}

impl WindowSnapshot {
    /// Assembles a snapshot from one fetch cycle's rows and bonus value.
    pub fn assemble(
        category: WindowCategory,
        top_list: Vec<LeaderboardEntry>,
        bonus: String,
    ) -> Self {
        match category {
            WindowCategory::Daily => WindowSnapshot::Daily {
                top_list,
                daily_bonus: bonus,
            },
            WindowCategory::Weekly => WindowSnapshot::Weekly {
                top_list,
                weekly_bonus: bonus,
            },
            WindowCategory::Monthly => WindowSnapshot::Monthly {
                top_list,
                monthly_bonus: bonus,
            },
        }
    }

    /// Returns the leaderboard rows.
    pub fn top_list(&self) -> &[LeaderboardEntry] {
        match self {
            WindowSnapshot::Daily { top_list, .. }
            | WindowSnapshot::Weekly { top_list, .. }
            | WindowSnapshot::Monthly { top_list, .. } => top_list,
        }
    }

    /// Returns the bonus figure, whichever category it belongs to.
    pub fn bonus(&self) -> &str {
        match self {
            WindowSnapshot::Daily { daily_bonus, .. } => daily_bonus,
            WindowSnapshot::Weekly { weekly_bonus, .. } => weekly_bonus,
            WindowSnapshot::Monthly { monthly_bonus, .. } => monthly_bonus,
        }
    }
}
