//! View data for the list, chart and calendar surfaces.
//!
//! Pure functions over already-loaded entries; rendering is up to the
//! caller.

use crate::error::{ClientError, ClientResult};
use crate::types::{Entry, Stats};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// List ordering offered by the entries page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    DateDesc,
    DateAsc,
    ScoreDesc,
    ScoreAsc,
}

/// Filters by badge (exact match) and sorts. Sorting is stable, so
/// entries with equal keys keep their loaded order.
pub fn browse(entries: &[Entry], badge: Option<&str>, order: SortOrder) -> Vec<Entry> {
    let mut out: Vec<Entry> = entries
        .iter()
        .filter(|e| match badge {
            Some(b) if !b.is_empty() => e.badge.as_deref() == Some(b),
            _ => true,
        })
        .cloned()
        .collect();

    match order {
        SortOrder::DateDesc => out.sort_by(|a, b| b.date.cmp(&a.date)),
        SortOrder::DateAsc => out.sort_by(|a, b| a.date.cmp(&b.date)),
        SortOrder::ScoreDesc => out.sort_by(|a, b| b.score.cmp(&a.score)),
        SortOrder::ScoreAsc => out.sort_by(|a, b| a.score.cmp(&b.score)),
    }
    out
}

/// Distinct badges in first-seen order.
pub fn distinct_badges(entries: &[Entry]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for badge in entries.iter().filter_map(|e| e.badge.as_deref()) {
        if !seen.iter().any(|s| s == badge) {
            seen.push(badge.to_string());
        }
    }
    seen
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub score: i64,
}

/// Score over time, oldest first. Same-day entries are ordered by id.
pub fn chart_series(entries: &[Entry]) -> Vec<ChartPoint> {
    let mut sorted: Vec<&Entry> = entries.iter().collect();
    sorted.sort_by_key(|e| (e.date, e.id));
    sorted
        .into_iter()
        .map(|e| ChartPoint {
            date: e.date,
            score: e.score,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub entries: Vec<Entry>,
}

/// One month laid out for a Monday-first calendar.
#[derive(Clone, Debug, PartialEq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st (0 when the month starts on a Monday).
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
}

pub fn month_grid(entries: &[Entry], year: i32, month: u32) -> ClientResult<MonthGrid> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ClientError::ValidationFailed(format!("invalid month {year}-{month}")))?;

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| CalendarDay {
            date,
            entries: entries.iter().filter(|e| e.date == date).cloned().collect(),
        })
        .collect();

    Ok(MonthGrid {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_monday(),
        days,
    })
}

/// Stats formatted for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsSummary {
    pub count: u64,
    pub avg: String,
    pub min: String,
    pub max: String,
}

impl StatsSummary {
    const ABSENT: &'static str = "-";

    pub fn from_stats(stats: Option<&Stats>) -> Self {
        let Some(stats) = stats else {
            return Self {
                count: 0,
                avg: Self::ABSENT.to_string(),
                min: Self::ABSENT.to_string(),
                max: Self::ABSENT.to_string(),
            };
        };
        let show = |v: Option<i64>| v.map_or_else(|| Self::ABSENT.to_string(), |v| v.to_string());
        Self {
            count: stats.count,
            avg: stats
                .avg
                .map_or_else(|| Self::ABSENT.to_string(), |v| format!("{v:.1}")),
            min: show(stats.min),
            max: show(stats.max),
        }
    }
}
