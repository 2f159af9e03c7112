//! The departures board: latest schedule snapshot plus the active filter.

use chrono::NaiveDate;
use serde::Serialize;

use crate::filter::{filter, sort_entries, FilterCriteria};
use crate::model::{Level, ScheduleEntry};

/// Column widths of a rendered row.
const COURSE_WIDTH: usize = 12;
const TIME_WIDTH: usize = 5;
const PLACE_WIDTH: usize = 7;
const CARRIER_WIDTH: usize = 4;
const STATUS_WIDTH: usize = 8;

/// One board line, already in display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRow {
    /// Course group(s).
    pub course: String,
    /// `HH:mm`.
    pub time: String,
    /// Site, blank when unknown.
    pub place: String,
    /// Vehicle, blank when unknown.
    pub carrier: String,
    /// `LLEGANDO` or `SALIENDO`.
    pub status: String,
}

impl From<&ScheduleEntry> for BoardRow {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            course: entry.course_name.to_string(),
            time: entry.time.clone(),
            place: entry.place.map(|p| p.as_str().to_string()).unwrap_or_default(),
            carrier: entry.carrier.map(|c| c.as_str().to_string()).unwrap_or_default(),
            status: entry.direction.status_label().to_string(),
        }
    }
}

fn fit(text: &str, width: usize) -> String {
    let clipped: String = text.chars().take(width).collect();
    format!("{clipped:<width$}")
}

impl BoardRow {
    /// Fixed-width uppercase line, the text a flap row chases.
    #[must_use]
    pub fn line(&self) -> String {
        let line = [
            fit(&self.course, COURSE_WIDTH),
            format!("{:>width$}", fit(&self.time, TIME_WIDTH).trim_end(), width = TIME_WIDTH),
            fit(&self.place, PLACE_WIDTH),
            fit(&self.carrier, CARRIER_WIDTH),
            fit(&self.status, STATUS_WIDTH),
        ]
        .join(" ");
        line.to_uppercase()
    }
}

/// What one board shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardView {
    entries: Vec<ScheduleEntry>,
    criteria: FilterCriteria,
}

impl BoardView {
    /// An empty board with no filter.
    #[must_use]
    pub fn new(criteria: FilterCriteria) -> Self {
        Self {
            entries: Vec::new(),
            criteria,
        }
    }

    /// A board opened on `today`: filtered to today's school day.
    #[must_use]
    pub fn for_today(today: NaiveDate) -> Self {
        Self::new(FilterCriteria::for_today(today))
    }

    /// Replace everything shown with `entries`.
    pub fn apply_snapshot(&mut self, mut entries: Vec<ScheduleEntry>) {
        sort_entries(&mut entries);
        self.entries = entries;
    }

    /// Change the active filter.
    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
    }

    /// The active filter.
    #[must_use]
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Every entry of the last snapshot, sorted.
    #[must_use]
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Entries passing the filter.
    #[must_use]
    pub fn visible(&self) -> Vec<&ScheduleEntry> {
        filter(&self.entries, &self.criteria)
    }

    /// Visible entries split into one board per level, every level present.
    #[must_use]
    pub fn by_level(&self) -> Vec<(Level, Vec<&ScheduleEntry>)> {
        let visible = self.visible();
        Level::ALL
            .iter()
            .map(|&level| {
                let rows = visible.iter().copied().filter(|e| e.level == level).collect();
                (level, rows)
            })
            .collect()
    }

    /// Visible entries as display rows.
    #[must_use]
    pub fn render_rows(&self) -> Vec<BoardRow> {
        self.visible().into_iter().map(BoardRow::from).collect()
    }

    /// The whole board as text, one level heading per section.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (level, entries) in self.by_level() {
            out.push_str(&level.as_str().to_uppercase());
            out.push('\n');
            if entries.is_empty() {
                out.push_str("  -\n");
            }
            for entry in entries {
                out.push_str("  ");
                out.push_str(&BoardRow::from(entry).line());
                out.push('\n');
            }
        }
        out
    }
}
