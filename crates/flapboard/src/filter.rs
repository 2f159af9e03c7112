//! Narrowing the board's trips by day, place, carrier, direction and level.
//!
//! Filtering is a pure function over an already-sorted slice. It never
//! reorders and never mutates its input, so it can be re-run on every input
//! change.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{Carrier, Day, Direction, Level, Place, ScheduleEntry};

/// Equality constraints on schedule entries. `None` means "All".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Day of the week.
    pub day: Option<Day>,
    /// Site.
    pub place: Option<Place>,
    /// Vehicle.
    pub carrier: Option<Carrier>,
    /// Arrival or departure.
    pub direction: Option<Direction>,
    /// School level.
    pub level: Option<Level>,
}

impl FilterCriteria {
    /// Criteria matching everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria for the board's opening view: today's school day, everything
    /// else unconstrained.
    #[must_use]
    pub fn for_today(today: NaiveDate) -> Self {
        Self {
            day: Some(default_day(today)),
            ..Self::default()
        }
    }

    /// Whether every criterion is "All".
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// Whether `entry` satisfies every present constraint.
    ///
    /// An entry lacking a field (older records have no day or carrier) does
    /// not match a constraint on that field.
    #[must_use]
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        fn check<T: PartialEq>(want: Option<T>, have: Option<T>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }

        check(self.day, entry.day)
            && check(self.place, entry.place)
            && check(self.carrier, entry.carrier)
            && check(self.direction, Some(entry.direction))
            && check(self.level, Some(entry.level))
    }
}

/// Entries satisfying `criteria`, in their original order.
#[must_use]
pub fn filter<'a>(entries: &'a [ScheduleEntry], criteria: &FilterCriteria) -> Vec<&'a ScheduleEntry> {
    entries.iter().filter(|e| criteria.matches(e)).collect()
}

/// The school day to show for `today`. Weekends map to Monday.
#[must_use]
pub fn default_day(today: NaiveDate) -> Day {
    Day::from_weekday(today.weekday()).unwrap_or(Day::Monday)
}

/// Sort entries by day, then time of day, then id. Entries without a day
/// sort first.
pub fn sort_entries(entries: &mut [ScheduleEntry]) {
    entries.sort_by_key(|e| (e.day, e.minutes(), e.id));
}
