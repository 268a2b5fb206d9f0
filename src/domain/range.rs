use crate::domain::local_calendar::{LocalCalendar, first_day_of_month, week_monday};
use crate::domain::models::{CalendarRange, CalendarView, DayKey, NavDirection};
use chrono::{Duration, Months, NaiveDate};

/// Month grids are always 7x6.
pub const MONTH_GRID_DAYS: i64 = 42;
pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeComputer {
    calendar: LocalCalendar,
}

impl RangeComputer {
    pub fn new(calendar: LocalCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &LocalCalendar {
        &self.calendar
    }

    pub fn compute(&self, view: CalendarView, focus: NaiveDate) -> CalendarRange {
        match view {
            CalendarView::Month => {
                let start = self
                    .calendar
                    .start_of_date(week_monday(first_day_of_month(focus)));
                CalendarRange {
                    start,
                    end: self.calendar.add_days(start, MONTH_GRID_DAYS),
                    label: focus.format("%B %Y").to_string(),
                }
            }
            CalendarView::Week => {
                let monday = week_monday(focus);
                let start = self.calendar.start_of_date(monday);
                CalendarRange {
                    start,
                    end: self.calendar.add_days(start, WEEK_DAYS),
                    label: week_label(monday, monday + Duration::days(WEEK_DAYS - 1)),
                }
            }
            CalendarView::Day => CalendarRange {
                start: self.calendar.start_of_date(focus),
                end: self.calendar.start_of_date(focus + Duration::days(1)),
                label: focus.format("%A, %-d %B %Y").to_string(),
            },
        }
    }

    /// One unit of the current view. Month steps clamp to the last day of shorter months.
    pub fn shift_focus(
        &self,
        view: CalendarView,
        focus: NaiveDate,
        direction: NavDirection,
    ) -> NaiveDate {
        match (view, direction) {
            (CalendarView::Month, NavDirection::Next) => {
                focus.checked_add_months(Months::new(1)).unwrap_or(focus)
            }
            (CalendarView::Month, NavDirection::Prev) => {
                focus.checked_sub_months(Months::new(1)).unwrap_or(focus)
            }
            (CalendarView::Week, direction) => {
                focus + Duration::days(WEEK_DAYS * i64::from(direction.signum()))
            }
            (CalendarView::Day, direction) => focus + Duration::days(i64::from(direction.signum())),
        }
    }

    /// Upcoming window used by list mode: `[today, today + horizon_days)`.
    pub fn list_window(&self, today: NaiveDate, horizon_days: u32) -> CalendarRange {
        let last = today + Duration::days(i64::from(horizon_days.max(1)) - 1);
        CalendarRange {
            start: self.calendar.start_of_date(today),
            end: self.calendar.start_of_date(last + Duration::days(1)),
            label: format!(
                "{} – {}",
                today.format("%-d %b %Y"),
                last.format("%-d %b %Y")
            ),
        }
    }

    /// Every local day whose midnight falls inside the range, in order.
    pub fn days_in(&self, range: &CalendarRange) -> Vec<DayKey> {
        let mut days = Vec::new();
        let mut date = self.calendar.local_date(range.start);
        while self.calendar.start_of_date(date) < range.end {
            days.push(DayKey::from_date(date));
            date += Duration::days(1);
        }
        days
    }

    pub fn contains_day(&self, range: &CalendarRange, key: DayKey) -> bool {
        range.contains(self.calendar.start_of_local_day(key))
    }
}

fn week_label(first: NaiveDate, last: NaiveDate) -> String {
    use chrono::Datelike;

    if first.year() == last.year() {
        format!("{} – {}", first.format("%-d %b"), last.format("%-d %b %Y"))
    } else {
        format!("{} – {}", first.format("%-d %b %Y"), last.format("%-d %b %Y"))
    }
}
