//! Packs overlapping appointments of one day into side-by-side lanes.
//!
//! Events are sorted by start (longer first on ties), split into clusters of transitively
//! overlapping events, and each cluster is coloured first-fit. With that ordering the number
//! of lanes in a cluster equals its maximum simultaneous overlap.

use crate::domain::local_calendar::LocalCalendar;
use crate::domain::models::{Appointment, DayKey};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Zero-length and clamped-away events are drawn as a marker of this many minutes.
pub const MIN_VISIBLE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for DisplayWindow {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 20,
        }
    }
}

impl DisplayWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, String> {
        let window = Self {
            start_hour,
            end_hour,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.end_hour > 24 {
            return Err("displayWindow.endHour must be <= 24".to_string());
        }
        if self.start_hour >= self.end_hour {
            return Err("displayWindow.startHour must be before displayWindow.endHour".to_string());
        }
        Ok(())
    }

    pub fn total_minutes(&self) -> i64 {
        i64::from(self.end_hour.saturating_sub(self.start_hour)) * 60
    }

    fn offset_minutes(&self) -> i64 {
        i64::from(self.start_hour) * 60
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEvent<'a> {
    pub appointment: &'a Appointment,
    pub start_minute: i64,
    pub end_minute: i64,
    pub lane: usize,
    pub lane_count: usize,
    pub cluster: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanePosition {
    pub left_percent: f64,
    pub width_percent: f64,
}

impl LayoutEvent<'_> {
    /// Horizontal placement inside the day column, lanes separated by `gap_percent`.
    /// Width bottoms out at zero when the gaps alone fill the column.
    pub fn position(&self, gap_percent: f64) -> LanePosition {
        let lanes = self.lane_count.max(1) as f64;
        let width = ((100.0 - (lanes - 1.0) * gap_percent) / lanes).max(0.0);
        LanePosition {
            left_percent: self.lane as f64 * (width + gap_percent),
            width_percent: width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLayout<'a> {
    pub day: DayKey,
    pub events: Vec<LayoutEvent<'a>>,
}

struct Placed<'a> {
    appointment: &'a Appointment,
    start_minute: i64,
    end_minute: i64,
}

/// Lays out the appointments of a single display day.
pub fn layout_day<'a, I>(
    appointments: I,
    window: DisplayWindow,
    calendar: &LocalCalendar,
) -> Vec<LayoutEvent<'a>>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    let total = window.total_minutes();
    let mut placed: Vec<Placed<'a>> = appointments
        .into_iter()
        .map(|appointment| {
            let day_start = calendar.start_of_day(appointment.starts_at);
            let start = (appointment.starts_at - day_start).num_minutes() - window.offset_minutes();
            let end = (appointment.ends_at - day_start).num_minutes() - window.offset_minutes();

            let start_minute = start.clamp(0, total);
            let mut end_minute = end.clamp(0, total);
            if end_minute <= start_minute {
                end_minute = total.min(start_minute + MIN_VISIBLE_MINUTES);
            }
            Placed {
                appointment,
                start_minute,
                end_minute,
            }
        })
        .collect();

    placed.sort_by_key(|event| (event.start_minute, Reverse(event.end_minute)));

    let mut events = Vec::with_capacity(placed.len());
    for (cluster_index, cluster) in clusters(&placed).into_iter().enumerate() {
        let mut lane_ends: Vec<i64> = Vec::new();
        let mut lanes = Vec::with_capacity(cluster.len());
        for event in cluster {
            let lane = match lane_ends.iter().position(|end| *end <= event.start_minute) {
                Some(lane) => lane,
                None => {
                    lane_ends.push(event.start_minute);
                    lane_ends.len() - 1
                }
            };
            lane_ends[lane] = event.end_minute;
            lanes.push(lane);
        }

        let lane_count = lane_ends.len();
        events.extend(cluster.iter().zip(lanes).map(|(event, lane)| LayoutEvent {
            appointment: event.appointment,
            start_minute: event.start_minute,
            end_minute: event.end_minute,
            lane,
            lane_count,
            cluster: cluster_index,
        }));
    }
    events
}

/// Groups appointments by local day and lays out each day that has any.
pub fn layout_days<'a>(
    appointments: &'a [Appointment],
    window: DisplayWindow,
    calendar: &LocalCalendar,
) -> Vec<DayLayout<'a>> {
    calendar
        .group_by_day(appointments)
        .into_iter()
        .map(|(day, bucket)| DayLayout {
            day,
            events: layout_day(bucket, window, calendar),
        })
        .collect()
}

/// Maximal runs of sorted events whose start precedes the running end of the run.
fn clusters<'p, 'a>(sorted: &'p [Placed<'a>]) -> Vec<&'p [Placed<'a>]> {
    let mut runs = Vec::new();
    let mut run_start = 0;
    let mut cur_end = i64::MIN;
    for (index, event) in sorted.iter().enumerate() {
        if index > run_start && event.start_minute >= cur_end {
            runs.push(&sorted[run_start..index]);
            run_start = index;
            cur_end = event.end_minute;
        } else {
            cur_end = cur_end.max(event.end_minute);
        }
    }
    if run_start < sorted.len() {
        runs.push(&sorted[run_start..]);
    }
    runs
}
