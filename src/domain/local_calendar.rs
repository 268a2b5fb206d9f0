use crate::domain::models::{Appointment, DayKey};
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Fixed UTC+3, no daylight saving. Note the inverted sign of the `Etc/GMT` names.
pub const BUSINESS_TIMEZONE: Tz = chrono_tz::Etc::GMTMinus3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    pub hour: u32,
    pub minute: u32,
}

/// Wall-clock arithmetic in one business timezone. Every day, week and label boundary in the
/// engine goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    zone: Tz,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self::new(BUSINESS_TIMEZONE)
    }
}

impl LocalCalendar {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        let zone = name
            .trim()
            .parse::<Tz>()
            .map_err(|_| EngineError::UnknownTimezone(name.to_string()))?;
        Ok(Self::new(zone))
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.zone).date_naive()
    }

    pub fn local_clock(&self, instant: DateTime<Utc>) -> LocalClock {
        let local = instant.with_timezone(&self.zone);
        LocalClock {
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    pub fn day_key(&self, instant: DateTime<Utc>) -> DayKey {
        DayKey::from_date(self.local_date(instant))
    }

    pub fn start_of_local_day(&self, key: DayKey) -> DateTime<Utc> {
        self.start_of_date(key.date())
    }

    /// Earliest instant of the local day. Falls forward hour by hour when midnight
    /// itself is skipped by a transition.
    pub fn start_of_date(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        self.resolve_local(midnight)
            .or_else(|| (1..=24).find_map(|hour| self.resolve_local(midnight + Duration::hours(hour))))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_date(self.local_date(instant))
    }

    pub fn end_exclusive_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_date(self.local_date(instant) + Duration::days(1))
    }

    /// Moves by `days` local calendar days keeping the wall-clock time. In a zone without
    /// transitions this is exactly `days * 86_400_000` ms.
    pub fn add_days(&self, instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        let shifted = instant.with_timezone(&self.zone).naive_local() + Duration::days(days);
        self.resolve_local(shifted)
            .unwrap_or_else(|| instant + Duration::days(days))
    }

    /// Monday-anchored week start at local midnight.
    pub fn start_of_week(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_date(week_monday(self.local_date(instant)))
    }

    /// Buckets appointments by the local day they start on, each bucket ordered by start.
    pub fn group_by_day<'a>(
        &self,
        appointments: &'a [Appointment],
    ) -> BTreeMap<DayKey, Vec<&'a Appointment>> {
        let mut days: BTreeMap<DayKey, Vec<&'a Appointment>> = BTreeMap::new();
        for appointment in appointments {
            days.entry(self.day_key(appointment.starts_at))
                .or_default()
                .push(appointment);
        }
        for bucket in days.values_mut() {
            bucket.sort_by_key(|appointment| (appointment.starts_at, appointment.ends_at));
        }
        days
    }

    fn resolve_local(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.zone
            .from_local_datetime(&local)
            .earliest()
            .map(|resolved| resolved.with_timezone(&Utc))
    }
}

pub fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
