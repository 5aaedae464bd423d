//! Promotion Schedule
//!
//! The validity window is absolute; weekday, time-of-day and excluded date
//! conditions are evaluated in the promotion's own timezone.

use std::collections::BTreeSet;

use jiff::{
    Timestamp, Zoned,
    civil::{Date, Time, Weekday},
    tz::TimeZone,
};

use crate::promotions::PromotionError;

/// Inclusive `[starts_at, ends_at]` window in which a promotion may be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    starts_at: Timestamp,
    ends_at: Timestamp,
}

impl ValidityWindow {
    /// Create a validity window.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::InvalidWindow`] unless `starts_at < ends_at`.
    pub fn new(starts_at: Timestamp, ends_at: Timestamp) -> Result<Self, PromotionError> {
        if starts_at >= ends_at {
            return Err(PromotionError::InvalidWindow);
        }

        Ok(Self { starts_at, ends_at })
    }

    /// Start of the window.
    pub fn starts_at(&self) -> Timestamp {
        self.starts_at
    }

    /// End of the window.
    pub fn ends_at(&self) -> Timestamp {
        self.ends_at
    }

    /// Whether `as_of` falls inside the window, bounds included.
    pub fn contains(&self, as_of: Timestamp) -> bool {
        self.starts_at <= as_of && as_of <= self.ends_at
    }

    /// Whether the window is over at `now`. Shared by lazy expiry and the sweep.
    pub fn has_ended(&self, now: Timestamp) -> bool {
        now > self.ends_at
    }
}

/// Set of allowed weekdays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// Whether no weekday restriction applies.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add a weekday.
    #[must_use]
    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | Self::bit(day))
    }

    /// Whether the weekday is a member.
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.to_monday_zero_offset().unsigned_abs()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::with)
    }
}

/// Local time-of-day window `[start, end)`. A window whose start is after its
/// end runs past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: Time,
    end: Time,
}

impl TimeWindow {
    /// Create a time-of-day window.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::InvalidTimeWindow`] if `start == end`.
    pub fn new(start: Time, end: Time) -> Result<Self, PromotionError> {
        if start == end {
            return Err(PromotionError::InvalidTimeWindow);
        }

        Ok(Self { start, end })
    }

    /// Parse a window from `HH:mm` strings.
    ///
    /// # Errors
    ///
    /// Returns an error if either time is malformed or the window is empty.
    pub fn parse(start: &str, end: &str) -> Result<Self, PromotionError> {
        Self::new(parse_hh_mm(start)?, parse_hh_mm(end)?)
    }

    /// Whether the local time falls inside the window.
    pub fn contains(&self, time: Time) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

fn parse_hh_mm(value: &str) -> Result<Time, PromotionError> {
    let invalid = || PromotionError::InvalidTimeOfDay(value.to_string());

    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;

    let hour = hour.parse::<i8>().map_err(|_err| invalid())?;
    let minute = minute.parse::<i8>().map_err(|_err| invalid())?;

    Time::new(hour, minute, 0, 0).map_err(|_err| invalid())
}

/// Calendar conditions of a promotion.
#[derive(Debug, Clone)]
pub struct Conditions {
    /// Timezone the local conditions are evaluated in
    pub timezone: TimeZone,

    /// Allowed weekdays; empty allows every day
    pub days: WeekdaySet,

    /// Allowed local time of day
    pub time_of_day: Option<TimeWindow>,

    /// Local calendar dates on which the promotion never applies
    pub excluded_dates: BTreeSet<Date>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            timezone: TimeZone::UTC,
            days: WeekdaySet::default(),
            time_of_day: None,
            excluded_dates: BTreeSet::new(),
        }
    }
}

impl Conditions {
    /// Conditions evaluated in the named IANA timezone.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::UnknownTimezone`] if the name is not in the
    /// timezone database.
    pub fn in_timezone(name: &str) -> Result<Self, PromotionError> {
        let timezone =
            TimeZone::get(name).map_err(|_err| PromotionError::UnknownTimezone(name.to_string()))?;

        Ok(Self {
            timezone,
            ..Self::default()
        })
    }

    /// Local wall-clock view of an instant.
    pub fn local(&self, instant: Timestamp) -> Zoned {
        instant.to_zoned(self.timezone.clone())
    }

    /// Whether the local weekday is allowed.
    pub fn allows_day(&self, local: &Zoned) -> bool {
        self.days.is_empty() || self.days.contains(local.weekday())
    }

    /// Whether the local time is allowed.
    pub fn allows_time(&self, local: &Zoned) -> bool {
        self.time_of_day
            .is_none_or(|window| window.contains(local.time()))
    }

    /// Whether the local date is excluded.
    pub fn excludes_date(&self, local: &Zoned) -> bool {
        self.excluded_dates.contains(&local.date())
    }
}
