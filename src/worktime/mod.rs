//! End-time / duration bookkeeping for the "starting work" message.
//!
//! All arithmetic happens on local wall-clock values ([`PrimitiveDateTime`]); the
//! [`Clock`] decides which offset "local" means.

use std::fmt;

use thiserror::Error;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::settings::TimeInputMode;

const SECONDS_PER_HOUR: f64 = 3600.0;
const MAX_DURATION_HOURS: f64 = 24.0;

#[derive(Debug, Error, PartialEq)]
pub enum TimeError {
    #[error("end time must look like HH:MM, got {0:?}")]
    InvalidEndTime(String),
    #[error("duration must be between 0 and 24 hours, got {0}")]
    InvalidDuration(f64),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

/// Reads the system clock and shifts it by an offset captured once at startup.
///
/// The local offset has to be read before any other thread is spawned, so callers
/// construct this early and pass it around.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn detect() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|err| {
            tracing::warn!(?err, "could not determine local UTC offset, using UTC");
            UtcOffset::UTC
        });
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

/// Wall-clock `HH:MM` with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EndTime(Time);

impl EndTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        Time::from_hms(hour, minute, 0).ok().map(Self)
    }

    pub fn time(&self) -> Time {
        self.0
    }
}

impl Default for EndTime {
    fn default() -> Self {
        Self(time::macros::time!(18:00))
    }
}

impl fmt::Display for EndTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

pub fn parse_end_time(raw: &str) -> Result<EndTime, TimeError> {
    let trimmed = raw.trim();
    let invalid = || TimeError::InvalidEndTime(raw.to_string());
    let (hour, minute) = trimmed.split_once(':').ok_or_else(invalid)?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u8 = hour.parse().map_err(|_| invalid())?;
    let minute: u8 = minute.parse().map_err(|_| invalid())?;
    EndTime::new(hour, minute).ok_or_else(invalid)
}

/// Time left until the next occurrence of `end`. Today's `end` is used when it is
/// still ahead of `now`, otherwise tomorrow's, so the result is never negative.
pub fn duration_until(now: PrimitiveDateTime, end: EndTime) -> Duration {
    let today = PrimitiveDateTime::new(now.date(), end.time());
    let target = if today <= now {
        today.saturating_add(Duration::DAY)
    } else {
        today
    };
    target - now
}

pub fn hours_until(now: PrimitiveDateTime, end: EndTime) -> f64 {
    duration_until(now, end).as_seconds_f64() / SECONDS_PER_HOUR
}

/// The wall-clock time `hours` after `now`, truncated to the minute. Only the position
/// within the day matters, so whole days are dropped before converting.
pub fn end_time_after(now: PrimitiveDateTime, hours: f64) -> EndTime {
    let hours = if hours.is_finite() {
        hours.rem_euclid(24.0)
    } else {
        0.0
    };
    let end = now.saturating_add(Duration::seconds_f64(hours * SECONDS_PER_HOUR));
    EndTime(Time::from_hms(end.hour(), end.minute(), 0).unwrap_or(Time::MIDNIGHT))
}

pub fn round_to_tenth(hours: f64) -> f64 {
    (hours * 10.0).round() / 10.0
}

/// Splits fractional hours into whole hours and rounded minutes.
pub fn split_hours(hours: f64) -> (u32, u32) {
    let hours = hours.max(0.0);
    let whole = hours.floor();
    let minutes = ((hours - whole) * 60.0).round() as u32;
    if minutes >= 60 {
        (whole as u32 + 1, 0)
    } else {
        (whole as u32, minutes)
    }
}

pub fn format_hours_label(hours: f64) -> String {
    match split_hours(hours) {
        (whole, 0) => format!("{whole}時間"),
        (whole, minutes) => format!("{whole}時間{minutes}分"),
    }
}

pub fn format_clock(now: PrimitiveDateTime) -> String {
    format!("{:02}:{:02}", now.hour(), now.minute())
}

#[derive(Debug, Clone)]
pub struct WorkTimeCalculator {
    mode: TimeInputMode,
    now: PrimitiveDateTime,
    end_time: EndTime,
    duration_hours: f64,
    duration_seeded: bool,
}

impl WorkTimeCalculator {
    /// Starts from `end_time`; the duration mirrors the gap until duration mode is entered.
    pub fn new(now: PrimitiveDateTime, mode: TimeInputMode, end_time: EndTime) -> Self {
        let mut calculator = Self {
            mode: TimeInputMode::EndTime,
            now,
            end_time,
            duration_hours: round_to_tenth(hours_until(now, end_time)),
            duration_seeded: false,
        };
        calculator.set_mode(mode);
        calculator
    }

    pub fn mode(&self) -> TimeInputMode {
        self.mode
    }

    pub fn now(&self) -> PrimitiveDateTime {
        self.now
    }

    /// The end time handed to message generation.
    pub fn end_time(&self) -> EndTime {
        self.end_time
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_hours
    }

    pub fn set_mode(&mut self, mode: TimeInputMode) {
        self.mode = mode;
        if mode == TimeInputMode::Duration && !self.duration_seeded {
            self.duration_seeded = true;
            self.duration_hours = round_to_tenth(hours_until(self.now, self.end_time));
            tracing::debug!(
                hours = self.duration_hours,
                "seeded duration from end time gap"
            );
        }
    }

    pub fn set_end_time(&mut self, raw: &str) -> Result<EndTime, TimeError> {
        let end = parse_end_time(raw)?;
        self.end_time = end;
        self.duration_hours = round_to_tenth(hours_until(self.now, end));
        Ok(end)
    }

    pub fn set_duration(&mut self, hours: f64) -> Result<EndTime, TimeError> {
        if !(0.0..=MAX_DURATION_HOURS).contains(&hours) {
            return Err(TimeError::InvalidDuration(hours));
        }
        self.duration_hours = hours;
        self.end_time = end_time_after(self.now, hours);
        Ok(self.end_time)
    }

    pub fn refresh(&mut self, now: PrimitiveDateTime) {
        self.now = now;
    }

    /// Remaining hours as shown to the user. Recomputed against `now` in end-time mode
    /// so the figure ticks down between edits.
    pub fn display_hours(&self) -> f64 {
        match self.mode {
            TimeInputMode::EndTime => hours_until(self.now, self.end_time),
            TimeInputMode::Duration => self.duration_hours,
        }
    }

    pub fn display_label(&self) -> String {
        format_hours_label(self.display_hours())
    }

    pub fn span_label(&self) -> String {
        format!("{} → {}", format_clock(self.now), self.end_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use time::macros::datetime;

    fn calculator_at(now: PrimitiveDateTime) -> WorkTimeCalculator {
        WorkTimeCalculator::new(now, TimeInputMode::EndTime, EndTime::default())
    }

    #[test]
    fn parses_zero_padded_and_short_hours() {
        assert_eq!(parse_end_time("09:05"), Ok(EndTime::new(9, 5).unwrap()));
        assert_eq!(parse_end_time("9:05"), Ok(EndTime::new(9, 5).unwrap()));
        assert_eq!(parse_end_time(" 23:59 ").map(|t| t.to_string()), Ok("23:59".into()));
    }

    #[test]
    fn rejects_malformed_end_times() {
        for raw in ["", "18", "18:0", "24:00", "12:60", "ab:cd", "123:00"] {
            assert_matches!(parse_end_time(raw), Err(TimeError::InvalidEndTime(_)), "{raw}");
        }
    }

    #[test]
    fn overnight_end_time_rolls_to_next_day() {
        let mut calc = calculator_at(datetime!(2024-05-01 23:30));
        calc.set_end_time("01:00").unwrap();
        assert_eq!(calc.duration_hours(), 1.5);
        assert_eq!(calc.display_hours(), 1.5);
    }

    #[test]
    fn end_time_equal_to_now_means_a_full_day() {
        let now = datetime!(2024-05-01 18:00);
        assert_eq!(hours_until(now, EndTime::new(18, 0).unwrap()), 24.0);
    }

    #[test]
    fn duration_derives_zero_padded_end_time() {
        let mut calc = calculator_at(datetime!(2024-05-01 09:15));
        let end = calc.set_duration(8.5).unwrap();
        assert_eq!(end.to_string(), "17:45");
        assert_eq!(calc.end_time(), end);

        let end = calc.set_duration(16.0).unwrap();
        assert_eq!(end.to_string(), "01:15");
    }

    #[test]
    fn duration_round_trips_within_a_tenth() {
        let nows = [
            datetime!(2024-05-01 00:00),
            datetime!(2024-05-01 08:59:59),
            datetime!(2024-05-01 13:07:31),
            datetime!(2024-05-01 23:45:10),
        ];
        for now in nows {
            let mut step = 1;
            while step <= 48 {
                let hours = step as f64 * 0.5;
                let mut calc = calculator_at(now);
                let end = calc.set_duration(hours).unwrap();
                let back = hours_until(now, end);
                assert!(
                    (back - hours).abs() <= 0.1,
                    "now={now} hours={hours} end={end} back={back}"
                );
                step += 1;
            }
        }
    }

    #[test]
    fn rejects_non_finite_or_negative_durations() {
        let mut calc = calculator_at(datetime!(2024-05-01 09:00));
        assert_matches!(calc.set_duration(f64::NAN), Err(TimeError::InvalidDuration(_)));
        assert_matches!(calc.set_duration(-1.0), Err(TimeError::InvalidDuration(_)));
        assert_matches!(calc.set_duration(f64::INFINITY), Err(TimeError::InvalidDuration(_)));
        assert_eq!(calc.end_time().to_string(), "18:00");
    }

    #[test]
    fn rejects_durations_longer_than_a_day() {
        let mut calc = calculator_at(datetime!(2024-05-01 09:00));
        assert_matches!(calc.set_duration(1e300), Err(TimeError::InvalidDuration(_)));
        assert_matches!(calc.set_duration(24.5), Err(TimeError::InvalidDuration(_)));
        assert_eq!(calc.end_time().to_string(), "18:00");
        assert_eq!(calc.duration_hours(), 9.0);

        assert_eq!(calc.set_duration(24.0).map(|end| end.to_string()), Ok("09:00".into()));
    }

    #[test]
    fn end_time_after_ignores_whole_days() {
        let now = datetime!(2024-05-01 09:00);
        assert_eq!(end_time_after(now, 1e300), end_time_after(now, 1e300 % 24.0));
        assert_eq!(end_time_after(now, 26.0).to_string(), "11:00");
        assert_eq!(end_time_after(now, f64::NAN).to_string(), "09:00");
    }

    #[test]
    fn first_switch_to_duration_mode_seeds_from_gap_only_once() {
        let mut calc = calculator_at(datetime!(2024-05-01 09:00));
        calc.set_mode(TimeInputMode::Duration);
        assert_eq!(calc.duration_hours(), 9.0);

        calc.set_duration(6.5).unwrap();
        calc.set_mode(TimeInputMode::EndTime);
        calc.set_mode(TimeInputMode::Duration);
        assert_eq!(calc.duration_hours(), 6.5);
    }

    #[test]
    fn starting_in_duration_mode_seeds_immediately() {
        let calc = WorkTimeCalculator::new(
            datetime!(2024-05-01 12:30),
            TimeInputMode::Duration,
            EndTime::default(),
        );
        assert_eq!(calc.duration_hours(), 5.5);
        assert_eq!(calc.display_label(), "5時間30分");
        assert_eq!(calc.end_time().to_string(), "18:00");
    }

    #[test]
    fn end_time_mode_display_ticks_down_on_refresh() {
        let mut calc = calculator_at(datetime!(2024-05-01 17:00));
        assert_eq!(calc.display_label(), "1時間");
        calc.refresh(datetime!(2024-05-01 17:01));
        assert_eq!(calc.display_label(), "0時間59分");
        assert_eq!(calc.span_label(), "17:01 → 18:00");
    }

    #[test]
    fn end_time_input_stores_rounded_duration() {
        let mut calc = calculator_at(datetime!(2024-05-01 09:00));
        calc.set_end_time("17:20").unwrap();
        assert_eq!(calc.duration_hours(), 8.3);
        assert_eq!(calc.display_label(), "8時間20分");
    }

    #[test]
    fn split_hours_never_reports_sixty_minutes() {
        assert_eq!(split_hours(1.9999), (2, 0));
        assert_eq!(split_hours(2.25), (2, 15));
        assert_eq!(split_hours(-3.0), (0, 0));
    }
}
