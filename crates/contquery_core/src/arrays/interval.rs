use std::cmp::Ordering;
use std::fmt;

use contquery_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;
/// Months are treated as 30 days when an interval is collapsed into a single
/// duration.
pub const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const ZERO: Interval = Interval {
        months: 0,
        days: 0,
        micros: 0,
    };

    pub const fn new(months: i32, days: i32, micros: i64) -> Self {
        Interval {
            months,
            days,
            micros,
        }
    }

    pub const fn from_micros(micros: i64) -> Self {
        Interval {
            months: 0,
            days: 0,
            micros,
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self::from_micros(secs * MICROS_PER_SECOND)
    }

    /// Approximate total duration of the interval.
    pub const fn total_micros(&self) -> i64 {
        (self.months as i64) * DAYS_PER_MONTH * MICROS_PER_DAY
            + (self.days as i64) * MICROS_PER_DAY
            + self.micros
    }

    pub const fn is_zero(&self) -> bool {
        self.total_micros() == 0
    }

    /// Scale the interval by some factor, collapsing it to a pure duration.
    pub fn scale(&self, factor: f64) -> Interval {
        Interval::from_micros((self.total_micros() as f64 * factor) as i64)
    }

    pub fn checked_add(&self, other: &Interval) -> Option<Interval> {
        Some(Interval {
            months: self.months.checked_add(other.months)?,
            days: self.days.checked_add(other.days)?,
            micros: self.micros.checked_add(other.micros)?,
        })
    }

    pub fn negate(&self) -> Interval {
        Interval {
            months: -self.months,
            days: -self.days,
            micros: -self.micros,
        }
    }

    /// Parse an interval from strings like '1 hour', '5 minutes 30 seconds',
    /// '2 days', '01:30:00', '90s' or a bare number of seconds.
    pub fn parse(s: &str) -> Result<Interval> {
        let mut interval = Interval::ZERO;
        let mut toks = s.split_whitespace().peekable();
        let mut parsed_any = false;

        while let Some(tok) = toks.next() {
            parsed_any = true;

            if tok.contains(':') {
                interval.micros += parse_clock(tok).map_err(|e| e.with_field("input", s.to_string()))?;
                continue;
            }

            let split = tok
                .find(|c: char| c.is_ascii_alphabetic())
                .unwrap_or(tok.len());
            let (num, attached_unit) = tok.split_at(split);
            if num.is_empty() {
                return Err(interval_error(s, "expected a number"));
            }
            let value: f64 = num
                .parse()
                .map_err(|_| interval_error(s, "invalid number"))?;

            let unit = if !attached_unit.is_empty() {
                attached_unit
            } else {
                match toks.next_if(|t| t.starts_with(|c: char| c.is_ascii_alphabetic())) {
                    Some(unit) => unit,
                    None => "second",
                }
            };

            interval.add_unit(value, unit).map_err(|e| e.with_field("input", s.to_string()))?;
        }

        if !parsed_any {
            return Err(interval_error(s, "empty interval"));
        }

        Ok(interval)
    }

    fn add_unit(&mut self, value: f64, unit: &str) -> Result<()> {
        let unit = unit.to_ascii_lowercase();
        let micros_per = match unit.as_str() {
            "us" | "usec" | "usecs" | "microsecond" | "microseconds" => 1,
            "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1_000,
            "s" | "sec" | "secs" | "second" | "seconds" => MICROS_PER_SECOND,
            "m" | "min" | "mins" | "minute" | "minutes" => MICROS_PER_MINUTE,
            "h" | "hr" | "hrs" | "hour" | "hours" => MICROS_PER_HOUR,
            "d" | "day" | "days" => {
                self.add_days(value);
                return Ok(());
            }
            "w" | "week" | "weeks" => {
                self.add_days(value * 7.0);
                return Ok(());
            }
            "mon" | "mons" | "month" | "months" => {
                self.add_months(value);
                return Ok(());
            }
            "y" | "yr" | "yrs" | "year" | "years" => {
                self.add_months(value * 12.0);
                return Ok(());
            }
            other => {
                return Err(DbError::new(format!("Unknown interval unit: {other}"))
                    .with_kind(ErrorKind::Syntax));
            }
        };
        self.micros += (value * micros_per as f64).round() as i64;
        Ok(())
    }

    fn add_months(&mut self, value: f64) {
        let whole = value.trunc();
        self.months += whole as i32;
        self.add_days((value - whole) * DAYS_PER_MONTH as f64);
    }

    fn add_days(&mut self, value: f64) {
        let whole = value.trunc();
        self.days += whole as i32;
        self.micros += ((value - whole) * MICROS_PER_DAY as f64).round() as i64;
    }
}

fn parse_clock(tok: &str) -> Result<i64> {
    let parts: Vec<&str> = tok.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => {
            return Err(DbError::new(format!("Invalid time component: {tok}"))
                .with_kind(ErrorKind::Syntax));
        }
    };
    let h: i64 = h.parse()?;
    let m: i64 = m.parse()?;
    let s: f64 = s.parse()?;
    Ok(h * MICROS_PER_HOUR + m * MICROS_PER_MINUTE + (s * MICROS_PER_SECOND as f64).round() as i64)
}

fn interval_error(input: &str, msg: &str) -> DbError {
    DbError::new(format!("Invalid interval '{input}': {msg}")).with_kind(ErrorKind::Syntax)
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_micros()
            .cmp(&other.total_micros())
            .then_with(|| (self.months, self.days, self.micros).cmp(&(other.months, other.days, other.micros)))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part(f: &mut fmt::Formatter<'_>, first: &mut bool, n: i64, unit: &str) -> fmt::Result {
            if n == 0 {
                return Ok(());
            }
            if !*first {
                write!(f, " ")?;
            }
            *first = false;
            if n == 1 || n == -1 {
                write!(f, "{n} {unit}")
            } else {
                write!(f, "{n} {unit}s")
            }
        }

        if self.months == 0 && self.days == 0 && self.micros == 0 {
            return write!(f, "0 seconds");
        }

        let mut first = true;
        let years = self.months as i64 / 12;
        let months = self.months as i64 % 12;
        part(f, &mut first, years, "year")?;
        part(f, &mut first, months, "month")?;
        part(f, &mut first, self.days as i64, "day")?;

        let hours = self.micros / MICROS_PER_HOUR;
        let rem = self.micros % MICROS_PER_HOUR;
        let minutes = rem / MICROS_PER_MINUTE;
        let rem = rem % MICROS_PER_MINUTE;
        let seconds = rem / MICROS_PER_SECOND;
        let frac = rem % MICROS_PER_SECOND;

        part(f, &mut first, hours, "hour")?;
        part(f, &mut first, minutes, "minute")?;
        if frac == 0 {
            part(f, &mut first, seconds, "second")?;
        } else {
            if !first {
                write!(f, " ")?;
            }
            let secs = seconds as f64 + frac as f64 / MICROS_PER_SECOND as f64;
            write!(f, "{secs} seconds")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_intervals() {
        // (input, expected)
        let tests = [
            ("1 hour", Interval::from_micros(MICROS_PER_HOUR)),
            ("5 minutes 30 seconds", Interval::from_micros(5 * MICROS_PER_MINUTE + 30 * MICROS_PER_SECOND)),
            ("2 days", Interval::new(0, 2, 0)),
            ("90", Interval::from_secs(90)),
            ("90s", Interval::from_secs(90)),
            ("1.5 hours", Interval::from_micros(90 * MICROS_PER_MINUTE)),
            ("01:30:00", Interval::from_micros(90 * MICROS_PER_MINUTE)),
            ("1 year 2 mons", Interval::new(14, 0, 0)),
            ("1 week", Interval::new(0, 7, 0)),
        ];

        for (input, expected) in tests {
            assert_eq!(expected, Interval::parse(input).unwrap(), "input: {input}");
        }
    }

    #[test]
    fn parse_invalid() {
        for input in ["", "hour", "5 fortnights", "1:2:3:4"] {
            let err = Interval::parse(input).unwrap_err();
            assert_eq!(ErrorKind::Syntax, err.kind(), "input: {input}");
        }
    }

    #[test]
    fn display_canonical() {
        // (interval, expected)
        let tests = [
            (Interval::from_micros(15 * MICROS_PER_MINUTE), "15 minutes"),
            (Interval::from_micros(90 * MICROS_PER_MINUTE), "1 hour 30 minutes"),
            (Interval::from_secs(1), "1 second"),
            (Interval::new(13, 1, 0), "1 year 1 month 1 day"),
            (Interval::ZERO, "0 seconds"),
            (Interval::from_micros(1_500_000), "1.5 seconds"),
        ];

        for (interval, expected) in tests {
            assert_eq!(expected, interval.to_string());
            // Display output parses back to the same duration.
            assert_eq!(
                interval.total_micros(),
                Interval::parse(expected).unwrap().total_micros()
            );
        }
    }

    #[test]
    fn scale_collapses_to_duration() {
        let hour = Interval::parse("1 hour").unwrap();
        assert_eq!(Interval::from_micros(15 * MICROS_PER_MINUTE), hour.scale(0.25));
        let month = Interval::parse("1 month").unwrap();
        assert_eq!(30 * MICROS_PER_DAY, month.total_micros());
    }

    #[test]
    fn ordering_by_duration() {
        let a = Interval::parse("1 day").unwrap();
        let b = Interval::parse("25 hours").unwrap();
        assert!(a < b);
    }
}
