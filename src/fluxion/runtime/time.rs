//! Instants and calendar-aware durations.
//!
//! Every event in the runtime is ordered by a [`Moment`]: milliseconds since
//! the Unix epoch, with `i64::MIN`/`i64::MAX` reserved as the -inf/+inf
//! sentinels procs use as "no bound" markers. A [`Span`] is a duration that
//! tracks whole calendar months separately from fixed milliseconds, so that
//! "1 month" advances by a month and not by 30 days.
//!
//! Moments carry an `epsilon` flag used only for tie-breaking: an epsilon
//! instant is defined to be just before the same-valued non-epsilon instant.
//! Batch boundaries use this to decide which side of a window an exactly-on-
//! the-boundary point falls on.

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use thiserror::Error;

use super::error::{RuntimeError, RuntimeResult};

/// An instant in time: epoch milliseconds plus the epsilon tie-break flag.
///
/// The ordering is total: moments compare by milliseconds first, and at
/// equal milliseconds the epsilon instant sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Moment {
    millis: i64,
    epsilon: bool,
}

impl Moment {
    /// The -inf sentinel ("beginning of time")
    pub const MIN: Moment = Moment {
        millis: i64::MIN,
        epsilon: false,
    };

    /// The +inf sentinel ("end of time")
    pub const MAX: Moment = Moment {
        millis: i64::MAX,
        epsilon: false,
    };

    /// Create a moment from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Moment {
            millis,
            epsilon: false,
        }
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        Moment::from_millis(Utc::now().timestamp_millis())
    }

    /// Epoch milliseconds of this moment
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// True unless this moment is one of the +/-inf sentinels
    pub fn finite(&self) -> bool {
        self.millis != i64::MIN && self.millis != i64::MAX
    }

    /// The epsilon tie-break flag
    pub fn is_epsilon(&self) -> bool {
        self.epsilon
    }

    /// The same instant with the epsilon flag set: sorts just before `self`
    pub fn epsilon(&self) -> Self {
        Moment {
            millis: self.millis,
            epsilon: true,
        }
    }

    /// The same instant with the epsilon flag cleared
    pub fn solid(&self) -> Self {
        Moment {
            millis: self.millis,
            epsilon: false,
        }
    }

    /// Add a span. Infinity absorbs finite offsets: a non-finite moment
    /// plus any finite span is the moment unchanged. The epsilon flag is
    /// preserved.
    pub fn add_span(&self, span: &Span) -> Moment {
        if !self.finite() {
            return *self;
        }
        let mut millis = self.millis;
        if span.months != 0 {
            millis = add_calendar_months(millis, span.months);
        }
        Moment {
            millis: millis.saturating_add(span.millis).clamp(i64::MIN + 1, i64::MAX - 1),
            epsilon: self.epsilon,
        }
    }

    /// Subtract a span; see [`Moment::add_span`] for the sentinel rule.
    pub fn sub_span(&self, span: &Span) -> Moment {
        self.add_span(&-*span)
    }

    /// The fixed-millisecond distance from `other` to `self`
    pub fn since(&self, other: &Moment) -> Span {
        Span::millis(self.millis.saturating_sub(other.millis))
    }

    /// Floor this moment to the nearest period boundary aligned to `anchor`.
    ///
    /// Calendar periods advance by whole months; fixed periods by modular
    /// millisecond arithmetic. A span mixing both is rejected, as is a zero
    /// or negative period. Non-finite moments quantize to themselves. The
    /// result never carries the epsilon flag.
    pub fn quantize(&self, period: &Span, anchor: Option<&Moment>) -> RuntimeResult<Moment> {
        if period.months != 0 && period.millis != 0 {
            return Err(RuntimeError::time_error(
                "cannot quantize by a span mixing calendar months with fixed milliseconds",
            ));
        }
        if !self.finite() {
            return Ok(self.solid());
        }
        let anchor = anchor.copied().unwrap_or_else(|| Moment::from_millis(0));
        if period.months != 0 {
            if period.months < 0 {
                return Err(RuntimeError::time_error("quantize period must be positive"));
            }
            Ok(Moment::from_millis(quantize_calendar(
                self.millis,
                period.months,
                anchor.millis,
            )))
        } else {
            if period.millis <= 0 {
                return Err(RuntimeError::time_error("quantize period must be positive"));
            }
            let offset = (self.millis - anchor.millis).rem_euclid(period.millis);
            Ok(Moment::from_millis(self.millis - offset))
        }
    }
}

impl PartialOrd for Moment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Moment {
    fn cmp(&self, other: &Self) -> Ordering {
        // Epsilon sorts first at equal milliseconds: it is "just before".
        self.millis
            .cmp(&other.millis)
            .then_with(|| other.epsilon.cmp(&self.epsilon))
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis == i64::MIN {
            return write!(f, ":beginning:");
        }
        if self.millis == i64::MAX {
            return write!(f, ":end:");
        }
        match Utc.timestamp_millis_opt(self.millis).single() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "@{}ms", self.millis),
        }
    }
}

fn add_calendar_months(millis: i64, months: i32) -> i64 {
    let dt = match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt,
        None => return millis,
    };
    let shifted: Option<DateTime<Utc>> = if months >= 0 {
        dt.checked_add_months(Months::new(months as u32))
    } else {
        dt.checked_sub_months(Months::new((-(months as i64)) as u32))
    };
    shifted.map(|d| d.timestamp_millis()).unwrap_or(millis)
}

fn quantize_calendar(millis: i64, period_months: i32, anchor_millis: i64) -> i64 {
    let t = Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());
    let anchor = Utc
        .timestamp_millis_opt(anchor_millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());

    let month_index = |d: &DateTime<Utc>| d.year() as i64 * 12 + d.month0() as i64;
    let n = period_months as i64;
    let mut k = (month_index(&t) - month_index(&anchor)).div_euclid(n);

    // Day-of-month and time-of-day offsets in the anchor can push the
    // estimated boundary to either side of t; walk to the maximal boundary
    // that is still <= t.
    let boundary_at = |k: i64| add_calendar_months(anchor_millis, (k * n) as i32);
    while boundary_at(k) > millis {
        k -= 1;
    }
    while boundary_at(k + 1) <= millis {
        k += 1;
    }
    boundary_at(k)
}

/// Error from parsing a span literal such as `"30s"` or `"2M"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSpanError {
    #[error("empty span literal")]
    Empty,
    #[error("invalid span magnitude in '{0}'")]
    BadMagnitude(String),
    #[error("unknown span unit '{unit}' in '{literal}'")]
    UnknownUnit { literal: String, unit: String },
}

/// A duration: whole calendar months tracked separately from fixed
/// milliseconds.
///
/// Spans with a month component are calendar-aware: adding them to a moment
/// advances by whole months, preserving day-of-month where the target month
/// allows. Scaling a calendar span by a non-integer is rejected, since
/// fractional months have no fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    months: i32,
    millis: i64,
}

impl Span {
    /// The zero-length span
    pub const ZERO: Span = Span {
        months: 0,
        millis: 0,
    };

    /// A span of fixed milliseconds
    pub fn millis(millis: i64) -> Self {
        Span { months: 0, millis }
    }

    /// A span of whole seconds
    pub fn seconds(seconds: i64) -> Self {
        Span::millis(seconds * 1000)
    }

    /// A span of whole minutes
    pub fn minutes(minutes: i64) -> Self {
        Span::millis(minutes * 60 * 1000)
    }

    /// A span of whole hours
    pub fn hours(hours: i64) -> Self {
        Span::millis(hours * 60 * 60 * 1000)
    }

    /// A span of whole days (fixed 24h, not calendar days)
    pub fn days(days: i64) -> Self {
        Span::millis(days * 24 * 60 * 60 * 1000)
    }

    /// A span of whole weeks
    pub fn weeks(weeks: i64) -> Self {
        Span::days(weeks * 7)
    }

    /// A calendar span of whole months
    pub fn months(months: i32) -> Self {
        Span { months, millis: 0 }
    }

    /// A calendar span of whole years
    pub fn years(years: i32) -> Self {
        Span::months(years * 12)
    }

    /// The calendar-month component
    pub fn month_count(&self) -> i32 {
        self.months
    }

    /// The fixed-millisecond component
    pub fn milli_count(&self) -> i64 {
        self.millis
    }

    /// True when this span has a calendar-month component
    pub fn is_calendar(&self) -> bool {
        self.months != 0
    }

    /// True for the zero-length span
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.millis == 0
    }

    /// True when the span moves time forward
    pub fn is_positive(&self) -> bool {
        if self.months != 0 {
            self.months > 0
        } else {
            self.millis > 0
        }
    }

    /// Multiply by a scalar. Calendar spans only accept integral factors.
    pub fn scale(&self, factor: f64) -> RuntimeResult<Span> {
        if self.months != 0 && factor.fract() != 0.0 {
            return Err(RuntimeError::time_error(
                "cannot scale a calendar span by a fractional factor",
            ));
        }
        Ok(Span {
            months: (self.months as f64 * factor) as i32,
            millis: (self.millis as f64 * factor) as i64,
        })
    }

    /// Divide by a scalar; the calendar restriction of [`Span::scale`]
    /// applies to the quotient.
    pub fn divide(&self, divisor: f64) -> RuntimeResult<Span> {
        if divisor == 0.0 {
            return Err(RuntimeError::time_error("cannot divide a span by zero"));
        }
        if self.months != 0 {
            let q = self.months as f64 / divisor;
            if q.fract() != 0.0 {
                return Err(RuntimeError::time_error(
                    "dividing this calendar span produces fractional months",
                ));
            }
            return Ok(Span {
                months: q as i32,
                millis: 0,
            });
        }
        Ok(Span::millis((self.millis as f64 / divisor) as i64))
    }

    /// Parse a span literal: a magnitude followed by a unit, e.g. `"250ms"`,
    /// `"30s"`, `"5m"`, `"2h"`, `"1d"`, `"1w"`, `"3M"` (months), `"1y"`.
    pub fn parse(literal: &str) -> Result<Span, ParseSpanError> {
        let literal = literal.trim();
        if literal.is_empty() {
            return Err(ParseSpanError::Empty);
        }
        let split = literal
            .find(|c: char| !c.is_ascii_digit() && c != '-' && c != '.')
            .unwrap_or(literal.len());
        let (mag, unit) = literal.split_at(split);
        let value: f64 = mag
            .parse()
            .map_err(|_| ParseSpanError::BadMagnitude(literal.to_string()))?;
        let span = match unit {
            "ms" => Span::millis(value as i64),
            "s" => Span::millis((value * 1000.0) as i64),
            "m" => Span::millis((value * 60_000.0) as i64),
            "h" => Span::millis((value * 3_600_000.0) as i64),
            "d" => Span::millis((value * 86_400_000.0) as i64),
            "w" => Span::millis((value * 7.0 * 86_400_000.0) as i64),
            "M" | "mo" => Span::months(value as i32),
            "y" => Span::years(value as i32),
            other => {
                return Err(ParseSpanError::UnknownUnit {
                    literal: literal.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        Ok(span)
    }
}

impl Neg for Span {
    type Output = Span;

    fn neg(self) -> Span {
        Span {
            months: -self.months,
            millis: -self.millis,
        }
    }
}

impl Add for Span {
    type Output = Span;

    fn add(self, rhs: Span) -> Span {
        Span {
            months: self.months + rhs.months,
            millis: self.millis + rhs.millis,
        }
    }
}

impl Sub for Span {
    type Output = Span;

    fn sub(self, rhs: Span) -> Span {
        self + (-rhs)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months != 0 && self.millis != 0 {
            write!(f, "{}M{}ms", self.months, self.millis)
        } else if self.months != 0 {
            if self.months % 12 == 0 {
                write!(f, "{}y", self.months / 12)
            } else {
                write!(f, "{}M", self.months)
            }
        } else if self.millis % 86_400_000 == 0 && self.millis != 0 {
            write!(f, "{}d", self.millis / 86_400_000)
        } else if self.millis % 3_600_000 == 0 && self.millis != 0 {
            write!(f, "{}h", self.millis / 3_600_000)
        } else if self.millis % 60_000 == 0 && self.millis != 0 {
            write!(f, "{}m", self.millis / 60_000)
        } else if self.millis % 1000 == 0 && self.millis != 0 {
            write!(f, "{}s", self.millis / 1000)
        } else {
            write!(f, "{}ms", self.millis)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_sorts_just_before() {
        let t = Moment::from_millis(1000);
        assert!(t.epsilon() < t);
        assert!(t.epsilon() > Moment::from_millis(999));
        assert_eq!(t.epsilon().solid(), t);
    }

    #[test]
    fn infinity_absorbs_finite_offsets() {
        assert_eq!(Moment::MAX.add_span(&Span::hours(5)), Moment::MAX);
        assert_eq!(Moment::MIN.sub_span(&Span::days(1)), Moment::MIN);
        assert!(!Moment::MAX.finite());
        assert!(Moment::from_millis(0).finite());
    }

    #[test]
    fn fixed_quantize_floors_to_boundary() {
        let t = Moment::from_millis(12_345);
        let q = t.quantize(&Span::seconds(10), None).unwrap();
        assert_eq!(q.millis(), 10_000);
        // Already on a boundary stays put.
        assert_eq!(q.quantize(&Span::seconds(10), None).unwrap(), q);
    }

    #[test]
    fn fixed_quantize_respects_anchor() {
        let anchor = Moment::from_millis(3);
        let t = Moment::from_millis(25);
        let q = t.quantize(&Span::millis(10), Some(&anchor)).unwrap();
        assert_eq!(q.millis(), 23);
    }

    #[test]
    fn calendar_quantize_steps_whole_months() {
        // 2024-03-15T12:00:00Z
        let t = Moment::from_millis(1_710_504_000_000);
        let q = t.quantize(&Span::months(1), None).unwrap();
        let dt = Utc.timestamp_millis_opt(q.millis()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 3, 1));

        let q = t.quantize(&Span::years(1), None).unwrap();
        let dt = Utc.timestamp_millis_opt(q.millis()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
    }

    #[test]
    fn mixed_quantize_is_rejected() {
        let t = Moment::from_millis(0);
        let mixed = Span::months(1) + Span::hours(1);
        assert!(t.quantize(&mixed, None).is_err());
    }

    #[test]
    fn calendar_add_preserves_day_where_possible() {
        // 2024-01-31 + 1 month clamps to the end of February.
        let jan31 = Utc
            .with_ymd_and_hms(2024, 1, 31, 0, 0, 0)
            .unwrap()
            .timestamp_millis();
        let m = Moment::from_millis(jan31).add_span(&Span::months(1));
        let dt = Utc.timestamp_millis_opt(m.millis()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 2, 29));
    }

    #[test]
    fn span_parse_round_trips() {
        assert_eq!(Span::parse("250ms").unwrap(), Span::millis(250));
        assert_eq!(Span::parse("30s").unwrap(), Span::seconds(30));
        assert_eq!(Span::parse("2h").unwrap(), Span::hours(2));
        assert_eq!(Span::parse("3M").unwrap(), Span::months(3));
        assert_eq!(Span::parse("1y").unwrap(), Span::years(1));
        assert!(Span::parse("10 fortnights").is_err());
        assert!(Span::parse("").is_err());
    }

    #[test]
    fn calendar_span_scaling_restrictions() {
        assert!(Span::months(1).scale(1.5).is_err());
        assert_eq!(Span::months(2).scale(3.0).unwrap(), Span::months(6));
        assert!(Span::seconds(10).divide(0.0).is_err());
        assert_eq!(Span::seconds(10).divide(2.0).unwrap(), Span::seconds(5));
    }
}
