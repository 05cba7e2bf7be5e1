//! Time construction and accessors.
use super::builder::Bound;
use super::eval::{Scope, arg_datum, eval_datum, opt_bound, opt_string};
use super::term::{Call, Op};
use super::value::Value;
use crate::datum::{Datum, time};
use crate::errors::DbError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Timelike};

fn as_u32(d: &Datum) -> Result<u32, DbError> {
    let n = d.expect_index()?;
    u32::try_from(n)
        .map_err(|_| DbError::InvalidArgument(format!("Expected a non-negative integer, got {n}")))
}

fn as_i32(d: &Datum) -> Result<i32, DbError> {
    let n = d.expect_index()?;
    i32::try_from(n).map_err(|_| DbError::InvalidArgument(format!("Year {n} is out of range")))
}

/// `r.time`, `r.epoch_time` and `r.iso8601`.
pub(super) fn construct(c: &Call, scope: &Scope) -> Result<Value, DbError> {
    let t = match c.op {
        Op::EpochTime => time::from_epoch(arg_datum(c, 0, scope)?.expect_number()?, time::utc())?,
        Op::Iso8601 => {
            let text = arg_datum(c, 0, scope)?;
            let default_tz = opt_string(c, "default_timezone", scope)?;
            parse_iso8601(text.expect_str()?, default_tz.as_deref())?
        }
        _ => {
            let args =
                c.args.iter().map(|a| eval_datum(a, scope)).collect::<Result<Vec<_>, _>>()?;
            let (date, clock, tz) = match args.as_slice() {
                [y, m, d, tz] => ((y, m, d), None, tz),
                [y, m, d, h, mi, s, tz] => ((y, m, d), Some((h, mi, s)), tz),
                _ => {
                    return Err(DbError::QueryError(format!(
                        "`time` expects 4 or 7 arguments but found {}",
                        args.len()
                    )));
                }
            };
            let offset = time::parse_timezone(tz.expect_str()?)?;
            let (h, mi, s) = match clock {
                Some((h, mi, s)) => (as_u32(h)?, as_u32(mi)?, s.expect_number()?),
                None => (0, 0, 0.0),
            };
            time::make_time(as_i32(date.0)?, as_u32(date.1)?, as_u32(date.2)?, h, mi, s, offset)?
        }
    };
    Ok(Datum::Time(t).into())
}

fn parse_iso8601(text: &str, default_tz: Option<&str>) -> Result<DateTime<FixedOffset>, DbError> {
    match (time::parse_iso8601(text), default_tz) {
        (Ok(t), _) => Ok(t),
        (Err(e), None) => Err(e),
        (Err(e), Some(tz)) => {
            let offset = time::parse_timezone(tz)?;
            let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
                .map_err(|_| e)?;
            offset.from_local_datetime(&naive).single().ok_or_else(|| {
                DbError::InvalidArgument(format!("Invalid ISO 8601 time `{text}`"))
            })
        }
    }
}

fn seconds_of(t: &DateTime<FixedOffset>) -> f64 {
    f64::from(t.second()) + f64::from(t.timestamp_subsec_millis()) / 1000.0
}

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let d = recv.into_datum(scope.array_limit())?;
    let t = *d.expect_time()?;
    let out = match c.op {
        Op::InTimezone => {
            let offset = time::parse_timezone(arg_datum(c, 1, scope)?.expect_str()?)?;
            Datum::Time(t.with_timezone(&offset))
        }
        Op::Timezone => Datum::String(time::format_timezone(t.offset())),
        Op::During => {
            let start = arg_datum(c, 1, scope)?;
            let end = arg_datum(c, 2, scope)?;
            let (start, end) = (start.expect_time()?, end.expect_time()?);
            let left = opt_bound(c, "left_bound", scope, Bound::Closed)?;
            let right = opt_bound(c, "right_bound", scope, Bound::Open)?;
            let after = if left == Bound::Closed { t >= *start } else { t > *start };
            let before = if right == Bound::Closed { t <= *end } else { t < *end };
            Datum::Bool(after && before)
        }
        Op::Date => {
            let midnight = time::make_time(t.year(), t.month(), t.day(), 0, 0, 0.0, *t.offset())?;
            Datum::Time(midnight)
        }
        Op::TimeOfDay => {
            let whole = f64::from(t.num_seconds_from_midnight());
            Datum::Number(whole + f64::from(t.timestamp_subsec_millis()) / 1000.0)
        }
        Op::Year => Datum::from(t.year()),
        Op::Month => Datum::from(t.month()),
        Op::Day => Datum::from(t.day()),
        Op::DayOfWeek => Datum::from(t.weekday().number_from_monday()),
        Op::DayOfYear => Datum::from(t.ordinal()),
        Op::Hours => Datum::from(t.hour()),
        Op::Minutes => Datum::from(t.minute()),
        Op::Seconds => Datum::Number(seconds_of(&t)),
        Op::ToIso8601 => Datum::String(time::to_iso8601(&t)),
        Op::ToEpochTime => Datum::Number(time::to_epoch(&t)),
        other => {
            return Err(DbError::QueryError(format!("`{}` is not a time operator", other.name())));
        }
    };
    Ok(out.into())
}
