//! Date transforms.

use time::{Date, Month};

use recordlink_storage::Value;

use super::{arg_text, expect_args};
use crate::error::MatchError;

fn date_of(value: &Value) -> Option<Date> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Text(s) => Value::parse_date(s.trim()),
        _ => None,
    }
}

/// `date_extract(part)`: truncate a date to its year (`y`), month (`M`) or
/// day (`d`).
pub fn date_extract(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("date_extract", args, 1, 1)?;
    let part = arg_text("date_extract", args, 0)?.unwrap_or("d");
    let Some(date) = date_of(value) else {
        return Ok(None);
    };
    let truncated = match part {
        "y" => Date::from_calendar_date(date.year(), Month::January, 1).ok(),
        "M" => Date::from_calendar_date(date.year(), date.month(), 1).ok(),
        "d" => Some(date),
        other => {
            return Err(MatchError::argument(format!(
                "date_extract: unknown date part '{}' (expected y, M or d)",
                other
            )))
        }
    };
    Ok(truncated.map(Value::Date))
}

/// Whole calendar months from `early` to `late` (`early <= late`).
fn whole_months(early: Date, late: Date) -> i64 {
    let mut months = (i64::from(late.year()) - i64::from(early.year())) * 12
        + (i64::from(u8::from(late.month())) - i64::from(u8::from(early.month())));
    if late.day() < early.day() {
        months -= 1;
    }
    months
}

/// `date_difference([unit])`: absolute difference between two dates in
/// days (`d`, default), weeks (`w`), months (`M`) or years (`y`).
pub fn date_difference(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("date_difference", args, 0, 1)?;
    let unit = arg_text("date_difference", args, 0)?.unwrap_or("d");
    let (Some(a), Some(b)) = (date_of(a), date_of(b)) else {
        return Ok(None);
    };
    let (early, late) = if a <= b { (a, b) } else { (b, a) };
    let days = (late - early).whole_days();
    let n = match unit {
        "d" => days,
        "w" => days / 7,
        "M" => whole_months(early, late),
        "y" => whole_months(early, late) / 12,
        other => {
            return Err(MatchError::argument(format!(
                "date_difference: unknown unit '{}' (expected d, w, M or y)",
                other
            )))
        }
    };
    Ok(Some(Value::Number(n as f64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn extract_truncates() {
        let d = Value::Date(date!(1984 - 07 - 19));
        assert_eq!(
            date_extract(&d, &[Value::text("y")]).unwrap(),
            Some(Value::Date(date!(1984 - 01 - 01)))
        );
        assert_eq!(
            date_extract(&d, &[Value::text("M")]).unwrap(),
            Some(Value::Date(date!(1984 - 07 - 01)))
        );
        assert!(date_extract(&d, &[Value::text("q")]).is_err());
        assert_eq!(date_extract(&Value::text("soon"), &[Value::text("y")]).unwrap(), None);
    }

    #[test]
    fn difference_units() {
        let a = Value::Date(date!(2020 - 01 - 31));
        let b = Value::text("2021-03-30");
        assert_eq!(date_difference(&a, &b, &[]).unwrap(), Some(Value::Number(424.0)));
        assert_eq!(
            date_difference(&b, &a, &[Value::text("w")]).unwrap(),
            Some(Value::Number(60.0))
        );
        assert_eq!(
            date_difference(&a, &b, &[Value::text("M")]).unwrap(),
            Some(Value::Number(13.0))
        );
        assert_eq!(
            date_difference(&a, &b, &[Value::text("y")]).unwrap(),
            Some(Value::Number(1.0))
        );
    }
}
