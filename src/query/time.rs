//! Relative durations and absolute ranges for time terms.

use chrono::{DateTime, Duration, Utc};

use crate::query::error::QueryError;

/// Parse `30s`, `5m`, `1h`, `2d` or `1w`.
pub fn parse_duration(text: &str) -> Result<Duration, QueryError> {
    let invalid = || QueryError::InvalidTime(text.to_string());
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let duration = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" => Duration::try_seconds(amount),
        "m" | "min" | "mins" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "wk" | "wks" => Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Parse `<rfc3339>..<rfc3339>` with either side optional.
pub fn parse_range(text: &str) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), QueryError> {
    let (start, end) = text
        .split_once("..")
        .ok_or_else(|| QueryError::InvalidTime(text.to_string()))?;
    let start = parse_bound(start)?;
    let end = parse_bound(end)?;
    if start.is_none() && end.is_none() {
        return Err(QueryError::InvalidTime(text.to_string()));
    }
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(QueryError::InvalidTime(text.to_string()));
        }
    }
    Ok((start, end))
}

fn parse_bound(text: &str) -> Result<Option<DateTime<Utc>>, QueryError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|_| QueryError::InvalidTime(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration("2D").unwrap(), Duration::days(2));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5 parsecs").is_err());
    }

    #[test]
    fn ranges() {
        let (start, end) = parse_range("2024-01-01T00:00:00Z..2024-01-02T00:00:00Z").unwrap();
        assert!(start.unwrap() < end.unwrap());

        let (start, end) = parse_range("..2024-01-02T00:00:00Z").unwrap();
        assert!(start.is_none() && end.is_some());

        assert!(parse_range("..").is_err());
        assert!(parse_range("2024-01-02T00:00:00Z..2024-01-01T00:00:00Z").is_err());
        assert!(parse_range("yesterday..").is_err());
    }
}
