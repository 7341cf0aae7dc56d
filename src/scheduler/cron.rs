use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::ExportError;

/// Parse a 6- or 7-field expression (`sec min hour dom month dow [year]`)
pub fn validate_expression(expression: &str) -> Result<Schedule, ExportError> {
    Schedule::from_str(expression.trim()).map_err(|err| {
        ExportError::validation(format!("invalid cron expression '{expression}': {err}"))
    })
}

/// First occurrence strictly after `now`, in UTC
pub fn next_run(expression: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ExportError> {
    validate_expression(expression)?
        .after(&now)
        .next()
        .ok_or_else(|| {
            ExportError::validation(format!("cron expression '{expression}' has no future occurrence"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};

    #[test]
    fn test_weekly_saturday() {
        // Tuesday
        let now = Utc.with_ymd_and_hms(2024, 6, 4, 15, 30, 0).unwrap();
        assert_eq!(now.weekday(), Weekday::Tue);

        let next = next_run("0 0 10 * * SAT", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 8, 10, 0, 0).unwrap());

        let following = next_run("0 0 10 * * SAT", next).unwrap();
        assert_eq!(following, Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_seven_field_expression() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = next_run("0 30 6 * * MON-FRI 2024", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let err = validate_expression("every saturday").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(next_run("61 * * * * *", Utc::now()).is_err());
    }

    #[test]
    fn test_expired_expression() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(next_run("0 0 0 1 1 * 2020", now).is_err());
    }
}
