use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Format of the day component used in stream keys and file names
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Current UTC calendar day as `YYYY-MM-DD`
pub fn today() -> String {
    day_of(&Utc::now())
}

/// Calendar day of a UTC instant as `YYYY-MM-DD`
pub fn day_of(instant: &DateTime<Utc>) -> String {
    instant.format(DAY_FORMAT).to_string()
}

/// Current local time as ISO-8601 with the local offset, millisecond precision
pub fn local_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_of() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(day_of(&instant), "2024-03-09");
    }

    #[test]
    fn test_today_shape() {
        let day = today();
        assert_eq!(day.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&day, DAY_FORMAT).is_ok());
    }

    #[test]
    fn test_local_timestamp_parses() {
        let ts = local_timestamp();
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
