use chrono::{Datelike, Duration, NaiveDate};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize any date to the Monday of its ISO week.
///
/// Week plans and shopping lists are keyed by this date, so every
/// caller-supplied date inside a week resolves to the same row.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(offset)
}

/// Storage form of a week key: `YYYY-MM-DD` of the ISO-week Monday.
pub fn week_start_str(date: NaiveDate) -> String {
    week_start(date).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_reasonable() {
        let a = now_ms();
        assert!(a > 1_500_000_000_000); // after 2017
        assert!(a < 4_100_000_000_000); // before year ~2100
    }

    #[test]
    fn monday_maps_to_itself() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn midweek_and_sunday_map_back_to_monday() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(week_start(wednesday), monday);
        assert_eq!(week_start(sunday), monday);
    }

    #[test]
    fn week_start_crosses_month_boundary() {
        // 2025-05-01 is a Thursday; its week starts in April.
        let thursday = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert_eq!(week_start_str(thursday), "2025-04-28");
    }
}
