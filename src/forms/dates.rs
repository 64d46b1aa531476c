//! Partial dates as stored on events and records: `yyyy`, `yyyy-mm` or `yyyy-mm-dd`.

use chrono::NaiveDate;

/// Parse a partial date, filling a missing month or day with `01`.
///
/// Returns `None` for anything that is not one of the three accepted shapes
/// or names an impossible calendar date.
pub fn normalize_date_for_comparison(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let parts: Vec<&str> = value.split('-').collect();
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

    let (year, month, day) = match parts.as_slice() {
        [y] if digits(y, 4) => (*y, "1", "1"),
        [y, m] if digits(y, 4) && digits(m, 2) => (*y, *m, "1"),
        [y, m, d] if digits(y, 4) && digits(m, 2) && digits(d, 2) => (*y, *m, *d),
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Human wording of a partial date for messages.
pub fn format_date_for_display(value: &str) -> String {
    let value = value.trim();
    match value.len() {
        4 => format!("the year {value}"),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_three_precisions() {
        assert_eq!(
            normalize_date_for_comparison("2023"),
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
        assert_eq!(
            normalize_date_for_comparison("2023-07"),
            NaiveDate::from_ymd_opt(2023, 7, 1)
        );
        assert_eq!(
            normalize_date_for_comparison("2023-07-15"),
            NaiveDate::from_ymd_opt(2023, 7, 15)
        );
    }

    #[test]
    fn rejects_malformed_or_impossible() {
        for bad in ["", "23", "2023-7", "2023-13", "2023-02-30", "2023/07/15", "2023-07-15T00:00"] {
            assert_eq!(normalize_date_for_comparison(bad), None, "{bad}");
        }
    }

    #[test]
    fn display_wording() {
        assert_eq!(format_date_for_display("2020"), "the year 2020");
        assert_eq!(format_date_for_display("2020-03"), "2020-03");
    }
}
