//! Month arithmetic for the calendar view.

use chrono::{Datelike, NaiveDate};

/// Fold an out-of-range month into a valid `(year, month)` pair.
///
/// Months are 1-based, so 0 is December of the previous year and 13 is
/// January of the next.
pub fn normalize_month(year: i32, month: i64) -> (i32, u32) {
    let zero_based = month - 1;
    let year = i64::from(year) + zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) + 1;
    (year as i32, month as u32)
}

/// Every date of the given month, in order. Empty if the year is outside chrono's range.
pub fn days_of_month(year: i32, month: u32) -> Vec<NaiveDate> {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => first.iter_days().take_while(|d| d.month() == month).collect(),
        None => Vec::new(),
    }
}

/// Number of blank cells before day 1 in a Monday-first week grid.
pub fn leading_empty_slots(first: NaiveDate) -> u32 {
    first.weekday().num_days_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_month_wraps() {
        assert_eq!(normalize_month(2024, 0), (2023, 12));
        assert_eq!(normalize_month(2024, 13), (2025, 1));
        assert_eq!(normalize_month(2024, -11), (2023, 1));
        assert_eq!(normalize_month(2024, 6), (2024, 6));
        assert_eq!(normalize_month(2024, 25), (2026, 1));
    }

    #[test]
    fn test_february_lengths() {
        assert_eq!(days_of_month(2023, 2).len(), 28);
        assert_eq!(days_of_month(2024, 2).len(), 29);
        assert_eq!(days_of_month(1900, 2).len(), 28);
        assert_eq!(days_of_month(2000, 2).len(), 29);
        assert_eq!(days_of_month(2024, 12).len(), 31);
    }

    #[test]
    fn test_leading_empty_slots() {
        // 2024-01-01 was a Monday, 2024-09-01 a Sunday.
        assert_eq!(leading_empty_slots(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()), 0);
        assert_eq!(leading_empty_slots(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()), 6);
        assert_eq!(leading_empty_slots(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()), 2);
    }
}
