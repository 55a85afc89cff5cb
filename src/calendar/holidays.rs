//! US equity exchange holiday and half-day rules
//!
//! Holidays are derived per year from the exchange's published rules rather
//! than a hardcoded table, so any year in the supported range resolves. A
//! short list of one-off closures (weather, national days of mourning) is
//! kept alongside the rules.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Classification of one exchange-local date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKind {
    Weekend,
    Holiday(&'static str),
    EarlyClose(&'static str),
    Regular,
}

/// Unscheduled full-day closures
const SPECIAL_CLOSURES: &[((i32, u32, u32), &str)] = &[
    ((2001, 9, 11), "September 11 attacks"),
    ((2001, 9, 12), "September 11 attacks"),
    ((2001, 9, 13), "September 11 attacks"),
    ((2001, 9, 14), "September 11 attacks"),
    ((2004, 6, 11), "National Day of Mourning (Reagan)"),
    ((2007, 1, 2), "National Day of Mourning (Ford)"),
    ((2012, 10, 29), "Hurricane Sandy"),
    ((2012, 10, 30), "Hurricane Sandy"),
    ((2018, 12, 5), "National Day of Mourning (G.H.W. Bush)"),
    ((2025, 1, 9), "National Day of Mourning (Carter)"),
];

pub fn classify_us_equity_day(date: NaiveDate) -> DayKind {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return DayKind::Weekend;
    }

    if let Some(name) = holiday_name(date) {
        return DayKind::Holiday(name);
    }

    if let Some(name) = early_close_name(date) {
        return DayKind::EarlyClose(name);
    }

    DayKind::Regular
}

/// Every observed full-day holiday of `year`, in calendar order
pub fn holidays_for_year(year: i32) -> Vec<(NaiveDate, &'static str)> {
    let mut days = Vec::with_capacity(12);

    // New Year's Day: a Saturday holiday is not moved back into the prior year
    if let Some(new_year) = ymd(year, 1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => days.extend(ymd(year, 1, 2).map(|d| (d, "New Year's Day"))),
            _ => days.push((new_year, "New Year's Day")),
        }
    }

    if year >= 1998 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3).map(|d| (d, "Martin Luther King Jr. Day")));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3).map(|d| (d, "Washington's Birthday")));
    days.extend(
        easter_sunday(year)
            .and_then(|d| d.checked_sub_days(Days::new(2)))
            .map(|d| (d, "Good Friday")),
    );
    days.extend(last_weekday(year, 5, Weekday::Mon).map(|d| (d, "Memorial Day")));
    if year >= 2022 {
        days.extend(ymd(year, 6, 19).map(observed).map(|d| (d, "Juneteenth")));
    }
    days.extend(ymd(year, 7, 4).map(observed).map(|d| (d, "Independence Day")));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1).map(|d| (d, "Labor Day")));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4).map(|d| (d, "Thanksgiving Day")));
    days.extend(ymd(year, 12, 25).map(observed).map(|d| (d, "Christmas Day")));

    days.extend(
        SPECIAL_CLOSURES
            .iter()
            .filter(|((y, _, _), _)| *y == year)
            .filter_map(|((y, m, d), name)| ymd(*y, *m, *d).map(|date| (date, *name))),
    );

    days.sort_by_key(|(d, _)| *d);
    days
}

fn holiday_name(date: NaiveDate) -> Option<&'static str> {
    holidays_for_year(date.year())
        .into_iter()
        .find(|(d, _)| *d == date)
        .map(|(_, name)| name)
}

fn early_close_name(date: NaiveDate) -> Option<&'static str> {
    let year = date.year();
    let weekday = date.weekday();
    let mon_to_thu = matches!(weekday, Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu);

    if date.month() == 7 && date.day() == 3 && mon_to_thu {
        return Some("Independence Day Eve");
    }

    if let Some(thanksgiving) = nth_weekday(year, 11, Weekday::Thu, 4) {
        if thanksgiving.succ_opt() == Some(date) {
            return Some("Day after Thanksgiving");
        }
    }

    if date.month() == 12 && date.day() == 24 && mon_to_thu {
        return Some("Christmas Eve");
    }

    None
}

/// Weekend holidays move to the adjacent weekday
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap_or(date),
        Weekday::Sun => date.succ_opt().unwrap_or(date),
        _ => date,
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 { ymd(year + 1, 1, 1)? } else { ymd(year, month + 1, 1)? };
    let mut day = first_of_next.pred_opt()?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm)
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_easter_sunday() {
        assert_eq!(easter_sunday(2024), Some(date(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(date(2025, 4, 20)));
        assert_eq!(easter_sunday(2026), Some(date(2026, 4, 5)));
    }

    #[test]
    fn test_holidays_2024() {
        let expected = vec![
            date(2024, 1, 1),
            date(2024, 1, 15),
            date(2024, 2, 19),
            date(2024, 3, 29),
            date(2024, 5, 27),
            date(2024, 6, 19),
            date(2024, 7, 4),
            date(2024, 9, 2),
            date(2024, 11, 28),
            date(2024, 12, 25),
        ];
        let actual: Vec<NaiveDate> = holidays_for_year(2024).into_iter().map(|(d, _)| d).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_weekend_holidays_are_observed() {
        // July 4 2026 is a Saturday
        assert_eq!(classify_us_equity_day(date(2026, 7, 3)), DayKind::Holiday("Independence Day"));
        // Christmas 2022 is a Sunday
        assert_eq!(classify_us_equity_day(date(2022, 12, 26)), DayKind::Holiday("Christmas Day"));
        // New Year's Day 2022 is a Saturday and is not observed on Dec 31 2021
        assert_eq!(classify_us_equity_day(date(2021, 12, 31)), DayKind::Regular);
        // New Year's Day 2023 is a Sunday
        assert_eq!(classify_us_equity_day(date(2023, 1, 2)), DayKind::Holiday("New Year's Day"));
    }

    #[test]
    fn test_juneteenth_starts_in_2022() {
        assert_eq!(classify_us_equity_day(date(2021, 6, 18)), DayKind::Regular);
        assert_eq!(classify_us_equity_day(date(2023, 6, 19)), DayKind::Holiday("Juneteenth"));
    }

    #[test]
    fn test_early_closes() {
        assert_eq!(classify_us_equity_day(date(2024, 7, 3)), DayKind::EarlyClose("Independence Day Eve"));
        assert_eq!(classify_us_equity_day(date(2024, 11, 29)), DayKind::EarlyClose("Day after Thanksgiving"));
        assert_eq!(classify_us_equity_day(date(2024, 12, 24)), DayKind::EarlyClose("Christmas Eve"));
        // Christmas Eve 2021 is a Friday and the observed Christmas holiday
        assert_eq!(classify_us_equity_day(date(2021, 12, 24)), DayKind::Holiday("Christmas Day"));
    }

    #[test]
    fn test_special_closures_and_weekends() {
        assert_eq!(
            classify_us_equity_day(date(2025, 1, 9)),
            DayKind::Holiday("National Day of Mourning (Carter)")
        );
        assert_eq!(classify_us_equity_day(date(2024, 1, 6)), DayKind::Weekend);
        assert_eq!(classify_us_equity_day(date(2024, 1, 2)), DayKind::Regular);
    }
}
