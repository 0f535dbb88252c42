//! Analysis dates: parsing user input and the `DD_MM_YYYY` filename token.
//!
//! The token is a side-channel index. [`date_token`] writes it into every
//! artifact name at ingestion time and [`date_from_file_name`] reads it back
//! when a specialty is collected for layout. Both halves live here so the
//! writer and the reader cannot drift apart.

use crate::error::PdfMedError;
use chrono::{Datelike, Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Accepted input layouts, tried in this order.
const DATE_LAYOUTS: [(char, &str); 3] = [('-', "%d-%m-%Y"), ('.', "%d.%m.%Y"), ('/', "%d/%m/%Y")];

/// `DD_MM_YYYY` anywhere in a file name.
static RE_NAME_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{2})_([0-9]{2})_([0-9]{4})").unwrap());

/// A parsed analysis date together with its filename token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisDate {
    pub date: NaiveDate,
    pub token: String,
}

/// Parse `DD-MM-YYYY`, `DD.MM.YYYY` or `DD/MM/YYYY`.
///
/// Each layout is strict (two-digit day, two-digit month, four-digit year,
/// a real calendar date); the first layout that accepts the input wins.
pub fn parse_date(text: &str) -> Result<AnalysisDate, PdfMedError> {
    let s = text.trim();
    for (sep, layout) in DATE_LAYOUTS {
        if !has_layout_shape(s, sep) {
            continue;
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, layout) {
            return Ok(AnalysisDate {
                date,
                token: date_token(date),
            });
        }
    }
    Err(PdfMedError::InvalidDateFormat {
        input: text.to_string(),
    })
}

/// `DD_MM_YYYY`, zero padded.
pub fn date_token(date: NaiveDate) -> String {
    format!("{:02}_{:02}_{:04}", date.day(), date.month(), date.year())
}

/// Recover the date embedded in an artifact file name.
///
/// Only the last `DD_MM_YYYY` occurrence counts. It is accepted when
/// day ∈ 1..=31, month ∈ 1..=12 and year ≥ 1; days past the end of the month
/// roll into the next month (`31_04_2024` reads as 1 May 2024).
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let caps = RE_NAME_DATE.captures_iter(name).last()?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || year < 1 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_days(Days::new(u64::from(day - 1)))
}

fn has_layout_shape(s: &str, sep: char) -> bool {
    let parts: Vec<&str> = s.split(sep).collect();
    parts.len() == 3
        && parts
            .iter()
            .zip([2, 2, 4])
            .all(|(p, width)| p.len() == width && p.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn all_separators_yield_same_date_and_token() {
        for input in ["01-01-2024", "01.01.2024", "01/01/2024"] {
            let parsed = parse_date(input).unwrap();
            assert_eq!(parsed.date, ymd(2024, 1, 1), "input {input}");
            assert_eq!(parsed.token, "01_01_2024", "input {input}");
        }
    }

    #[test]
    fn day_comes_before_month() {
        let parsed = parse_date("03-12-2023").unwrap();
        assert_eq!(parsed.date, ymd(2023, 12, 3));
        assert_eq!(parsed.token, "03_12_2023");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_date("  15.06.2022 ").unwrap().token, "15_06_2022");
    }

    #[test]
    fn rejects_other_layouts() {
        for input in ["2024-01-01", "1-1-2024", "01-01-24", "01_01_2024", "", "31-02-2024"] {
            let err = parse_date(input).unwrap_err();
            assert!(
                matches!(err, PdfMedError::InvalidDateFormat { .. }),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn rejects_mixed_separators() {
        assert!(parse_date("01-01/2024").is_err());
    }

    #[test]
    fn token_round_trips_through_file_name() {
        let parsed = parse_date("09.08.2021").unwrap();
        let name = format!("Cardio_{}.jpg", parsed.token);
        assert_eq!(date_from_file_name(&name), Some(parsed.date));
    }

    #[test]
    fn last_embedded_date_wins() {
        assert_eq!(
            date_from_file_name("copy_01_02_2020_of_05_06_2021.jpg"),
            Some(ymd(2021, 6, 5))
        );
    }

    #[test]
    fn collision_and_page_suffixes_do_not_confuse_the_reader() {
        assert_eq!(
            date_from_file_name("Cardio_03_01_2024_02.jpg"),
            Some(ymd(2024, 1, 3))
        );
        assert_eq!(
            date_from_file_name("Cardio_03_01_2024_001.jpg"),
            Some(ymd(2024, 1, 3))
        );
    }

    #[test]
    fn out_of_range_components_are_rejected() {
        assert_eq!(date_from_file_name("x_32_01_2024.jpg"), None);
        assert_eq!(date_from_file_name("x_00_01_2024.jpg"), None);
        assert_eq!(date_from_file_name("x_10_13_2024.jpg"), None);
        assert_eq!(date_from_file_name("x_10_10_0000.jpg"), None);
        assert_eq!(date_from_file_name("IMG_1234.jpg"), None);
    }

    #[test]
    fn overflowing_day_rolls_into_next_month() {
        assert_eq!(date_from_file_name("x_31_04_2024.jpg"), Some(ymd(2024, 5, 1)));
    }
}
