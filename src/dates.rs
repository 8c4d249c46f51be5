//! Date and hour normalization for booking and absence inputs.
//!
//! Inputs come from forms and from assistant tool calls, so they range from
//! ISO dates to French phrases such as "après-demain" or "12 juin".

use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime};

use crate::error::{BoxdeskError, Result};

const RELATIVE_DAYS: &[(&str, i64)] = &[
    ("après-demain", 2),
    ("apres-demain", 2),
    ("après demain", 2),
    ("apres demain", 2),
    ("day after tomorrow", 2),
    ("demain", 1),
    ("tomorrow", 1),
    ("aujourd", 0),
    ("today", 0),
];

const MONTHS: &[(&str, Month)] = &[
    ("janvier", Month::January),
    ("january", Month::January),
    ("jan", Month::January),
    ("février", Month::February),
    ("fevrier", Month::February),
    ("february", Month::February),
    ("feb", Month::February),
    ("fév", Month::February),
    ("mars", Month::March),
    ("march", Month::March),
    ("mar", Month::March),
    ("avril", Month::April),
    ("april", Month::April),
    ("apr", Month::April),
    ("mai", Month::May),
    ("may", Month::May),
    ("juin", Month::June),
    ("june", Month::June),
    ("jun", Month::June),
    ("juillet", Month::July),
    ("july", Month::July),
    ("jul", Month::July),
    ("août", Month::August),
    ("aout", Month::August),
    ("august", Month::August),
    ("aug", Month::August),
    ("septembre", Month::September),
    ("september", Month::September),
    ("sept", Month::September),
    ("sep", Month::September),
    ("octobre", Month::October),
    ("october", Month::October),
    ("oct", Month::October),
    ("novembre", Month::November),
    ("november", Month::November),
    ("nov", Month::November),
    ("décembre", Month::December),
    ("decembre", Month::December),
    ("december", Month::December),
    ("dec", Month::December),
    ("déc", Month::December),
];

/// Current local date, falling back to UTC when the offset cannot be determined.
pub fn today() -> Date {
    now().date()
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `HH:MM` for the given instant.
pub fn hour_of(instant: OffsetDateTime) -> String {
    format!("{:02}:{:02}", instant.hour(), instant.minute())
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Resolves free-form date text against `today`.
///
/// A year other than the current one is replaced by the current year unless
/// the text itself mentions the current year; assistant models tend to fill
/// in stale years.
pub fn normalize_date(text: &str, today: Date) -> Result<Date> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(BoxdeskError::InvalidInput("empty date".to_string()));
    }

    for (phrase, offset) in RELATIVE_DAYS {
        if lowered.contains(phrase) {
            return today
                .checked_add(Duration::days(*offset))
                .ok_or_else(|| BoxdeskError::InvalidInput("date out of range".to_string()));
        }
    }

    let (year, month, day) = parse_numeric(&lowered)
        .or_else(|| parse_words(&lowered))
        .ok_or_else(|| BoxdeskError::InvalidInput(format!("unrecognized date: {text}")))?;

    let current_year = today.year();
    let year = match year {
        Some(year) if year != current_year && !lowered.contains(&current_year.to_string()) => {
            current_year
        }
        Some(year) => year,
        None => current_year,
    };

    Date::from_calendar_date(year, month, day)
        .map_err(|e| BoxdeskError::InvalidInput(format!("invalid date {text}: {e}")))
}

/// Strict `YYYY-MM-DD` check used for manual bookings.
pub fn parse_iso_date(text: &str) -> Result<Date> {
    let parts: Vec<&str> = text.trim().split('-').collect();
    let invalid = || BoxdeskError::InvalidInput(format!("expected YYYY-MM-DD, got {text}"));
    if parts.len() != 3 || parts[0].len() != 4 {
        return Err(invalid());
    }
    let year: i32 = parts[0].parse().map_err(|_| invalid())?;
    let month = parse_month_number(parts[1]).ok_or_else(invalid)?;
    let day: u8 = parts[2].parse().map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

/// Canonicalizes `H:MM`, `HH:MM`, `HHhMM` and `HHh` to `HH:MM`.
pub fn validate_hour(text: &str) -> Result<String> {
    let raw = text.trim().to_lowercase();
    let invalid = || BoxdeskError::InvalidInput(format!("expected HH:MM, got {text}"));
    let (hours, minutes) = match raw.split_once(|c: char| c == ':' || c == 'h') {
        Some((h, "")) if raw.ends_with('h') => (h, "00"),
        Some((h, m)) => (h, m),
        None => return Err(invalid()),
    };
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !(1..=2).contains(&hours.len()) || minutes.len() != 2 {
        return Err(invalid());
    }
    if !digits(hours) || !digits(minutes) {
        return Err(invalid());
    }
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(format!("{hours:02}:{minutes:02}"))
}

fn parse_numeric(text: &str) -> Option<(Option<i32>, Month, u8)> {
    let token = text.split_whitespace().find(|t| t.contains(&['-', '/', '.'][..]))?;
    let parts: Vec<&str> = token.split(&['-', '/', '.'][..]).collect();
    match parts.as_slice() {
        [y, m, d] if y.len() == 4 => Some((
            Some(y.parse().ok()?),
            parse_month_number(m)?,
            d.parse().ok()?,
        )),
        [d, m, y] if y.len() == 4 => Some((
            Some(y.parse().ok()?),
            parse_month_number(m)?,
            d.parse().ok()?,
        )),
        [d, m] => Some((None, parse_month_number(m)?, d.parse().ok()?)),
        _ => None,
    }
}

fn parse_words(text: &str) -> Option<(Option<i32>, Month, u8)> {
    let mut month = None;
    let mut day = None;
    let mut year = None;
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim_end_matches('.');
        if token.is_empty() {
            continue;
        }
        if let Some(found) = MONTHS.iter().find(|(name, _)| *name == token) {
            month = Some(found.1);
            continue;
        }
        let digits = token
            .trim_end_matches("er")
            .trim_end_matches("st")
            .trim_end_matches("nd")
            .trim_end_matches("rd")
            .trim_end_matches("th");
        if let Ok(value) = digits.parse::<i32>() {
            if digits.len() == 4 {
                year = Some(value);
            } else if (1..=31).contains(&value) && day.is_none() {
                day = Some(value as u8);
            }
        }
    }
    Some((year, month?, day?))
}

fn parse_month_number(text: &str) -> Option<Month> {
    let value: u8 = text.parse().ok()?;
    Month::try_from(value).ok()
}
