//! SQL rewriter: temporal range extraction.
//!
//! `FOR <date>` / `FOR DATES BETWEEN a AND b` / `FOR TODAY` style clauses
//! are not part of the delegated SQL dialect, so they are extracted from
//! the text before parsing. Each extracted clause becomes a date range,
//! attached to the scans in order of appearance; connectors that partition
//! by date use them to prune reads. Malformed clauses fail with
//! `InvalidTemporalRangeFilter`.

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::errors::{Error, Result};

/// An inclusive date range extracted from a `FOR` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    next_month.map_or(date, |d| d - Duration::days(1))
}

fn previous_month(date: NaiveDate) -> NaiveDate {
    month_start(date) - Duration::days(1)
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    let trimmed = text.trim_matches('\'');
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| Error::InvalidTemporalRangeFilter(format!("'{trimmed}' is not a date")))
}

fn named_range(keyword: &str, today: NaiveDate) -> Result<TemporalRange> {
    match keyword.to_ascii_uppercase().as_str() {
        "TODAY" => Ok(TemporalRange {
            start: today,
            end: today,
        }),
        "YESTERDAY" => {
            let yesterday = today - Duration::days(1);
            Ok(TemporalRange {
                start: yesterday,
                end: yesterday,
            })
        }
        "THIS_MONTH" => Ok(TemporalRange {
            start: month_start(today),
            end: today,
        }),
        "LAST_MONTH" | "PREVIOUS_MONTH" => {
            let last = previous_month(today);
            Ok(TemporalRange {
                start: month_start(last),
                end: month_end(last),
            })
        }
        other => Err(Error::InvalidTemporalRangeFilter(format!(
            "unrecognised temporal keyword '{other}'"
        ))),
    }
}

/// Strip temporal clauses from the SQL, returning the cleaned text and
/// the extracted ranges in order of appearance.
pub fn extract_temporal_filters(sql: &str) -> Result<(String, Vec<TemporalRange>)> {
    extract_with_today(sql, chrono::Local::now().date_naive())
}

fn extract_with_today(sql: &str, today: NaiveDate) -> Result<(String, Vec<TemporalRange>)> {
    let between = Regex::new(
        r"(?i)\bFOR\s+DATES\s+BETWEEN\s+('[^']+'|\S+)\s+AND\s+('[^']+'|\S+)",
    )
    .map_err(|e| Error::Programming(format!("temporal regex: {e}")))?;
    let dates_in = Regex::new(r"(?i)\bFOR\s+DATES\s+IN\s+(\w+)")
        .map_err(|e| Error::Programming(format!("temporal regex: {e}")))?;
    let single = Regex::new(r"(?i)\bFOR\s+('[^']+'|TODAY|YESTERDAY|THIS_MONTH|LAST_MONTH|PREVIOUS_MONTH)")
        .map_err(|e| Error::Programming(format!("temporal regex: {e}")))?;
    let dangling = Regex::new(r"(?i)\bFOR\s+DATES\b")
        .map_err(|e| Error::Programming(format!("temporal regex: {e}")))?;

    // positions are collected so ranges stay in textual order even when
    // the clause kinds interleave
    let mut found: Vec<(usize, usize, TemporalRange)> = Vec::new();

    for capture in between.captures_iter(sql) {
        let whole = capture.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let start = parse_date(&capture[1])?;
        let end = parse_date(&capture[2])?;
        if start > end {
            return Err(Error::InvalidTemporalRangeFilter(
                "range start is after its end".to_string(),
            ));
        }
        found.push((whole.0, whole.1, TemporalRange { start, end }));
    }

    for capture in dates_in.captures_iter(sql) {
        let whole = capture.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        if found.iter().any(|(s, e, _)| whole.0 >= *s && whole.1 <= *e) {
            continue;
        }
        found.push((whole.0, whole.1, named_range(&capture[1], today)?));
    }

    for capture in single.captures_iter(sql) {
        let whole = capture.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        if found.iter().any(|(s, e, _)| whole.0 >= *s && whole.0 < *e) {
            continue;
        }
        let token = &capture[1];
        let range = if token.starts_with('\'') {
            let date = parse_date(token)?;
            TemporalRange {
                start: date,
                end: date,
            }
        } else {
            named_range(token, today)?
        };
        found.push((whole.0, whole.1, range));
    }

    // a FOR DATES with no recognised continuation is malformed
    for matched in dangling.find_iter(sql) {
        if !found
            .iter()
            .any(|(s, e, _)| matched.start() >= *s && matched.end() <= *e)
        {
            return Err(Error::InvalidTemporalRangeFilter(
                "FOR DATES requires BETWEEN or IN".to_string(),
            ));
        }
    }

    found.sort_by_key(|(start, _, _)| *start);

    let mut cleaned = String::with_capacity(sql.len());
    let mut cursor = 0;
    let mut ranges = Vec::with_capacity(found.len());
    for (start, end, range) in found {
        if start >= cursor {
            cleaned.push_str(&sql[cursor..start]);
            cursor = end;
            ranges.push(range);
        }
    }
    cleaned.push_str(&sql[cursor..]);
    Ok((cleaned, ranges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }

    #[test]
    fn plain_sql_is_untouched() {
        let (sql, ranges) =
            extract_with_today("SELECT * FROM $planets", today()).expect("extracts");
        assert_eq!(sql, "SELECT * FROM $planets");
        assert!(ranges.is_empty());
    }

    #[test]
    fn between_clause_is_extracted() {
        let (sql, ranges) = extract_with_today(
            "SELECT * FROM logs FOR DATES BETWEEN '2024-01-01' AND '2024-01-31' WHERE x = 1",
            today(),
        )
        .expect("extracts");
        assert_eq!(sql, "SELECT * FROM logs WHERE x = 1");
        assert_eq!(ranges.len(), 1);
        assert_eq!(
            ranges[0].start,
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid")
        );
        assert_eq!(
            ranges[0].end,
            NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid")
        );
    }

    #[test]
    fn named_keywords_resolve_relative_to_today() {
        let (_, ranges) =
            extract_with_today("SELECT * FROM logs FOR YESTERDAY", today()).expect("extracts");
        assert_eq!(
            ranges[0].start,
            NaiveDate::from_ymd_opt(2024, 3, 14).expect("valid")
        );

        let (_, ranges) =
            extract_with_today("SELECT * FROM logs FOR LAST_MONTH", today()).expect("extracts");
        assert_eq!(
            ranges[0].start,
            NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid")
        );
        assert_eq!(
            ranges[0].end,
            NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid")
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let result = extract_with_today(
            "SELECT * FROM logs FOR DATES BETWEEN '2024-02-01' AND '2024-01-01'",
            today(),
        );
        assert!(matches!(
            result,
            Err(Error::InvalidTemporalRangeFilter(_))
        ));
    }

    #[test]
    fn dangling_for_dates_is_rejected() {
        let result = extract_with_today("SELECT * FROM logs FOR DATES", today());
        assert!(matches!(
            result,
            Err(Error::InvalidTemporalRangeFilter(_))
        ));
    }
}
