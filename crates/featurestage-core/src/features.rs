//! # Feature Deriver
//!
//! Derives temporal features from the raw transaction timestamp.
//!
//! ## Coercion Policy
//!
//! Timestamps that cannot be parsed are coerced to `Null`; they never abort
//! the stage and never reject the row. Derived features of a `Null`
//! timestamp are `Null` as well (no zero-fill). The number of coerced cells
//! is reported in [`DerivedFeatures::coerced`] so the caller can log it.
//!
//! ## Derived Columns
//!
//! | Column        | Range | Convention  |
//! |---------------|-------|-------------|
//! | `hour`        | 0-23  | wall clock  |
//! | `day_of_week` | 0-6   | Monday = 0  |

use crate::primitives::{DAY_OF_WEEK_COLUMN, HOUR_COLUMN};
use crate::{Column, Dataset, Scalar, StageError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Naive layouts tried in order before RFC 3339.
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Date-only layout, read as midnight.
const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Result of feature derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    /// The input dataset with the parsed timestamp column and derived columns.
    pub dataset: Dataset,
    /// Names of the derived columns, in the order they were added.
    pub new_features: Vec<String>,
    /// Number of non-null timestamp cells that failed to parse.
    pub coerced: usize,
}

/// Parse one timestamp string. Returns `None` when no layout matches.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for layout in DATETIME_LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }

    NaiveDate::parse_from_str(raw, DATE_LAYOUT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Coerce one cell to a timestamp. Anything that is not a parseable string or
/// an already-parsed timestamp becomes `Null`.
fn coerce_cell(cell: &Scalar) -> Scalar {
    match cell {
        Scalar::Timestamp(ts) => Scalar::Timestamp(*ts),
        Scalar::Text(raw) => parse_timestamp(raw).map_or(Scalar::Null, Scalar::Timestamp),
        Scalar::Null | Scalar::Int(_) | Scalar::Float(_) => Scalar::Null,
    }
}

/// Derive `hour` and `day_of_week` from `timestamp_column`.
///
/// The timestamp column itself is replaced by its parsed form; every other
/// existing column is carried over untouched. Pre-existing `hour` or
/// `day_of_week` columns are replaced in place.
///
/// # Errors
///
/// `StageError::ParseError` if the timestamp column is absent.
pub fn derive_features(
    dataset: &Dataset,
    timestamp_column: &str,
) -> Result<DerivedFeatures, StageError> {
    let raw = dataset.column(timestamp_column).ok_or_else(|| {
        StageError::ParseError(format!("missing timestamp column '{}'", timestamp_column))
    })?;

    let parsed: Vec<Scalar> = raw.values().iter().map(coerce_cell).collect();
    let coerced = raw
        .values()
        .iter()
        .zip(&parsed)
        .filter(|(before, after)| !before.is_null() && after.is_null())
        .count();

    let (hours, weekdays): (Vec<Scalar>, Vec<Scalar>) = parsed
        .iter()
        .map(|cell| match cell {
            Scalar::Timestamp(ts) => (
                Scalar::Int(i64::from(ts.hour())),
                Scalar::Int(i64::from(ts.weekday().num_days_from_monday())),
            ),
            _ => (Scalar::Null, Scalar::Null),
        })
        .unzip();

    let derived = dataset
        .with_column(Column::new(timestamp_column, parsed))?
        .with_column(Column::new(HOUR_COLUMN, hours))?
        .with_column(Column::new(DAY_OF_WEEK_COLUMN, weekdays))?;

    Ok(DerivedFeatures {
        dataset: derived,
        new_features: vec![HOUR_COLUMN.to_string(), DAY_OF_WEEK_COLUMN.to_string()],
        coerced,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::read_csv;
    use crate::primitives::TIMESTAMP_COLUMN;

    #[test]
    fn parses_supported_layouts() {
        for raw in [
            "2023-01-02 03:04:05",
            "2023-01-02T03:04:05",
            "2023-01-02 03:04:05.250",
            "2023-01-02 03:04",
            "2023-01-02T03:04:05+00:00",
        ] {
            let ts = parse_timestamp(raw).expect(raw);
            assert_eq!(ts.hour(), 3, "{raw}");
        }
        let midnight = parse_timestamp("2023-01-02").expect("date only");
        assert_eq!(midnight.hour(), 0);
    }

    #[test]
    fn rfc3339_keeps_offset_wall_clock() {
        let ts = parse_timestamp("2023-01-02T23:30:00-05:00").expect("parse");
        assert_eq!(ts.hour(), 23);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2023-13-45 99:00:00").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn derives_hour_and_monday_based_weekday() {
        // 2023-01-02 is a Monday, 2023-01-08 a Sunday.
        let ds = read_csv(
            b"trans_date_trans_time,amt\n2023-01-02 03:04:05,1.0\n2023-01-08 23:59:59,2.0\n",
        )
        .expect("parse");
        let derived = derive_features(&ds, TIMESTAMP_COLUMN).expect("derive");

        let hours = derived.dataset.column(HOUR_COLUMN).expect("hour");
        let days = derived.dataset.column(DAY_OF_WEEK_COLUMN).expect("dow");
        assert_eq!(hours.values(), &[Scalar::Int(3), Scalar::Int(23)]);
        assert_eq!(days.values(), &[Scalar::Int(0), Scalar::Int(6)]);
        assert_eq!(derived.new_features, vec!["hour", "day_of_week"]);
        assert_eq!(derived.coerced, 0);
    }

    #[test]
    fn malformed_timestamps_become_null() {
        let ds = read_csv(b"trans_date_trans_time\nyesterday\n\"\"\n2023-01-02 10:00:00\n")
            .expect("parse");
        let derived = derive_features(&ds, TIMESTAMP_COLUMN).expect("derive");

        let hours = derived.dataset.column(HOUR_COLUMN).expect("hour").values();
        let days = derived.dataset.column(DAY_OF_WEEK_COLUMN).expect("dow").values();
        assert_eq!(hours, &[Scalar::Null, Scalar::Null, Scalar::Int(10)]);
        assert_eq!(days, &[Scalar::Null, Scalar::Null, Scalar::Int(0)]);
        // Only the non-empty unparseable cell counts as coerced.
        assert_eq!(derived.coerced, 1);
    }

    #[test]
    fn other_columns_untouched() {
        let ds = read_csv(b"trans_date_trans_time,amt,state\n2023-01-02 03:04:05,1.5,CA\n")
            .expect("parse");
        let derived = derive_features(&ds, TIMESTAMP_COLUMN).expect("derive");

        assert_eq!(derived.dataset.column("amt"), ds.column("amt"));
        assert_eq!(derived.dataset.column("state"), ds.column("state"));
        assert_eq!(derived.dataset.column_count(), ds.column_count() + 2);
    }

    #[test]
    fn missing_timestamp_column_is_parse_error() {
        let ds = read_csv(b"amt\n1.0\n").expect("parse");
        assert!(matches!(
            derive_features(&ds, TIMESTAMP_COLUMN),
            Err(StageError::ParseError(_))
        ));
    }

    #[test]
    fn existing_derived_columns_replaced_in_place() {
        let ds = read_csv(b"hour,trans_date_trans_time\n99,2023-01-02 05:00:00\n").expect("parse");
        let derived = derive_features(&ds, TIMESTAMP_COLUMN).expect("derive");

        assert_eq!(
            derived.dataset.column_names(),
            vec!["hour", "trans_date_trans_time", "day_of_week"]
        );
        assert_eq!(
            derived.dataset.column(HOUR_COLUMN).expect("hour").values(),
            &[Scalar::Int(5)]
        );
    }
}
