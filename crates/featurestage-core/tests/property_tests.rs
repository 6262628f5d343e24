//! # Property-Based Tests
//!
//! Invariants of feature derivation and the column transformer.

use featurestage_core::primitives::{LABEL_COLUMN, TIMESTAMP_COLUMN};
use featurestage_core::{
    Column, Dataset, FeatureSpec, Scalar, derive_features, fit_transform, read_csv, write_csv,
};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

/// A raw timestamp cell: either a well-formed timestamp or junk text.
fn timestamp_cell() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        3 => (2000i32..2030, 1u32..13, 1u32..29, 0u32..24, 0u32..60).prop_map(
            |(y, mo, d, h, mi)| {
                Scalar::Text(format!("{:04}-{:02}-{:02} {:02}:{:02}:00", y, mo, d, h, mi))
            }
        ),
        1 => "[a-z]{1,8}".prop_map(Scalar::Text),
        1 => Just(Scalar::Null),
    ]
}

fn amount_cell() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        4 => (-1.0e6f64..1.0e6).prop_map(Scalar::Float),
        1 => Just(Scalar::Null),
    ]
}

/// A raw transaction dataset with `rows` rows.
fn raw_dataset(rows: usize) -> impl Strategy<Value = Dataset> {
    (
        vec(timestamp_cell(), rows),
        vec(amount_cell(), rows),
        vec(0i64..2, rows),
        vec(prop_oneof![Just("CA"), Just("NY"), Just("TX")], rows),
    )
        .prop_map(|(ts, amt, label, state)| {
            Dataset::from_columns(vec![
                Column::new(TIMESTAMP_COLUMN, ts),
                Column::new("state", state.into_iter().map(|s| Scalar::Text(s.into())).collect()),
                Column::new("amt", amt),
                Column::new(LABEL_COLUMN, label.into_iter().map(Scalar::Int).collect()),
            ])
            .expect("valid dataset")
        })
}

fn any_dataset() -> impl Strategy<Value = Dataset> {
    (1usize..40).prop_flat_map(raw_dataset)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Derivation adds exactly two columns and leaves the others untouched.
    #[test]
    fn deriver_adds_two_columns(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");

        prop_assert_eq!(derived.dataset.column_count(), input.column_count() + 2);
        prop_assert_eq!(derived.dataset.row_count(), input.row_count());
        for column in input.columns() {
            if column.name() != TIMESTAMP_COLUMN {
                prop_assert_eq!(derived.dataset.column(column.name()), Some(column));
            }
        }
    }

    /// A null parsed timestamp implies null hour and null day-of-week.
    #[test]
    fn unparseable_timestamps_yield_null_features(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");
        let ts = derived.dataset.column(TIMESTAMP_COLUMN).expect("ts").values();
        let hours = derived.dataset.column("hour").expect("hour").values();
        let days = derived.dataset.column("day_of_week").expect("dow").values();

        for i in 0..ts.len() {
            prop_assert_eq!(ts[i].is_null(), hours[i].is_null());
            prop_assert_eq!(ts[i].is_null(), days[i].is_null());
            if let Scalar::Int(h) = hours[i] {
                prop_assert!((0..24).contains(&h));
            }
            if let Scalar::Int(d) = days[i] {
                prop_assert!((0..7).contains(&d));
            }
        }
    }

    /// The label at output row i equals the input label at row i.
    #[test]
    fn label_integrity(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");
        let (out, _) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

        prop_assert_eq!(out.column(LABEL_COLUMN), input.column(LABEL_COLUMN));
        prop_assert_eq!(out.row_count(), input.row_count());
    }

    /// Identical input produces identical output and identical fitted state.
    #[test]
    fn fit_transform_is_deterministic(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");
        let first = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");
        let second = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(
            write_csv(&first.0).expect("csv"),
            write_csv(&second.0).expect("csv")
        );
    }

    /// Output columns are the present numeric features then the label.
    #[test]
    fn output_columns_follow_declared_order(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");
        let (out, fitted) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

        prop_assert_eq!(out.column_names(), vec!["amt", "hour", "day_of_week", LABEL_COLUMN]);
        prop_assert_eq!(fitted.feature_names_out(), vec!["amt", "hour", "day_of_week"]);
    }

    /// Published CSV reads back with the same shape and label.
    #[test]
    fn published_csv_preserves_shape(input in any_dataset()) {
        let derived = derive_features(&input, TIMESTAMP_COLUMN).expect("derive");
        let (out, _) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");
        let reread = read_csv(&write_csv(&out).expect("csv")).expect("parse");

        prop_assert_eq!(reread.shape(), out.shape());
        prop_assert_eq!(reread.column(LABEL_COLUMN), out.column(LABEL_COLUMN));
    }
}
