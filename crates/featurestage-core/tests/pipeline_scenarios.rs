//! End-to-end scenarios over the pure pipeline: CSV in, derive, transform,
//! serialize, reload, reapply.

use featurestage_core::primitives::{LABEL_COLUMN, PREVIEW_ROWS, TIMESTAMP_COLUMN};
use featurestage_core::{
    FeatureSpec, PreviewTable, Scalar, derive_features, fit_transform, read_csv,
    transform_from_bytes, transform_to_bytes, write_csv,
};

const TRANSACTIONS: &[u8] = b"trans_date_trans_time,category,state,amt,is_fraud\n\
2023-01-02 03:04:05,grocery,CA,100.0,0\n\
2023-01-03 12:30:00,travel,NY,250.5,1\n\
2023-01-07 23:15:00,grocery,TX,12.25,0\n\
not-a-date,misc,CA,40.0,0\n";

fn floats(values: &[Scalar]) -> Vec<Option<f64>> {
    values.iter().map(Scalar::as_f64).collect()
}

#[test]
fn single_transaction_scenario() {
    let raw = read_csv(
        b"trans_date_trans_time,category,state,amt,is_fraud\n\
          2023-01-02 03:04:05,grocery,CA,100.0,0\n",
    )
    .expect("parse");

    let derived = derive_features(&raw, TIMESTAMP_COLUMN).expect("derive");
    let (out, fitted) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

    assert_eq!(out.column_names(), vec!["amt", "hour", "day_of_week", "is_fraud"]);
    // One sample: zero deviation, unit scale, every feature centers to 0.
    for name in ["amt", "hour", "day_of_week"] {
        assert_eq!(
            floats(out.column(name).expect(name).values()),
            vec![Some(0.0)],
            "{name}"
        );
    }
    assert_eq!(out.column(LABEL_COLUMN).expect("label").values(), &[Scalar::Int(0)]);

    let hour = fitted.numeric_stats().find(|s| s.name == "hour").expect("hour stats");
    assert_eq!(hour.mean, 3.0);
    let dow = fitted
        .numeric_stats()
        .find(|s| s.name == "day_of_week")
        .expect("dow stats");
    assert_eq!(dow.mean, 0.0);
}

#[test]
fn batch_with_bad_timestamp() {
    let raw = read_csv(TRANSACTIONS).expect("parse");
    let derived = derive_features(&raw, TIMESTAMP_COLUMN).expect("derive");
    assert_eq!(derived.coerced, 1);

    let (out, fitted) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");
    assert_eq!(out.shape(), (4, 4));

    let hour = out.column("hour").expect("hour").values();
    assert!(hour[3].is_null());
    assert_eq!(fitted.numeric_stats().find(|s| s.name == "hour").expect("hour").samples, 3);
    assert_eq!(fitted.reserved_features(), vec!["category", "state"]);
}

#[test]
fn absent_numeric_feature_is_not_an_error() {
    let raw = read_csv(
        b"trans_date_trans_time,state,is_fraud\n2023-01-02 03:04:05,CA,0\n2023-01-04 08:00:00,NY,1\n",
    )
    .expect("parse");
    let derived = derive_features(&raw, TIMESTAMP_COLUMN).expect("derive");
    let (out, fitted) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

    assert_eq!(out.column_names(), vec!["hour", "day_of_week", "is_fraud"]);
    assert!(!fitted.feature_names_out().iter().any(|n| n == "amt"));
}

#[test]
fn reloaded_transform_reproduces_output() {
    let raw = read_csv(TRANSACTIONS).expect("parse");
    let derived = derive_features(&raw, TIMESTAMP_COLUMN).expect("derive");
    let (out, fitted) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

    let blob = transform_to_bytes(&fitted).expect("serialize");
    let reloaded = transform_from_bytes(&blob).expect("deserialize");
    assert_eq!(reloaded, fitted);

    let reapplied = reloaded.transform(&derived.dataset).expect("reapply");
    assert_eq!(write_csv(&reapplied).expect("csv"), write_csv(&out).expect("csv"));
}

#[test]
fn preview_holds_first_rows_of_output() {
    let raw = read_csv(TRANSACTIONS).expect("parse");
    let derived = derive_features(&raw, TIMESTAMP_COLUMN).expect("derive");
    let (out, _) = fit_transform(&derived.dataset, &FeatureSpec::default()).expect("fit");

    let preview = PreviewTable::from_dataset(&out, PREVIEW_ROWS);
    assert_eq!(preview.len(), 4);
    assert_eq!(preview.columns, vec!["amt", "hour", "day_of_week", "is_fraud"]);
    assert_eq!(preview.rows[3][1], "");
}
