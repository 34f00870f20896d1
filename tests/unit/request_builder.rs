use chrono::{NaiveDate, NaiveDateTime};
use minder_downloader::export::{ExportError, ExportJobRequest, ExportParams};
use minder_downloader::metadata::{DatasetCatalog, MetadataLookup};
use serde_json::json;

fn at(day: u32, hour: u32, milli: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 6, day)
        .unwrap()
        .and_hms_milli_opt(hour, 0, 0, milli)
        .unwrap()
}

/// Lookup backed by a fixed table, standing in for the portal metadata.
struct FixedLookup(Vec<(String, Vec<String>)>);

impl MetadataLookup for FixedLookup {
    fn columns_for(&self, dataset: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == dataset)
            .map(|(_, columns)| columns.as_slice())
    }
}

#[test]
fn request_body_matches_wire_format() {
    let lookup = FixedLookup(vec![(
        "raw_body_temperature".to_string(),
        vec!["id".to_string(), "start_date".to_string(), "value".to_string()],
    )]);
    let params = ExportParams::new(at(1, 9, 250), at(2, 9, 0), ["raw_body_temperature"])
        .with_organizations(["org-a", "org-b"]);

    let body = ExportJobRequest::build(&params, &lookup).unwrap().to_json().unwrap();
    assert_eq!(
        body,
        json!({
            "since": "2023-06-01T09:00:00.250Z",
            "until": "2023-06-02T09:00:00.000Z",
            "datasets": {"raw_body_temperature": {"columns": ["id", "start_date", "value"]}},
            "organizations": ["org-a", "org-b"]
        })
    );
}

#[test]
fn dataset_keys_keep_caller_order() {
    let catalog = DatasetCatalog::new()
        .with_dataset("zeta", ["id"])
        .with_dataset("alpha", ["id"]);
    let params = ExportParams::new(at(1, 0, 0), at(2, 0, 0), ["zeta", "alpha"]);

    let request = ExportJobRequest::build(&params, &catalog).unwrap();
    let text = serde_json::to_string(&request).unwrap();
    assert!(text.find("\"zeta\"").unwrap() < text.find("\"alpha\"").unwrap());
}

#[test]
fn unknown_dataset_is_reported_by_name() {
    let catalog = DatasetCatalog::new().with_dataset("raw_sleep_mat", ["id"]);
    let params = ExportParams::new(at(1, 0, 0), at(2, 0, 0), ["raw_sleep_mat", "raw_typo"]);

    match ExportJobRequest::build(&params, &catalog) {
        Err(ExportError::UnknownDataset(name)) => assert_eq!(name, "raw_typo"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn equal_bounds_are_rejected() {
    let catalog = DatasetCatalog::new().with_dataset("raw_sleep_mat", ["id"]);
    let params = ExportParams::new(at(1, 0, 0), at(1, 0, 0), ["raw_sleep_mat"]);
    assert!(matches!(
        ExportJobRequest::build(&params, &catalog),
        Err(ExportError::InvalidRequest(_))
    ));
}
