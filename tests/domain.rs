use assert_matches::assert_matches;
use serde_json::{Map, Value, json};

use estat_fetch::domain::{DataQuery, DatasetId, QueryOptions};
use estat_fetch::error::FetchError;
use estat_fetch::sdmx::StructureMessage;

const STRUCTURE: &str = include_str!("fixtures/nama_10_gdp_structure.xml");

fn dataset() -> DatasetId {
    "nama_10_gdp".parse().unwrap()
}

fn options(value: Value) -> QueryOptions {
    let Value::Object(map) = value else {
        panic!("options must be an object");
    };
    QueryOptions::from_map(&dataset(), &map).unwrap()
}

fn resolve(value: Value) -> Result<DataQuery, FetchError> {
    let structure = StructureMessage::parse(STRUCTURE).unwrap();
    options(value).resolve(&dataset(), &structure)
}

#[test]
fn no_options_means_no_key() {
    let query = resolve(json!({})).unwrap();
    assert_eq!(query, DataQuery::default());
}

#[test]
fn key_follows_dimension_positions() {
    let query = resolve(json!({"geo": ["IE", "FR"], "unit": "CP_MEUR"})).unwrap();
    assert_eq!(query.key.as_deref(), Some(".CP_MEUR..IE+FR"));
    assert!(query.params.is_empty());
}

#[test]
fn dimension_keys_are_case_insensitive() {
    let query = resolve(json!({"FREQ": "A", "NA_ITEM": "B1GQ"})).unwrap();
    assert_eq!(query.key.as_deref(), Some("A..B1GQ."));
}

#[test]
fn reserved_params_are_passed_as_query_parameters() {
    let query = resolve(json!({
        "geo": "IE",
        "startPeriod": "2015",
        "endperiod": "2022",
        "lastNObservations": 3
    }))
    .unwrap();
    assert_eq!(query.key.as_deref(), Some("...IE"));
    assert_eq!(
        query.params,
        [
            ("startPeriod".to_string(), "2015".to_string()),
            ("endPeriod".to_string(), "2022".to_string()),
            ("lastNObservations".to_string(), "3".to_string()),
        ]
    );
}

#[test]
fn unknown_dimension_is_rejected() {
    let err = resolve(json!({"sex": "T"})).unwrap_err();
    assert_matches!(err, FetchError::InvalidOption { .. });
    assert!(err.to_string().contains("sex is not a dimension"));
}

#[test]
fn unknown_code_is_rejected() {
    let err = resolve(json!({"geo": ["IE", "XX"]})).unwrap_err();
    assert!(err.to_string().contains("XX is not a code of GEO"));
}

#[test]
fn time_dimension_is_rejected() {
    let err = resolve(json!({"TIME_PERIOD": "2020"})).unwrap_err();
    assert!(err.to_string().contains("startPeriod"));
}

#[test]
fn duplicate_dimension_is_rejected() {
    let err = resolve(json!({"geo": "IE", "GEO": "FR"})).unwrap_err();
    assert!(err.to_string().contains("more than once"));
}

#[test]
fn period_params_take_a_single_valid_period() {
    assert_matches!(
        resolve(json!({"startPeriod": ["2015", "2016"]})),
        Err(FetchError::InvalidOption { .. })
    );
    assert_matches!(
        resolve(json!({"startPeriod": "yesterday"})),
        Err(FetchError::InvalidOption { .. })
    );
    assert_matches!(
        resolve(json!({"firstNObservations": 0})),
        Err(FetchError::InvalidOption { .. })
    );
}

#[test]
fn malformed_shapes_fail_before_any_request() {
    let mut map = Map::new();
    map.insert("geo".to_string(), json!({"code": "IE"}));
    let err = QueryOptions::from_map(&dataset(), &map).unwrap_err();
    assert_matches!(err, FetchError::InvalidOption { .. });
}
