use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use estat_fetch::app::{App, FailurePolicy, FetchOptions, ProgressEvent, ProgressSink};
use estat_fetch::config::{Config, ConfigLoader, DatasetRequest};
use estat_fetch::domain::{DataQuery, DatasetId};
use estat_fetch::error::FetchError;
use estat_fetch::eurostat::SdmxClient;
use estat_fetch::sdmx::StructureMessage;
use estat_fetch::store::{Store, md5_file};
use estat_fetch::table::ObservationTable;

const STRUCTURE: &str = include_str!("fixtures/nama_10_gdp_structure.xml");
const DATA: &str = include_str!("fixtures/nama_10_gdp.csv");

#[derive(Default)]
struct MockSdmx {
    fail_on: Option<String>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl MockSdmx {
    fn failing_on(dataset: &str) -> Self {
        Self {
            fail_on: Some(dataset.to_string()),
            ..Self::default()
        }
    }
}

impl SdmxClient for MockSdmx {
    fn fetch_structure(&self, id: &DatasetId) -> Result<StructureMessage, FetchError> {
        self.calls.borrow_mut().push(format!("structure:{id}"));
        StructureMessage::parse(STRUCTURE)
    }

    fn fetch_data(&self, id: &DatasetId, query: &DataQuery) -> Result<ObservationTable, FetchError> {
        self.calls.borrow_mut().push(format!(
            "data:{id}:{}",
            query.key.as_deref().unwrap_or("")
        ));
        if self.fail_on.as_deref() == Some(id.as_str()) {
            return Err(FetchError::Status {
                status: 404,
                message: "not found".to_string(),
            });
        }
        ObservationTable::from_sdmx_csv(DATA)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: RefCell<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.borrow_mut().push(event);
    }
}

fn requests() -> Vec<DatasetRequest> {
    let config: Config = serde_json::from_value(json!({
        "nama_10_gdp": {"geo": ["IE", "FR"], "unit": "CP_MEUR"},
        "tps00001": {},
        "tec00001": {"startPeriod": "2020"}
    }))
    .unwrap();
    ConfigLoader::resolve_config(config).unwrap()
}

fn app(temp: &tempfile::TempDir, client: MockSdmx) -> App<MockSdmx> {
    let data_dir = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    App::new(Store::new(data_dir), client)
}

fn file_names(app: &App<MockSdmx>) -> Vec<String> {
    let mut names = fs::read_dir(app.store().data_dir().as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn fetch_writes_three_files_per_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::default());
    let sink = RecordingSink::default();

    let summary = app
        .fetch_all(&requests(), &FetchOptions::default(), &sink)
        .unwrap();

    assert_eq!(summary.completed.len(), 3);
    assert!(summary.is_success());
    assert_eq!(
        file_names(&app),
        [
            "nama_10_gdp.json",
            "nama_10_gdp_meta_creation.json",
            "nama_10_gdp_metadata.json",
            "tec00001.json",
            "tec00001_meta_creation.json",
            "tec00001_metadata.json",
            "tps00001.json",
            "tps00001_meta_creation.json",
            "tps00001_metadata.json",
        ]
    );
    assert!(
        sink.events
            .borrow()
            .iter()
            .any(|event| event.message.starts_with("Writing the internal meta to"))
    );
}

#[test]
fn structure_is_fetched_before_data_in_config_order() {
    let temp = tempfile::tempdir().unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let client = MockSdmx {
        calls: Rc::clone(&calls),
        ..MockSdmx::default()
    };
    let app = app(&temp, client);

    app.fetch_all(&requests(), &FetchOptions::default(), &RecordingSink::default())
        .unwrap();

    assert_eq!(
        *calls.borrow(),
        [
            "structure:nama_10_gdp",
            "data:nama_10_gdp:.CP_MEUR..IE+FR",
            "structure:tps00001",
            "data:tps00001:",
            "structure:tec00001",
            "data:tec00001:",
        ]
    );
}

#[test]
fn record_holds_config_options_and_data_checksum() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::default());
    let requests = requests();

    let summary = app
        .fetch_all(&requests, &FetchOptions::default(), &RecordingSink::default())
        .unwrap();

    let id: DatasetId = "nama_10_gdp".parse().unwrap();
    let record = app.store().read_record(&id).unwrap();
    assert_eq!(record.dataset_code, "nama_10_gdp");
    assert_eq!(
        serde_json::Value::Object(record.opts.clone()),
        json!({"geo": ["IE", "FR"], "unit": "CP_MEUR"})
    );
    assert_eq!(
        record.md5sum,
        md5_file(app.store().data_path(&id).as_std_path()).unwrap()
    );
    assert_eq!(summary.completed[0].md5sum, record.md5sum);
    assert_eq!(summary.completed[0].rows, 4);
}

#[test]
fn rerun_overwrites_outputs() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::default());
    let requests = requests();
    let id: DatasetId = "tps00001".parse().unwrap();

    app.fetch_all(&requests, &FetchOptions::default(), &RecordingSink::default())
        .unwrap();
    fs::write(app.store().data_path(&id).as_std_path(), b"stale").unwrap();
    app.fetch_all(&requests, &FetchOptions::default(), &RecordingSink::default())
        .unwrap();

    assert_eq!(file_names(&app).len(), 9);
    assert!(app.store().verify_record(&id).unwrap());
    let content = fs::read_to_string(app.store().data_path(&id).as_std_path()).unwrap();
    assert!(content.starts_with('['));
}

#[test]
fn abort_policy_stops_at_first_failure() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::failing_on("tps00001"));

    let err = app
        .fetch_all(&requests(), &FetchOptions::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, FetchError::Status { status: 404, .. });

    assert_eq!(
        file_names(&app),
        [
            "nama_10_gdp.json",
            "nama_10_gdp_meta_creation.json",
            "nama_10_gdp_metadata.json",
        ]
    );
}

#[test]
fn continue_policy_reports_failures() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::failing_on("tps00001"));
    let options = FetchOptions {
        policy: FailurePolicy::Continue,
    };

    let summary = app
        .fetch_all(&requests(), &options, &RecordingSink::default())
        .unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].dataset, "tps00001");
    assert_eq!(file_names(&app).len(), 6);
}

#[test]
fn invalid_option_fails_before_data_request() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::default());
    let config: Config = serde_json::from_value(json!({"nama_10_gdp": {"geo": "XX"}})).unwrap();
    let requests = ConfigLoader::resolve_config(config).unwrap();

    let err = app
        .fetch_all(&requests, &FetchOptions::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, FetchError::InvalidOption { .. });
    assert!(!app.store().data_dir().as_std_path().exists());
}

#[test]
fn bad_option_shape_fails_only_its_dataset_under_continue() {
    let temp = tempfile::tempdir().unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let client = MockSdmx {
        calls: Rc::clone(&calls),
        ..MockSdmx::default()
    };
    let app = app(&temp, client);
    let config: Config =
        serde_json::from_value(json!({"nama_10_gdp": {"geo": true}, "tps00001": {}})).unwrap();
    let requests = ConfigLoader::resolve_config(config).unwrap();
    let options = FetchOptions {
        policy: FailurePolicy::Continue,
    };

    let summary = app
        .fetch_all(&requests, &options, &RecordingSink::default())
        .unwrap();

    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].dataset, "nama_10_gdp");
    assert!(summary.failed[0].error.contains("booleans are not allowed"));
    assert_eq!(
        file_names(&app),
        [
            "tps00001.json",
            "tps00001_meta_creation.json",
            "tps00001_metadata.json",
        ]
    );
    assert_eq!(*calls.borrow(), ["structure:tps00001", "data:tps00001:"]);
}

#[test]
fn bad_option_shape_aborts_before_any_request() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, MockSdmx::default());
    let config: Config =
        serde_json::from_value(json!({"nama_10_gdp": {"geo": true}, "tps00001": {}})).unwrap();
    let requests = ConfigLoader::resolve_config(config).unwrap();

    let err = app
        .fetch_all(&requests, &FetchOptions::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, FetchError::InvalidOption { .. });
    assert!(!app.store().data_dir().as_std_path().exists());
}
