use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::DatasetRequest;
use crate::error::FetchError;
use crate::eurostat::SdmxClient;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failing dataset; later datasets are not touched.
    #[default]
    Abort,
    /// Record the failure and move on to the next dataset.
    Continue,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub dataset: Option<String>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to `tracing`.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        let dataset = event.dataset.as_deref().unwrap_or("-");
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                dataset,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!(dataset, "{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub rows: usize,
    pub data_path: String,
    pub metadata_path: String,
    pub record_path: String,
    pub md5sum: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetFailure {
    pub dataset: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub completed: Vec<DatasetOutcome>,
    pub failed: Vec<DatasetFailure>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct App<C: SdmxClient> {
    store: Store,
    client: C,
}

impl<C: SdmxClient> App<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Process every request in order. Under [`FailurePolicy::Abort`] the first
    /// error is returned as-is; files of datasets already processed stay on disk.
    pub fn fetch_all(
        &self,
        requests: &[DatasetRequest],
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, FetchError> {
        let mut summary = RunSummary::default();
        for request in requests {
            match self.fetch_dataset(request, sink) {
                Ok(outcome) => summary.completed.push(outcome),
                Err(err) => match options.policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::Continue => {
                        sink.event(ProgressEvent {
                            dataset: Some(request.id.to_string()),
                            message: format!("failed: {err}"),
                            elapsed: None,
                        });
                        summary.failed.push(DatasetFailure {
                            dataset: request.id.to_string(),
                            error: err.to_string(),
                        });
                    }
                },
            }
        }
        Ok(summary)
    }

    pub fn fetch_dataset(
        &self,
        request: &DatasetRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetOutcome, FetchError> {
        let id = &request.id;
        let options = request.query_options()?;
        let emit = |message: String, elapsed: Option<Duration>| {
            sink.event(ProgressEvent {
                dataset: Some(id.to_string()),
                message,
                elapsed,
            })
        };

        emit(format!("Downloading the metadata for {id}"), None);
        let start = Instant::now();
        let structure = self.client.fetch_structure(id)?;
        emit("Done".to_string(), Some(start.elapsed()));

        let query = options.resolve(id, &structure)?;

        emit(
            format!(
                "Downloading {id} with the following options: {}",
                serde_json::Value::Object(request.raw_options.clone())
            ),
            None,
        );
        let start = Instant::now();
        let table = self.client.fetch_data(id, &query)?;
        emit(
            format!("Done ({} observations)", table.len()),
            Some(start.elapsed()),
        );

        self.store.ensure_data_dir()?;

        let data_path = self.store.data_path(id);
        emit(format!("Writing the data file to {data_path}"), None);
        self.store.write_data(id, &table)?;

        let metadata_path = self.store.metadata_path(id);
        emit(
            format!("Writing the data set metadata to {metadata_path}"),
            None,
        );
        self.store.write_metadata(id, &structure)?;

        let record_path = self.store.record_path(id);
        emit(format!("Writing the internal meta to {record_path}"), None);
        let record = self.store.write_record(id, &request.raw_options)?;

        Ok(DatasetOutcome {
            dataset: id.to_string(),
            rows: table.len(),
            data_path: data_path.to_string(),
            metadata_path: metadata_path.to_string(),
            record_path: record_path.to_string(),
            md5sum: record.md5sum,
        })
    }
}
