use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{DatasetId, QueryOptions};
use crate::error::FetchError;

/// Config file contents: dataset code -> option name -> value, in file order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Config {
    pub datasets: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub id: DatasetId,
    /// Options exactly as written in the config file.
    pub raw_options: Map<String, Value>,
    /// Typed options, or the shape error found while loading. A bad shape
    /// fails only this dataset, under the run's failure policy.
    pub options: Result<QueryOptions, String>,
}

impl DatasetRequest {
    pub fn query_options(&self) -> Result<&QueryOptions, FetchError> {
        self.options
            .as_ref()
            .map_err(|message| FetchError::InvalidOption {
                dataset: self.id.to_string(),
                message: message.clone(),
            })
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<Vec<DatasetRequest>, FetchError> {
        let mut file =
            File::open(path).map_err(|_| FetchError::ConfigNotFound(path.to_path_buf()))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|err| FetchError::ConfigParse(format!("{}: {err}", path.display())))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Vec<DatasetRequest>, FetchError> {
        config
            .datasets
            .into_iter()
            .map(|(code, options)| {
                let id: DatasetId = code.parse()?;
                let Value::Object(raw_options) = options else {
                    return Err(FetchError::ConfigParse(format!(
                        "options for {code} must be an object"
                    )));
                };
                let options = QueryOptions::parse_map(&raw_options);
                Ok(DatasetRequest {
                    id,
                    raw_options,
                    options,
                })
            })
            .collect()
    }
}
