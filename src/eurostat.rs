use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{DataQuery, DatasetId};
use crate::error::FetchError;
use crate::sdmx::StructureMessage;
use crate::table::ObservationTable;

pub const DEFAULT_BASE_URL: &str = "https://ec.europa.eu/eurostat/api/dissemination/sdmx/2.1";
pub const AGENCY: &str = "ESTAT";

/// Remote statistical-data service. The two queries are independent of
/// each other; callers decide how to combine them.
pub trait SdmxClient {
    fn fetch_structure(&self, id: &DatasetId) -> Result<StructureMessage, FetchError>;
    fn fetch_data(&self, id: &DatasetId, query: &DataQuery) -> Result<ObservationTable, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct EurostatHttpClient {
    client: Client,
    base_url: String,
}

impl EurostatHttpClient {
    pub fn new(options: &ClientOptions) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("estat-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn structure_url(&self, id: &DatasetId) -> String {
        format!(
            "{}/datastructure/{AGENCY}/{}?references=children",
            self.base_url,
            id.as_str()
        )
    }

    /// Data URL without query parameters; the series key is omitted when no
    /// dimension is filtered.
    pub fn data_url(&self, id: &DatasetId, query: &DataQuery) -> String {
        match &query.key {
            Some(key) => format!("{}/data/{}/{key}", self.base_url, id.as_str()),
            None => format!("{}/data/{}", self.base_url, id.as_str()),
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Eurostat request failed".to_string());
        Err(FetchError::Status { status, message })
    }
}

impl SdmxClient for EurostatHttpClient {
    fn fetch_structure(&self, id: &DatasetId) -> Result<StructureMessage, FetchError> {
        let url = self.structure_url(id);
        tracing::debug!(%url, "requesting structure");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/xml")
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        let body = Self::handle_status(response)?
            .text()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        StructureMessage::parse(&body)
    }

    fn fetch_data(&self, id: &DatasetId, query: &DataQuery) -> Result<ObservationTable, FetchError> {
        let url = self.data_url(id, query);
        tracing::debug!(%url, params = ?query.params, "requesting data");
        let response = self
            .client
            .get(&url)
            .query(&[("format", "SDMX-CSV")])
            .query(&query.params)
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        let body = Self::handle_status(response)?
            .text()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        ObservationTable::from_sdmx_csv(&body)
    }
}
