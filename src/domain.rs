use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FetchError;
use crate::sdmx::StructureMessage;

static DATASET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_$.-]*$").expect("valid dataset id regex"));

static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}(-(Q[1-4]|S[12]|W\d{2}|\d{2}(-\d{2})?))?$").expect("valid period regex")
});

/// Eurostat dataset code, e.g. `nama_10_gdp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !DATASET_ID.is_match(trimmed) {
            return Err(FetchError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Single(String),
    Many(Vec<String>),
}

impl OptionValue {
    /// Accepts a string, a number, or a non-empty list of those.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err("empty list".to_string());
                }
                let values = items
                    .iter()
                    .map(scalar_text)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(OptionValue::Many(values))
            }
            other => scalar_text(other).map(OptionValue::Single),
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            OptionValue::Single(value) => std::slice::from_ref(value),
            OptionValue::Many(values) => values,
        }
    }

    fn single(&self) -> Option<&str> {
        match self {
            OptionValue::Single(value) => Some(value),
            OptionValue::Many(values) if values.len() == 1 => Some(&values[0]),
            OptionValue::Many(_) => None,
        }
    }
}

fn scalar_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Value::String(_) => Err("empty string".to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(_) => Err("booleans are not allowed".to_string()),
        Value::Null => Err("null is not allowed".to_string()),
        Value::Array(_) => Err("nested lists are not allowed".to_string()),
        Value::Object(_) => Err("objects are not allowed".to_string()),
    }
}

/// Reserved (non-dimension) query parameters understood by the SDMX REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryParam {
    StartPeriod,
    EndPeriod,
    FirstN,
    LastN,
}

impl QueryParam {
    fn lookup(key: &str) -> Option<Self> {
        [
            QueryParam::StartPeriod,
            QueryParam::EndPeriod,
            QueryParam::FirstN,
            QueryParam::LastN,
        ]
        .into_iter()
        .find(|param| param.name().eq_ignore_ascii_case(key))
    }

    fn name(self) -> &'static str {
        match self {
            QueryParam::StartPeriod => "startPeriod",
            QueryParam::EndPeriod => "endPeriod",
            QueryParam::FirstN => "firstNObservations",
            QueryParam::LastN => "lastNObservations",
        }
    }

    fn check(self, value: &str) -> Result<(), String> {
        match self {
            QueryParam::StartPeriod | QueryParam::EndPeriod => {
                if PERIOD.is_match(value) {
                    Ok(())
                } else {
                    Err(format!("{value:?} is not a period (YYYY, YYYY-MM, YYYY-Qn, ...)"))
                }
            }
            QueryParam::FirstN | QueryParam::LastN => match value.parse::<u64>() {
                Ok(n) if n > 0 => Ok(()),
                _ => Err(format!("{value:?} is not a positive integer")),
            },
        }
    }
}

/// Per-dataset query options.
///
/// Allowed values per key:
/// - `startPeriod` / `endPeriod`: a single period (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`,
///   `YYYY-Qn`, `YYYY-Sn`, `YYYY-Wnn`).
/// - `firstNObservations` / `lastNObservations`: a single positive integer.
/// - a dimension id of the dataset structure (case-insensitive, never the time
///   dimension): one code or a list of codes, each present in the dimension's
///   codelist when the structure carries it.
///
/// Value shapes are checked when the config is loaded; keys and codes are
/// checked against the structure in [`QueryOptions::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    entries: Vec<(String, OptionValue)>,
}

impl QueryOptions {
    pub fn from_map(dataset: &DatasetId, raw: &Map<String, Value>) -> Result<Self, FetchError> {
        Self::parse_map(raw).map_err(|message| FetchError::InvalidOption {
            dataset: dataset.to_string(),
            message,
        })
    }

    /// Shape check only; the error names the offending key.
    pub fn parse_map(raw: &Map<String, Value>) -> Result<Self, String> {
        let entries = raw
            .iter()
            .map(|(key, value)| {
                OptionValue::from_json(value)
                    .map(|value| (key.clone(), value))
                    .map_err(|message| format!("{key}: {message}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, OptionValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(
        &self,
        dataset: &DatasetId,
        structure: &StructureMessage,
    ) -> Result<DataQuery, FetchError> {
        let invalid = |message: String| FetchError::InvalidOption {
            dataset: dataset.to_string(),
            message,
        };

        let dimensions = structure.ordered_dimensions();
        let mut selections: Vec<Option<&[String]>> = vec![None; dimensions.len()];
        let mut params = Vec::new();

        for (key, value) in &self.entries {
            if let Some(param) = QueryParam::lookup(key) {
                let single = value
                    .single()
                    .ok_or_else(|| invalid(format!("{key} takes a single value")))?;
                param
                    .check(single)
                    .map_err(|message| invalid(format!("{key}: {message}")))?;
                params.push((param.name().to_string(), single.to_string()));
                continue;
            }

            if structure.is_time_dimension(key) {
                return Err(invalid(format!(
                    "{key} is the time dimension; use startPeriod/endPeriod"
                )));
            }

            let index = dimensions
                .iter()
                .position(|dimension| dimension.id.eq_ignore_ascii_case(key))
                .ok_or_else(|| invalid(format!("{key} is not a dimension of {dataset}")))?;

            if selections[index].is_some() {
                return Err(invalid(format!("{key} is given more than once")));
            }

            let codelist = dimensions[index]
                .codelist
                .as_deref()
                .and_then(|id| structure.codelist(id));
            if let Some(codelist) = codelist {
                if let Some(code) = value.values().iter().find(|code| !codelist.contains(code)) {
                    return Err(invalid(format!(
                        "{code} is not a code of {} ({key})",
                        codelist.id
                    )));
                }
            }
            selections[index] = Some(value.values());
        }

        let key = selections
            .iter()
            .any(Option::is_some)
            .then(|| {
                selections
                    .iter()
                    .map(|selection| selection.map(|codes| codes.join("+")).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(".")
            });

        Ok(DataQuery { key, params })
    }
}

/// Validated data request: positional series key plus extra query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataQuery {
    pub key: Option<String>,
    pub params: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_dataset_id_valid() {
        let id: DatasetId = " nama_10_gdp ".parse().unwrap();
        assert_eq!(id.as_str(), "nama_10_gdp");
        let id: DatasetId = "nama.10".parse().unwrap();
        assert_eq!(id.as_str(), "nama.10");
        assert!(".hidden".parse::<DatasetId>().is_err());
    }

    #[test]
    fn parse_dataset_id_rejects_paths() {
        let err = "../etc".parse::<DatasetId>().unwrap_err();
        assert_matches!(err, FetchError::InvalidDatasetId(_));
        assert!("".parse::<DatasetId>().is_err());
        assert!("a/b".parse::<DatasetId>().is_err());
    }

    #[test]
    fn option_value_shapes() {
        assert_eq!(
            OptionValue::from_json(&json!("IE")).unwrap(),
            OptionValue::Single("IE".to_string())
        );
        assert_eq!(
            OptionValue::from_json(&json!(["IE", "FR"])).unwrap().values(),
            ["IE".to_string(), "FR".to_string()]
        );
        assert_eq!(
            OptionValue::from_json(&json!(5)).unwrap(),
            OptionValue::Single("5".to_string())
        );
        assert!(OptionValue::from_json(&json!([])).is_err());
        assert!(OptionValue::from_json(&json!({"a": 1})).is_err());
        assert!(OptionValue::from_json(&json!(true)).is_err());
        assert!(OptionValue::from_json(&json!([["IE"]])).is_err());
    }

    #[test]
    fn period_policy() {
        for ok in ["2020", "2020-01", "2020-01-31", "2020-Q3", "2020-S1", "2020-W07"] {
            assert!(QueryParam::StartPeriod.check(ok).is_ok(), "{ok}");
        }
        for bad in ["20", "2020-Q5", "last year", "2020/01"] {
            assert!(QueryParam::EndPeriod.check(bad).is_err(), "{bad}");
        }
        assert!(QueryParam::LastN.check("3").is_ok());
        assert!(QueryParam::LastN.check("0").is_err());
    }
}
