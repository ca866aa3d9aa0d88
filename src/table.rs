use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};

use crate::error::FetchError;

const DROPPED_COLUMNS: [&str; 2] = ["DATAFLOW", "LAST UPDATE"];
const OBS_VALUE: &str = "OBS_VALUE";
pub const VALUE_COLUMN: &str = "value";

/// Flattened observation table: every index (dimensions, time period) is a
/// regular column next to the observation value and its attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ObservationTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, FetchError> {
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(FetchError::Sdmx(format!(
                "row has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parse an SDMX-CSV 1.0 payload as served by Eurostat.
    pub fn from_sdmx_csv(payload: &str) -> Result<Self, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(payload.trim_start_matches('\u{feff}').as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| FetchError::Sdmx(err.to_string()))?
            .clone();

        let kept = headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !DROPPED_COLUMNS.contains(name))
            .map(|(index, name)| (index, name.to_string()))
            .collect::<Vec<_>>();
        let value_index = headers
            .iter()
            .position(|name| name == OBS_VALUE)
            .ok_or_else(|| FetchError::Sdmx("SDMX-CSV payload has no OBS_VALUE column".to_string()))?;

        let columns = kept
            .iter()
            .map(|(index, name)| {
                if *index == value_index {
                    VALUE_COLUMN.to_string()
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| FetchError::Sdmx(err.to_string()))?;
            let mut row = Vec::with_capacity(kept.len());
            for (index, _) in &kept {
                let cell = record.get(*index).unwrap_or("").trim();
                let value = if *index == value_index {
                    parse_observation(cell).ok_or_else(|| {
                        FetchError::Sdmx(format!(
                            "non-numeric observation {cell:?} on data row {}",
                            line + 1
                        ))
                    })?
                } else if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                row.push(value);
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }
}

/// Serializes as a list of records, one object per row, in column order.
impl Serialize for ObservationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&Record {
                columns: &self.columns,
                cells: row,
            })?;
        }
        seq.end()
    }
}

struct Record<'a> {
    columns: &'a [String],
    cells: &'a [Value],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

fn parse_observation(cell: &str) -> Option<Value> {
    if cell.is_empty() || cell == ":" {
        return Some(Value::Null);
    }
    let value = cell.parse::<f64>().ok()?;
    Some(Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null))
}
