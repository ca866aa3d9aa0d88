use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

use crate::error::FetchError;

/// Parsed SDMX-ML 2.1 structure message for a single data-structure definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureMessage {
    pub header: Header,
    pub dimensions: Vec<Dimension>,
    pub time_dimension: Option<String>,
    pub codelists: Vec<Codelist>,
}

/// SDMX message header. Only `id`, `test`, `prepared`, `sender`, `receiver`
/// and `source` are read; see [`Header::to_text_map`] for how they are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub id: Option<String>,
    pub test: Option<String>,
    pub prepared: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub id: String,
    pub position: usize,
    pub codelist: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codelist {
    pub id: String,
    pub name: Option<String>,
    pub codes: Vec<Code>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    pub id: String,
    pub name: Option<String>,
    pub parent: Option<String>,
}

impl Header {
    /// Header fields as text, in a fixed order. Absent fields become empty
    /// strings rather than `"None"`, and only these six fields are written;
    /// `error`, `extracted` and the reporting period are not carried.
    pub fn to_text_map(&self) -> Map<String, Value> {
        let fields = [
            ("id", &self.id),
            ("test", &self.test),
            ("prepared", &self.prepared),
            ("sender", &self.sender),
            ("receiver", &self.receiver),
            ("source", &self.source),
        ];
        fields
            .into_iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    Value::String(value.clone().unwrap_or_default()),
                )
            })
            .collect()
    }
}

impl Codelist {
    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|item| item.id == code)
    }

    /// Column-oriented table of the codelist: `name` and `parent` keyed by code.
    /// Codes without a parent report the codelist id.
    pub fn to_table(&self) -> Value {
        let mut names = Map::new();
        let mut parents = Map::new();
        for code in &self.codes {
            let name = code.name.clone().map(Value::String).unwrap_or(Value::Null);
            let parent = code.parent.clone().unwrap_or_else(|| self.id.clone());
            names.insert(code.id.clone(), name);
            parents.insert(code.id.clone(), Value::String(parent));
        }
        let mut table = Map::new();
        table.insert("name".to_string(), Value::Object(names));
        table.insert("parent".to_string(), Value::Object(parents));
        Value::Object(table)
    }

    pub fn to_json_string(&self) -> Result<String, FetchError> {
        serde_json::to_string(&self.to_table())
            .map_err(|err| FetchError::Serialize(format!("codelist {}: {err}", self.id)))
    }
}

impl StructureMessage {
    pub fn parse(xml: &str) -> Result<Self, FetchError> {
        StructureParser::default().parse(xml)
    }

    pub fn codelist(&self, id: &str) -> Option<&Codelist> {
        self.codelists.iter().find(|codelist| codelist.id == id)
    }

    /// Dimensions sorted by their declared position.
    pub fn ordered_dimensions(&self) -> Vec<&Dimension> {
        let mut dimensions = self.dimensions.iter().collect::<Vec<_>>();
        dimensions.sort_by_key(|dimension| dimension.position);
        dimensions
    }

    pub fn is_time_dimension(&self, key: &str) -> bool {
        key.eq_ignore_ascii_case("TIME_PERIOD")
            || self
                .time_dimension
                .as_deref()
                .map(|id| id.eq_ignore_ascii_case(key))
                .unwrap_or(false)
    }

    /// Metadata document persisted next to the data file: the header as text
    /// plus every codelist's own JSON serialization under its id.
    pub fn metadata_document(&self) -> Result<Value, FetchError> {
        let mut document = Map::new();
        document.insert("header".to_string(), Value::Object(self.header.to_text_map()));
        for codelist in &self.codelists {
            document.insert(
                codelist.id.clone(),
                Value::String(codelist.to_json_string()?),
            );
        }
        Ok(Value::Object(document))
    }
}

#[derive(Default)]
struct StructureParser {
    message: StructureMessage,
    stack: Vec<String>,
    codelist: Option<Codelist>,
    code: Option<Code>,
    dimension: Option<Dimension>,
    name_lang: Option<String>,
}

impl StructureParser {
    fn parse(mut self, xml: &str) -> Result<StructureMessage, FetchError> {
        let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
        reader.config_mut().trim_text(true);

        let mut saw_root = false;
        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => {
                    saw_root = true;
                    let name = local_name(&element);
                    self.on_start(&name, &element)?;
                    self.stack.push(name);
                }
                Ok(Event::Empty(element)) => {
                    saw_root = true;
                    let name = local_name(&element);
                    self.on_start(&name, &element)?;
                    self.on_end(&name);
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|err| FetchError::Sdmx(err.to_string()))?;
                    self.on_text(&text);
                }
                Ok(Event::End(element)) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    self.stack.pop();
                    self.on_end(&name);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(FetchError::Sdmx(format!(
                        "xml error at byte {}: {err}",
                        reader.buffer_position()
                    )));
                }
            }
        }

        if !saw_root {
            return Err(FetchError::Sdmx("empty structure document".to_string()));
        }
        if self.message.dimensions.is_empty() && self.message.codelists.is_empty() {
            return Err(FetchError::Sdmx(
                "structure document has no dimensions or codelists".to_string(),
            ));
        }
        Ok(self.message)
    }

    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn inside(&self, name: &str) -> bool {
        self.stack.iter().any(|item| item == name)
    }

    fn on_start(&mut self, name: &str, element: &BytesStart<'_>) -> Result<(), FetchError> {
        match name {
            "Sender" if self.inside("Header") => {
                self.message.header.sender = attribute(element, "id")?;
            }
            "Receiver" if self.inside("Header") => {
                self.message.header.receiver = attribute(element, "id")?;
            }
            "Codelist" => {
                self.codelist = Some(Codelist {
                    id: required_attribute(element, "id", "Codelist")?,
                    ..Codelist::default()
                });
            }
            "Code" if self.codelist.is_some() => {
                self.code = Some(Code {
                    id: required_attribute(element, "id", "Code")?,
                    ..Code::default()
                });
            }
            "Name" => {
                self.name_lang = attribute(element, "xml:lang")?;
            }
            "Ref" => self.on_ref(element)?,
            "Dimension" if self.inside("DimensionList") => {
                let id = required_attribute(element, "id", "Dimension")?;
                let position = match attribute(element, "position")? {
                    Some(value) => value.parse::<usize>().map_err(|_| {
                        FetchError::Sdmx(format!("dimension {id} has invalid position {value}"))
                    })?,
                    None => self.message.dimensions.len() + 1,
                };
                self.dimension = Some(Dimension {
                    id,
                    position,
                    codelist: None,
                });
            }
            "TimeDimension" => {
                self.message.time_dimension = attribute(element, "id")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn on_ref(&mut self, element: &BytesStart<'_>) -> Result<(), FetchError> {
        match self.parent() {
            Some("Parent") => {
                if let Some(code) = self.code.as_mut() {
                    code.parent = attribute(element, "id")?;
                }
            }
            Some("Enumeration") => {
                if let Some(dimension) = self.dimension.as_mut() {
                    dimension.codelist = attribute(element, "id")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_text(&mut self, text: &str) {
        let depth = self.stack.len();
        let current = self.stack.last().map(String::as_str);
        let owner = depth
            .checked_sub(2)
            .and_then(|index| self.stack.get(index))
            .map(String::as_str);

        match (owner, current) {
            (Some("Header"), Some("ID")) => self.message.header.id = Some(text.to_string()),
            (Some("Header"), Some("Test")) => self.message.header.test = Some(text.to_string()),
            (Some("Header"), Some("Prepared")) => {
                self.message.header.prepared = Some(text.to_string())
            }
            (Some("Header"), Some("Source")) => {
                self.message.header.source = Some(text.to_string())
            }
            (Some("Code"), Some("Name")) => {
                let prefer = is_preferred_lang(self.name_lang.as_deref());
                if let Some(code) = self.code.as_mut() {
                    if code.name.is_none() || prefer {
                        code.name = Some(text.to_string());
                    }
                }
            }
            (Some("Codelist"), Some("Name")) => {
                let prefer = is_preferred_lang(self.name_lang.as_deref());
                if let Some(codelist) = self.codelist.as_mut() {
                    if codelist.name.is_none() || prefer {
                        codelist.name = Some(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    fn on_end(&mut self, name: &str) {
        match name {
            "Code" => {
                if let (Some(code), Some(codelist)) = (self.code.take(), self.codelist.as_mut()) {
                    codelist.codes.push(code);
                }
            }
            "Codelist" => {
                if let Some(codelist) = self.codelist.take() {
                    self.message.codelists.push(codelist);
                }
            }
            "Dimension" => {
                if let Some(dimension) = self.dimension.take() {
                    self.message.dimensions.push(dimension);
                }
            }
            "Name" => self.name_lang = None,
            _ => {}
        }
    }
}

fn is_preferred_lang(lang: Option<&str>) -> bool {
    matches!(lang, Some("en"))
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, FetchError> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|err| FetchError::Sdmx(err.to_string()))?;
    match attr {
        Some(attr) => attr
            .unescape_value()
            .map(|value| Some(value.into_owned()))
            .map_err(|err| FetchError::Sdmx(err.to_string())),
        None => Ok(None),
    }
}

fn required_attribute(
    element: &BytesStart<'_>,
    name: &str,
    owner: &str,
) -> Result<String, FetchError> {
    attribute(element, name)?
        .ok_or_else(|| FetchError::Sdmx(format!("{owner} element without {name} attribute")))
}
