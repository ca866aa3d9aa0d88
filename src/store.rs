use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::domain::DatasetId;
use crate::error::FetchError;
use crate::sdmx::StructureMessage;
use crate::table::ObservationTable;

const CHUNK_SIZE: usize = 4096;
const INDENT: &[u8] = b"    ";

/// Output directory holding three files per dataset.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: Utf8PathBuf,
}

/// Local record of one download, used later to check the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub dataset_code: String,
    pub opts: Map<String, Value>,
    pub timestamp: String,
    pub md5sum: String,
}

impl Store {
    pub fn new(data_dir: Utf8PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn data_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    pub fn metadata_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.data_dir.join(format!("{id}_metadata.json"))
    }

    pub fn record_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.data_dir.join(format!("{id}_meta_creation.json"))
    }

    pub fn ensure_data_dir(&self) -> Result<(), FetchError> {
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {}: {err}", self.data_dir)))
    }

    pub fn write_data(
        &self,
        id: &DatasetId,
        table: &ObservationTable,
    ) -> Result<Utf8PathBuf, FetchError> {
        let path = self.data_path(id);
        Self::write_json_atomic(&path, table)?;
        Ok(path)
    }

    pub fn write_metadata(
        &self,
        id: &DatasetId,
        structure: &StructureMessage,
    ) -> Result<Utf8PathBuf, FetchError> {
        let path = self.metadata_path(id);
        Self::write_json_atomic(&path, &structure.metadata_document()?)?;
        Ok(path)
    }

    /// Checksums the data file already on disk, so it must run after
    /// [`Store::write_data`].
    pub fn write_record(
        &self,
        id: &DatasetId,
        opts: &Map<String, Value>,
    ) -> Result<DownloadRecord, FetchError> {
        let record = DownloadRecord {
            dataset_code: id.to_string(),
            opts: opts.clone(),
            timestamp: timestamp(),
            md5sum: md5_file(self.data_path(id).as_std_path())?,
        };
        Self::write_json_atomic(&self.record_path(id), &record)?;
        Ok(record)
    }

    pub fn read_record(&self, id: &DatasetId) -> Result<DownloadRecord, FetchError> {
        let path = self.record_path(id);
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| FetchError::Filesystem(format!("parse {path}: {err}")))
    }

    /// Recompute the data file checksum and compare it with the recorded one.
    pub fn verify_record(&self, id: &DatasetId) -> Result<bool, FetchError> {
        let record = self.read_record(id)?;
        let actual = md5_file(self.data_path(id).as_std_path())?;
        Ok(actual == record.md5sum)
    }

    /// Pretty JSON (four-space indent) written to a temp file in the target
    /// directory, then renamed over the target.
    pub fn write_json_atomic<T: Serialize + ?Sized>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), FetchError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {parent}: {err}")))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".estat-fetch")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let mut serializer = serde_json::Serializer::with_formatter(
                &mut writer,
                PrettyFormatter::with_indent(INDENT),
            );
            value
                .serialize(&mut serializer)
                .map_err(|err| FetchError::Serialize(format!("{path}: {err}")))?;
            writer
                .flush()
                .map_err(|err| FetchError::Filesystem(format!("write {path}: {err}")))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(())
    }
}

/// Hex MD5 of a file, read in fixed-size chunks.
pub fn md5_file(path: &Path) -> Result<String, FetchError> {
    let mut file = File::open(path)
        .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|err| FetchError::Filesystem(format!("read {}: {err}", path.display())))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}
