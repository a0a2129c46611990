//! Delimited row reader
//!
//! Turns an upload into a header row plus an iterator of trimmed cell rows.
//! ZIP archives are unpacked to their first delimited entry.

use std::io::{Cursor, Read};

use specieslists_common::format::UploadFormat;
use tracing::debug;

use super::{IngestError, Upload};

/// Rows of a delimited upload
pub struct DelimitedRows {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for DelimitedRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelimitedRows")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl DelimitedRows {
    /// Open an upload of an already detected format
    pub fn open(upload: &Upload, format: UploadFormat) -> Result<Self, IngestError> {
        match format {
            UploadFormat::Csv | UploadFormat::Tsv => {
                Self::from_bytes(upload.data.clone(), format.delimiter())
            },
            UploadFormat::Zip => {
                let (name, bytes, delimiter) = first_delimited_entry(&upload.data)?;
                debug!(entry = %name, "Reading checklist from archive entry");
                Self::from_bytes(bytes, delimiter)
            },
        }
    }

    fn from_bytes(bytes: Vec<u8>, delimiter: u8) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(Cursor::new(bytes));

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').trim().to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::MissingHeader);
        }

        Ok(Self {
            headers,
            records: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for DelimitedRows {
    type Item = Result<Vec<String>, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(IngestError::from)
        })
    }
}

/// Name, contents and delimiter of the first CSV/TSV entry in an archive
fn first_delimited_entry(data: &[u8]) -> Result<(String, Vec<u8>, u8), IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        // skip macOS resource forks
        if name.starts_with("__MACOSX/") {
            continue;
        }
        let Some(format) = UploadFormat::from_extension(&name) else {
            continue;
        };
        if format == UploadFormat::Zip {
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        return Ok((name, bytes, format.delimiter()));
    }

    Err(IngestError::EmptyArchive)
}
