//! Upload format detection
//!
//! Checklists arrive as delimited text or as a ZIP archive wrapping one. The
//! format is decided from the declared content type first and the file name
//! extension second, so that generic types such as `text/plain` and
//! `application/octet-stream` still resolve.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

/// Supported checklist upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    Csv,
    Tsv,
    Zip,
}

impl UploadFormat {
    /// Detect the format of an upload.
    ///
    /// Fails with [`CommonError::UnsupportedFormat`] when neither the content
    /// type nor the extension names a supported format.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Result<Self> {
        let from_name = file_name.and_then(Self::from_extension);

        let Some(content_type) = content_type.map(str::trim).filter(|ct| !ct.is_empty()) else {
            return from_name.ok_or_else(|| unsupported(None, file_name));
        };

        let mime: mime::Mime = content_type
            .parse()
            .map_err(|_| unsupported(Some(content_type), file_name))?;

        match mime.essence_str() {
            "text/csv" | "application/csv" | "application/vnd.ms-excel" => Ok(Self::Csv),
            "text/tab-separated-values" => Ok(Self::Tsv),
            "application/zip" | "application/x-zip-compressed" => Ok(Self::Zip),
            "text/plain" => Ok(from_name.unwrap_or(Self::Csv)),
            "application/octet-stream" => {
                from_name.ok_or_else(|| unsupported(Some(content_type), file_name))
            },
            _ => Err(unsupported(Some(content_type), file_name)),
        }
    }

    /// Format implied by a file name extension
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "txt" | "tab" => Some(Self::Tsv),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    /// Field delimiter for delimited formats
    pub fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            Self::Csv | Self::Zip => b',',
        }
    }
}

impl std::fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Tsv => write!(f, "tsv"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

fn unsupported(content_type: Option<&str>, file_name: Option<&str>) -> CommonError {
    CommonError::UnsupportedFormat(format!(
        "content type {:?}, file name {:?}",
        content_type.unwrap_or("<none>"),
        file_name.unwrap_or("<none>")
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_content_type() {
        assert_eq!(UploadFormat::detect(Some("text/csv; charset=utf-8"), None).unwrap(), UploadFormat::Csv);
        assert_eq!(UploadFormat::detect(Some("application/zip"), None).unwrap(), UploadFormat::Zip);
        assert_eq!(
            UploadFormat::detect(Some("text/tab-separated-values"), Some("x.csv")).unwrap(),
            UploadFormat::Tsv
        );
    }

    #[test]
    fn test_generic_content_type_falls_back_to_extension() {
        assert_eq!(UploadFormat::detect(Some("text/plain"), Some("list.tsv")).unwrap(), UploadFormat::Tsv);
        assert_eq!(UploadFormat::detect(Some("text/plain"), None).unwrap(), UploadFormat::Csv);
        assert_eq!(
            UploadFormat::detect(Some("application/octet-stream"), Some("dwca.ZIP")).unwrap(),
            UploadFormat::Zip
        );
    }

    #[test]
    fn test_unsupported_formats_rejected() {
        assert!(matches!(
            UploadFormat::detect(Some("application/pdf"), Some("list.csv")),
            Err(CommonError::UnsupportedFormat(_))
        ));
        assert!(UploadFormat::detect(None, Some("list.xlsx")).is_err());
        assert!(UploadFormat::detect(None, None).is_err());
        assert!(UploadFormat::detect(Some("application/octet-stream"), None).is_err());
    }

    #[test]
    fn test_delimiter() {
        assert_eq!(UploadFormat::Csv.delimiter(), b',');
        assert_eq!(UploadFormat::Tsv.delimiter(), b'\t');
    }
}
