use std::path::Path;

use anyhow::{Result, anyhow};

use super::tabular::TabularKind;

/// File families the ingestor knows how to read, keyed by extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Tabular(TabularKind),
    Unsupported(String),
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Self {
        let extension = extension_of(filename).unwrap_or_default();
        match extension.as_str() {
            "pdf" => FileKind::Pdf,
            "csv" => FileKind::Tabular(TabularKind::Csv),
            "xlsx" | "xls" => FileKind::Tabular(TabularKind::Spreadsheet),
            _ => FileKind::Unsupported(extension),
        }
    }
}

/// Lower-cased extension of `filename`, without the leading dot.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
}

pub fn normalize_extension(ext: &str) -> String {
    if let Some(stripped) = ext.strip_prefix('.') {
        stripped.to_ascii_lowercase()
    } else {
        ext.to_ascii_lowercase()
    }
}

/// Rejects names that could escape a directory when used as a path segment.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("filename cannot be empty"));
    }

    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(anyhow!("invalid filename"));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_case_insensitive() {
        assert_eq!(FileKind::from_filename("Report.PDF"), FileKind::Pdf);
        assert_eq!(
            FileKind::from_filename("data.Xls"),
            FileKind::Tabular(TabularKind::Spreadsheet)
        );
        assert_eq!(
            FileKind::from_filename("notes.docx"),
            FileKind::Unsupported("docx".into())
        );
        assert_eq!(
            FileKind::from_filename("README"),
            FileKind::Unsupported(String::new())
        );
    }

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("  ").is_err());
        assert_eq!(sanitize_filename(" a.pdf ").unwrap(), "a.pdf");
    }
}
