use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::structure::StructureTree;

/// Column layout of one parsed table (a CSV file or a single sheet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TabularMetadata {
    Csv(TableMetadata),
    Spreadsheet {
        sheet_count: usize,
        sheets: BTreeMap<String, TableMetadata>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    #[serde(rename = "structure_aware")]
    StructureAware,
    #[serde(rename = "direct_layer")]
    DirectLayer,
    #[serde(rename = "direct_layer+ocr")]
    DirectLayerWithOcr,
    #[serde(rename = "ocr")]
    Ocr,
    #[serde(rename = "partition")]
    Partition,
    #[serde(rename = "last_resort")]
    LastResort,
    #[serde(rename = "single_pass")]
    SinglePass,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::StructureAware => "structure_aware",
            ExtractionMethod::DirectLayer => "direct_layer",
            ExtractionMethod::DirectLayerWithOcr => "direct_layer+ocr",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Partition => "partition",
            ExtractionMethod::LastResort => "last_resort",
            ExtractionMethod::SinglePass => "single_pass",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a PDF extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub page_count: usize,
    pub has_images: bool,
    pub has_ocr: bool,
    pub extraction_method: ExtractionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Status reported by a rejected structure-aware attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_status: Option<String>,
}

impl PdfMetadata {
    pub fn new(extraction_method: ExtractionMethod) -> Self {
        Self {
            page_count: 0,
            has_images: false,
            has_ocr: false,
            extraction_method,
            title: None,
            conversion_status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFileType,
    CsvParsingError,
    ExcelParsingError,
    PdfParsingError,
    EmptyPdf,
    ParsingError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
            ErrorKind::CsvParsingError => "csv_parsing_error",
            ErrorKind::ExcelParsingError => "excel_parsing_error",
            ErrorKind::PdfParsingError => "pdf_parsing_error",
            ErrorKind::EmptyPdf => "empty_pdf",
            ErrorKind::ParsingError => "parsing_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single output record of an ingestion call.
///
/// Each variant carries exactly the fields it guarantees, so callers match on
/// the variant instead of probing for optional data. A structure tree only
/// exists on [`NormalizedDocument::StructuredPdf`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedDocument {
    Tabular {
        text: String,
        metadata: TabularMetadata,
    },
    StructuredPdf {
        text: String,
        metadata: PdfMetadata,
        structure: StructureTree,
    },
    PlainText {
        text: String,
        metadata: PdfMetadata,
    },
    Error {
        text: String,
        error: ErrorKind,
    },
}

impl NormalizedDocument {
    pub fn error(kind: ErrorKind, text: impl Into<String>) -> Self {
        NormalizedDocument::Error {
            text: text.into(),
            error: kind,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            NormalizedDocument::Tabular { text, .. }
            | NormalizedDocument::StructuredPdf { text, .. }
            | NormalizedDocument::PlainText { text, .. }
            | NormalizedDocument::Error { text, .. } => text,
        }
    }

    pub fn structure_tree(&self) -> Option<&StructureTree> {
        match self {
            NormalizedDocument::StructuredPdf { structure, .. } => Some(structure),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            NormalizedDocument::Error { error, .. } => Some(*error),
            _ => None,
        }
    }

    pub fn extraction_method(&self) -> Option<ExtractionMethod> {
        match self {
            NormalizedDocument::StructuredPdf { metadata, .. }
            | NormalizedDocument::PlainText { metadata, .. } => Some(metadata.extraction_method),
            _ => None,
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, NormalizedDocument::Tabular { .. })
    }

    /// Flat metadata mapping as exposed to API clients.
    pub fn metadata(&self) -> Map<String, Value> {
        let value = match self {
            NormalizedDocument::Tabular { metadata, .. } => {
                serde_json::to_value(metadata).unwrap_or_else(|_| json!({}))
            }
            NormalizedDocument::StructuredPdf { metadata, .. }
            | NormalizedDocument::PlainText { metadata, .. } => {
                serde_json::to_value(metadata).unwrap_or_else(|_| json!({}))
            }
            NormalizedDocument::Error { error, .. } => json!({ "error": error.as_str() }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Outcome of a single extraction strategy. Consumed by the orchestrator only.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub success: bool,
    pub text: String,
    pub error_reason: Option<String>,
    pub metadata: PdfMetadata,
    pub structure: Option<StructureTree>,
    /// Pages already OCR'd without recovering any text.
    pub ocr_exhausted_pages: Vec<u32>,
}

impl ExtractionResult {
    pub fn failed(method: ExtractionMethod, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            error_reason: Some(reason.into()),
            metadata: PdfMetadata::new(method),
            structure: None,
            ocr_exhausted_pages: Vec::new(),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
