use std::{
    io::{Read, Seek, SeekFrom},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use super::{
    converter::{LayoutConverter, StructureConverter, convert_buffer},
    fallback::{EMPTY_PDF_MESSAGE, FallbackChain, single_pass_page_text},
    file_kind::FileKind,
    ocr::PageOcr,
    tabular::TabularExtractor,
    temp::TempWorkspace,
    types::{ErrorKind, NormalizedDocument},
};
use crate::config::IngestionConfig;

/// Turns uploaded bytes into a [`NormalizedDocument`]. Never fails: every
/// problem is reported as an error document.
pub struct Ingestor {
    converter: Arc<dyn StructureConverter>,
    chain: FallbackChain,
    tabular: TabularExtractor,
    workspace: TempWorkspace,
    use_ocr: bool,
}

impl Ingestor {
    pub fn new(config: &IngestionConfig) -> Self {
        let ocr = PageOcr::from_config(config);
        Self::with_components(
            Arc::new(LayoutConverter::new(ocr.clone())),
            FallbackChain::standard(ocr, config.force_ocr),
            TempWorkspace::new(config.temp_dir.clone()),
            config.use_ocr,
        )
    }

    pub fn with_components(
        converter: Arc<dyn StructureConverter>,
        chain: FallbackChain,
        workspace: TempWorkspace,
        use_ocr: bool,
    ) -> Self {
        Self {
            converter,
            chain,
            tabular: TabularExtractor::new(),
            workspace,
            use_ocr,
        }
    }

    pub fn ingest(&self, bytes: &[u8], filename: &str) -> NormalizedDocument {
        let kind = FileKind::from_filename(filename);
        info!(filename, ?kind, size = bytes.len(), "ingesting document");

        if let FileKind::Unsupported(ext) = &kind {
            warn!(filename, "unsupported file type");
            return NormalizedDocument::error(
                ErrorKind::UnsupportedFileType,
                format!("Unsupported file type: .{ext}"),
            );
        }

        match catch_unwind(AssertUnwindSafe(|| self.dispatch(bytes, &kind))) {
            Ok(doc) => doc,
            Err(_) => {
                error!(filename, "ingestion panicked");
                NormalizedDocument::error(
                    ErrorKind::ParsingError,
                    "Error parsing file: extractor panicked",
                )
            }
        }
    }

    /// Reads the whole stream once, restores its position, then ingests the
    /// owned copy.
    pub fn ingest_reader<R: Read + Seek>(&self, reader: &mut R, filename: &str) -> NormalizedDocument {
        match read_preserving_position(reader) {
            Ok(bytes) => self.ingest(&bytes, filename),
            Err(err) => {
                error!(filename, error = %err, "failed to read upload");
                NormalizedDocument::error(ErrorKind::ParsingError, format!("Error parsing file: {err:#}"))
            }
        }
    }

    fn dispatch(&self, bytes: &[u8], kind: &FileKind) -> NormalizedDocument {
        match kind {
            FileKind::Tabular(tabular) => self.tabular.extract(bytes, *tabular),
            FileKind::Pdf => self.ingest_pdf(bytes),
            FileKind::Unsupported(ext) => NormalizedDocument::error(
                ErrorKind::UnsupportedFileType,
                format!("Unsupported file type: .{ext}"),
            ),
        }
    }

    fn ingest_pdf(&self, bytes: &[u8]) -> NormalizedDocument {
        let primary = convert_buffer(self.converter.as_ref(), &self.workspace, bytes, self.use_ocr);
        let readable = primary
            .structure
            .as_ref()
            .is_some_and(|tree| tree.has_text());
        if primary.success && readable {
            if let Some(structure) = primary.structure {
                info!(pages = primary.metadata.page_count, "structure-aware conversion succeeded");
                return NormalizedDocument::StructuredPdf {
                    text: primary.text,
                    metadata: primary.metadata,
                    structure,
                };
            }
        }

        let conversion_status = primary
            .error_reason
            .clone()
            .unwrap_or_else(|| "conversion produced no text".to_string());
        warn!(reason = %conversion_status, "falling back to text extractors");

        match self
            .chain
            .run_with_ocr_exhausted(bytes, &primary.ocr_exhausted_pages)
        {
            Ok(outcome) if outcome.has_text() => {
                let mut metadata = outcome.metadata;
                metadata.conversion_status = Some(conversion_status);
                NormalizedDocument::PlainText {
                    text: outcome.text,
                    metadata,
                }
            }
            Ok(_) => {
                warn!("no extractor found readable text");
                NormalizedDocument::error(ErrorKind::EmptyPdf, EMPTY_PDF_MESSAGE)
            }
            Err(err) => {
                warn!(error = %err, "fallback chain failed, trying single-pass extraction");
                single_pass_page_text(bytes)
            }
        }
    }
}

fn read_preserving_position<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    let start = reader.stream_position().context("failed to query stream position")?;
    let mut bytes = Vec::new();
    let read = reader.read_to_end(&mut bytes).context("failed to read stream");
    reader
        .seek(SeekFrom::Start(start))
        .context("failed to restore stream position")?;
    read?;
    Ok(bytes)
}
