use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use super::{
    layout,
    ocr::PageOcr,
    types::{ErrorKind, ExtractionMethod, NormalizedDocument, PdfMetadata},
};

/// Facts gathered by earlier steps and read by later ones.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub page_count: usize,
    pub has_images: bool,
    pub used_ocr: bool,
    /// Text the direct layer found but deemed incomplete.
    pub partial_text: String,
    pub force_ocr: bool,
    /// Pages an earlier OCR pass already tried without result.
    pub ocr_exhausted: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Text {
        text: String,
        method: ExtractionMethod,
    },
    /// Usable text that a later step may extend.
    Partial(String),
    Empty,
}

pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, _state: &ChainState) -> bool {
        true
    }

    fn extract(&self, bytes: &[u8], state: &mut ChainState) -> Result<StepOutput>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub text: String,
    pub metadata: PdfMetadata,
}

impl FallbackOutcome {
    fn new(text: String, method: ExtractionMethod, state: &ChainState) -> Self {
        let mut metadata = PdfMetadata::new(method);
        metadata.page_count = state.page_count;
        metadata.has_images = state.has_images;
        metadata.has_ocr = state.used_ocr;
        Self { text, metadata }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Ordered text extractors tried until one yields text.
pub struct FallbackChain {
    strategies: Vec<Box<dyn FallbackStrategy>>,
    force_ocr: bool,
}

impl FallbackChain {
    pub fn new(strategies: Vec<Box<dyn FallbackStrategy>>, force_ocr: bool) -> Self {
        Self {
            strategies,
            force_ocr,
        }
    }

    /// Direct layer, OCR, partition, last resort.
    pub fn standard(ocr: PageOcr, force_ocr: bool) -> Self {
        Self::new(
            vec![
                Box::new(DirectLayer),
                Box::new(OcrPages::new(ocr)),
                Box::new(Partition),
                Box::new(LastResort),
            ],
            force_ocr,
        )
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain. Returns an empty outcome when every step ran but found
    /// nothing, and `Err` only when every applicable step failed outright.
    pub fn run(&self, bytes: &[u8]) -> Result<FallbackOutcome> {
        self.run_with_ocr_exhausted(bytes, &[])
    }

    /// Like [`run`](Self::run), but the OCR step skips `ocr_exhausted` pages.
    pub fn run_with_ocr_exhausted(&self, bytes: &[u8], ocr_exhausted: &[u32]) -> Result<FallbackOutcome> {
        let mut state = ChainState {
            force_ocr: self.force_ocr,
            ocr_exhausted: ocr_exhausted.to_vec(),
            ..ChainState::default()
        };
        let mut failures = Vec::new();
        let mut completed = 0usize;

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.applies(&state) {
                info!(strategy = name, "skipping fallback strategy");
                continue;
            }

            info!(strategy = name, "trying fallback strategy");
            let result = catch_unwind(AssertUnwindSafe(|| strategy.extract(bytes, &mut state)));
            match result {
                Ok(Ok(StepOutput::Text { text, method })) if !text.trim().is_empty() => {
                    info!(strategy = name, chars = text.len(), "fallback strategy produced text");
                    return Ok(FallbackOutcome::new(text, method, &state));
                }
                Ok(Ok(StepOutput::Partial(text))) => {
                    completed += 1;
                    info!(strategy = name, chars = text.len(), "fallback strategy produced partial text");
                    state.partial_text = text;
                }
                Ok(Ok(_)) => {
                    completed += 1;
                    warn!(strategy = name, "fallback strategy produced no text");
                }
                Ok(Err(err)) => {
                    warn!(strategy = name, error = %err, "fallback strategy failed");
                    failures.push(format!("{name}: {err:#}"));
                }
                Err(_) => {
                    warn!(strategy = name, "fallback strategy panicked");
                    failures.push(format!("{name}: panicked"));
                }
            }
        }

        if !state.partial_text.trim().is_empty() {
            let text = std::mem::take(&mut state.partial_text);
            return Ok(FallbackOutcome::new(text, ExtractionMethod::DirectLayer, &state));
        }

        if completed == 0 && !failures.is_empty() {
            return Err(anyhow!("every fallback strategy failed: {}", failures.join("; ")));
        }

        Ok(FallbackOutcome::new(String::new(), ExtractionMethod::LastResort, &state))
    }
}

fn join_non_empty<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Per-page text from pdf-extract, which resolves font encodings and form
/// XObjects the layout pass does not. lopdf still supplies page and image facts.
pub struct DirectLayer;

impl FallbackStrategy for DirectLayer {
    fn name(&self) -> &'static str {
        "direct_layer"
    }

    fn extract(&self, bytes: &[u8], state: &mut ChainState) -> Result<StepOutput> {
        let doc = layout::load_pdf(bytes)?;
        let pdf = layout::analyze(&doc);
        state.page_count = pdf.pages.len();
        state.has_images = pdf.has_images();

        let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|err| anyhow!("pdf-extract failed: {err}"))?;
        let text = join_non_empty(page_texts.iter().cloned());
        if text.is_empty() {
            return Ok(StepOutput::Empty);
        }

        // Image-bearing pages without a text layer mean the text is incomplete.
        let incomplete = pdf.pages.iter().enumerate().any(|(idx, page)| {
            !page.images.is_empty()
                && page_texts
                    .get(idx)
                    .is_none_or(|text| text.trim().is_empty())
        });
        if state.force_ocr && state.has_images && incomplete {
            return Ok(StepOutput::Partial(text));
        }

        Ok(StepOutput::Text {
            text,
            method: ExtractionMethod::DirectLayer,
        })
    }
}

/// Renders every page not already tried and OCRs it, keeping any
/// direct-layer text.
pub struct OcrPages {
    ocr: PageOcr,
}

impl OcrPages {
    pub fn new(ocr: PageOcr) -> Self {
        Self { ocr }
    }
}

impl FallbackStrategy for OcrPages {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn applies(&self, state: &ChainState) -> bool {
        state.has_images
    }

    fn extract(&self, bytes: &[u8], state: &mut ChainState) -> Result<StepOutput> {
        if state.page_count == 0 {
            state.page_count = layout::load_pdf(bytes)?.get_pages().len();
        }
        let pages: Vec<u32> = (1..=state.page_count as u32)
            .filter(|page_no| !state.ocr_exhausted.contains(page_no))
            .collect();
        if pages.is_empty() {
            info!(skipped = state.ocr_exhausted.len(), "every page already tried by ocr");
            return Ok(StepOutput::Empty);
        }

        let staged = self.ocr.workspace().materialize(bytes, ".pdf")?;
        let recognized = self
            .ocr
            .ocr_pages(staged.path(), &pages)
            .context("ocr pass failed")?;
        state.used_ocr = true;

        let ocr_text = join_non_empty(recognized.into_iter().map(|(_, text)| text));
        if ocr_text.is_empty() {
            return Ok(StepOutput::Empty);
        }

        if state.partial_text.trim().is_empty() {
            Ok(StepOutput::Text {
                text: ocr_text,
                method: ExtractionMethod::Ocr,
            })
        } else {
            let partial = std::mem::take(&mut state.partial_text);
            Ok(StepOutput::Text {
                text: format!("{}\n\n{}", partial.trim(), ocr_text),
                method: ExtractionMethod::DirectLayerWithOcr,
            })
        }
    }
}

/// Whole-document extraction split into elements.
pub struct Partition;

impl FallbackStrategy for Partition {
    fn name(&self) -> &'static str {
        "partition"
    }

    fn extract(&self, bytes: &[u8], _state: &mut ChainState) -> Result<StepOutput> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|err| anyhow!("pdf-extract failed: {err}"))?;
        let elements = text
            .split("\n\n")
            .flat_map(|chunk| chunk.split('\u{c}'))
            .map(str::to_string);
        let text = join_non_empty(elements);
        if text.is_empty() {
            return Ok(StepOutput::Empty);
        }
        Ok(StepOutput::Text {
            text,
            method: ExtractionMethod::Partition,
        })
    }
}

/// Page-by-page text through lopdf's own decoder.
pub struct LastResort;

impl FallbackStrategy for LastResort {
    fn name(&self) -> &'static str {
        "last_resort"
    }

    fn extract(&self, bytes: &[u8], state: &mut ChainState) -> Result<StepOutput> {
        let doc = layout::load_pdf(bytes)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        state.page_count = state.page_count.max(page_numbers.len());

        let text = join_non_empty(
            page_numbers
                .iter()
                .filter_map(|page| doc.extract_text(&[*page]).ok()),
        );
        if text.is_empty() {
            return Ok(StepOutput::Empty);
        }
        Ok(StepOutput::Text {
            text,
            method: ExtractionMethod::LastResort,
        })
    }
}

/// Single pass over every page at once, used when the chain itself errors.
pub fn single_pass_page_text(bytes: &[u8]) -> NormalizedDocument {
    let extracted = catch_unwind(AssertUnwindSafe(|| -> Result<(String, usize)> {
        let doc = layout::load_pdf(bytes)?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let text = doc
            .extract_text(&pages)
            .map_err(|err| anyhow!("text extraction failed: {err}"))?;
        Ok((text, pages.len()))
    }));

    match extracted {
        Ok(Ok((text, page_count))) if !text.trim().is_empty() => {
            let mut metadata = PdfMetadata::new(ExtractionMethod::SinglePass);
            metadata.page_count = page_count;
            NormalizedDocument::PlainText {
                text: text.trim().to_string(),
                metadata,
            }
        }
        Ok(Ok(_)) => NormalizedDocument::error(ErrorKind::EmptyPdf, EMPTY_PDF_MESSAGE),
        Ok(Err(err)) => {
            warn!(error = %err, "single-pass extraction failed");
            NormalizedDocument::error(ErrorKind::PdfParsingError, format!("Error parsing PDF: {err:#}"))
        }
        Err(_) => NormalizedDocument::error(ErrorKind::PdfParsingError, "Error parsing PDF: parser panicked"),
    }
}

pub const EMPTY_PDF_MESSAGE: &str = "No readable text found in the PDF.";

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    struct Scripted {
        name: &'static str,
        output: fn() -> Result<StepOutput>,
        calls: Arc<AtomicUsize>,
    }

    impl FallbackStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extract(&self, _bytes: &[u8], _state: &mut ChainState) -> Result<StepOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.output)()
        }
    }

    fn scripted(name: &'static str, output: fn() -> Result<StepOutput>) -> (Box<dyn FallbackStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                name,
                output,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn text(method: ExtractionMethod) -> Result<StepOutput> {
        Ok(StepOutput::Text {
            text: "found".into(),
            method,
        })
    }

    #[test]
    fn first_non_empty_step_wins() {
        let (failing, _) = scripted("a", || Err(anyhow!("boom")));
        let (empty, _) = scripted("b", || Ok(StepOutput::Empty));
        let (hit, _) = scripted("c", || text(ExtractionMethod::Partition));
        let (never, never_calls) = scripted("d", || text(ExtractionMethod::LastResort));

        let chain = FallbackChain::new(vec![failing, empty, hit, never], false);
        let outcome = chain.run(b"").unwrap();
        assert_eq!(outcome.text, "found");
        assert_eq!(outcome.metadata.extraction_method, ExtractionMethod::Partition);
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panics_fall_through() {
        let (panicking, _) = scripted("a", || panic!("third-party parser bug"));
        let (hit, _) = scripted("b", || text(ExtractionMethod::LastResort));
        let outcome = FallbackChain::new(vec![panicking, hit], false).run(b"").unwrap();
        assert_eq!(outcome.metadata.extraction_method, ExtractionMethod::LastResort);
    }

    #[test]
    fn all_empty_is_an_empty_outcome() {
        let (a, _) = scripted("a", || Ok(StepOutput::Empty));
        let (b, _) = scripted("b", || Err(anyhow!("nope")));
        let outcome = FallbackChain::new(vec![a, b], false).run(b"").unwrap();
        assert!(!outcome.has_text());
    }

    #[test]
    fn all_failing_is_an_error() {
        let (a, _) = scripted("a", || Err(anyhow!("first")));
        let (b, _) = scripted("b", || Err(anyhow!("second")));
        let err = FallbackChain::new(vec![a, b], false).run(b"").unwrap_err();
        assert!(err.to_string().contains("first"));
        assert!(err.to_string().contains("second"));
    }

    #[test]
    fn partial_text_survives_when_nothing_else_reads() {
        let (partial, _) = scripted("a", || Ok(StepOutput::Partial("half a page".into())));
        let (empty, _) = scripted("b", || Ok(StepOutput::Empty));
        let outcome = FallbackChain::new(vec![partial, empty], true).run(b"").unwrap();
        assert_eq!(outcome.text, "half a page");
        assert_eq!(outcome.metadata.extraction_method, ExtractionMethod::DirectLayer);
    }

    #[test]
    fn single_pass_on_garbage_is_a_parsing_error() {
        let doc = single_pass_page_text(b"not a pdf");
        assert_eq!(doc.error_kind(), Some(ErrorKind::PdfParsingError));
    }
}
