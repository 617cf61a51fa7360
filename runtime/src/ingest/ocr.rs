use std::{
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use super::temp::TempWorkspace;
use crate::config::IngestionConfig;

/// Rasterizes a single PDF page to an image file inside `out_dir`.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, pdf: &Path, page_no: u32, out_dir: &Path) -> Result<PathBuf>;
}

/// Recognizes the text in a rendered page image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    command: String,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(command: impl Into<String>, dpi: u32) -> Self {
        Self {
            command: command.into(),
            dpi,
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_page(&self, pdf: &Path, page_no: u32, out_dir: &Path) -> Result<PathBuf> {
        let prefix = out_dir.join(format!("page-{page_no}"));
        let page = page_no.to_string();
        let output = Command::new(&self.command)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page)
            .arg("-l")
            .arg(&page)
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .with_context(|| format!("failed to run {}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.command, output.status, stderr.trim()));
        }

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(anyhow!("{} produced no image for page {page_no}", self.command));
        }
        Ok(image)
    }
}

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    language: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &Path) -> Result<String> {
        let output = Command::new(&self.command)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .with_context(|| format!("failed to run {}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.command, output.status, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Renders pages and runs OCR over them, one scratch directory per call.
#[derive(Clone)]
pub struct PageOcr {
    renderer: Arc<dyn PageRenderer>,
    engine: Arc<dyn OcrEngine>,
    workspace: TempWorkspace,
}

impl PageOcr {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        engine: Arc<dyn OcrEngine>,
        workspace: TempWorkspace,
    ) -> Self {
        Self {
            renderer,
            engine,
            workspace,
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(
            Arc::new(PdftoppmRenderer::new(&config.pdftoppm_cmd, config.render_dpi)),
            Arc::new(TesseractEngine::new(&config.tesseract_cmd, &config.ocr_language)),
            TempWorkspace::new(config.temp_dir.clone()),
        )
    }

    pub fn workspace(&self) -> &TempWorkspace {
        &self.workspace
    }

    /// OCR text for each page that yielded any. A page that fails to render
    /// or recognize is skipped; the call only errors when no page could be
    /// processed at all.
    pub fn ocr_pages(&self, pdf: &Path, pages: &[u32]) -> Result<Vec<(u32, String)>> {
        let scratch = self.workspace.scratch_dir("ocr")?;
        let mut recognized = Vec::new();
        let mut failures = 0usize;

        for &page_no in pages {
            let text = self
                .renderer
                .render_page(pdf, page_no, scratch.path())
                .and_then(|image| self.engine.recognize(&image));
            match text {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(page = page_no, chars = text.len(), "ocr recognized text");
                    recognized.push((page_no, text.trim().to_string()));
                }
                Ok(_) => debug!(page = page_no, "ocr found no text"),
                Err(err) => {
                    failures += 1;
                    warn!(page = page_no, error = %err, "ocr failed for page");
                }
            }
        }

        if !pages.is_empty() && failures == pages.len() {
            return Err(anyhow!("ocr failed on all {} pages", pages.len()));
        }

        info!(pages = pages.len(), recognized = recognized.len(), "ocr pass finished");
        Ok(recognized)
    }
}
