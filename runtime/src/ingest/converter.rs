use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    layout::{self, PdfLayout, TextLine},
    ocr::PageOcr,
    structure::{Block, PageNode, StructureTree},
    temp::TempWorkspace,
    types::{ExtractionMethod, ExtractionResult, PdfMetadata},
};

const HEADING_SIZE_RATIO: f32 = 1.2;
const MAX_HEADING_CHARS: usize = 120;
const MAX_HEADING_LEVEL: u8 = 4;
/// Vertical distance (in line heights) that ends a paragraph.
const PARAGRAPH_BREAK_LINES: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Success,
    PartialSuccess,
    Failure,
    Unsupported,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Success => "success",
            ConversionStatus::PartialSuccess => "partial_success",
            ConversionStatus::Failure => "failure",
            ConversionStatus::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Conversion {
    pub status: ConversionStatus,
    pub tree: Option<StructureTree>,
    pub detail: Option<String>,
    /// Pages OCR ran on (or failed on) without yielding text.
    pub ocr_exhausted: Vec<u32>,
}

impl Conversion {
    fn rejected(status: ConversionStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            tree: None,
            detail: Some(detail.into()),
            ocr_exhausted: Vec::new(),
        }
    }
}

/// Structure-aware conversion of a PDF on disk.
pub trait StructureConverter: Send + Sync {
    fn convert(&self, path: &Path, use_ocr: bool) -> Conversion;
}

/// Builds a structure tree from font sizes and positions in the content streams.
#[derive(Clone)]
pub struct LayoutConverter {
    ocr: PageOcr,
}

impl LayoutConverter {
    pub fn new(ocr: PageOcr) -> Self {
        Self { ocr }
    }
}

impl StructureConverter for LayoutConverter {
    fn convert(&self, path: &Path, use_ocr: bool) -> Conversion {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                return Conversion::rejected(ConversionStatus::Failure, format!("read failed: {err}"));
            }
        };
        if !bytes.starts_with(b"%PDF") {
            return Conversion::rejected(ConversionStatus::Unsupported, "missing PDF header");
        }

        let doc = match layout::load_pdf(&bytes) {
            Ok(doc) => doc,
            Err(err) => return Conversion::rejected(ConversionStatus::Failure, format!("{err:#}")),
        };
        let layout = layout::analyze(&doc);
        if layout.pages.is_empty() {
            return Conversion::rejected(ConversionStatus::Failure, "document has no pages");
        }

        let mut tree = build_tree(&layout);
        let ocr_exhausted = if use_ocr {
            self.ocr_image_only_pages(path, &layout, &mut tree)
        } else {
            Vec::new()
        };

        let failed = layout.failed_pages();
        let status = if failed == layout.pages.len() {
            ConversionStatus::Failure
        } else if failed > 0 {
            ConversionStatus::PartialSuccess
        } else {
            ConversionStatus::Success
        };

        Conversion {
            status,
            detail: (failed > 0).then(|| format!("{failed} page(s) undecodable")),
            tree: Some(tree),
            ocr_exhausted,
        }
    }
}

impl LayoutConverter {
    /// Returns the targeted pages that came back without text.
    fn ocr_image_only_pages(&self, path: &Path, layout: &PdfLayout, tree: &mut StructureTree) -> Vec<u32> {
        let targets: Vec<u32> = layout
            .pages
            .iter()
            .filter(|page| !page.images.is_empty() && !page.has_text())
            .map(|page| page.page_no)
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        match self.ocr.ocr_pages(path, &targets) {
            Ok(recognized) => {
                let exhausted = targets
                    .iter()
                    .copied()
                    .filter(|page_no| !recognized.iter().any(|(done, _)| done == page_no))
                    .collect();
                for (page_no, text) in recognized {
                    if let Some(page) = tree.pages.iter_mut().find(|p| p.page_no == page_no) {
                        page.ocr = true;
                        page.blocks.extend(
                            text.split("\n\n")
                                .map(str::trim)
                                .filter(|chunk| !chunk.is_empty())
                                .map(|chunk| Block::Paragraph {
                                    text: chunk.to_string(),
                                }),
                        );
                    }
                }
                exhausted
            }
            Err(err) => {
                warn!(error = %err, "ocr during conversion failed");
                targets
            }
        }
    }
}

/// Materializes `bytes` to a scoped temp file, converts it, and removes the
/// file before returning.
pub fn convert_buffer(
    converter: &dyn StructureConverter,
    workspace: &TempWorkspace,
    bytes: &[u8],
    use_ocr: bool,
) -> ExtractionResult {
    let staged = match workspace.materialize(bytes, ".pdf") {
        Ok(staged) => staged,
        Err(err) => {
            warn!(error = %err, "failed to stage pdf for conversion");
            return ExtractionResult::failed(ExtractionMethod::StructureAware, format!("{err:#}"));
        }
    };
    convert_path(converter, staged.path(), use_ocr)
}

pub fn convert_path(converter: &dyn StructureConverter, path: &Path, use_ocr: bool) -> ExtractionResult {
    info!(path = %path.display(), use_ocr, "running structure-aware conversion");
    let conversion = match catch_unwind(AssertUnwindSafe(|| converter.convert(path, use_ocr))) {
        Ok(conversion) => conversion,
        Err(_) => {
            warn!("structure-aware converter panicked");
            return ExtractionResult::failed(ExtractionMethod::StructureAware, "converter panicked");
        }
    };

    let ocr_exhausted_pages = conversion.ocr_exhausted;
    let tree = match (conversion.status, conversion.tree) {
        (ConversionStatus::Success, Some(tree)) => tree,
        (status, _) => {
            warn!(%status, detail = ?conversion.detail, "structure-aware conversion rejected");
            let mut result = ExtractionResult::failed(
                ExtractionMethod::StructureAware,
                format!("conversion failed with status: {status}"),
            );
            result.ocr_exhausted_pages = ocr_exhausted_pages;
            return result;
        }
    };

    let mut metadata = PdfMetadata::new(ExtractionMethod::StructureAware);
    metadata.page_count = tree.page_count();
    metadata.has_images = tree.has_images();
    metadata.has_ocr = tree.used_ocr();
    metadata.title = tree.title.clone();

    ExtractionResult {
        success: true,
        text: tree.to_markdown(),
        error_reason: None,
        metadata,
        structure: Some(tree),
        ocr_exhausted_pages,
    }
}

fn size_key(size: f32) -> i32 {
    (size * 2.0).round() as i32
}

pub fn build_tree(layout: &PdfLayout) -> StructureTree {
    let page_lines: Vec<Vec<TextLine>> = layout.pages.iter().map(|page| page.lines()).collect();

    let mut weights: HashMap<i32, usize> = HashMap::new();
    for line in page_lines.iter().flatten() {
        *weights.entry(size_key(line.font_size)).or_default() += line.char_count();
    }
    let body_key = weights
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(key, _)| *key)
        .unwrap_or(24);
    let body_size = body_key as f32 / 2.0;

    let heading_keys: Vec<i32> = weights
        .keys()
        .copied()
        .filter(|key| *key as f32 / 2.0 >= body_size * HEADING_SIZE_RATIO)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
        .collect();
    let heading_level = |line: &TextLine| -> Option<u8> {
        if line.char_count() > MAX_HEADING_CHARS {
            return None;
        }
        heading_keys
            .iter()
            .position(|key| *key == size_key(line.font_size))
            .map(|rank| (rank as u8 + 1).min(MAX_HEADING_LEVEL))
    };

    let mut pages = Vec::with_capacity(layout.pages.len());
    for (page, lines) in layout.pages.iter().zip(&page_lines) {
        let mut node = PageNode::new(page.page_no);
        let mut paragraph: Vec<String> = Vec::new();
        let mut last_y: Option<f32> = None;

        let flush = |paragraph: &mut Vec<String>, blocks: &mut Vec<Block>| {
            if !paragraph.is_empty() {
                blocks.push(Block::Paragraph {
                    text: paragraph.join(" "),
                });
                paragraph.clear();
            }
        };

        let mut idx = 0;
        while idx < lines.len() {
            let line = &lines[idx];

            if let Some(level) = heading_level(line) {
                flush(&mut paragraph, &mut node.blocks);
                node.blocks.push(Block::Heading {
                    text: line.text(),
                    level,
                });
                last_y = None;
                idx += 1;
                continue;
            }

            if line.cells.len() >= 2 {
                let end = lines[idx..]
                    .iter()
                    .position(|l| l.cells.len() < 2 || heading_level(l).is_some())
                    .map(|offset| idx + offset)
                    .unwrap_or(lines.len());
                if end - idx >= 2 {
                    flush(&mut paragraph, &mut node.blocks);
                    node.blocks.push(Block::Table {
                        rows: lines[idx..end].iter().map(|l| l.cells.clone()).collect(),
                    });
                    last_y = None;
                    idx = end;
                    continue;
                }
            }

            let gap_break = last_y.is_some_and(|y| {
                (y - line.y).abs() > line.font_size.max(1.0) * PARAGRAPH_BREAK_LINES
            });
            if gap_break {
                flush(&mut paragraph, &mut node.blocks);
            }
            paragraph.push(line.text());
            last_y = Some(line.y);
            idx += 1;
        }
        flush(&mut paragraph, &mut node.blocks);

        node.blocks
            .extend(page.images.iter().cloned().map(Block::Image));
        pages.push(node);
    }

    let title = layout.title.clone().or_else(|| {
        pages.iter().find_map(|page: &PageNode| {
            page.blocks.iter().find_map(|block| match block {
                Block::Heading { text, level: 1 } => Some(text.clone()),
                _ => None,
            })
        })
    });

    StructureTree { title, pages }
}
