use anyhow::{Context, Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, content::Content};
use tracing::debug;

use super::structure::ImageBlock;

/// Approximate advance of one glyph, as a fraction of the font size.
const GLYPH_ADVANCE_EM: f32 = 0.5;
/// Horizontal gap (in ems) that separates two cells on the same line.
const CELL_GAP_EM: f32 = 1.5;
/// `TJ` adjustments below this (thousandths of an em) read as a word break.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font_size: f32,
    pub x: f32,
    pub y: f32,
}

impl TextRun {
    fn end_x(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * GLYPH_ADVANCE_EM
    }
}

/// One visual line: runs sharing a baseline, split into cells on wide gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub y: f32,
    pub font_size: f32,
    pub cells: Vec<String>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.cells.join(" ")
    }

    pub fn char_count(&self) -> usize {
        self.cells.iter().map(|cell| cell.chars().count()).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub page_no: u32,
    pub runs: Vec<TextRun>,
    pub images: Vec<ImageBlock>,
    pub decode_error: Option<String>,
}

impl PageLayout {
    pub fn has_text(&self) -> bool {
        self.runs.iter().any(|run| !run.text.trim().is_empty())
    }

    pub fn lines(&self) -> Vec<TextLine> {
        group_lines(&self.runs)
    }

    /// Plain text of the page, one visual line per row.
    pub fn text(&self) -> String {
        self.lines()
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfLayout {
    pub title: Option<String>,
    pub pages: Vec<PageLayout>,
}

impl PdfLayout {
    pub fn has_images(&self) -> bool {
        self.pages.iter().any(|page| !page.images.is_empty())
    }

    pub fn failed_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.decode_error.is_some())
            .count()
    }
}

pub fn load_pdf(bytes: &[u8]) -> Result<Document> {
    if !bytes.starts_with(b"%PDF") {
        return Err(anyhow!("input does not start with a PDF header"));
    }
    Document::load_mem(bytes).context("failed to load pdf")
}

/// Decodes every page of `doc` into positioned text runs and image references.
pub fn analyze(doc: &Document) -> PdfLayout {
    let pages = doc
        .get_pages()
        .into_iter()
        .map(|(page_no, page_id)| analyze_page(doc, page_no, page_id))
        .collect();

    PdfLayout {
        title: document_title(doc),
        pages,
    }
}

fn analyze_page(doc: &Document, page_no: u32, page_id: ObjectId) -> PageLayout {
    let image_xobjects = page_image_xobjects(doc, page_id);
    let mut layout = PageLayout {
        page_no,
        ..PageLayout::default()
    };

    let operations = match doc
        .get_page_content(page_id)
        .map_err(|err| anyhow!("failed to read content stream: {err}"))
        .and_then(|bytes| {
            Content::decode(&bytes).map_err(|err| anyhow!("failed to decode content: {err}"))
        }) {
        Ok(content) => content.operations,
        Err(err) => {
            debug!(page = page_no, error = %err, "page content undecodable");
            layout.decode_error = Some(err.to_string());
            layout.images = image_xobjects.into_iter().map(|(_, image)| image).collect();
            return layout;
        }
    };

    let mut state = TextState::default();
    for op in &operations {
        match op.operator.as_str() {
            "BT" => state.begin_text(),
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = op.operands.first().and_then(number).unwrap_or(0.0);
                let ty = op.operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "Tm" => {
                let values: Vec<f32> = op.operands.iter().filter_map(number).collect();
                if values.len() == 6 {
                    state.set_matrix(values[0], values[3], values[4], values[5]);
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = op.operands.first().and_then(string_operand) {
                    state.show(&text, &mut layout.runs);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = op.operands.first().and_then(string_operand) {
                    state.show(&text, &mut layout.runs);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = op.operands.get(2).and_then(string_operand) {
                    state.show(&text, &mut layout.runs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut text = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                if let Some(decoded) = decode_pdf_string(bytes) {
                                    text.push_str(&decoded);
                                }
                            }
                            other => {
                                if number(other).is_some_and(|adj| adj < TJ_SPACE_THRESHOLD)
                                    && !text.ends_with(' ')
                                {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                    state.show(&text, &mut layout.runs);
                }
            }
            "Do" => {
                if let Some(Ok(name)) = op.operands.first().map(Object::as_name) {
                    if let Some((_, image)) = image_xobjects.iter().find(|(n, _)| n == name) {
                        layout.images.push(image.clone());
                    }
                }
            }
            "BI" => layout.images.push(ImageBlock {
                name: format!("inline-{}", layout.images.len() + 1),
                width: None,
                height: None,
            }),
            _ => {}
        }
    }

    layout
}

#[derive(Debug)]
struct TextState {
    font_size: f32,
    scale: f32,
    leading: f32,
    line_x: f32,
    line_y: f32,
    x: f32,
    y: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            scale: 1.0,
            leading: 0.0,
            line_x: 0.0,
            line_y: 0.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

impl TextState {
    fn begin_text(&mut self) {
        self.scale = 1.0;
        self.line_x = 0.0;
        self.line_y = 0.0;
        self.x = 0.0;
        self.y = 0.0;
    }

    fn effective_size(&self) -> f32 {
        (self.font_size * self.scale).abs()
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_x += tx * self.scale;
        self.line_y += ty * self.scale;
        self.x = self.line_x;
        self.y = self.line_y;
    }

    fn set_matrix(&mut self, a: f32, d: f32, e: f32, f: f32) {
        let scale = if d != 0.0 { d.abs() } else { a.abs() };
        self.scale = if scale > 0.0 { scale } else { 1.0 };
        self.line_x = e;
        self.line_y = f;
        self.x = e;
        self.y = f;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, text: &str, runs: &mut Vec<TextRun>) {
        if text.is_empty() {
            return;
        }
        let run = TextRun {
            text: text.to_string(),
            font_size: self.effective_size(),
            x: self.x,
            y: self.y,
        };
        self.x = run.end_x();
        runs.push(run);
    }
}

fn group_lines(runs: &[TextRun]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut last_end_x = 0.0f32;

    for run in runs {
        let size = run.font_size.max(1.0);
        let same_line = lines
            .last()
            .is_some_and(|line| (line.y - run.y).abs() < size * 0.5);

        if same_line {
            if let Some(line) = lines.last_mut() {
                let gap = run.x - last_end_x;
                if gap > size * CELL_GAP_EM {
                    line.cells.push(run.text.trim().to_string());
                } else if let Some(cell) = line.cells.last_mut() {
                    if gap > size * 0.15 && !cell.ends_with(' ') && !run.text.starts_with(' ') {
                        cell.push(' ');
                    }
                    cell.push_str(&run.text);
                }
                line.font_size = line.font_size.max(run.font_size);
            }
        } else {
            lines.push(TextLine {
                y: run.y,
                font_size: run.font_size,
                cells: vec![run.text.clone()],
            });
        }
        last_end_x = run.end_x();
    }

    lines
        .into_iter()
        .filter_map(|mut line| {
            line.cells = line
                .cells
                .into_iter()
                .map(|cell| collapse_whitespace(&cell))
                .filter(|cell| !cell.is_empty())
                .collect();
            (!line.cells.is_empty()).then_some(line)
        })
        .collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn string_operand(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => None,
    }
}

/// Decodes a PDF string: UTF-16BE when it carries a byte-order mark,
/// otherwise bytes are read as PDFDocEncoding/Latin-1. Control characters
/// are dropped, so undecodable CID strings come back empty.
pub fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let decoded: String = if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };

    let cleaned: String = decoded
        .chars()
        .filter(|c| !c.is_control() || *c == ' ' || *c == '\t')
        .filter(|c| *c != '\u{FFFD}')
        .collect();

    (!cleaned.is_empty()).then_some(cleaned)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Image XObjects reachable from the page's (possibly inherited) resources.
fn page_image_xobjects(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, ImageBlock)> {
    let mut images = Vec::new();
    let Some(resources) = page_resources(doc, page_id) else {
        return images;
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return images;
    };

    for (name, object) in xobjects.iter() {
        let Some(dict) = resolve_dict(doc, object) else {
            continue;
        };
        let is_image = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Image");
        if !is_image {
            continue;
        }
        images.push((
            name.clone(),
            ImageBlock {
                name: String::from_utf8_lossy(name).into_owned(),
                width: dict.get(b"Width").ok().and_then(|o| o.as_i64().ok()),
                height: dict.get(b"Height").ok().and_then(|o| o.as_i64().ok()),
            },
        ));
    }
    images
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Resources may be inherited from any ancestor in the page tree.
    for _ in 0..32 {
        if let Some(resources) = current
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
        {
            return Some(resources);
        }
        current = current
            .get(b"Parent")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))?;
    }
    None
}

fn document_title(doc: &Document) -> Option<String> {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))?;
    match info.get(b"Title").ok().and_then(|obj| resolve(doc, obj))? {
        Object::String(bytes, _) => decode_pdf_string(bytes)
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty()),
        _ => None,
    }
}
