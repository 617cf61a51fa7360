#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use docsight::ingest::{
    Ingestor,
    converter::LayoutConverter,
    fallback::FallbackChain,
    ocr::{OcrEngine, PageOcr, PageRenderer},
    temp::TempWorkspace,
};
use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use tempfile::TempDir;

/// A line of text placed at a fixed baseline.
pub struct Line<'a> {
    pub text: &'a str,
    pub size: i64,
    pub x: i64,
    pub y: i64,
}

pub fn line(text: &str, size: i64, y: i64) -> Line<'_> {
    Line {
        text,
        size,
        x: 72,
        y,
    }
}

pub enum PageSpec<'a> {
    Text(Vec<Line<'a>>),
    /// A single full-page image and no text layer.
    Scanned,
    /// Text drawn only inside a form XObject.
    Form(Vec<Line<'a>>),
}

fn text_operations(lines: &[Line<'_>]) -> Vec<Operation> {
    lines
        .iter()
        .flat_map(|line| {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), line.size.into()]),
                Operation::new("Td", vec![line.x.into(), line.y.into()]),
                Operation::new("Tj", vec![Object::string_literal(line.text)]),
                Operation::new("ET", vec![]),
            ]
        })
        .collect()
}

pub fn build_pdf(pages: &[PageSpec<'_>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0u8, 255, 255, 0],
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut page_resources = resources_id;
        let operations = match page {
            PageSpec::Text(lines) => text_operations(lines),
            PageSpec::Form(lines) => {
                let form = Content {
                    operations: text_operations(lines),
                };
                let form_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                        "Resources" => resources_id,
                    },
                    form.encode().expect("encode form"),
                ));
                page_resources = doc.add_object(dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => dictionary! { "Im1" => image_id, "Fm1" => form_id },
                });
                vec![Operation::new("Do", vec!["Fm1".into()])]
            }
            PageSpec::Scanned => vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![500.into(), 0.into(), 0.into(), 700.into(), 50.into(), 50.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => page_resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

pub fn text_pdf() -> Vec<u8> {
    build_pdf(&[PageSpec::Text(vec![
        line("Quarterly Review", 24, 760),
        line("Sales rose in every region during the quarter.", 11, 720),
        line("Costs were flat.", 11, 706),
    ])])
}

pub fn scanned_pdf() -> Vec<u8> {
    build_pdf(&[PageSpec::Scanned])
}

/// Writes a placeholder image per page so the scratch directory is exercised.
pub struct FakeRenderer;

impl PageRenderer for FakeRenderer {
    fn render_page(&self, _pdf: &Path, page_no: u32, out_dir: &Path) -> Result<PathBuf> {
        let image = out_dir.join(format!("page-{page_no}.png"));
        std::fs::write(&image, b"png")?;
        Ok(image)
    }
}

pub struct CountingOcr {
    pub calls: AtomicUsize,
    pub text: &'static str,
}

impl CountingOcr {
    pub fn new(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            text,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for CountingOcr {
    fn recognize(&self, _image: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

pub struct Harness {
    pub temp_root: TempDir,
    pub ocr: Arc<CountingOcr>,
    pub ingestor: Ingestor,
}

impl Harness {
    pub fn new(use_ocr: bool) -> Self {
        Self::with_ocr_text(use_ocr, "Recognized scan text")
    }

    pub fn with_ocr_text(use_ocr: bool, text: &'static str) -> Self {
        let temp_root = TempDir::new().expect("create temp dir");
        let workspace = TempWorkspace::new(Some(temp_root.path().to_path_buf()));
        let ocr = CountingOcr::new(text);
        let page_ocr = PageOcr::new(Arc::new(FakeRenderer), ocr.clone(), workspace.clone());
        let ingestor = Ingestor::with_components(
            Arc::new(LayoutConverter::new(page_ocr.clone())),
            FallbackChain::standard(page_ocr, false),
            workspace,
            use_ocr,
        );
        Self {
            temp_root,
            ocr,
            ingestor,
        }
    }

    pub fn leftover_temp_entries(&self) -> usize {
        std::fs::read_dir(self.temp_root.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
