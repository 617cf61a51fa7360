mod common;

use std::sync::Arc;

use common::{CountingOcr, FakeRenderer, PageSpec, build_pdf, line, scanned_pdf, text_pdf};
use docsight::ingest::{
    Block, ExtractionMethod,
    converter::{ConversionStatus, LayoutConverter, StructureConverter, convert_buffer},
    ocr::PageOcr,
    temp::TempWorkspace,
};
use tempfile::TempDir;

fn converter(root: &TempDir) -> (LayoutConverter, TempWorkspace, Arc<CountingOcr>) {
    let workspace = TempWorkspace::new(Some(root.path().to_path_buf()));
    let ocr = CountingOcr::new("ocr page text");
    let page_ocr = PageOcr::new(Arc::new(FakeRenderer), ocr.clone(), workspace.clone());
    (LayoutConverter::new(page_ocr), workspace, ocr)
}

fn leftovers(root: &TempDir) -> usize {
    std::fs::read_dir(root.path()).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn buffer_conversion_leaves_no_temp_file() {
    let root = TempDir::new().unwrap();
    let (converter, workspace, _) = converter(&root);

    let result = convert_buffer(&converter, &workspace, &text_pdf(), true);

    assert!(result.success);
    assert_eq!(result.metadata.extraction_method, ExtractionMethod::StructureAware);
    assert!(result.text.starts_with("# Quarterly Review"));
    assert_eq!(leftovers(&root), 0);
}

#[test]
fn failed_conversion_leaves_no_temp_file() {
    let root = TempDir::new().unwrap();
    let (converter, workspace, _) = converter(&root);

    let result = convert_buffer(&converter, &workspace, b"not a pdf at all", true);

    assert!(!result.success);
    assert_eq!(
        result.error_reason.as_deref(),
        Some("conversion failed with status: unsupported")
    );
    assert_eq!(leftovers(&root), 0);
}

#[test]
fn truncated_pdf_is_a_failure_status() {
    let root = TempDir::new().unwrap();
    let (converter, workspace, _) = converter(&root);
    let staged = workspace.materialize(b"%PDF-1.7\n%%EOF", ".pdf").unwrap();

    let conversion = converter.convert(staged.path(), false);

    assert_eq!(conversion.status, ConversionStatus::Failure);
    assert!(conversion.tree.is_none());
}

#[test]
fn tables_are_detected_from_aligned_columns() {
    let root = TempDir::new().unwrap();
    let (converter, workspace, _) = converter(&root);
    let mut header = line("Item", 11, 650);
    header.x = 72;
    let mut header_qty = line("Qty", 11, 650);
    header_qty.x = 320;
    let mut row = line("Bolts", 11, 636);
    row.x = 72;
    let mut row_qty = line("40", 11, 636);
    row_qty.x = 320;
    let pdf = build_pdf(&[PageSpec::Text(vec![
        line("Inventory", 20, 700),
        line("Counted at close of business.", 11, 680),
        header,
        header_qty,
        row,
        row_qty,
    ])]);

    let result = convert_buffer(&converter, &workspace, &pdf, false);

    let tree = result.structure.expect("structure");
    let table = tree.pages[0]
        .blocks
        .iter()
        .find_map(|block| match block {
            Block::Table { rows } => Some(rows.clone()),
            _ => None,
        })
        .expect("table block");
    assert_eq!(
        table,
        vec![
            vec!["Item".to_string(), "Qty".to_string()],
            vec!["Bolts".to_string(), "40".to_string()],
        ]
    );
    assert!(result.text.contains("| Item | Qty |"));
}

#[test]
fn image_only_pages_are_ocrd_when_enabled() {
    let root = TempDir::new().unwrap();
    let (converter, workspace, ocr) = converter(&root);

    let with_ocr = convert_buffer(&converter, &workspace, &scanned_pdf(), true);
    assert!(with_ocr.metadata.has_ocr);
    assert!(with_ocr.text.contains("ocr page text"));
    assert_eq!(ocr.calls(), 1);

    let without_ocr = convert_buffer(&converter, &workspace, &scanned_pdf(), false);
    assert!(!without_ocr.metadata.has_ocr);
    assert!(without_ocr.metadata.has_images);
    assert_eq!(without_ocr.text, "<!-- image -->");
    assert_eq!(ocr.calls(), 1);
    assert_eq!(leftovers(&root), 0);
}
