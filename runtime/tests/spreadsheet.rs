mod common;

use std::io::{Cursor, Write};

use common::Harness;
use docsight::ingest::NormalizedDocument;
use zip::{ZipWriter, write::SimpleFileOptions};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
<sheet name="Parts" sheetId="1" r:id="rId1"/>
<sheet name="Owners" sheetId="2" r:id="rId2"/>
</sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;

fn inline(cell: &str, text: &str) -> String {
    format!(r#"<c r="{cell}" t="inlineStr"><is><t>{text}</t></is></c>"#)
}

fn number(cell: &str, value: i64) -> String {
    format!(r#"<c r="{cell}"><v>{value}</v></c>"#)
}

fn worksheet(rows: &[Vec<String>]) -> String {
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(idx, cells)| format!(r#"<row r="{}">{}</row>"#, idx + 1, cells.concat()))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{body}</sheetData></worksheet>"#
    )
}

fn two_sheet_workbook() -> anyhow::Result<Vec<u8>> {
    let parts = worksheet(&[
        vec![inline("A1", "part"), inline("B1", "qty")],
        vec![inline("A2", "bolt"), number("B2", 40)],
        vec![inline("A3", "nut"), number("B3", 12)],
    ]);
    let owners = worksheet(&[
        vec![inline("A1", "owner"), inline("B1", "site"), inline("C1", "shift")],
        vec![inline("A2", "Ada"), inline("B2", "London"), inline("C2", "early")],
    ]);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", WORKBOOK.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", parts),
        ("xl/worksheets/sheet2.xml", owners),
    ] {
        zip.start_file(name, SimpleFileOptions::default())?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

#[test]
fn workbook_sheets_are_rendered_in_order_with_metadata() -> anyhow::Result<()> {
    let harness = Harness::new(false);

    let doc = harness.ingestor.ingest(&two_sheet_workbook()?, "inventory.xlsx");

    assert!(matches!(doc, NormalizedDocument::Tabular { .. }), "{}", doc.text());
    let text = doc.text();
    assert!(text.starts_with("Sheet: Parts\n"));
    assert!(text.contains("bolt"));
    assert!(text.contains("40"));
    assert!(text.contains("\n\nSheet: Owners\n"));
    assert!(text.contains("London"));

    let metadata = doc.metadata();
    assert_eq!(metadata["sheet_count"], 2);
    assert_eq!(metadata["sheets"]["Parts"]["row_count"], 2);
    assert_eq!(metadata["sheets"]["Parts"]["column_count"], 2);
    assert_eq!(metadata["sheets"]["Parts"]["columns"][1], "qty");
    assert_eq!(metadata["sheets"]["Owners"]["row_count"], 1);
    assert_eq!(metadata["sheets"]["Owners"]["columns"][2], "shift");
    assert_eq!(harness.leftover_temp_entries(), 0);
    Ok(())
}
