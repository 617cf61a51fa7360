use std::{collections::BTreeMap, io::Cursor};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use tracing::{error, info};

use super::types::{ErrorKind, NormalizedDocument, TableMetadata, TabularMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularKind {
    Csv,
    Spreadsheet,
}

/// Parses CSV and spreadsheet uploads. Malformed input comes back as an
/// error document, never as an `Err`.
#[derive(Debug, Default, Clone)]
pub struct TabularExtractor;

impl TabularExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, bytes: &[u8], kind: TabularKind) -> NormalizedDocument {
        match kind {
            TabularKind::Csv => match parse_csv(bytes) {
                Ok((text, metadata)) => {
                    info!(
                        rows = metadata.row_count,
                        columns = metadata.column_count,
                        "parsed csv"
                    );
                    NormalizedDocument::Tabular {
                        text,
                        metadata: TabularMetadata::Csv(metadata),
                    }
                }
                Err(err) => {
                    error!(error = %err, "error parsing csv");
                    NormalizedDocument::error(
                        ErrorKind::CsvParsingError,
                        format!("Error parsing CSV: {err}"),
                    )
                }
            },
            TabularKind::Spreadsheet => match parse_spreadsheet(bytes) {
                Ok((text, metadata)) => {
                    info!("parsed spreadsheet");
                    NormalizedDocument::Tabular { text, metadata }
                }
                Err(err) => {
                    error!(error = %err, "error parsing spreadsheet");
                    NormalizedDocument::error(
                        ErrorKind::ExcelParsingError,
                        format!("Error parsing Excel: {err}"),
                    )
                }
            },
        }
    }
}

fn parse_csv(bytes: &[u8]) -> Result<(String, TableMetadata)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .context("failed to read csv header")?
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let h = if idx == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(anyhow!("no columns to parse from file"));
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed csv record {}", idx + 1))?;
        if record.len() > headers.len() {
            return Err(anyhow!(
                "malformed csv record {}: expected {} fields, saw {}",
                idx + 1,
                headers.len(),
                record.len()
            ));
        }
        // Short rows are padded with empty cells.
        let mut row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    let text = render_table(&headers, &rows);
    let metadata = TableMetadata {
        row_count: rows.len(),
        column_count: headers.len(),
        columns: headers,
    };
    Ok((text, metadata))
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<(String, TabularMetadata)> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).context("failed to open workbook")?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut rendered = Vec::with_capacity(sheet_names.len());
    let mut sheets = BTreeMap::new();

    for sheet_name in &sheet_names {
        let range = workbook
            .worksheet_range(sheet_name)
            .with_context(|| format!("failed to read sheet '{sheet_name}'"))?;

        let mut row_iter = range.rows();
        let headers: Vec<String> = row_iter
            .next()
            .map(|row| row.iter().map(cell_to_string).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = row_iter
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        let body = if headers.is_empty() {
            "Empty DataFrame".to_string()
        } else {
            render_table(&headers, &rows)
        };
        rendered.push(format!("Sheet: {sheet_name}\n{body}"));

        sheets.insert(
            sheet_name.clone(),
            TableMetadata {
                row_count: rows.len(),
                column_count: headers.len(),
                columns: headers,
            },
        );
    }

    let metadata = TabularMetadata::Spreadsheet {
        sheet_count: sheet_names.len(),
        sheets,
    };
    Ok((rendered.join("\n\n"), metadata))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        #[allow(unreachable_patterns)]
        _ => String::new(),
    }
}

/// Renders rows as right-aligned columns, header first.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));

    let mut widths = vec![0usize; column_count];
    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(header.chars().count());
    }
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let render_line = |cells: &[String]| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(idx, width)| {
                let cell = cells.get(idx).map(String::as_str).unwrap_or("");
                format!("{cell:>width$}")
            })
            .collect();
        padded.join(" ").trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_line(headers));
    lines.extend(rows.iter().map(|row| render_line(row)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_renders_every_value() {
        let csv = b"name,city\nAda,London\nGrace,Arlington\n";
        let doc = TabularExtractor::new().extract(csv, TabularKind::Csv);

        assert!(doc.error_kind().is_none());
        for needle in ["name", "city", "Ada", "London", "Grace", "Arlington"] {
            assert!(doc.text().contains(needle), "missing {needle}");
        }
        let metadata = doc.metadata();
        assert_eq!(metadata["row_count"], 2);
        assert_eq!(metadata["column_count"], 2);
        assert_eq!(metadata["columns"][1], "city");
    }

    #[test]
    fn ragged_csv_is_a_recovered_error() {
        let csv = b"a,b\n1,2,3\n";
        let doc = TabularExtractor::new().extract(csv, TabularKind::Csv);

        assert_eq!(doc.error_kind(), Some(ErrorKind::CsvParsingError));
        assert!(doc.text().starts_with("Error parsing CSV:"));
    }

    #[test]
    fn short_rows_are_padded() {
        let csv = b"name,city,zip\nAda,London\nGrace,Arlington,22201\n";
        let doc = TabularExtractor::new().extract(csv, TabularKind::Csv);

        assert!(doc.error_kind().is_none(), "{}", doc.text());
        assert!(doc.text().contains("22201"));
        assert_eq!(doc.metadata()["row_count"], 2);
        assert_eq!(doc.metadata()["column_count"], 3);
    }

    #[test]
    fn leading_bom_is_stripped_from_first_column() {
        let csv = "\u{feff}name,qty\nbolt,4\n";
        let doc = TabularExtractor::new().extract(csv.as_bytes(), TabularKind::Csv);

        assert!(doc.error_kind().is_none());
        assert_eq!(doc.metadata()["columns"][0], "name");
    }

    #[test]
    fn empty_csv_has_no_columns() {
        let doc = TabularExtractor::new().extract(b"", TabularKind::Csv);
        assert_eq!(doc.error_kind(), Some(ErrorKind::CsvParsingError));
    }

    #[test]
    fn garbage_spreadsheet_is_a_recovered_error() {
        let doc = TabularExtractor::new().extract(b"not a workbook", TabularKind::Spreadsheet);
        assert_eq!(doc.error_kind(), Some(ErrorKind::ExcelParsingError));
        assert!(doc.text().starts_with("Error parsing Excel:"));
    }

    #[test]
    fn table_columns_are_right_aligned() {
        let headers = vec!["id".to_string(), "label".to_string()];
        let rows = vec![vec!["7".to_string(), "x".to_string()]];
        assert_eq!(render_table(&headers, &rows), "id label\n 7     x");
    }
}
