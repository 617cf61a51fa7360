use serde::{Deserialize, Serialize};

/// Hierarchical layout of a converted document: pages, each holding typed
/// blocks in reading order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageNode {
    /// 1-based page number.
    pub page_no: u32,
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Set when the page text came from OCR rather than the text layer.
    #[serde(default)]
    pub ocr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { text: String, level: u8 },
    Paragraph { text: String },
    Table { rows: Vec<Vec<String>> },
    Image(ImageBlock),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

impl PageNode {
    pub fn new(page_no: u32) -> Self {
        Self {
            page_no,
            blocks: Vec::new(),
            ocr: false,
        }
    }

    pub fn headings(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn table_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, Block::Table { .. }))
            .count()
    }

    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, Block::Image(_)))
            .count()
    }

    pub fn has_text(&self) -> bool {
        self.blocks.iter().any(|block| match block {
            Block::Heading { text, .. } | Block::Paragraph { text } => {
                !text.trim().is_empty()
            }
            Block::Table { rows } => !rows.is_empty(),
            Block::Image(_) => false,
        })
    }
}

impl StructureTree {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn has_images(&self) -> bool {
        self.pages.iter().any(|page| page.image_count() > 0)
    }

    pub fn used_ocr(&self) -> bool {
        self.pages.iter().any(|page| page.ocr)
    }

    /// True when any page carries readable content; image placeholders do not count.
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(PageNode::has_text)
    }

    /// Markdown rendering in reading order.
    pub fn to_markdown(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for page in &self.pages {
            for block in &page.blocks {
                match block {
                    Block::Heading { text, level } => {
                        let hashes = "#".repeat(usize::from((*level).clamp(1, 6)));
                        parts.push(format!("{hashes} {text}"));
                    }
                    Block::Paragraph { text } => {
                        if !text.trim().is_empty() {
                            parts.push(text.clone());
                        }
                    }
                    Block::Table { rows } => {
                        if let Some(table) = markdown_table(rows) {
                            parts.push(table);
                        }
                    }
                    Block::Image(_) => parts.push("<!-- image -->".to_string()),
                }
            }
        }
        parts.join("\n\n")
    }
}

fn markdown_table(rows: &[Vec<String>]) -> Option<String> {
    let width = rows.iter().map(Vec::len).max()?;
    if width == 0 {
        return None;
    }

    let render_row = |row: &Vec<String>| {
        let cells: Vec<&str> = (0..width)
            .map(|idx| row.get(idx).map(|cell| cell.trim()).unwrap_or(""))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let mut iter = rows.iter();
    if let Some(header) = iter.next() {
        lines.push(render_row(header));
        lines.push(format!("|{}", " --- |".repeat(width)));
    }
    lines.extend(iter.map(render_row));
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_keeps_reading_order() {
        let tree = StructureTree {
            title: Some("Report".into()),
            pages: vec![PageNode {
                page_no: 1,
                ocr: false,
                blocks: vec![
                    Block::Heading {
                        text: "Overview".into(),
                        level: 1,
                    },
                    Block::Paragraph {
                        text: "Body text.".into(),
                    },
                    Block::Table {
                        rows: vec![
                            vec!["name".into(), "qty".into()],
                            vec!["bolt".into(), "4".into()],
                        ],
                    },
                    Block::Image(ImageBlock::default()),
                ],
            }],
        };

        let markdown = tree.to_markdown();
        assert_eq!(
            markdown,
            "# Overview\n\nBody text.\n\n| name | qty |\n| --- | --- |\n| bolt | 4 |\n\n<!-- image -->"
        );
    }

    #[test]
    fn blocks_serialize_with_type_tag() {
        let block = Block::Heading {
            text: "Scope".into(),
            level: 2,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "heading");
        assert_eq!(value["text"], "Scope");
    }
}
