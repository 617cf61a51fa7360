use super::structure::StructureTree;

pub const MAX_SECTION_LINES: usize = 10;
pub const UNTITLED: &str = "Untitled Document";

/// Bounded, prompt-ready digest of a structure tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureSummary {
    pub title: String,
    pub section_lines: Vec<String>,
    pub page_count: usize,
    pub table_count: usize,
    pub image_count: usize,
}

impl StructureSummary {
    pub fn from_tree(tree: &StructureTree) -> Self {
        let headings: Vec<(u32, &str)> = tree
            .pages
            .iter()
            .flat_map(|page| page.headings().map(move |text| (page.page_no, text)))
            .collect();

        let mut section_lines: Vec<String> = headings
            .iter()
            .take(MAX_SECTION_LINES)
            .map(|(page_no, text)| format!("- Section: {text} (Page {page_no})"))
            .collect();
        if headings.len() > MAX_SECTION_LINES {
            section_lines.push(format!(
                "...and {} more sections",
                headings.len() - MAX_SECTION_LINES
            ));
        }

        Self {
            title: tree
                .title
                .clone()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            section_lines,
            page_count: tree.page_count(),
            table_count: tree.pages.iter().map(|page| page.table_count()).sum(),
            image_count: tree.pages.iter().map(|page| page.image_count()).sum(),
        }
    }

    /// Structure text without the title, which prompts carry separately.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("- Total pages: {}", self.page_count)];

        if !self.section_lines.is_empty() {
            lines.push("\nDocument sections:".to_string());
            lines.extend(self.section_lines.iter().cloned());
        }
        if self.table_count > 0 {
            lines.push(format!("\n- Document contains {} tables", self.table_count));
        }
        if self.image_count > 0 {
            lines.push(format!("- Document contains {} images/figures", self.image_count));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::structure::{Block, ImageBlock, PageNode};

    fn heading(text: String) -> Block {
        Block::Heading { text, level: 2 }
    }

    #[test]
    fn overflowing_sections_are_bounded() {
        let pages = (1..=3)
            .map(|page_no| PageNode {
                page_no,
                ocr: false,
                blocks: (1..=5)
                    .map(|n| heading(format!("Heading {page_no}.{n}")))
                    .collect(),
            })
            .collect();
        let summary = StructureSummary::from_tree(&StructureTree { title: None, pages });

        assert_eq!(summary.section_lines.len(), 11);
        assert_eq!(summary.section_lines[0], "- Section: Heading 1.1 (Page 1)");
        assert_eq!(summary.section_lines[9], "- Section: Heading 2.5 (Page 2)");
        assert_eq!(summary.section_lines[10], "...and 5 more sections");
        assert_eq!(summary.title, UNTITLED);
    }

    #[test]
    fn render_lists_counts_only_when_present() {
        let tree = StructureTree {
            title: Some("Manual".into()),
            pages: vec![PageNode {
                page_no: 1,
                ocr: false,
                blocks: vec![
                    heading("Setup".into()),
                    Block::Image(ImageBlock::default()),
                ],
            }],
        };
        let rendered = StructureSummary::from_tree(&tree).render();
        assert_eq!(
            rendered,
            "- Total pages: 1\n\nDocument sections:\n- Section: Setup (Page 1)\n- Document contains 1 images/figures"
        );
        assert!(!rendered.contains("tables"));
    }

    #[test]
    fn summary_is_deterministic() {
        let tree = StructureTree {
            title: None,
            pages: vec![PageNode::new(1)],
        };
        assert_eq!(
            StructureSummary::from_tree(&tree),
            StructureSummary::from_tree(&tree)
        );
    }
}
