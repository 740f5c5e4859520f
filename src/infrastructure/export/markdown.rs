//! 导出用的 Markdown 块模型
//!
//! 由 pulldown-cmark 事件流构建：标题、段落、列表项、表格、代码块和 mermaid 占位块，
//! 行内只保留粗体和斜体两种样式

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// mermaid 代码块在导出文档中的占位文字
pub const DIAGRAM_PLACEHOLDER: &str = "--- Mermaid Workflow Diagram ---";

/// 带样式的一段文字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, runs: Vec<TextRun> },
    Paragraph(Vec<TextRun>),
    /// `marker` 为 `•` 或 `3.` 这样的序号，`depth` 从 1 开始
    ListItem {
        marker: String,
        depth: usize,
        runs: Vec<TextRun>,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// 非 mermaid 代码块，原样输出
    Code(String),
    /// mermaid 代码块，导出时不渲染图形
    DiagramPlaceholder,
}

/// 拼接所有文字，丢弃样式
pub fn plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|run| run.text.as_str()).collect()
}

/// 把 Markdown 解析成块序列
///
/// 未闭合的代码块延伸到文末，mermaid 代码块同样输出占位块
pub fn blocks(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markdown, options) {
        builder.handle(event);
    }
    builder.finish()
}

#[derive(Default)]
struct TableBuilder {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    runs: Vec<TextRun>,
    bold: usize,
    italic: usize,
    heading: Option<u8>,
    /// 每层列表的下一个序号，无序列表为 None
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    /// (是否 mermaid, 代码内容)
    code: Option<(bool, String)>,
    table: Option<TableBuilder>,
}

impl BlockBuilder {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush();
                self.heading = Some(level as u8);
            }
            Event::End(TagEnd::Heading(_)) => {
                let runs = std::mem::take(&mut self.runs);
                if let Some(level) = self.heading.take() {
                    if !plain_text(&runs).trim().is_empty() {
                        self.blocks.push(Block::Heading { level, runs });
                    }
                }
            }
            Event::End(TagEnd::Paragraph) | Event::Start(Tag::BlockQuote(_)) => self.flush(),
            Event::Start(Tag::List(start)) => {
                self.flush();
                self.lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}.");
                        *next += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Event::End(TagEnd::Item) => {
                self.flush();
                self.item_marker = None;
            }
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush();
                let mermaid = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        lang.split_whitespace().next() == Some("mermaid")
                    }
                    CodeBlockKind::Indented => false,
                };
                self.code = Some((mermaid, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => match self.code.take() {
                Some((true, _)) => self.blocks.push(Block::DiagramPlaceholder),
                Some((false, code)) => {
                    let code = code.trim_end().to_string();
                    if !code.is_empty() {
                        self.blocks.push(Block::Code(code));
                    }
                }
                None => {}
            },
            Event::Start(Tag::Table(_)) => {
                self.flush();
                self.table = Some(TableBuilder::default());
            }
            Event::End(TagEnd::TableHead) => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.row);
                }
            }
            Event::End(TagEnd::TableRow) => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            Event::End(TagEnd::TableCell) => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            Event::End(TagEnd::Table) => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(Block::Table {
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            Event::Text(text) | Event::Code(text) | Event::InlineHtml(text) => self.text(&text),
            Event::Html(html) => {
                self.text(html.trim_end());
                self.flush();
            }
            Event::SoftBreak | Event::HardBreak => self.text(" "),
            Event::Rule => self.flush(),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, code)) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }

        let (bold, italic) = (self.bold > 0, self.italic > 0);
        match self.runs.last_mut() {
            Some(last) if last.bold == bold && last.italic == italic => last.text.push_str(text),
            _ => self.runs.push(TextRun {
                text: text.to_string(),
                bold,
                italic,
            }),
        }
    }

    /// 把累积的行内文字收尾成段落或列表项
    fn flush(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        if plain_text(&runs).trim().is_empty() {
            return;
        }
        let block = match self.item_marker.take() {
            Some(marker) => Block::ListItem {
                marker,
                depth: self.lists.len().max(1),
                runs,
            },
            None => Block::Paragraph(runs),
        };
        self.blocks.push(block);
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        if let Some((true, _)) = self.code {
            self.blocks.push(Block::DiagramPlaceholder);
        }
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(level: u8, text: &str) -> Block {
        Block::Heading {
            level,
            runs: vec![TextRun::plain(text)],
        }
    }

    fn paragraph(text: &str) -> Block {
        Block::Paragraph(vec![TextRun::plain(text)])
    }

    #[test]
    fn test_blocks_replace_mermaid_with_placeholder() {
        let markdown = "# Proposal\n\n## Workflow Plan\n\n```mermaid\ngraph TD\nA[Start] --> B[End]\n```\n\n## Budget\nTotal: 10k";

        assert_eq!(
            blocks(markdown),
            vec![
                heading(1, "Proposal"),
                heading(2, "Workflow Plan"),
                Block::DiagramPlaceholder,
                heading(2, "Budget"),
                paragraph("Total: 10k"),
            ]
        );
    }

    #[test]
    fn test_other_code_fences_keep_content() {
        let markdown = "```rust\nlet x = 1;\n```";
        assert_eq!(blocks(markdown), vec![Block::Code("let x = 1;".to_string())]);
    }

    #[test]
    fn test_unterminated_mermaid_still_yields_placeholder() {
        let markdown = "## Flow\n```mermaid\ngraph TD\nA --> B";
        assert_eq!(
            blocks(markdown),
            vec![heading(2, "Flow"), Block::DiagramPlaceholder]
        );
    }

    #[test]
    fn test_deeper_headings_keep_level() {
        assert_eq!(blocks("#### Deep"), vec![heading(4, "Deep")]);
    }

    #[test]
    fn test_emphasis_becomes_styled_runs() {
        assert_eq!(
            blocks("We **will** deliver *on time*."),
            vec![Block::Paragraph(vec![
                TextRun::plain("We "),
                TextRun {
                    text: "will".to_string(),
                    bold: true,
                    italic: false,
                },
                TextRun::plain(" deliver "),
                TextRun {
                    text: "on time".to_string(),
                    bold: false,
                    italic: true,
                },
                TextRun::plain("."),
            ])]
        );
    }

    #[test]
    fn test_lists_and_tables() {
        let markdown = "## Plan\n\n- **Phase 1**: design\n- Phase 2\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n3. *Kickoff*\n4. Review";

        assert_eq!(
            blocks(markdown),
            vec![
                heading(2, "Plan"),
                Block::ListItem {
                    marker: "•".to_string(),
                    depth: 1,
                    runs: vec![
                        TextRun {
                            text: "Phase 1".to_string(),
                            bold: true,
                            italic: false,
                        },
                        TextRun::plain(": design"),
                    ],
                },
                Block::ListItem {
                    marker: "•".to_string(),
                    depth: 1,
                    runs: vec![TextRun::plain("Phase 2")],
                },
                Block::Table {
                    header: vec!["a".to_string(), "b".to_string()],
                    rows: vec![vec!["1".to_string(), "2".to_string()]],
                },
                Block::ListItem {
                    marker: "3.".to_string(),
                    depth: 1,
                    runs: vec![TextRun {
                        text: "Kickoff".to_string(),
                        bold: false,
                        italic: true,
                    }],
                },
                Block::ListItem {
                    marker: "4.".to_string(),
                    depth: 1,
                    runs: vec![TextRun::plain("Review")],
                },
            ]
        );
    }

    #[test]
    fn test_compact_model_output_has_no_literal_markup() {
        let markdown = "## Plan\n\n- **Phase 1**: design\n| a | b |\n|---|---|\n1. *Kickoff*";
        let parsed = blocks(markdown);

        assert_eq!(parsed[0], heading(2, "Plan"));
        assert!(parsed.iter().any(|block| matches!(
            block,
            Block::ListItem { marker, runs, .. }
                if marker == "•" && runs[0].bold && runs[0].text == "Phase 1"
        )));
        assert!(parsed.iter().any(|block| matches!(
            block,
            Block::ListItem { marker, runs, .. }
                if marker == "1." && runs[0].italic && runs[0].text == "Kickoff"
        )));

        for block in &parsed {
            let runs = match block {
                Block::Heading { runs, .. }
                | Block::Paragraph(runs)
                | Block::ListItem { runs, .. } => runs,
                _ => continue,
            };
            let text = plain_text(runs);
            assert!(!text.contains("**"), "残留粗体标记: {text}");
            assert!(!text.contains("*Kickoff*"), "残留斜体标记: {text}");
        }
    }

    #[test]
    fn test_nested_list_depth() {
        let markdown = "- outer\n  - inner";
        assert_eq!(
            blocks(markdown),
            vec![
                Block::ListItem {
                    marker: "•".to_string(),
                    depth: 1,
                    runs: vec![TextRun::plain("outer")],
                },
                Block::ListItem {
                    marker: "•".to_string(),
                    depth: 2,
                    runs: vec![TextRun::plain("inner")],
                },
            ]
        );
    }

    #[test]
    fn test_inline_html_kept_as_text() {
        assert_eq!(blocks("R&D <budget>"), vec![paragraph("R&D <budget>")]);
    }
}
