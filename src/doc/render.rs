//! Flat block list to Markdown rendering.

use crate::block::{Block, BlockBody, BlockType, WireBlock, flatten};
use crate::doc::{Admonition, inline, lang};
use std::collections::{HashMap, HashSet};

/// Renders a flat block list to Markdown.
///
/// Roots are the page block's children when a page block exists, otherwise
/// every block whose parent is not in the list. Each block is emitted at most
/// once, so a malformed listing cannot loop.
pub fn render(blocks: &[WireBlock]) -> String {
    let mut renderer = Renderer::new(blocks);
    let mut lines = Vec::new();
    for root in renderer.roots() {
        renderer.render_block(root, "", &mut lines);
    }
    finish(&lines)
}

/// Renders a locally built block tree.
pub fn render_tree(blocks: &[Block]) -> String {
    render(&flatten("root", blocks))
}

fn finish(lines: &[String]) -> String {
    let mut out = lines.join("\n").trim().to_string();
    out.push('\n');
    out
}

struct Renderer<'a> {
    blocks: &'a [WireBlock],
    children: Vec<Vec<usize>>,
    parent_known: Vec<bool>,
    emitted: HashSet<usize>,
}

impl<'a> Renderer<'a> {
    fn new(blocks: &'a [WireBlock]) -> Self {
        let by_id: HashMap<&str, usize> = blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (block.block_id.as_str(), index))
            .collect();
        let children = blocks
            .iter()
            .map(|block| {
                block
                    .children
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).copied())
                    .collect()
            })
            .collect();
        let parent_known = blocks
            .iter()
            .map(|block| by_id.contains_key(block.parent_id.as_str()))
            .collect();
        Renderer {
            blocks,
            children,
            parent_known,
            emitted: HashSet::new(),
        }
    }

    fn roots(&self) -> Vec<usize> {
        match self.blocks.iter().position(|b| b.kind == BlockType::Page) {
            Some(page) => self.children[page].clone(),
            None => (0..self.blocks.len())
                .filter(|index| !self.parent_known[*index])
                .collect(),
        }
    }

    fn text(&self, index: usize) -> String {
        inline::encode(self.blocks[index].body.elements())
    }

    fn render_children(&mut self, index: usize, indent: &str, lines: &mut Vec<String>) {
        for child in self.children[index].clone() {
            self.render_block(child, indent, lines);
        }
    }

    fn render_block(&mut self, index: usize, indent: &str, lines: &mut Vec<String>) {
        if !self.emitted.insert(index) {
            return;
        }
        let blocks = self.blocks;
        let block = &blocks[index];
        match block.kind {
            BlockType::Page | BlockType::TableCell => self.render_children(index, indent, lines),
            BlockType::Bullet | BlockType::Ordered | BlockType::Todo => {
                let marker = match &block.body {
                    _ if block.kind == BlockType::Ordered => "1. ",
                    BlockBody::Todo(todo) if todo.style.done => "- [x] ",
                    BlockBody::Todo(_) => "- [ ] ",
                    _ => "- ",
                };
                lines.push(format!("{indent}{marker}{}", self.text(index)));
                // Children of `1. ` must reach its content column, or
                // CommonMark reads them as a new list at the parent's level.
                let width = if block.kind == BlockType::Ordered { 3 } else { 2 };
                let nested = format!("{indent}{}", " ".repeat(width));
                self.render_children(index, &nested, lines);
            }
            kind => {
                separate(lines);
                match kind {
                    BlockType::Heading(level) => {
                        let hashes = "#".repeat(usize::from(level.min(6)));
                        lines.push(format!("{hashes} {}", self.text(index)));
                    }
                    BlockType::Text => lines.push(self.text(index)),
                    BlockType::Quote => lines.push(format!("> {}", self.text(index))),
                    BlockType::Code => {
                        let tag = match &block.body {
                            BlockBody::Code(code) => lang::fence_tag(&code.style.language),
                            _ => "",
                        };
                        lines.push(format!("```{tag}"));
                        let content = self.text(index);
                        if !content.is_empty() {
                            lines.extend(content.lines().map(str::to_string));
                        }
                        lines.push("```".to_string());
                    }
                    BlockType::QuoteContainer => {
                        let inner = self.render_detached(index);
                        lines.extend(quoted(inner));
                    }
                    BlockType::Callout => {
                        let emoji = match &block.body {
                            BlockBody::Callout(callout) => callout.emoji_id.as_str(),
                            _ => "",
                        };
                        lines.push(format!("> [!{}]", Admonition::from_emoji(emoji).label()));
                        let inner = self.render_detached(index);
                        lines.extend(quoted(inner));
                    }
                    BlockType::Table => self.render_table(index, lines),
                    BlockType::Image => {
                        if let BlockBody::Image(image) = &block.body {
                            let alt = if image.alt.is_empty() {
                                "image"
                            } else {
                                image.alt.as_str()
                            };
                            lines.push(format!("![{alt}]({})", image.token));
                        }
                    }
                    BlockType::Divider => lines.push("---".to_string()),
                    other => lines.push(format!(
                        "<!-- unsupported:{other}:{} -->",
                        block.block_id
                    )),
                }
                lines.push(String::new());
            }
        }
    }

    /// Renders a container's children on their own, as if at top level.
    fn render_detached(&mut self, index: usize) -> Vec<String> {
        let mut inner = Vec::new();
        self.render_children(index, "", &mut inner);
        while inner.last().is_some_and(|line| line.is_empty()) {
            inner.pop();
        }
        inner
    }

    fn cell_text(&self, cell: usize) -> String {
        let parts: Vec<String> = self.children[cell]
            .iter()
            .filter(|child| !self.blocks[**child].body.elements().is_empty())
            .map(|child| self.text(*child))
            .collect();
        parts.join(" ").replace('|', "\\|").replace('\n', " ")
    }

    fn render_table(&mut self, index: usize, lines: &mut Vec<String>) {
        let cells = self.children[index].clone();
        let (rows, mut columns) = match &self.blocks[index].body {
            BlockBody::Table(table) => (table.property.row_size, table.property.column_size),
            _ => (0, 0),
        };
        if columns == 0 {
            columns = cells.len();
        }
        if columns == 0 {
            return;
        }
        let rows = rows.max(cells.len().div_ceil(columns));
        for (row, chunk) in (0..rows).map(|row| (row, row * columns)) {
            let texts: Vec<String> = (0..columns)
                .map(|column| {
                    cells
                        .get(chunk + column)
                        .map(|cell| self.cell_text(*cell))
                        .unwrap_or_default()
                })
                .collect();
            lines.push(format!("| {} |", texts.join(" | ")));
            if row == 0 {
                lines.push(format!("|{}", " --- |".repeat(columns)));
            }
        }
        for cell in cells {
            self.emitted.insert(cell);
        }
    }
}

/// Ensures a blank line before a non-list block that follows list items.
fn separate(lines: &mut Vec<String>) {
    if lines.last().is_some_and(|line| !line.is_empty()) {
        lines.push(String::new());
    }
}

fn quoted(lines: Vec<String>) -> impl Iterator<Item = String> {
    lines.into_iter().map(|line| {
        if line.is_empty() {
            ">".to_string()
        } else {
            format!("> {line}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{
        CalloutBody, CodeBody, CodeLanguage, CodeStyle, ImageBody, TableBody, TableProperty,
        TextElement, TextStyle, TodoBody, TodoStyle,
    };

    fn text(id: &str, parent: &str, kind: BlockType, content: &str) -> WireBlock {
        WireBlock::new(
            id,
            parent,
            kind,
            BlockBody::text(vec![TextElement::plain(content)]),
        )
    }

    fn page(children: &[&str]) -> WireBlock {
        WireBlock::new("doc", "", BlockType::Page, BlockBody::text(vec![]))
            .with_children(children.iter().copied())
    }

    #[test]
    fn test_tree_order_ignores_storage_order() {
        let blocks = vec![
            text("c", "b", BlockType::Text, "C"),
            page(&["a", "b"]),
            text("b", "doc", BlockType::QuoteContainer, "").with_children(["c"]),
            text("a", "doc", BlockType::Text, "A"),
        ];
        assert_eq!(render(&blocks), "A\n\n> C\n");
    }

    #[test]
    fn test_roots_without_page() {
        let blocks = vec![
            text("x", "missing", BlockType::Heading(2), "Title"),
            text("y", "", BlockType::Text, "Body"),
        ];
        assert_eq!(render(&blocks), "## Title\n\nBody\n");
    }

    #[test]
    fn test_deep_heading_clamps_to_six_hashes() {
        let blocks = vec![page(&["h"]), text("h", "doc", BlockType::Heading(8), "Deep")];
        assert_eq!(render(&blocks), "###### Deep\n");
    }

    #[test]
    fn test_nested_list_indentation() {
        let blocks = vec![
            page(&["a", "d", "p"]),
            text("a", "doc", BlockType::Bullet, "a").with_children(["b"]),
            text("b", "a", BlockType::Ordered, "b").with_children(["c"]),
            text("c", "b", BlockType::Bullet, "c"),
            text("d", "doc", BlockType::Bullet, "d"),
            text("p", "doc", BlockType::Text, "after"),
        ];
        assert_eq!(render(&blocks), "- a\n  1. b\n     - c\n- d\n\nafter\n");
    }

    #[test]
    fn test_todo_and_image_and_divider() {
        let blocks = vec![
            page(&["t", "i", "r"]),
            WireBlock::new(
                "t",
                "doc",
                BlockType::Todo,
                BlockBody::Todo(TodoBody {
                    elements: vec![TextElement::plain("ship")],
                    style: TodoStyle { done: true },
                }),
            ),
            WireBlock::new(
                "i",
                "doc",
                BlockType::Image,
                BlockBody::Image(ImageBody {
                    token: "tok".into(),
                    alt: String::new(),
                }),
            ),
            WireBlock::new("r", "doc", BlockType::Divider, BlockBody::Empty),
        ];
        assert_eq!(render(&blocks), "- [x] ship\n\n![image](tok)\n\n---\n");
    }

    #[test]
    fn test_code_block_language() {
        let blocks = vec![
            page(&["c"]),
            WireBlock::new(
                "c",
                "doc",
                BlockType::Code,
                BlockBody::Code(CodeBody {
                    elements: vec![TextElement::plain("fn main() {}\n")],
                    style: CodeStyle {
                        language: CodeLanguage::Id(53),
                        wrap: false,
                    },
                }),
            ),
        ];
        assert_eq!(render(&blocks), "```rust\nfn main() {}\n```\n");
    }

    #[test]
    fn test_callout_label_from_emoji() {
        let blocks = vec![
            page(&["co"]),
            WireBlock::new(
                "co",
                "doc",
                BlockType::Callout,
                BlockBody::Callout(CalloutBody {
                    emoji_id: "bulb".into(),
                }),
            )
            .with_children(["t1", "t2"]),
            text("t1", "co", BlockType::Text, "one"),
            text("t2", "co", BlockType::Text, "two"),
        ];
        assert_eq!(render(&blocks), "> [!TIP]\n> one\n>\n> two\n");
    }

    #[test]
    fn test_table_escapes_cells() {
        let mut blocks = vec![
            page(&["t"]),
            WireBlock::new(
                "t",
                "doc",
                BlockType::Table,
                BlockBody::Table(TableBody {
                    property: TableProperty {
                        row_size: 2,
                        column_size: 2,
                        column_width: vec![],
                    },
                }),
            )
            .with_children(["c0", "c1", "c2", "c3"]),
        ];
        let contents = ["h1", "h|2", "a\nb", ""];
        for (i, content) in contents.iter().enumerate() {
            let cell = format!("c{i}");
            let inner = format!("x{i}");
            blocks.push(
                WireBlock::new(cell.as_str(), "t", BlockType::TableCell, BlockBody::Empty)
                    .with_children([inner.as_str()]),
            );
            let body = if content.is_empty() {
                BlockBody::text(vec![])
            } else {
                BlockBody::text(vec![TextElement::plain(*content)])
            };
            blocks.push(WireBlock::new(inner, cell, BlockType::Text, body));
        }
        assert_eq!(
            render(&blocks),
            "| h1 | h\\|2 |\n| --- | --- |\n| a b |  |\n"
        );
    }

    #[test]
    fn test_unsupported_kind_leaves_marker() {
        let blocks = vec![
            page(&["s"]),
            WireBlock::new("s", "doc", BlockType::Sheet, BlockBody::Empty),
        ];
        assert_eq!(render(&blocks), "<!-- unsupported:SHEET:s -->\n");
    }

    #[test]
    fn test_styled_inline_text() {
        let bold = TextStyle {
            bold: true,
            ..TextStyle::default()
        };
        let blocks = vec![
            page(&["p"]),
            WireBlock::new(
                "p",
                "doc",
                BlockType::Text,
                BlockBody::text(vec![
                    TextElement::plain("a "),
                    TextElement::run("b", bold),
                ]),
            ),
        ];
        assert_eq!(render(&blocks), "a **b**\n");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(render(&[page(&[])]), "\n");
    }

    #[test]
    fn test_render_tree_matches_flat_render() {
        let tree = vec![
            Block::text(BlockType::Heading(1), vec![TextElement::plain("T")]),
            Block::new(BlockType::QuoteContainer, BlockBody::Empty).with_children(vec![
                Block::text(BlockType::Text, vec![TextElement::plain("q")]),
            ]),
        ];
        assert_eq!(render_tree(&tree), "# T\n\n> q\n");
    }
}
