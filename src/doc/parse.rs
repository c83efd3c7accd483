//! Markdown to block tree conversion.
//!
//! The pulldown-cmark event stream is first flattened into [`Token`]s: one
//! per block-level construct, with inline content already re-serialized to
//! canonical Markdown. [`BlockParser`] then walks the tokens with an explicit
//! cursor, each consumer advancing it past what it handled.

use crate::block::{
    Block, BlockBody, BlockType, CalloutBody, CodeBody, CodeStyle, ImageBody, TableBody,
    TableProperty, TextElement, TodoBody, TodoStyle,
};
use crate::doc::{Admonition, inline, lang};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use std::mem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// Inline content of one block-level construct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inline {
    /// Canonical Markdown for the inline codec.
    pub markdown: String,
    pub images: Vec<ImageRef>,
    /// Whether anything besides images carries visible text.
    pub has_text: bool,
}

impl Inline {
    fn is_single_image(&self) -> bool {
        self.images.len() == 1 && !self.has_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Heading { level: u8, inline: Inline },
    Paragraph(Inline),
    ListOpen { ordered: bool },
    ListClose,
    ItemOpen,
    ItemClose,
    Code { info: String, content: String },
    QuoteOpen(Option<Admonition>),
    QuoteClose,
    Rule,
    Html(String),
    TableOpen,
    RowOpen,
    Cell(Inline),
    RowClose,
    TableClose,
}

/// Tokenizes Markdown with tables, strikethrough and GitHub alerts enabled.
pub fn tokenize(markdown: &str) -> Vec<Token> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_GFM);
    let mut tokenizer = Tokenizer::default();
    for event in Parser::new_ext(markdown, options) {
        tokenizer.feed(event);
    }
    tokenizer.finish()
}

enum Open {
    Heading(u8),
    Paragraph,
    List,
    Item,
    Quote,
    Code { info: String, content: String },
    Html(String),
    Table,
    TableHead,
    Row,
    Cell,
    Marker(&'static str),
    Link(String),
    Image(String),
    Other,
}

#[derive(Default)]
struct InlineBuf {
    inline: Inline,
    /// Opened by bare text in a tight list item rather than a paragraph.
    implicit: bool,
    image_depth: usize,
    alt: String,
}

#[derive(Default)]
struct Tokenizer {
    tokens: Vec<Token>,
    open: Vec<Open>,
    inline: Option<InlineBuf>,
}

impl Tokenizer {
    fn feed(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => match self.open.last_mut() {
                Some(Open::Code { content, .. }) => content.push_str(&text),
                Some(Open::Html(raw)) => raw.push_str(&text),
                _ => self.push_text(&text, true),
            },
            Event::Html(html) => match self.open.last_mut() {
                Some(Open::Html(raw)) => raw.push_str(&html),
                _ => self.push_text(&html, true),
            },
            Event::InlineHtml(html) => self.push_text(&html, true),
            Event::Code(code) => self.push_text(&format!("`{code}`"), true),
            Event::InlineMath(math) => self.push_text(&format!("${math}$"), true),
            Event::DisplayMath(math) => self.push_text(&format!("$${math}$$"), true),
            Event::FootnoteReference(label) => self.push_text(&format!("[^{label}]"), true),
            Event::SoftBreak | Event::HardBreak => self.push_text("\n", false),
            Event::TaskListMarker(done) => {
                self.push_text(if done { "[x] " } else { "[ ] " }, false)
            }
            Event::Rule => {
                self.flush_implicit();
                self.tokens.push(Token::Rule);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let open = match tag {
            Tag::Paragraph => {
                self.begin_block();
                self.inline = Some(InlineBuf::default());
                Open::Paragraph
            }
            Tag::Heading { level, .. } => {
                self.begin_block();
                self.inline = Some(InlineBuf::default());
                Open::Heading(level as u8)
            }
            Tag::BlockQuote(kind) => {
                self.begin_block();
                self.tokens.push(Token::QuoteOpen(kind.map(Admonition::from)));
                Open::Quote
            }
            Tag::CodeBlock(kind) => {
                self.begin_block();
                let info = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                Open::Code {
                    info,
                    content: String::new(),
                }
            }
            Tag::HtmlBlock => {
                self.begin_block();
                Open::Html(String::new())
            }
            Tag::List(start) => {
                self.begin_block();
                self.tokens.push(Token::ListOpen {
                    ordered: start.is_some(),
                });
                Open::List
            }
            Tag::Item => {
                self.begin_block();
                self.tokens.push(Token::ItemOpen);
                Open::Item
            }
            Tag::Table(_) => {
                self.begin_block();
                self.tokens.push(Token::TableOpen);
                Open::Table
            }
            Tag::TableHead => {
                self.tokens.push(Token::RowOpen);
                Open::TableHead
            }
            Tag::TableRow => {
                self.tokens.push(Token::RowOpen);
                Open::Row
            }
            Tag::TableCell => {
                self.inline = Some(InlineBuf::default());
                Open::Cell
            }
            Tag::Emphasis => self.marker("*"),
            Tag::Strong => self.marker("**"),
            Tag::Strikethrough => self.marker("~~"),
            Tag::Link { dest_url, .. } => {
                self.push_marker("[");
                Open::Link(dest_url.to_string())
            }
            Tag::Image { dest_url, .. } => {
                self.buf().image_depth += 1;
                Open::Image(dest_url.to_string())
            }
            _ => Open::Other,
        };
        self.open.push(open);
    }

    fn end(&mut self) {
        let Some(open) = self.open.pop() else {
            return;
        };
        match open {
            Open::Paragraph => {
                let inline = self.take_inline();
                self.tokens.push(Token::Paragraph(inline));
            }
            Open::Heading(level) => {
                let inline = self.take_inline();
                self.tokens.push(Token::Heading { level, inline });
            }
            Open::Quote => {
                self.flush_implicit();
                self.tokens.push(Token::QuoteClose);
            }
            Open::Code { info, content } => self.tokens.push(Token::Code { info, content }),
            Open::Html(raw) => self.tokens.push(Token::Html(raw)),
            Open::List => {
                self.flush_implicit();
                self.tokens.push(Token::ListClose);
            }
            Open::Item => {
                self.flush_implicit();
                self.tokens.push(Token::ItemClose);
            }
            Open::Table => self.tokens.push(Token::TableClose),
            Open::TableHead | Open::Row => self.tokens.push(Token::RowClose),
            Open::Cell => {
                let inline = self.take_inline();
                self.tokens.push(Token::Cell(inline));
            }
            Open::Marker(marker) => self.push_marker(marker),
            Open::Link(url) => self.push_marker(&format!("]({url})")),
            Open::Image(url) => {
                let buf = self.buf();
                buf.image_depth = buf.image_depth.saturating_sub(1);
                if buf.image_depth == 0 {
                    let alt = mem::take(&mut buf.alt);
                    buf.inline.markdown.push_str(&format!("![{alt}]({url})"));
                    buf.inline.images.push(ImageRef { url, alt });
                }
            }
            Open::Other => {}
        }
    }

    fn marker(&mut self, marker: &'static str) -> Open {
        self.push_marker(marker);
        Open::Marker(marker)
    }

    fn buf(&mut self) -> &mut InlineBuf {
        self.inline.get_or_insert_with(|| InlineBuf {
            implicit: true,
            ..InlineBuf::default()
        })
    }

    fn push_marker(&mut self, marker: &str) {
        let buf = self.buf();
        if buf.image_depth == 0 {
            buf.inline.markdown.push_str(marker);
        }
    }

    fn push_text(&mut self, text: &str, visible: bool) {
        let buf = self.buf();
        if buf.image_depth > 0 {
            buf.alt.push_str(text);
            return;
        }
        buf.inline.markdown.push_str(text);
        if visible && !text.trim().is_empty() {
            buf.inline.has_text = true;
        }
    }

    fn take_inline(&mut self) -> Inline {
        self.inline.take().map(|buf| buf.inline).unwrap_or_default()
    }

    fn begin_block(&mut self) {
        self.flush_implicit();
    }

    fn flush_implicit(&mut self) {
        if self.inline.as_ref().is_some_and(|buf| buf.implicit) {
            let inline = self.take_inline();
            self.tokens.push(Token::Paragraph(inline));
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.flush_implicit();
        self.tokens
    }
}

/// Converts a token stream into a block tree.
pub struct BlockParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl BlockParser {
    pub fn new(markdown: &str) -> Self {
        BlockParser {
            tokens: tokenize(markdown),
            pos: 0,
        }
    }

    pub fn parse(markdown: &str) -> Vec<Block> {
        BlockParser::new(markdown).blocks()
    }

    pub fn blocks(mut self) -> Vec<Block> {
        let mut out = Vec::new();
        while self.pos < self.tokens.len() {
            self.consume(&mut out);
        }
        out
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Consumes one construct starting at the cursor. Stray closing tokens
    /// and anything unrecognized are skipped.
    fn consume(&mut self, out: &mut Vec<Block>) {
        let Some(token) = self.advance() else {
            return;
        };
        match token {
            Token::Heading { level, inline } => out.push(Block::text(
                BlockType::heading(level),
                inline::decode(&inline.markdown),
            )),
            Token::Paragraph(inline) => out.push(paragraph_block(inline)),
            Token::ListOpen { ordered } => self.consume_list(ordered, 0, out),
            Token::Code { info, content } => out.push(code_block(&info, &content)),
            Token::QuoteOpen(alert) => {
                let children = self.consume_quote();
                let block = match alert {
                    Some(alert) => Block::new(
                        BlockType::Callout,
                        BlockBody::Callout(CalloutBody {
                            emoji_id: alert.emoji_id().to_string(),
                        }),
                    ),
                    None => Block::new(BlockType::QuoteContainer, BlockBody::Empty),
                };
                out.push(block.with_children(children));
            }
            Token::Rule => out.push(Block::divider()),
            Token::Html(raw) => {
                let raw = raw.trim();
                if !raw.is_empty() {
                    out.push(Block::text(BlockType::Text, vec![TextElement::plain(raw)]));
                }
            }
            Token::TableOpen => out.push(self.consume_table()),
            _ => {}
        }
    }

    fn consume_quote(&mut self) -> Vec<Block> {
        let mut children = Vec::new();
        while let Some(token) = self.peek() {
            if *token == Token::QuoteClose {
                self.pos += 1;
                break;
            }
            self.consume(&mut children);
        }
        children
    }

    /// Nested lists land in `out` right after their parent item.
    fn consume_list(&mut self, ordered: bool, depth: usize, out: &mut Vec<Block>) {
        while let Some(token) = self.advance() {
            match token {
                Token::ListClose => break,
                Token::ItemOpen => self.consume_item(ordered, depth, out),
                _ => {}
            }
        }
    }

    fn consume_item(&mut self, ordered: bool, depth: usize, out: &mut Vec<Block>) {
        while let Some(token) = self.peek() {
            match token {
                Token::ItemClose => {
                    self.pos += 1;
                    break;
                }
                Token::Paragraph(inline) => {
                    tracing::trace!(depth, ordered, "list item");
                    out.push(list_item_block(ordered, inline));
                    self.pos += 1;
                }
                Token::ListOpen { ordered: nested } => {
                    let nested = *nested;
                    self.pos += 1;
                    self.consume_list(nested, depth + 1, out);
                }
                _ => self.consume(out),
            }
        }
    }

    fn consume_table(&mut self) -> Block {
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut current: Option<Vec<String>> = None;
        while let Some(token) = self.advance() {
            match token {
                Token::TableClose => break,
                Token::RowOpen => current = Some(Vec::new()),
                Token::RowClose => rows.extend(current.take()),
                Token::Cell(inline) => current.get_or_insert_with(Vec::new).push(inline.markdown),
                _ => {}
            }
        }
        let column_size = rows.iter().map(Vec::len).max().unwrap_or(0);
        let cells = rows
            .iter()
            .flat_map(|row| (0..column_size).map(move |column| row.get(column)))
            .map(|text| {
                let text = text.map(String::as_str).unwrap_or_default();
                Block::new(BlockType::TableCell, BlockBody::Empty)
                    .with_children(vec![Block::text(BlockType::Text, inline::decode(text))])
            })
            .collect();
        Block::new(
            BlockType::Table,
            BlockBody::Table(TableBody {
                property: TableProperty {
                    row_size: rows.len(),
                    column_size,
                    column_width: Vec::new(),
                },
            }),
        )
        .with_children(cells)
    }
}

/// Splits a leading task checkbox off `text`.
fn task_marker(text: &str) -> Option<(bool, &str)> {
    let text = text.trim_start();
    [("[ ] ", false), ("[x] ", true), ("[X] ", true)]
        .iter()
        .find_map(|(prefix, done)| text.strip_prefix(prefix).map(|rest| (*done, rest)))
}

fn todo_block(done: bool, rest: &str) -> Block {
    Block::new(
        BlockType::Todo,
        BlockBody::Todo(TodoBody {
            elements: inline::decode(rest),
            style: TodoStyle { done },
        }),
    )
}

fn paragraph_block(inline: Inline) -> Block {
    if inline.is_single_image() {
        if let Some(image) = inline.images.into_iter().next() {
            let alt = if image.alt.is_empty() {
                "image".to_string()
            } else {
                image.alt
            };
            return Block::new(
                BlockType::Image,
                BlockBody::Image(ImageBody {
                    token: image.url,
                    alt,
                }),
            );
        }
        return Block::text(BlockType::Text, Vec::new());
    }
    match task_marker(&inline.markdown) {
        Some((done, rest)) => todo_block(done, rest),
        None => Block::text(BlockType::Text, inline::decode(&inline.markdown)),
    }
}

fn list_item_block(ordered: bool, inline: &Inline) -> Block {
    if let Some((done, rest)) = task_marker(&inline.markdown) {
        return todo_block(done, rest);
    }
    let kind = if ordered {
        BlockType::Ordered
    } else {
        BlockType::Bullet
    };
    Block::text(kind, inline::decode(&inline.markdown))
}

fn code_block(info: &str, content: &str) -> Block {
    let content = content.strip_suffix('\n').unwrap_or(content);
    let elements = if content.is_empty() {
        Vec::new()
    } else {
        vec![TextElement::plain(content)]
    };
    Block::new(
        BlockType::Code,
        BlockBody::Code(CodeBody {
            elements,
            style: CodeStyle {
                language: lang::resolve(info),
                wrap: false,
            },
        }),
    )
}
