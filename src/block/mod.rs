//! Block model shared by the Markdown codec, the materializer and the remote
//! store.
//!
//! A [`Block`] is a locally built tree node (children owned inline). A
//! [`WireBlock`] is the flat form the remote store hands back, where children
//! are opaque ids resolved through an index.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

mod wire;

pub use wire::{WireBlock, flatten};

const HEADING_KEYS: [&str; 9] = [
    "heading1", "heading2", "heading3", "heading4", "heading5", "heading6", "heading7",
    "heading8", "heading9",
];

/// Registry of block kinds and their integer tags on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum BlockType {
    Page,
    Text,
    /// Heading levels 1 through 9.
    Heading(u8),
    Bullet,
    Ordered,
    Code,
    Quote,
    Todo,
    Bitable,
    Callout,
    Divider,
    File,
    Grid,
    GridColumn,
    Iframe,
    Image,
    Sheet,
    Table,
    TableCell,
    View,
    QuoteContainer,
    /// Any tag this registry does not know, including the remote's own
    /// `999` "undefined" marker.
    Unknown(i64),
}

impl BlockType {
    pub fn from_value(value: i64) -> Self {
        match value {
            1 => BlockType::Page,
            2 => BlockType::Text,
            3..=11 => BlockType::Heading((value - 2) as u8),
            12 => BlockType::Bullet,
            13 => BlockType::Ordered,
            14 => BlockType::Code,
            15 => BlockType::Quote,
            17 => BlockType::Todo,
            18 => BlockType::Bitable,
            19 => BlockType::Callout,
            22 => BlockType::Divider,
            23 => BlockType::File,
            24 => BlockType::Grid,
            25 => BlockType::GridColumn,
            26 => BlockType::Iframe,
            27 => BlockType::Image,
            30 => BlockType::Sheet,
            31 => BlockType::Table,
            32 => BlockType::TableCell,
            33 => BlockType::View,
            34 => BlockType::QuoteContainer,
            other => BlockType::Unknown(other),
        }
    }

    pub fn value(self) -> i64 {
        match self {
            BlockType::Page => 1,
            BlockType::Text => 2,
            BlockType::Heading(level) => i64::from(level.clamp(1, 9)) + 2,
            BlockType::Bullet => 12,
            BlockType::Ordered => 13,
            BlockType::Code => 14,
            BlockType::Quote => 15,
            BlockType::Todo => 17,
            BlockType::Bitable => 18,
            BlockType::Callout => 19,
            BlockType::Divider => 22,
            BlockType::File => 23,
            BlockType::Grid => 24,
            BlockType::GridColumn => 25,
            BlockType::Iframe => 26,
            BlockType::Image => 27,
            BlockType::Sheet => 30,
            BlockType::Table => 31,
            BlockType::TableCell => 32,
            BlockType::View => 33,
            BlockType::QuoteContainer => 34,
            BlockType::Unknown(value) => value,
        }
    }

    /// Heading kind for `level`, clamped into `1..=9`.
    pub fn heading(level: u8) -> Self {
        BlockType::Heading(level.clamp(1, 9))
    }

    /// Key under which this kind's body travels in the wire schema.
    pub fn body_key(self) -> Option<&'static str> {
        let key = match self {
            BlockType::Page => "page",
            BlockType::Text => "text",
            BlockType::Heading(level) => HEADING_KEYS[usize::from(level.clamp(1, 9)) - 1],
            BlockType::Bullet => "bullet",
            BlockType::Ordered => "ordered",
            BlockType::Code => "code",
            BlockType::Quote => "quote",
            BlockType::Todo => "todo",
            BlockType::Bitable => "bitable",
            BlockType::Callout => "callout",
            BlockType::Divider => "divider",
            BlockType::File => "file",
            BlockType::Grid => "grid",
            BlockType::GridColumn => "grid_column",
            BlockType::Iframe => "iframe",
            BlockType::Image => "image",
            BlockType::Sheet => "sheet",
            BlockType::Table => "table",
            BlockType::TableCell => "table_cell",
            BlockType::View => "view",
            BlockType::QuoteContainer => "quote_container",
            BlockType::Unknown(_) => return None,
        };
        Some(key)
    }

    /// Kinds whose body is a run of inline text elements.
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            BlockType::Page
                | BlockType::Text
                | BlockType::Heading(_)
                | BlockType::Bullet
                | BlockType::Ordered
                | BlockType::Quote
        )
    }
}

impl From<i64> for BlockType {
    fn from(value: i64) -> Self {
        BlockType::from_value(value)
    }
}

impl From<BlockType> for i64 {
    fn from(kind: BlockType) -> Self {
        kind.value()
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Heading(level) => write!(f, "HEADING{level}"),
            BlockType::Unknown(999) => f.write_str("UNDEFINED"),
            BlockType::Unknown(value) => write!(f, "UNKNOWN_{value}"),
            other => match other.body_key() {
                Some(key) => f.write_str(&key.to_ascii_uppercase()),
                None => f.write_str("UNKNOWN"),
            },
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

/// Independent inline style flags carried by one text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inline_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

impl TextStyle {
    /// Folds `outer` onto `self`: flags are OR-ed, an existing link wins.
    pub fn merge(&mut self, outer: &TextStyle) {
        self.bold |= outer.bold;
        self.italic |= outer.italic;
        self.strikethrough |= outer.strikethrough;
        self.inline_code |= outer.inline_code;
        if self.link.is_none() {
            self.link = outer.link.clone();
        }
    }

    pub fn link_url(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.url.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    #[serde(default)]
    pub text_element_style: TextStyle,
}

/// Inline element kinds that carry no run but still have something to show.
const FALLBACK_KINDS: [&str; 6] = [
    "mention_user",
    "mention_doc",
    "equation",
    "file",
    "reminder",
    "undefined",
];

/// One inline unit. Anything other than a plain text run (mentions,
/// equations, embeds) is kept verbatim in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_run: Option<TextRun>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl TextElement {
    pub fn run(content: impl Into<String>, style: TextStyle) -> Self {
        TextElement {
            text_run: Some(TextRun {
                content: content.into(),
                text_element_style: style,
            }),
            other: BTreeMap::new(),
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self::run(content, TextStyle::default())
    }

    pub fn content(&self) -> Option<&str> {
        self.text_run.as_ref().map(|run| run.content.as_str())
    }

    pub fn style(&self) -> Option<&TextStyle> {
        self.text_run.as_ref().map(|run| &run.text_element_style)
    }

    /// Display text of a non-run element, e.g. a mention's name.
    pub fn fallback_text(&self) -> Option<&str> {
        FALLBACK_KINDS
            .iter()
            .filter_map(|kind| self.other.get(*kind))
            .find_map(|value| {
                ["content", "title", "text"]
                    .iter()
                    .find_map(|field| value.get(field).and_then(Value::as_str))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub elements: Vec<TextElement>,
}

/// Code language as stored remotely: an integer from the language table, or
/// a literal tag the table does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeLanguage {
    Id(i64),
    Name(String),
}

impl Default for CodeLanguage {
    fn default() -> Self {
        CodeLanguage::Id(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStyle {
    #[serde(default)]
    pub language: CodeLanguage,
    #[serde(default)]
    pub wrap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeBody {
    #[serde(default)]
    pub elements: Vec<TextElement>,
    #[serde(default)]
    pub style: CodeStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStyle {
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoBody {
    #[serde(default)]
    pub elements: Vec<TextElement>,
    #[serde(default)]
    pub style: TodoStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProperty {
    #[serde(default)]
    pub row_size: usize,
    #[serde(default)]
    pub column_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_width: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBody {
    #[serde(default)]
    pub property: TableProperty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBody {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalloutBody {
    #[serde(default)]
    pub emoji_id: String,
}

/// Kind-specific payload of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockBody {
    /// Structural kinds with no payload (divider, quote container, table cell).
    Empty,
    Text(TextBody),
    Code(CodeBody),
    Todo(TodoBody),
    Table(TableBody),
    Image(ImageBody),
    Callout(CalloutBody),
    /// Payload of a kind this crate does not interpret, kept as received.
    Opaque(Value),
}

impl BlockBody {
    pub fn text(elements: Vec<TextElement>) -> Self {
        BlockBody::Text(TextBody { elements })
    }

    /// Decodes the payload found under `kind`'s body key.
    pub fn decode(kind: BlockType, raw: Option<Value>) -> Result<Self, serde_json::Error> {
        let raw = match raw {
            Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
            Some(value) => value,
        };
        let body = match kind {
            kind if kind.is_text_like() => BlockBody::Text(serde_json::from_value(raw)?),
            BlockType::Code => BlockBody::Code(serde_json::from_value(raw)?),
            BlockType::Todo => BlockBody::Todo(serde_json::from_value(raw)?),
            BlockType::Table => BlockBody::Table(serde_json::from_value(raw)?),
            BlockType::Image => BlockBody::Image(serde_json::from_value(raw)?),
            BlockType::Callout => BlockBody::Callout(serde_json::from_value(raw)?),
            BlockType::Divider | BlockType::QuoteContainer | BlockType::TableCell => {
                BlockBody::Empty
            }
            _ => BlockBody::Opaque(raw),
        };
        Ok(body)
    }

    /// Inline elements for text-bearing bodies; empty for everything else.
    pub fn elements(&self) -> &[TextElement] {
        match self {
            BlockBody::Text(body) => &body.elements,
            BlockBody::Code(body) => &body.elements,
            BlockBody::Todo(body) => &body.elements,
            _ => &[],
        }
    }
}

impl Serialize for BlockBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockBody::Empty => serializer.serialize_map(Some(0))?.end(),
            BlockBody::Text(body) => body.serialize(serializer),
            BlockBody::Code(body) => body.serialize(serializer),
            BlockBody::Todo(body) => body.serialize(serializer),
            BlockBody::Table(body) => body.serialize(serializer),
            BlockBody::Image(body) => body.serialize(serializer),
            BlockBody::Callout(body) => body.serialize(serializer),
            BlockBody::Opaque(value) => value.serialize(serializer),
        }
    }
}

/// A locally built block tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockType,
    pub body: BlockBody,
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockType, body: BlockBody) -> Self {
        Block {
            kind,
            body,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn text(kind: BlockType, elements: Vec<TextElement>) -> Self {
        Block::new(kind, BlockBody::text(elements))
    }

    pub fn divider() -> Self {
        Block::new(BlockType::Divider, BlockBody::Empty)
    }

    /// Copy of this block without its children, as sent to a create call.
    pub fn shallow(&self) -> Block {
        Block::new(self.kind, self.body.clone())
    }

    /// Whether this block cannot be created inside a flat sibling batch.
    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            BlockType::Table | BlockType::QuoteContainer | BlockType::Callout
        ) || !self.children.is_empty()
    }

    pub fn elements(&self) -> &[TextElement] {
        self.body.elements()
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("block_type", &self.kind)?;
        if let Some(key) = self.kind.body_key() {
            map.serialize_entry(key, &self.body)?;
        }
        if !self.children.is_empty() {
            map.serialize_entry("children", &self.children)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_type_values_round_trip() {
        for value in [1, 2, 3, 11, 12, 13, 14, 15, 17, 19, 22, 27, 31, 32, 34, 999, 40] {
            assert_eq!(BlockType::from_value(value).value(), value);
        }
        assert_eq!(BlockType::from_value(5), BlockType::Heading(3));
        assert_eq!(BlockType::from_value(999), BlockType::Unknown(999));
    }

    #[test]
    fn test_body_keys() {
        assert_eq!(BlockType::Heading(1).body_key(), Some("heading1"));
        assert_eq!(BlockType::Heading(9).body_key(), Some("heading9"));
        assert_eq!(BlockType::QuoteContainer.body_key(), Some("quote_container"));
        assert_eq!(BlockType::TableCell.body_key(), Some("table_cell"));
        assert_eq!(BlockType::Unknown(77).body_key(), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(BlockType::Bitable.to_string(), "BITABLE");
        assert_eq!(BlockType::Heading(2).to_string(), "HEADING2");
        assert_eq!(BlockType::Unknown(999).to_string(), "UNDEFINED");
        assert_eq!(BlockType::Unknown(40).to_string(), "UNKNOWN_40");
    }

    #[test]
    fn test_block_serializes_to_wire_schema() {
        let block = Block::new(
            BlockType::QuoteContainer,
            BlockBody::Empty,
        )
        .with_children(vec![Block::text(
            BlockType::Text,
            vec![TextElement::run(
                "hi",
                TextStyle {
                    bold: true,
                    ..TextStyle::default()
                },
            )],
        )]);
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(
            value,
            json!({
                "block_type": 34,
                "quote_container": {},
                "children": [{
                    "block_type": 2,
                    "text": {"elements": [{
                        "text_run": {"content": "hi", "text_element_style": {"bold": true}}
                    }]}
                }]
            })
        );
    }

    #[test]
    fn test_divider_has_empty_body() {
        let value = serde_json::to_value(Block::divider()).unwrap();
        assert_eq!(value, json!({"block_type": 22, "divider": {}}));
    }

    #[test]
    fn test_fallback_text_for_mentions() {
        let element: TextElement =
            serde_json::from_value(json!({"mention_user": {"content": "@ada", "user_id": "u1"}}))
                .unwrap();
        assert!(element.text_run.is_none());
        assert_eq!(element.fallback_text(), Some("@ada"));
    }

    #[test]
    fn test_code_language_accepts_int_or_string() {
        let body: CodeBody =
            serde_json::from_value(json!({"elements": [], "style": {"language": 49}})).unwrap();
        assert_eq!(body.style.language, CodeLanguage::Id(49));
        let body: CodeBody =
            serde_json::from_value(json!({"style": {"language": "zig"}})).unwrap();
        assert_eq!(body.style.language, CodeLanguage::Name("zig".into()));
    }

    #[test]
    fn test_style_merge_keeps_inner_link() {
        let mut inner = TextStyle {
            italic: true,
            link: Some(Link { url: "a".into() }),
            ..TextStyle::default()
        };
        let outer = TextStyle {
            bold: true,
            link: Some(Link { url: "b".into() }),
            ..TextStyle::default()
        };
        inner.merge(&outer);
        assert!(inner.bold && inner.italic);
        assert_eq!(inner.link_url(), Some("a"));
    }

    #[test]
    fn test_container_detection() {
        assert!(Block::new(BlockType::Table, BlockBody::Table(TableBody::default())).is_container());
        assert!(!Block::text(BlockType::Bullet, vec![]).is_container());
        assert!(
            Block::text(BlockType::Bullet, vec![])
                .with_children(vec![Block::divider()])
                .is_container()
        );
    }
}
