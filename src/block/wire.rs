use super::{Block, BlockBody, BlockType};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A block as listed by the remote store: children are ids, not nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct WireBlock {
    pub block_id: String,
    pub parent_id: String,
    pub kind: BlockType,
    pub body: BlockBody,
    pub children: Vec<String>,
}

impl WireBlock {
    pub fn new(
        block_id: impl Into<String>,
        parent_id: impl Into<String>,
        kind: BlockType,
        body: BlockBody,
    ) -> Self {
        WireBlock {
            block_id: block_id.into(),
            parent_id: parent_id.into(),
            kind,
            body,
            children: Vec::new(),
        }
    }

    pub fn with_children<I, T>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }
}

/// Lays a block tree out as a flat listing under a page block `root_id`,
/// assigning sequential ids in document order.
pub fn flatten(root_id: &str, blocks: &[Block]) -> Vec<WireBlock> {
    let mut out = vec![WireBlock::new(
        root_id,
        "",
        BlockType::Page,
        BlockBody::text(Vec::new()),
    )];
    let children = blocks
        .iter()
        .map(|block| push_flat(block, root_id, &mut out))
        .collect();
    out[0].children = children;
    out
}

fn push_flat(block: &Block, parent_id: &str, out: &mut Vec<WireBlock>) -> String {
    let block_id = format!("blk_{}", out.len());
    let index = out.len();
    out.push(WireBlock::new(
        block_id.as_str(),
        parent_id,
        block.kind,
        block.body.clone(),
    ));
    let children = block
        .children
        .iter()
        .map(|child| push_flat(child, &block_id, out))
        .collect();
    out[index].children = children;
    block_id
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(default)]
    block_id: String,
    #[serde(default)]
    parent_id: Option<String>,
    block_type: i64,
    #[serde(default)]
    children: Option<Vec<String>>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl<'de> Deserialize<'de> for WireBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = RawBlock::deserialize(deserializer)?;
        let kind = BlockType::from_value(raw.block_type);
        let payload = kind.body_key().and_then(|key| raw.rest.remove(key));
        let body = BlockBody::decode(kind, payload).map_err(de::Error::custom)?;
        Ok(WireBlock {
            block_id: raw.block_id,
            parent_id: raw.parent_id.unwrap_or_default(),
            kind,
            body,
            children: raw.children.unwrap_or_default(),
        })
    }
}

impl Serialize for WireBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("block_id", &self.block_id)?;
        map.serialize_entry("parent_id", &self.parent_id)?;
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
