//! Markdown codec: Markdown text to block trees and flat block lists back to
//! Markdown.

use pulldown_cmark::BlockQuoteKind;

pub mod inline;
pub mod lang;
pub mod parse;
pub mod render;

pub use parse::{BlockParser, Inline, Token, tokenize};
pub use render::{render, render_tree};

/// GitHub alert kinds, stored remotely as callouts keyed by emoji id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admonition {
    Note,
    Tip,
    Important,
    Warning,
    Caution,
}

impl Admonition {
    pub fn label(self) -> &'static str {
        match self {
            Admonition::Note => "NOTE",
            Admonition::Tip => "TIP",
            Admonition::Important => "IMPORTANT",
            Admonition::Warning => "WARNING",
            Admonition::Caution => "CAUTION",
        }
    }

    pub fn emoji_id(self) -> &'static str {
        match self {
            Admonition::Note => "info",
            Admonition::Tip => "bulb",
            Admonition::Important => "star",
            Admonition::Warning => "warning",
            Admonition::Caution => "red_circle",
        }
    }

    /// Unknown emoji ids fall back to a note.
    pub fn from_emoji(emoji_id: &str) -> Self {
        match emoji_id {
            "bulb" => Admonition::Tip,
            "warning" => Admonition::Warning,
            "red_circle" => Admonition::Caution,
            "star" => Admonition::Important,
            _ => Admonition::Note,
        }
    }
}

impl From<BlockQuoteKind> for Admonition {
    fn from(kind: BlockQuoteKind) -> Self {
        match kind {
            BlockQuoteKind::Note => Admonition::Note,
            BlockQuoteKind::Tip => Admonition::Tip,
            BlockQuoteKind::Important => Admonition::Important,
            BlockQuoteKind::Warning => Admonition::Warning,
            BlockQuoteKind::Caution => Admonition::Caution,
        }
    }
}

/// Parses Markdown into a block tree.
pub fn markdown_to_blocks(markdown: &str) -> Vec<crate::block::Block> {
    BlockParser::parse(markdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_table_round_trips_labels() {
        for kind in [
            Admonition::Note,
            Admonition::Tip,
            Admonition::Important,
            Admonition::Warning,
            Admonition::Caution,
        ] {
            assert_eq!(Admonition::from_emoji(kind.emoji_id()), kind);
        }
        assert_eq!(Admonition::from_emoji("check"), Admonition::Note);
        assert_eq!(Admonition::from_emoji("rocket"), Admonition::Note);
    }
}
