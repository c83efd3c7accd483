//! Code block language table.

use crate::block::CodeLanguage;

/// Language ids used by the remote store, in id order starting at 1.
const LANGUAGES: [&str; 67] = [
    "plaintext",
    "abap",
    "ada",
    "apache",
    "apex",
    "assembly",
    "bash",
    "c",
    "c#",
    "c++",
    "cobol",
    "css",
    "coffeescript",
    "d",
    "dart",
    "delphi",
    "django",
    "dockerfile",
    "elixir",
    "erlang",
    "fortran",
    "foxpro",
    "go",
    "groovy",
    "html",
    "haskell",
    "http",
    "json",
    "java",
    "javascript",
    "julia",
    "kotlin",
    "latex",
    "lisp",
    "logo",
    "lua",
    "matlab",
    "makefile",
    "markdown",
    "nginx",
    "objective-c",
    "openedgeabl",
    "perl",
    "php",
    "pl/sql",
    "powershell",
    "prolog",
    "protobuf",
    "python",
    "r",
    "rpg",
    "ruby",
    "rust",
    "sas",
    "scss",
    "sql",
    "scala",
    "scheme",
    "scratch",
    "shell",
    "swift",
    "thrift",
    "typescript",
    "vbscript",
    "visual-basic",
    "xml",
    "yaml",
];

const ALIASES: [(&str, i64); 24] = [
    ("text", 1),
    ("txt", 1),
    ("sh", 7),
    ("zsh", 7),
    ("cs", 9),
    ("csharp", 9),
    ("cpp", 10),
    ("golang", 23),
    ("js", 30),
    ("kt", 32),
    ("tex", 33),
    ("make", 38),
    ("md", 39),
    ("objc", 41),
    ("plsql", 45),
    ("ps1", 46),
    ("proto", 48),
    ("py", 49),
    ("rb", 52),
    ("rs", 53),
    ("ts", 63),
    ("vb", 65),
    ("yml", 67),
    ("docker", 18),
];

pub const PLAINTEXT: i64 = 1;

/// Resolves a fence info string to a language.
///
/// Lookup is case-insensitive and covers common aliases. An empty tag is
/// plain text; an unknown tag is kept as a lowercased literal.
pub fn resolve(tag: &str) -> CodeLanguage {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return CodeLanguage::Id(PLAINTEXT);
    }
    if let Some(index) = LANGUAGES.iter().position(|name| *name == tag) {
        return CodeLanguage::Id(index as i64 + 1);
    }
    if let Some((_, id)) = ALIASES.iter().find(|(alias, _)| *alias == tag) {
        return CodeLanguage::Id(*id);
    }
    CodeLanguage::Name(tag)
}

/// Fence info string for a stored language. Plain text renders as a bare
/// fence so unannotated blocks stay unannotated.
pub fn fence_tag(language: &CodeLanguage) -> &str {
    match language {
        CodeLanguage::Id(PLAINTEXT) => "",
        CodeLanguage::Id(id) => usize::try_from(*id - 1)
            .ok()
            .and_then(|index| LANGUAGES.get(index))
            .copied()
            .unwrap_or(""),
        CodeLanguage::Name(name) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ends() {
        assert_eq!(resolve("abap"), CodeLanguage::Id(2));
        assert_eq!(resolve("shell"), CodeLanguage::Id(60));
        assert_eq!(resolve("yaml"), CodeLanguage::Id(67));
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        assert_eq!(resolve("PY"), CodeLanguage::Id(49));
        assert_eq!(resolve("Python"), CodeLanguage::Id(49));
        assert_eq!(resolve("js"), CodeLanguage::Id(30));
        assert_eq!(resolve("sh"), CodeLanguage::Id(7));
        assert_eq!(resolve("bash"), CodeLanguage::Id(7));
        assert_eq!(resolve("rs"), CodeLanguage::Id(53));
    }

    #[test]
    fn test_unknown_passes_through_lowercased() {
        assert_eq!(resolve("Zig"), CodeLanguage::Name("zig".into()));
        assert_eq!(fence_tag(&CodeLanguage::Name("zig".into())), "zig");
    }

    #[test]
    fn test_empty_tag_is_plaintext() {
        assert_eq!(resolve(""), CodeLanguage::Id(PLAINTEXT));
        assert_eq!(fence_tag(&CodeLanguage::Id(PLAINTEXT)), "");
    }

    #[test]
    fn test_fence_tag_reverse_lookup() {
        assert_eq!(fence_tag(&CodeLanguage::Id(53)), "rust");
        assert_eq!(fence_tag(&CodeLanguage::Id(10)), "c++");
        assert_eq!(fence_tag(&CodeLanguage::Id(500)), "");
        assert_eq!(fence_tag(&CodeLanguage::Id(0)), "");
    }
}
