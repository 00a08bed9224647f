//! Text helpers shared by the task analyzer and the file predictor
//!
//! Everything here is a keyword heuristic over the raw description; nothing
//! parses language structure.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

static BACKTICK_PATTERN: OnceLock<Regex> = OnceLock::new();
static CAMEL_PATTERN: OnceLock<Regex> = OnceLock::new();
static SNAKE_PATTERN: OnceLock<Regex> = OnceLock::new();
static COMPONENT_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Extensions recognised when a bare file name (no directory) is mentioned
const KNOWN_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go", "java", "kt", "c", "h", "cc", "cpp", "hpp",
    "cs", "rb", "php", "swift", "scala", "vue", "svelte", "toml", "json", "yaml", "yml", "ini",
    "env", "xml", "sql", "proto", "graphql", "md", "txt", "html", "css", "scss", "sh", "lock",
];

/// Words that never carry meaning on their own
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "onto", "that", "this", "these", "those", "when",
    "then", "than", "our", "its", "new", "all", "any", "each", "every", "some", "use", "using",
    "via", "per", "not", "but", "are", "was", "will", "should", "must", "can", "has", "have",
    "make", "sure", "also", "only", "just", "more", "less", "over", "under", "about", "after",
    "before", "between", "other", "same", "existing", "current", "proper", "properly", "better",
];

/// Nouns that name a kind of component ("the billing service")
const COMPONENT_KEYWORDS: &str = "service|module|component|endpoint|api|model|schema|table|handler|controller|page|store|hook|helper|util|utility|library|client|server|middleware|route|router|view|migration|command|plugin|worker|job|provider|adapter|parser|screen|form|widget";

fn backtick_pattern() -> &'static Regex {
    BACKTICK_PATTERN.get_or_init(|| Regex::new(r"`([^`\s][^`]*)`").unwrap())
}

fn camel_pattern() -> &'static Regex {
    CAMEL_PATTERN.get_or_init(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").unwrap())
}

fn snake_pattern() -> &'static Regex {
    SNAKE_PATTERN.get_or_init(|| Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b").unwrap())
}

fn component_pattern() -> &'static Regex {
    COMPONENT_PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b([a-z][a-z0-9-]+)\s+(?:{})s?\b", COMPONENT_KEYWORDS)).unwrap()
    })
}

/// File paths mentioned verbatim: anything with a directory separator, or a bare
/// file name with a known extension. Leading `./` and trailing punctuation are stripped.
pub fn extract_paths(text: &str) -> BTreeSet<String> {
    text.split_whitespace().filter_map(normalize_path).collect()
}

fn normalize_path(word: &str) -> Option<String> {
    if word.contains("://") {
        return None;
    }

    let trimmed = word
        .trim_start_matches(|c: char| matches!(c, '(' | '[' | '"' | '\'' | '`'))
        .trim_end_matches(|c: char| {
            matches!(c, ')' | ']' | '"' | '\'' | '`' | ',' | ';' | ':' | '.' | '!' | '?' | '/')
        })
        .trim_start_matches("./");

    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '/');
    if trimmed.is_empty()
        || trimmed.starts_with('/')
        || trimmed.starts_with("..")
        || !trimmed.chars().all(valid)
    {
        return None;
    }

    let has_dir = trimmed.contains('/');
    let extension = trimmed
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(stem, ext)| (stem.is_empty(), ext.to_lowercase()));

    match extension {
        Some((false, ext)) if KNOWN_EXTENSIONS.contains(&ext.as_str()) => Some(trimmed.to_string()),
        // Directory-like mentions such as `src/api` still count when a separator is present
        _ if has_dir && trimmed.split('/').all(|s| !s.is_empty()) => Some(trimmed.to_string()),
        _ => None,
    }
}

/// Lowercased word tokens of at least three characters, stopwords removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Tokens of the description with verbatim file paths left out
pub fn prose_tokens(text: &str) -> Vec<String> {
    let prose: Vec<&str> = text
        .split_whitespace()
        .filter(|word| normalize_path(word).is_none())
        .collect();
    tokenize(&prose.join(" "))
}

/// Named artifacts a description talks about, lowercased: file paths, backtick-quoted
/// names, CamelCase and snake_case identifiers and "<noun> <component>" phrases.
pub fn extract_artifacts(text: &str) -> BTreeSet<String> {
    let mut artifacts: BTreeSet<String> = extract_paths(text)
        .into_iter()
        .map(|p| p.to_lowercase())
        .collect();

    for cap in backtick_pattern().captures_iter(text) {
        artifacts.insert(cap[1].trim().to_lowercase());
    }

    for m in camel_pattern().find_iter(text) {
        artifacts.insert(m.as_str().to_lowercase());
    }

    for m in snake_pattern().find_iter(text) {
        artifacts.insert(m.as_str().to_lowercase());
    }

    for cap in component_pattern().captures_iter(text) {
        let noun = cap[1].to_lowercase();
        if STOPWORDS.contains(&noun.as_str()) || noun.len() < 3 {
            continue;
        }
        // Keep the full phrase so "billing service" and "billing table" stay distinct
        let phrase = cap[0].to_lowercase();
        artifacts.insert(phrase.trim_end_matches('s').to_string());
    }

    artifacts
}

/// Whether `artifact` is mentioned in `text` (case-insensitive, whole words)
pub fn mentions(text: &str, artifact: &str) -> bool {
    let haystack = text.to_lowercase();
    let mut start = 0;

    while let Some(pos) = haystack[start..].find(artifact) {
        let begin = start + pos;
        let end = begin + artifact.len();
        let before = haystack[..begin].chars().next_back();
        let after = haystack[end..].chars().next();
        let is_word = |c: Option<char>| c.map_or(false, |c| c.is_alphanumeric() || c == '_');

        if !is_word(before) && !is_word(after) {
            return true;
        }
        start = end;
    }

    false
}
