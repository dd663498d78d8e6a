//! Markdown note parsing: frontmatter split, wikilink and tag extraction,
//! title derivation.
//!
//! Parsing never fails on content. Malformed YAML frontmatter degrades to
//! "no frontmatter, whole input is body" rather than surfacing an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static WIKILINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(.*?)\]\]").unwrap());
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)#([A-Za-z][A-Za-z0-9_/-]*)").unwrap());

/// Output of parsing a Markdown note.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    /// Frontmatter mapping, `None` when absent or unparseable.
    pub frontmatter: Option<Map<String, Value>>,
    /// Body text after the frontmatter block (whole input when no frontmatter).
    pub body: String,
    /// Frontmatter `title`, else first H1, else empty.
    pub title: String,
    /// Wikilink targets in first-seen order, deduplicated.
    pub links: Vec<String>,
    /// Frontmatter tags followed by inline `#tags`, deduplicated.
    pub tags: Vec<String>,
}

/// Parse raw note bytes into frontmatter, body, links, tags, and title.
pub fn parse(data: &[u8]) -> Parsed {
    let text = String::from_utf8_lossy(data);
    let (frontmatter, body) = split_frontmatter(&text);

    let links = extract_links(&body);
    let tags = extract_tags(&body, frontmatter.as_ref());
    let title = derive_title(frontmatter.as_ref(), &body);

    Parsed {
        frontmatter,
        body,
        title,
        links,
        tags,
    }
}

/// Separate YAML frontmatter (between leading `---` delimiter lines) from the
/// body. Returns `(None, whole input)` when there is no valid frontmatter.
fn split_frontmatter(text: &str) -> (Option<Map<String, Value>>, String) {
    let trimmed = text.trim_start_matches(['\n', '\r']);

    match trimmed.split_inclusive('\n').next() {
        Some(first) if first.trim_end_matches(['\n', '\r']) == "---" => {}
        _ => return (None, text.to_string()),
    }

    // Find the closing delimiter line.
    let after_open = &trimmed[trimmed.find('\n').map(|i| i + 1).unwrap_or(trimmed.len())..];
    let mut offset = 0usize;
    let mut yaml_end: Option<usize> = None;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            yaml_end = Some(offset);
            offset += line.len();
            break;
        }
        offset += line.len();
    }

    let Some(end) = yaml_end else {
        // No closing delimiter: the whole input is body.
        return (None, text.to_string());
    };

    let yaml_block = &after_open[..end];
    let body = after_open[offset..]
        .trim_start_matches(['\n', '\r'])
        .to_string();

    match serde_yaml::from_str::<Value>(yaml_block) {
        Ok(Value::Object(map)) => (Some(map), body),
        // An empty block between the delimiters is valid, just empty.
        Ok(Value::Null) => (None, body),
        // Invalid or non-mapping YAML: degrade, whole input is body.
        _ => (None, text.to_string()),
    }
}

/// Deduplicated wikilink targets, with `[[target|alias]]` reduced to `target`.
fn extract_links(body: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in WIKILINK_RE.captures_iter(body) {
        let raw = &cap[1];
        let target = match raw.find('|') {
            Some(i) => &raw[..i],
            None => raw,
        };
        let target = target.trim();
        if target.is_empty() {
            continue;
        }
        if !out.iter().any(|t| t == target) {
            out.push(target.to_string());
        }
    }
    out
}

/// Tags from the frontmatter `tags` list followed by inline `#tags`,
/// deduplicated preserving first-seen order.
fn extract_tags(body: &str, fm: Option<&Map<String, Value>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |out: &mut Vec<String>, tag: &str| {
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    };

    if let Some(Value::Array(items)) = fm.and_then(|m| m.get("tags")) {
        for item in items {
            if let Value::String(s) = item {
                push(&mut out, s.trim());
            }
        }
    }

    for cap in TAG_RE.captures_iter(body) {
        push(&mut out, &cap[1]);
    }

    out
}

/// Frontmatter `title` when present and non-empty, else the first H1 heading,
/// else empty.
fn derive_title(fm: Option<&Map<String, Value>>, body: &str) -> String {
    if let Some(Value::String(s)) = fm.and_then(|m| m.get("title")) {
        if !s.is_empty() {
            return s.clone();
        }
    }
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            return rest.trim().to_string();
        }
    }
    String::new()
}
