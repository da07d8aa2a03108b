//! Condense rendered markup into a bounded excerpt for the model.
//!
//! Strips non-content elements, keeps JSON-LD product data, picks the
//! narrowest container that still carries enough markup, collapses
//! whitespace, and truncates to the character budget.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// Appended when the excerpt was cut. Counted against the budget.
pub const TRUNCATION_MARKER: &str = " [...truncated]";

/// A container shorter than this is considered too thin to use.
pub const MIN_CONTAINER_CHARS: usize = 3_000;

const STRIP: &str = "script, style, noscript, iframe, svg";
const LD_JSON: &str = r#"script[type="application/ld+json"]"#;
const PRIMARY: &[&str] = &["main", "[role='main']", "#main"];
const BROADER: &[&str] = &["#content", "#page", "#wrapper", ".container"];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("regex is valid"));

/// Produce the excerpt sent to the model, at most `max_chars` characters long.
pub fn prepare_html(html: &str, max_chars: usize) -> String {
    let mut document = Html::parse_document(html);
    let ld_json = linked_data(&document);
    strip_noise(&mut document);

    let body = pick_container(&document);
    let mut excerpt = String::new();
    for block in &ld_json {
        excerpt.push_str(r#"<script type="application/ld+json">"#);
        excerpt.push_str(block);
        excerpt.push_str("</script>\n");
    }
    excerpt.push_str(&body);

    truncate(collapse(&excerpt), max_chars)
}

fn linked_data(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(LD_JSON) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Detach scripts, styles, frames, inline SVG, and comments.
fn strip_noise(document: &mut Html) {
    let mut doomed = Vec::new();
    if let Ok(selector) = Selector::parse(STRIP) {
        doomed.extend(document.select(&selector).map(|el| el.id()));
    }
    doomed.extend(
        document
            .tree
            .root()
            .descendants()
            .filter(|n| n.value().is_comment())
            .map(|n| n.id()),
    );

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Narrowest container with enough markup: primary, then broader, then body.
fn pick_container(document: &Html) -> String {
    for group in [PRIMARY, BROADER] {
        if let Some(html) = first_container(document, group) {
            if html.chars().count() >= MIN_CONTAINER_CHARS {
                return html;
            }
        }
    }

    Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next().map(|el| el.html()))
        .unwrap_or_else(|| document.root_element().html())
}

fn first_container(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        document.select(&selector).next().map(|el| el.html())
    })
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
