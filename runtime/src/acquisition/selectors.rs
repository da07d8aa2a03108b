//! Declarative selector rule tables and the first-match resolver.
//!
//! Rules are ordered CSS selectors keyed by field, loaded at compile time from
//! `selector_rules.json` via `include_str!`. The same table drives both the
//! parsed-markup resolver used by the static tier and the in-page script used
//! against the live DOM, so a rule added to the JSON file applies to both.
//!
//! `scraper` types are `!Send`; resolve inside a synchronous scope and only
//! carry the resulting [`RawFields`] across await points.

use crate::error::ConfigError;
use crate::price::{parse_price, resolve_image_url};
use crate::result::ProductData;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const RULES_JSON: &str = include_str!("selector_rules.json");

/// Attributes holding an image reference, best first.
pub const IMAGE_ATTRS: &[&str] = &["data-old-hires", "data-src", "src", "content"];

/// A field addressed by the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Price,
    Image,
}

/// Ordered selectors per field, evaluated first-match-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRuleSet {
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
}

/// Raw, unparsed values picked by the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawFields {
    pub title: Option<String>,
    pub price: Option<String>,
    pub image: Option<String>,
}

impl SelectorRuleSet {
    /// The rule table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_json(RULES_JSON).unwrap_or_default()
    }

    /// Load a rule table from JSON (`{"title": [...], "price": [...], "image": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidRules(e.to_string()))
    }

    pub fn selectors(&self, field: Field) -> &[String] {
        match field {
            Field::Title => &self.title,
            Field::Price => &self.price,
            Field::Image => &self.image,
        }
    }

    /// Append a rule at the lowest priority for `field`.
    pub fn push(&mut self, field: Field, selector: impl Into<String>) {
        let list = match field {
            Field::Title => &mut self.title,
            Field::Price => &mut self.price,
            Field::Image => &mut self.image,
        };
        list.push(selector.into());
    }

    /// Resolve every field against parsed markup.
    pub fn resolve(&self, document: &Html) -> RawFields {
        RawFields {
            title: first_match(document, &self.title, element_text_or_content),
            price: first_match(document, &self.price, element_text_or_content),
            image: first_match(document, &self.image, image_reference),
        }
    }

    /// Parse `html` and resolve every field.
    pub fn resolve_html(&self, html: &str) -> RawFields {
        let document = Html::parse_document(html);
        self.resolve(&document)
    }

    /// A self-contained expression that applies this rule table to the live
    /// DOM and evaluates to `{title, price, image}` (strings or null).
    pub fn page_script(&self) -> String {
        let rules = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        let attrs = serde_json::to_string(IMAGE_ATTRS).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"(() => {{
  const rules = {rules};
  const imageAttrs = {attrs};
  const clean = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const textOf = (el) => clean(el.textContent) || clean(el.getAttribute('content'));
  const imageOf = (el) => {{
    for (const a of imageAttrs) {{
      const v = clean(el.getAttribute(a));
      if (v) return v;
    }}
    return '';
  }};
  const first = (selectors, read) => {{
    for (const sel of selectors || []) {{
      let nodes;
      try {{ nodes = document.querySelectorAll(sel); }} catch (_) {{ continue; }}
      for (const el of nodes) {{
        const v = read(el);
        if (v) return v;
      }}
    }}
    return null;
  }};
  return {{
    title: first(rules.title, textOf),
    price: first(rules.price, textOf),
    image: first(rules.image, imageOf),
  }};
}})()"#
        )
    }
}

impl RawFields {
    /// Run the price parser and URL resolver over the raw values.
    pub fn into_product(self, base_url: &str) -> ProductData {
        let parsed = self.price.as_deref().and_then(parse_price);
        ProductData {
            title: self.title.filter(|t| !t.is_empty()),
            price: parsed.as_ref().map(|p| p.price),
            currency: parsed.map(|p| p.currency),
            image_url: resolve_image_url(self.image.as_deref(), base_url),
        }
    }
}

fn first_match(
    document: &Html,
    selectors: &[String],
    read: fn(&ElementRef<'_>) -> Option<String>,
) -> Option<String> {
    for selector_str in selectors {
        let selector = match Selector::parse(selector_str) {
            Ok(s) => s,
            Err(e) => {
                warn!("skipping invalid selector {selector_str:?}: {e:?}");
                continue;
            }
        };
        if let Some(value) = document.select(&selector).find_map(|el| read(&el)) {
            debug!("selector {selector_str:?} matched");
            return Some(value);
        }
    }
    None
}

/// Whitespace-collapsed text, falling back to the `content` attribute.
///
/// Text nodes are concatenated with no separator, matching `textContent` in
/// the live-DOM script, so a price split across spans reads the same in both.
fn element_text_or_content(el: &ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&el.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }
    el.value()
        .attr("content")
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn image_reference(el: &ElementRef<'_>) -> Option<String> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
