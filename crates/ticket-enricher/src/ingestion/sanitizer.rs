//! Plain-text cleanup of ticket fields before they reach the LLM

use regex::{Regex, RegexBuilder};
use scraper::{node::Node, ElementRef, Html};

use crate::config::SanitizerConfig;
use crate::error::{Error, Result};
use crate::types::Cell;

/// Elements that start a new line when flattened to text
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section", "table", "td",
    "th", "tr", "ul",
];

/// Elements whose content is never user-visible text
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template"];

/// Strips markup and system-generated identifier tags from field text
#[derive(Debug, Clone)]
pub struct Sanitizer {
    identifiers: Vec<Regex>,
}

impl Sanitizer {
    /// Compile the configured identifier patterns (case-insensitive)
    pub fn new(config: &SanitizerConfig) -> Result<Self> {
        let identifiers = config
            .identifier_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        Error::Config(format!("Invalid identifier pattern '{}': {}", pattern, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { identifiers })
    }

    /// Clean a table cell; non-text cells yield an empty string
    pub fn sanitize(&self, value: &Cell) -> String {
        match value.as_text() {
            Some(text) => self.sanitize_text(text),
            None => String::new(),
        }
    }

    /// Clean raw field text
    pub fn sanitize_text(&self, text: &str) -> String {
        let mut cleaned = if looks_like_markup(text) {
            html_to_text(text)
        } else {
            text.to_string()
        };

        for pattern in &self.identifiers {
            if pattern.is_match(&cleaned) {
                cleaned = pattern.replace_all(&cleaned, "").into_owned();
            }
        }

        collapse_whitespace(&cleaned)
    }
}

fn looks_like_markup(text: &str) -> bool {
    text.contains('<') || text.contains('&')
}

/// Flatten an HTML fragment to text, keeping block boundaries as line breaks
fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// One space between words, one newline between non-empty lines
fn collapse_whitespace(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
