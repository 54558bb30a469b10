//! Flattens a document body into Markdown blocks.
//!
//! Every descendant of `<body>` is visited independently, so content nested
//! inside a recognized block is emitted again by its own rule (an `<a>` inside
//! a `<p>` yields the paragraph and then the link). Keeping images nested in
//! paragraphs depends on this.

use crate::document::{Document, NodeId};

pub const MISSING_ALT_TEXT: &str = "TODO: add alt text";

pub fn to_markdown(document: &Document) -> String {
    let Some(body) = document.body() else {
        return String::new();
    };

    let mut blocks = Vec::new();
    for node in document.descendants(body) {
        emit_block(document, node, &mut blocks);
    }
    blocks.join("\n\n")
}

fn emit_block(document: &Document, node: NodeId, blocks: &mut Vec<String>) {
    let Some(name) = document.name(node) else {
        return;
    };

    if let Some(level) = heading_level(name) {
        blocks.push(format!(
            "{} {}",
            "#".repeat(level),
            document.text_content(node)
        ));
        return;
    }

    match name {
        "p" => {
            let text = document.text_content(node);
            if !text.is_empty() {
                blocks.push(text);
            }
        }
        "ul" => {
            for &child in document.children(node) {
                if document.name(child) == Some("li") {
                    blocks.push(format!("- {}", document.text_content(child)));
                }
            }
        }
        "img" => {
            let Some(src) = document.attr(node, "src").filter(|s| !s.is_empty()) else {
                return;
            };
            let alt = document
                .attr(node, "alt")
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .unwrap_or(MISSING_ALT_TEXT);
            blocks.push(format!("![{alt}]({src})"));
        }
        "a" => {
            let Some(href) = document.attr(node, "href").filter(|s| !s.is_empty()) else {
                return;
            };
            let text = document.text_content(node);
            let text = if text.is_empty() { href } else { text.as_str() };
            blocks.push(format!("[{text}]({href})"));
        }
        _ => {}
    }
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}
