//! HTML-to-text conversion for email bodies.
//!
//! [`HtmlTextExtractor::parse`] walks a parsed DOM and applies an ordered
//! set of rendering rules: scripts, styles, tracking pixels, and hidden
//! nodes are dropped; headers, paragraphs, lists, tables, links, and line
//! breaks are linearized into readable plain text; whitespace is collapsed
//! last. Structural metadata (images, links, tables, encoding) is read from
//! the original tree before rendering.
//!
//! `parse` never fails: malformed or non-HTML input degrades to a
//! regex tag-strip pass that still returns best-effort text with zeroed
//! structural metadata.
//!
//! The module also owns the plain-text cleanup rules shared with the
//! chunker ([`clean_plain_text`]) and the signature splitter
//! ([`extract_signature`]).

use regex::Regex;
use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};

use crate::models::{ContentMetadata, ParsedContent};

/// Tags removed entirely before text extraction.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "head", "title", "noscript", "template",
];

/// Signature delimiters in priority order. The first one found splits the
/// text.
const SIGNATURE_DELIMITERS: &[&str] = &[
    "\n--\n",
    "Best regards,",
    "Sincerely,",
    "Kind regards,",
    "Thanks,",
    "Sent from my ",
];

/// Result of [`extract_signature`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSplit {
    pub content: String,
    pub signature: Option<String>,
}

/// Converts HTML email bodies into normalized plain text.
pub struct HtmlTextExtractor;

impl HtmlTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse an HTML string into plain text plus structural metadata.
    ///
    /// Never panics or errors for any string input: empty input yields
    /// empty text with `word_count = 0`, and input the DOM renderer cannot
    /// linearize falls back to tag stripping.
    pub fn parse(&self, html: &str) -> ParsedContent {
        let document = Html::parse_document(html);

        // Metadata comes from the original structure, before any rendering
        // rule drops nodes.
        let mut metadata = extract_metadata(&document);

        let mut rendered = String::new();
        render_block(*document.root_element(), &mut rendered);
        let mut plain_text = normalize_rendered(&rendered);

        if plain_text.is_empty() {
            let stripped = strip_tags(html);
            if !stripped.is_empty() {
                plain_text = stripped;
                metadata = ContentMetadata {
                    encoding: "utf-8".to_string(),
                    ..ContentMetadata::default()
                };
            }
        }

        metadata.word_count = plain_text.split_whitespace().count();

        ParsedContent {
            plain_text,
            metadata,
        }
    }
}

impl Default for HtmlTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_metadata(document: &Html) -> ContentMetadata {
    let img = Selector::parse("img").expect("img selector");
    let link = Selector::parse("a[href]").expect("anchor selector");
    let table = Selector::parse("table").expect("table selector");

    ContentMetadata {
        has_images: document.select(&img).next().is_some(),
        has_links: document.select(&link).next().is_some(),
        has_tables: document.select(&table).next().is_some(),
        word_count: 0,
        encoding: extract_encoding(document),
    }
}

fn extract_encoding(document: &Html) -> String {
    let charset = Selector::parse("meta[charset]").expect("charset selector");
    if let Some(meta) = document.select(&charset).next() {
        if let Some(value) = meta.value().attr("charset") {
            let value = value.trim().to_lowercase();
            if !value.is_empty() {
                return value;
            }
        }
    }

    let http_equiv = Selector::parse(r#"meta[http-equiv]"#).expect("http-equiv selector");
    for meta in document.select(&http_equiv) {
        let is_content_type = meta
            .value()
            .attr("http-equiv")
            .map(|v| v.eq_ignore_ascii_case("content-type"))
            .unwrap_or(false);
        if !is_content_type {
            continue;
        }
        if let Some(content) = meta.value().attr("content") {
            let lowered = content.to_lowercase();
            if let Some(idx) = lowered.find("charset=") {
                let value = lowered[idx + "charset=".len()..]
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'' || c == ';')
                    .to_string();
                if !value.is_empty() {
                    return value;
                }
            }
        }
    }

    "utf-8".to_string()
}

fn element_is_hidden(el: &scraper::node::Element) -> bool {
    let Some(style) = el.attr("style") else {
        return false;
    };
    let style: String = style
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    style.contains("display:none") || style.contains("visibility:hidden")
}

fn is_tracking_pixel(el: &scraper::node::Element) -> bool {
    if el.name() != "img" {
        return false;
    }
    let dim_is_one = |attr: &str| el.attr(attr).map(|v| v.trim() == "1").unwrap_or(false);
    if dim_is_one("width") || dim_is_one("height") {
        return true;
    }
    if let Some(style) = el.attr("style") {
        let style: String = style
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        return style.contains("width:1px") || style.contains("height:1px");
    }
    false
}

fn should_skip(el: &scraper::node::Element) -> bool {
    SKIP_TAGS.contains(&el.name()) || element_is_hidden(el) || is_tracking_pixel(el)
}

/// Block-level renderer: dispatches structural elements to their rules and
/// recurses into containers.
fn render_block(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(el) => {
            if should_skip(&el) {
                return;
            }
            match el.name() {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let text = inline_text(node);
                    if !text.is_empty() {
                        out.push_str("\n\n");
                        out.push_str(&text.to_uppercase());
                        out.push_str("\n\n");
                    }
                }
                "p" => {
                    // Inline render without collapsing, so <br> newlines
                    // survive until the final whitespace pass.
                    let mut inner = String::new();
                    render_inline_children(node, &mut inner);
                    let text = inner.trim();
                    if !text.is_empty() {
                        out.push('\n');
                        out.push_str(&text);
                        out.push('\n');
                    }
                }
                "ul" => render_list(node, out, false),
                "ol" => render_list(node, out, true),
                "table" => render_table(node, out),
                "br" => out.push('\n'),
                "a" => render_inline(node, out),
                "div" => {
                    out.push(' ');
                    for child in node.children() {
                        render_block(child, out);
                    }
                    out.push(' ');
                }
                "span" => {
                    out.push(' ');
                    render_inline_children(node, out);
                    out.push(' ');
                }
                _ => {
                    for child in node.children() {
                        render_block(child, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Inline renderer: text, anchors, and line breaks; block descendants
/// degrade to their inline text.
fn render_inline(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(el) => {
            if should_skip(&el) || el.name() == "img" {
                return;
            }
            match el.name() {
                "br" => out.push('\n'),
                "a" => {
                    let href = el.attr("href").unwrap_or("").trim();
                    let mut inner = String::new();
                    render_inline_children(node, &mut inner);
                    let text = collapse_whitespace(&inner);
                    if text.is_empty() {
                        out.push_str(href);
                    } else if !href.is_empty() && text != href {
                        out.push_str(&text);
                        out.push_str(" (");
                        out.push_str(href);
                        out.push(')');
                    } else {
                        out.push_str(&text);
                    }
                }
                _ => render_inline_children(node, out),
            }
        }
        _ => {}
    }
}

fn render_inline_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render_inline(child, out);
    }
}

/// Whitespace-collapsed inline text of a node's subtree.
fn inline_text(node: NodeRef<'_, Node>) -> String {
    let mut buf = String::new();
    render_inline_children(node, &mut buf);
    collapse_whitespace(&buf)
}

fn render_list(node: NodeRef<'_, Node>, out: &mut String, ordered: bool) {
    out.push('\n');
    let mut position = 0usize;
    for child in node.children() {
        let Some(element) = ElementRef::wrap(child) else {
            continue;
        };
        if element.value().name() != "li" || should_skip(element.value()) {
            continue;
        }
        let text = inline_text(child);
        if text.is_empty() {
            continue;
        }
        position += 1;
        if ordered {
            out.push_str(&format!("{position}. {text}\n"));
        } else {
            out.push_str(&format!("\u{2022} {text}\n"));
        }
    }
    out.push('\n');
}

fn render_table(node: NodeRef<'_, Node>, out: &mut String) {
    let Some(table) = ElementRef::wrap(node) else {
        return;
    };
    let row_selector = Selector::parse("tr").expect("tr selector");
    let cell_selector = Selector::parse("th, td").expect("cell selector");

    out.push_str("\n--- TABLE ---\n");
    for row in table.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| inline_text(*cell))
            .collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out.push_str("--- END TABLE ---\n");
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

/// Final whitespace pass over rendered text: collapse runs of spaces/tabs,
/// strip spaces hugging newlines, cap consecutive newlines at two, trim.
fn normalize_rendered(text: &str) -> String {
    let spaces = Regex::new(r"[ \t]+").expect("valid regex");
    let around_newlines = Regex::new(r"[ \t]*\n[ \t]*").expect("valid regex");
    let newline_runs = Regex::new(r"\n{3,}").expect("valid regex");

    let text = spaces.replace_all(text, " ");
    let text = around_newlines.replace_all(&text, "\n");
    let text = newline_runs.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Regex tag-strip fallback for input the DOM renderer produced nothing
/// from. Decodes common entities and collapses whitespace.
pub fn strip_tags(html: &str) -> String {
    let tag_re = Regex::new(r"<[^>]+>").expect("valid regex");
    let text = tag_re.replace_all(html, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    let ws_re = Regex::new(r"\s+").expect("valid regex");
    ws_re.replace_all(text.trim(), " ").to_string()
}

/// Normalize plain text: CRLF/CR to LF, tabs to four spaces, trailing
/// whitespace trimmed per line, 3+ consecutive newlines collapsed to two.
pub fn clean_plain_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let detabbed = unified.replace('\t', "    ");
    let trimmed: Vec<&str> = detabbed.lines().map(|line| line.trim_end()).collect();
    let joined = trimmed.join("\n");

    let newline_runs = Regex::new(r"\n{3,}").expect("valid regex");
    newline_runs.replace_all(&joined, "\n\n").trim().to_string()
}

/// Split a plain-text body into content and trailing signature.
///
/// Delimiters are tried in priority order; the split only applies when the
/// candidate signature is plausibly signature-sized (under 500 bytes and
/// either short outright or under 30% of the content length). Otherwise the
/// whole text is returned as content.
pub fn extract_signature(text: &str) -> SignatureSplit {
    for delimiter in SIGNATURE_DELIMITERS {
        if let Some(pos) = text.find(delimiter) {
            let content = text[..pos].trim_end();
            let signature = text[pos..].trim();
            let plausible = signature.len() < 500
                && (signature.len() <= 200
                    || (signature.len() as f64) < 0.3 * content.len() as f64);
            if !content.is_empty() && !signature.is_empty() && plausible {
                return SignatureSplit {
                    content: content.to_string(),
                    signature: Some(signature.to_string()),
                };
            }
            break;
        }
    }
    SignatureSplit {
        content: text.to_string(),
        signature: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> ParsedContent {
        HtmlTextExtractor::new().parse(html)
    }

    #[test]
    fn empty_input_yields_empty_text() {
        let parsed = parse("");
        assert_eq!(parsed.plain_text, "");
        assert_eq!(parsed.metadata.word_count, 0);
        assert_eq!(parsed.metadata.encoding, "utf-8");
    }

    #[test]
    fn plain_text_passes_through() {
        let parsed = parse("just a plain sentence, no markup");
        assert_eq!(parsed.plain_text, "just a plain sentence, no markup");
        assert_eq!(parsed.metadata.word_count, 6);
    }

    #[test]
    fn scripts_and_styles_are_removed() {
        let parsed = parse(
            "<html><head><style>p{color:red}</style></head>\
             <body><script>alert('x')</script><p>visible</p></body></html>",
        );
        assert_eq!(parsed.plain_text, "visible");
    }

    #[test]
    fn headers_are_uppercased_with_blank_lines() {
        let parsed = parse("<h2>Quarterly update</h2><p>Numbers inside.</p>");
        assert_eq!(parsed.plain_text, "QUARTERLY UPDATE\n\nNumbers inside.");
    }

    #[test]
    fn lists_are_linearized() {
        let parsed = parse("<ul><li>alpha</li><li>beta</li></ul><ol><li>one</li><li>two</li></ol>");
        assert!(parsed.plain_text.contains("\u{2022} alpha"));
        assert!(parsed.plain_text.contains("\u{2022} beta"));
        assert!(parsed.plain_text.contains("1. one"));
        assert!(parsed.plain_text.contains("2. two"));
    }

    #[test]
    fn tables_are_fenced_with_pipe_cells() {
        let parsed = parse(
            "<table><tr><th>name</th><th>qty</th></tr><tr><td>bolts</td><td>40</td></tr></table>",
        );
        let text = parsed.plain_text;
        assert!(text.contains("--- TABLE ---"));
        assert!(text.contains("name | qty"));
        assert!(text.contains("bolts | 40"));
        assert!(text.contains("--- END TABLE ---"));
        assert!(parsed.metadata.has_tables);
    }

    #[test]
    fn links_render_href_when_text_differs() {
        let parsed = parse(r#"<p>see <a href="https://docs.example">the docs</a></p>"#);
        assert_eq!(
            parsed.plain_text,
            "see the docs (https://docs.example)"
        );

        let same = parse(r#"<p><a href="https://x.example">https://x.example</a></p>"#);
        assert_eq!(same.plain_text, "https://x.example");
        assert!(same.metadata.has_links);
    }

    #[test]
    fn tracking_pixels_and_hidden_nodes_dropped() {
        let parsed = parse(
            r#"<p>hello</p><img src="t.gif" width="1" height="1">
               <div style="display:none">secret preheader</div>
               <span style="visibility: hidden">also hidden</span>"#,
        );
        assert_eq!(parsed.plain_text, "hello");
        // Metadata reflects the original structure, pixel included.
        assert!(parsed.metadata.has_images);
    }

    #[test]
    fn br_becomes_newline_and_divs_do_not_concatenate_words() {
        let parsed = parse("<div>first</div><div>second</div><p>a<br>b</p>");
        assert!(parsed.plain_text.contains("first second") || parsed.plain_text.contains("first\nsecond"));
        assert!(parsed.plain_text.contains("a\nb"));
    }

    #[test]
    fn encoding_read_from_meta() {
        let parsed = parse(r#"<html><head><meta charset="ISO-8859-1"></head><body>x</body></html>"#);
        assert_eq!(parsed.metadata.encoding, "iso-8859-1");

        let parsed = parse(
            r#"<meta http-equiv="Content-Type" content="text/html; charset=windows-1252"><p>x</p>"#,
        );
        assert_eq!(parsed.metadata.encoding, "windows-1252");
    }

    #[test]
    fn newline_runs_collapse_to_two() {
        let parsed = parse("<h1>A</h1><h2>B</h2>");
        assert_eq!(parsed.plain_text, "A\n\nB");
    }

    #[test]
    fn clean_plain_text_normalizes_line_endings_and_tabs() {
        let cleaned = clean_plain_text("a\r\nb\rc\td   \n\n\n\nend");
        assert_eq!(cleaned, "a\nb\nc    d\n\nend");
    }

    #[test]
    fn signature_split_on_best_regards() {
        let split = extract_signature("Body text\n\nBest regards,\nJane Smith\nRole");
        assert!(split.content.contains("Body text"));
        assert!(!split.content.contains("Best regards"));
        assert!(split.signature.unwrap().contains("Jane Smith"));
    }

    #[test]
    fn dash_delimiter_has_priority() {
        let split = extract_signature("Body\n--\nThanks,\nBob");
        assert_eq!(split.content, "Body");
        assert!(split.signature.unwrap().starts_with("--"));
    }

    #[test]
    fn oversized_signature_is_not_split() {
        let text = format!("Short body\n\nThanks,\n{}", "x".repeat(600));
        let split = extract_signature(&text);
        assert!(split.signature.is_none());
        assert_eq!(split.content, text);
    }

    #[test]
    fn text_without_delimiters_is_untouched() {
        let split = extract_signature("no closers here at all");
        assert_eq!(split.content, "no closers here at all");
        assert!(split.signature.is_none());
    }
}
