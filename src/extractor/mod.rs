//! The Content Extractor: a deterministic, network-free `html -> {metadata,
//! markdown}` transform.
//!
//! Grounded on `content_saver::markdown_converter`'s pipeline, trimmed down
//! to a plain deterministic conversion: `scraper` answers the
//! read-only metadata queries (title/author/publish_date/images), `kuchiki`
//! performs the DOM-mutating removal of non-content subtrees (following
//! `html_preprocessing/html_cleaning.rs`'s parse-select-detach-serialize
//! pattern), and `htmd` renders what's left to Markdown.

use kuchiki::traits::TendrilSink;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Structured fields lifted from the document head and body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub publish_date: String,
    pub images: Vec<String>,
}

/// The full result of one extraction: metadata plus the Markdown body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub metadata: Metadata,
    pub markdown: String,
}

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("'title' is a valid selector"));
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("'img' is a valid selector"));

const AUTHOR_META: &[(&str, &str)] = &[("name", "author"), ("property", "article:author")];
const PUBLISH_DATE_META: &[(&str, &str)] =
    &[("name", "publish-date"), ("property", "article:published_time"), ("name", "date")];

const REMOVE_SELECTORS: &[&str] = &["script", "style", "meta", "noscript", "svg"];

/// Run the full `html -> Artifact` transform. Never touches the network.
pub fn extract(html: &str) -> Artifact {
    let metadata = extract_metadata(html);
    let cleaned = strip_non_content_subtrees(html);
    let markdown = html_to_markdown(&cleaned);
    Artifact { metadata, markdown }
}

fn extract_metadata(html: &str) -> Metadata {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string();

    let author = first_matching_meta_content(&document, AUTHOR_META);
    let publish_date = first_matching_meta_content(&document, PUBLISH_DATE_META);

    let images = document
        .select(&IMG_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| src.starts_with("http"))
        .map(str::to_string)
        .collect();

    Metadata { title, author, publish_date, images }
}

/// Walk `candidates` in order (e.g. `name="author"` before
/// `property="article:author"`) and return the `content` of the first
/// matching `<meta>`, trimmed. Every candidate is its own attribute-equals
/// selector since `scraper`'s selector syntax can't express an ordered OR.
fn first_matching_meta_content(document: &Html, candidates: &[(&str, &str)]) -> String {
    for (attr, value) in candidates {
        let selector_str = format!(r#"meta[{attr}="{value}"]"#);
        let Ok(selector) = Selector::parse(&selector_str) else { continue };
        if let Some(content) = document.select(&selector).next().and_then(|el| el.value().attr("content")) {
            return content.trim().to_string();
        }
    }
    String::new()
}

/// Remove every `<script>`, `<style>`, `<meta>`, `<noscript>`, `<svg>`
/// subtree, mirroring `html_cleaning.rs`'s parse/select/detach/serialize
/// shape but against a fixed, short tag list.
fn strip_non_content_subtrees(html: &str) -> String {
    let document = kuchiki::parse_html().one(html);

    for selector in REMOVE_SELECTORS {
        let Ok(matches) = document.select(selector) else { continue };
        let nodes: Vec<_> = matches.collect();
        for node in nodes {
            node.as_node().detach();
        }
    }

    let mut output = Vec::new();
    if document.serialize(&mut output).is_err() {
        return html.to_string();
    }
    String::from_utf8(output).unwrap_or_else(|_| html.to_string())
}

fn html_to_markdown(html: &str) -> String {
    htmd::HtmlToMarkdown::builder()
        .build()
        .convert(html)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_trimmed() {
        let html = "<html><head><title>  Example Domain  </title></head><body></body></html>";
        assert_eq!(extract(html).metadata.title, "Example Domain");
    }

    #[test]
    fn author_prefers_name_author_over_article_author() {
        let html = r#"<html><head>
            <meta property="article:author" content="Fallback">
            <meta name="author" content="Primary">
        </head><body></body></html>"#;
        assert_eq!(extract(html).metadata.author, "Primary");
    }

    #[test]
    fn author_falls_back_to_article_author() {
        let html = r#"<html><head><meta property="article:author" content="Jane Doe"></head><body></body></html>"#;
        assert_eq!(extract(html).metadata.author, "Jane Doe");
    }

    #[test]
    fn publish_date_checks_candidates_in_order() {
        let html = r#"<html><head>
            <meta name="date" content="2024-01-01">
            <meta name="publish-date" content="2024-06-15">
        </head><body></body></html>"#;
        assert_eq!(extract(html).metadata.publish_date, "2024-06-15");
    }

    #[test]
    fn missing_metadata_is_empty_string() {
        let html = "<html><head></head><body><p>hi</p></body></html>";
        let artifact = extract(html);
        assert_eq!(artifact.metadata.title, "");
        assert_eq!(artifact.metadata.author, "");
        assert_eq!(artifact.metadata.publish_date, "");
    }

    #[test]
    fn images_only_absolute_urls_in_document_order_with_duplicates() {
        let html = r#"<html><body>
            <img src="/relative.png">
            <img src="https://example.com/a.png">
            <img src="http://example.com/b.png">
            <img src="https://example.com/a.png">
        </body></html>"#;
        assert_eq!(
            extract(html).metadata.images,
            vec!["https://example.com/a.png", "http://example.com/b.png", "https://example.com/a.png"]
        );
    }

    #[test]
    fn markdown_strips_scripts_styles_meta_noscript_svg() {
        let html = r#"<html><head><meta charset="utf-8"></head><body>
            <script>alert('x')</script>
            <style>.a{color:red}</style>
            <noscript>no js</noscript>
            <svg><circle r="2"/></svg>
            <p>Hello world</p>
        </body></html>"#;
        let markdown = extract(html).markdown;
        assert!(markdown.contains("Hello world"));
        assert!(!markdown.contains("alert"));
        assert!(!markdown.contains("color:red"));
        assert!(!markdown.contains("no js"));
        assert!(!markdown.contains("circle"));
    }

    #[test]
    fn markdown_preserves_links_and_images() {
        let html = r#"<html><body>
            <p>See <a href="https://example.com">example</a></p>
            <img src="https://example.com/pic.png" alt="pic">
        </body></html>"#;
        let markdown = extract(html).markdown;
        assert!(markdown.contains("[example](https://example.com)"));
        assert!(markdown.contains("![pic](https://example.com/pic.png)"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = "<html><head><title>T</title></head><body><p>body text</p></body></html>";
        assert_eq!(extract(html), extract(html));
    }
}
