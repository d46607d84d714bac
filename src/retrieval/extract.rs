//! Readable-text extraction from raw page markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Documents shorter than this are rejected before parsing.
pub const MIN_DOCUMENT_CHARS: usize = 100;
/// Extracted text is cut to this many characters.
pub const MAX_CONTENT_CHARS: usize = 3000;

const MIN_CONTAINER_CHARS: usize = 200;
const MIN_PARAGRAPH_CHARS: usize = 30;
const MAX_PARAGRAPHS: usize = 10;
const MIN_USABLE_CHARS: usize = 50;
const MIN_SENTENCE_CHARS: usize = 15;
const MAX_SENTENCES: usize = 12;

static NON_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, nav, header, footer, aside, .sidebar, .menu, .advertisement, .ads, \
         .cookie-notice, .social-share, .comments, .related-posts, .newsletter",
    )
    .expect("valid non-content selector")
});

static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"article[role="main"]"#,
        "main article",
        r#"[role="main"]"#,
        "article",
        ".article-content",
        ".post-content",
        ".entry-content",
        "main .content",
        "main",
        "#content",
        ".page-content",
    ]
    .iter()
    .map(|css| Selector::parse(css).expect("valid container selector"))
    .collect()
});

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid paragraph selector"));

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(cookie|privacy|terms|subscribe|newsletter|advertisement|copyright|all rights reserved|click here|read more|continue reading)\b|©",
    )
    .expect("valid noise regex")
});

/// Extract the readable text of an HTML document.
///
/// Returns `None` when the document is too small, or when fewer than
/// `MIN_USABLE_CHARS` characters survive filtering.
pub fn extract_readable(html: &str) -> Option<String> {
    if html.chars().count() < MIN_DOCUMENT_CHARS {
        return None;
    }
    let mut document = Html::parse_document(html);
    strip_non_content(&mut document);

    let raw = main_container_text(&document).or_else(|| paragraph_text(&document))?;
    if raw.chars().count() < MIN_USABLE_CHARS {
        return None;
    }

    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentences: Vec<&str> = normalized
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS && !NOISE.is_match(s))
        .take(MAX_SENTENCES)
        .collect();
    let content = truncate_chars(&sentences.join(". "), MAX_CONTENT_CHARS);
    (content.chars().count() >= MIN_USABLE_CHARS).then_some(content)
}

fn strip_non_content(document: &mut Html) {
    let ids: Vec<_> = document
        .root_element()
        .select(&NON_CONTENT)
        .map(|element| element.id())
        .collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn main_container_text(document: &Html) -> Option<String> {
    let root = document.root_element();
    CONTAINERS.iter().find_map(|selector| {
        let text = element_text(root.select(selector).next()?);
        (text.chars().count() > MIN_CONTAINER_CHARS).then_some(text)
    })
}

fn paragraph_text(document: &Html) -> Option<String> {
    let paragraphs: Vec<String> = document
        .root_element()
        .select(&PARAGRAPH)
        .map(element_text)
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .take(MAX_PARAGRAPHS)
        .collect();
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join(" "))
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
