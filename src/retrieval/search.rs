//! Result-link parsing for the HTML search engine.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;

/// HTML endpoint of the search engine.
pub const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
/// Result links are relative to this origin.
const RESULT_LINK_BASE: &str = "https://duckduckgo.com";
/// Query parameter carrying the real destination of a result link.
const REDIRECT_PARAM: &str = "uddg";

static RESULT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#".result, [class*="result"]"#).expect("valid result selector")
});

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid link selector"));

/// Build the results-page URL for `query`.
pub fn search_page_url(query: &str) -> Result<Url> {
    Ok(Url::parse_with_params(SEARCH_ENDPOINT, &[("q", query)])?)
}

/// Extract up to `max_results` destination URLs from a results page, in ranking order.
pub fn parse_results(html: &str, max_results: usize) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut urls: Vec<Url> = Vec::new();
    for result in document.root_element().select(&RESULT) {
        if urls.len() >= max_results {
            break;
        }
        let Some(href) = result
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| href.contains(&format!("{REDIRECT_PARAM}=")))
        else {
            continue;
        };
        if let Some(url) = destination(href) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Decode the real destination of a redirect link, keeping only web URLs.
fn destination(href: &str) -> Option<Url> {
    let base = Url::parse(RESULT_LINK_BASE).ok()?;
    let link = base.join(href).ok()?;
    let target = link
        .query_pairs()
        .find(|(key, _)| key == REDIRECT_PARAM)
        .map(|(_, value)| value.into_owned())?;
    let url = Url::parse(&target).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
