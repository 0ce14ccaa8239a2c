// src/render/links.rs
// =============================================================================
// Extracts outbound links from a rendered page.
//
// We use the `scraper` crate to find every <a href> and the `url` crate to
// resolve relative links against the page's *final* URL (after redirects),
// the same way a browser resolves them.
//
// Skipped:
// - pure fragments (#section) - same page
// - mailto:, tel:, javascript:, data: and anything not http(s)
//
// Fragments are stripped from the links we keep, so /docs#intro and
// /docs#usage count as the same page.
// =============================================================================

use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    // "a[href]" is a constant, known-valid selector
    SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap())
}

// Extracts all followable links from HTML content
//
// Parameters:
//   html: the page markup
//   final_url: where the page ended up (for resolving relative links)
//
// Returns: absolute http(s) URLs with fragments removed, in document order
pub fn extract_page_links(html: &str, final_url: &str) -> Vec<String> {
    let base = match Url::parse(final_url) {
        Ok(url) => url,
        Err(_) => {
            tracing::debug!(url = final_url, "cannot resolve links against invalid base URL");
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);

    document
        .select(anchor_selector())
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(&base, href))
        .collect()
}

// Resolves a possibly-relative href to an absolute URL without fragment
fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
