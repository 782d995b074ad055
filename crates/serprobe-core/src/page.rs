//! Page auditing: structured metrics from one fetched page.

use scraper::{Html, Selector};
use url::Url;

use crate::error::AppError;
use crate::models::{PageAudit, PageHeadings, PageImages, PageLinks};

const CONTENT_SAMPLE_WORDS: usize = 150;

/// Build a [`PageAudit`] from fetched markup.
///
/// Relative link and image URLs are resolved against the page URL before
/// classification; links with no or matching host count as internal.
pub fn audit_page(url: &str, html: &str, status: u16) -> Result<PageAudit, AppError> {
    let base = Url::parse(url)
        .map_err(|e| AppError::Generic(format!("invalid page URL '{url}': {e}")))?;
    let document = Html::parse_document(html);

    let title = select_text(&document, "title");
    let description = meta_content(&document, "description");
    let keywords = meta_content(&document, "keywords");

    let headings = PageHeadings {
        h1: select_all_text(&document, "h1"),
        h2: select_all_text(&document, "h2"),
        h3: select_all_text(&document, "h3"),
    };

    let links = count_links(&document, &base);
    let images = count_images(&document);

    let body_text = select_text(&document, "body");
    let words: Vec<&str> = body_text.split_whitespace().collect();
    let content_sample = words
        .iter()
        .take(CONTENT_SAMPLE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    Ok(PageAudit {
        url: url.to_string(),
        status,
        title,
        description,
        keywords,
        headings,
        links,
        images,
        word_count: words.len(),
        content_sample,
        page_size_kb: html.len() as f64 / 1024.0,
    })
}

fn count_links(document: &Html, base: &Url) -> PageLinks {
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return PageLinks::default();
    };
    let page_host = base.host_str().unwrap_or_default();

    let mut links = PageLinks::default();
    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        links.total += 1;

        let internal = match base.join(href) {
            Ok(resolved) => resolved.host_str().unwrap_or_default() == page_host,
            Err(_) => false,
        };
        if internal {
            links.internal += 1;
        } else {
            links.external += 1;
        }
    }
    links
}

fn count_images(document: &Html) -> PageImages {
    let Ok(img_sel) = Selector::parse("img") else {
        return PageImages::default();
    };

    let mut images = PageImages::default();
    for img in document.select(&img_sel) {
        images.total += 1;
        if img.value().attr("alt").is_some_and(|alt| !alt.is_empty()) {
            images.with_alt += 1;
        } else {
            images.without_alt += 1;
        }
    }
    images
}

fn select_text(document: &Html, selector: &str) -> String {
    Selector::parse(selector)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

fn select_all_text(document: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn meta_content(document: &Html, name: &str) -> String {
    let Ok(sel) = Selector::parse(&format!(r#"meta[name="{name}"]"#)) else {
        return String::new();
    };
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Example Domain</title>
        <meta name="description" content="An example page.">
        <meta name="keywords" content="example, test">
    </head><body>
        <h1>Main Heading</h1>
        <h2>Sub One</h2><h2>Sub Two</h2>
        <p>Some body prose with a handful of words in it.</p>
        <a href="/about">About</a>
        <a href="https://example.com/contact">Contact</a>
        <a href="https://other.org/page">Elsewhere</a>
        <img src="/logo.png" alt="Logo">
        <img src="/spacer.gif">
    </body></html>"#;

    #[test]
    fn audit_collects_metadata_and_headings() {
        let audit = audit_page("https://example.com/", PAGE, 200).unwrap();

        assert_eq!(audit.title, "Example Domain");
        assert_eq!(audit.description, "An example page.");
        assert_eq!(audit.keywords, "example, test");
        assert_eq!(audit.headings.h1, vec!["Main Heading"]);
        assert_eq!(audit.headings.h2.len(), 2);
        assert!(audit.headings.h3.is_empty());
        assert_eq!(audit.status, 200);
    }

    #[test]
    fn links_split_by_host_after_resolution() {
        let audit = audit_page("https://example.com/", PAGE, 200).unwrap();

        assert_eq!(audit.links.total, 3);
        assert_eq!(audit.links.internal, 2);
        assert_eq!(audit.links.external, 1);
    }

    #[test]
    fn image_alt_coverage_is_counted() {
        let audit = audit_page("https://example.com/", PAGE, 200).unwrap();

        assert_eq!(audit.images.total, 2);
        assert_eq!(audit.images.with_alt, 1);
        assert_eq!(audit.images.without_alt, 1);
    }

    #[test]
    fn word_count_and_sample_come_from_body() {
        let audit = audit_page("https://example.com/", PAGE, 200).unwrap();

        assert!(audit.word_count > 10);
        assert!(audit.content_sample.contains("Main Heading"));
        assert!(audit.page_size_kb > 0.0);
    }

    #[test]
    fn invalid_page_url_is_an_error() {
        let err = audit_page("not a url", "<html></html>", 200).unwrap_err();
        assert!(matches!(err, AppError::Generic(_)));
    }

    #[test]
    fn empty_page_audits_cleanly() {
        let audit = audit_page("https://example.com/", "", 200).unwrap();
        assert_eq!(audit.word_count, 0);
        assert!(audit.title.is_empty());
        assert_eq!(audit.links.total, 0);
    }
}
