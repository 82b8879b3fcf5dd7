//! Resolving a sitemap source into a list of URL paths.
//!
//! A source is either an `http://`/`https://` URL or a local file path. The
//! content may be:
//!
//! - an XML `<urlset>` sitemap: every `<loc>` becomes one path,
//! - an XML `<sitemapindex>`: every `<loc>` names a nested sitemap, which is
//!   loaded in turn (one level deep),
//! - plain text: one URL or absolute path per line, `#` starts a comment.
//!
//! Only the path component of each location is kept. Host, query string and
//! fragment are dropped.

use std::time::Duration;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::SiteError;

/// Timeout for a single sitemap HTTP request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed sitemap body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SitemapDocument {
    /// Page locations.
    UrlSet(Vec<String>),
    /// Locations of further sitemaps.
    Index(Vec<String>),
}

/// Load every page path named by a sitemap source.
///
/// # Errors
///
/// Returns [`SiteError::MissingSource`] for an empty source,
/// [`SiteError::Fetch`] or [`SiteError::Io`] if the source (or a nested
/// sitemap) cannot be read, and [`SiteError::Empty`] if nothing usable was
/// found.
pub async fn load_paths(source: &str) -> Result<Vec<String>, SiteError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(SiteError::MissingSource);
    }

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| SiteError::Fetch {
            source_url: source.to_owned(),
            source: e,
        })?;

    info!(source = source, "loading sitemap");
    let body = read_source(&client, source).await?;

    let paths = match parse_document(&body) {
        SitemapDocument::UrlSet(locations) => locations_to_paths(&locations),
        SitemapDocument::Index(nested) => {
            info!(
                source = source,
                nested_count = nested.len(),
                "sitemap index found, loading nested sitemaps"
            );
            let mut paths = Vec::new();
            for nested_source in &nested {
                let nested_body = read_source(&client, nested_source).await?;
                match parse_document(&nested_body) {
                    SitemapDocument::UrlSet(locations) => {
                        paths.extend(locations_to_paths(&locations));
                    }
                    SitemapDocument::Index(_) => {
                        warn!(
                            source = nested_source,
                            "nested sitemap index ignored, only one level is followed"
                        );
                    }
                }
            }
            paths
        }
    };

    if paths.is_empty() {
        return Err(SiteError::Empty {
            source_name: source.to_owned(),
        });
    }

    info!(source = source, path_count = paths.len(), "sitemap loaded");
    Ok(paths)
}

/// Extract page paths from an in-memory sitemap body.
///
/// A sitemap index yields no paths here, since resolving it requires I/O.
pub fn extract_paths(body: &str) -> Vec<String> {
    match parse_document(body) {
        SitemapDocument::UrlSet(locations) => locations_to_paths(&locations),
        SitemapDocument::Index(_) => Vec::new(),
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn read_source(client: &reqwest::Client, source: &str) -> Result<String, SiteError> {
    if is_remote(source) {
        debug!(url = source, "fetching sitemap over HTTP");
        let fetch_err = |e| SiteError::Fetch {
            source_url: source.to_owned(),
            source: e,
        };
        client
            .get(source)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_err)?
            .text()
            .await
            .map_err(fetch_err)
    } else {
        debug!(path = source, "reading sitemap file");
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| SiteError::Io {
                path: source.to_owned(),
                source: e,
            })
    }
}

fn parse_document(body: &str) -> SitemapDocument {
    if body.contains("<sitemapindex") {
        SitemapDocument::Index(extract_locs(body))
    } else if body.contains("<urlset") || body.contains("<loc>") {
        SitemapDocument::UrlSet(extract_locs(body))
    } else {
        SitemapDocument::UrlSet(
            body.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_owned)
                .collect(),
        )
    }
}

/// Collect the text content of every `<loc>` element.
fn extract_locs(body: &str) -> Vec<String> {
    const OPEN: &str = "<loc>";
    const CLOSE: &str = "</loc>";

    let mut locs = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(OPEN) {
        let Some(after_open) = rest.get(start.saturating_add(OPEN.len())..) else {
            break;
        };
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let raw = after_open.get(..end).unwrap_or_default().trim();
        let raw = raw
            .strip_prefix("<![CDATA[")
            .and_then(|inner| inner.strip_suffix("]]>"))
            .unwrap_or(raw);
        let value = unescape_xml(raw.trim());
        if !value.is_empty() {
            locs.push(value);
        }
        rest = after_open.get(end.saturating_add(CLOSE.len())..).unwrap_or_default();
    }
    locs
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn locations_to_paths(locations: &[String]) -> Vec<String> {
    locations
        .iter()
        .filter_map(|loc| {
            let path = location_to_path(loc);
            if path.is_none() {
                debug!(location = loc, "skipping unusable sitemap location");
            }
            path
        })
        .collect()
}

/// Reduce a location (absolute URL or absolute path) to its URL path.
fn location_to_path(location: &str) -> Option<String> {
    if location.starts_with('/') {
        let end = location.find(['?', '#']).unwrap_or(location.len());
        return location.get(..end).map(str::to_owned);
    }
    let url = Url::parse(location).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }
    Some(url.path().to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/</loc>
    <lastmod>2024-01-01</lastmod>
  </url>
  <url><loc>https://example.com/blog/hello-world</loc></url>
  <url><loc> https://example.com/search?q=a&amp;b=c </loc></url>
  <url><loc><![CDATA[https://example.com/docs/intro#setup]]></loc></url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap-posts.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn urlset_locations_become_paths() {
        let paths = extract_paths(URLSET);
        assert_eq!(paths, vec!["/", "/blog/hello-world", "/search", "/docs/intro"]);
    }

    #[test]
    fn index_is_recognized() {
        assert_eq!(
            parse_document(INDEX),
            SitemapDocument::Index(vec![
                "https://example.com/sitemap-posts.xml".to_owned(),
                "https://example.com/sitemap-pages.xml".to_owned(),
            ])
        );
        assert!(extract_paths(INDEX).is_empty());
    }

    #[test]
    fn plain_text_lists_are_accepted() {
        let body = "# exported pages\nhttps://example.com/a\n\n/b/c?x=1\n  /d  \nnot a url\n";
        assert_eq!(extract_paths(body), vec!["/a", "/b/c", "/d"]);
    }

    #[test]
    fn entities_are_unescaped() {
        assert_eq!(unescape_xml("a&amp;b&lt;c&gt;"), "a&b<c>");
        assert_eq!(unescape_xml("&amp;lt;"), "&lt;");
    }

    #[test]
    fn unterminated_loc_is_ignored() {
        let body = "<urlset><loc>https://example.com/ok</loc><loc>https://example.com/broken";
        assert_eq!(extract_paths(body), vec!["/ok"]);
    }

    #[tokio::test]
    async fn empty_source_is_rejected() {
        let result = load_paths("   ").await;
        assert!(matches!(result, Err(SiteError::MissingSource)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let result = load_paths("/definitely/not/a/sitemap.xml").await;
        assert!(matches!(result, Err(SiteError::Io { .. })));
    }

    #[tokio::test]
    async fn loads_sitemap_from_file() {
        let path = std::env::temp_dir().join(format!(
            "clickstream-sitemap-{}.xml",
            std::process::id()
        ));
        tokio::fs::write(&path, URLSET).await.unwrap();

        let paths = load_paths(path.to_str().unwrap()).await.unwrap();
        assert_eq!(paths.len(), 4);
        assert!(paths.contains(&"/blog/hello-world".to_owned()));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn file_without_locations_is_empty_error() {
        let path = std::env::temp_dir().join(format!(
            "clickstream-empty-sitemap-{}.xml",
            std::process::id()
        ));
        tokio::fs::write(&path, "<urlset></urlset>").await.unwrap();

        let result = load_paths(path.to_str().unwrap()).await;
        assert!(matches!(result, Err(SiteError::Empty { .. })));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
