//! Sitemap generation.
//!
//! Lists every page written by the renderer, in the order it was written,
//! for search engine indexing:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/index.html</loc>
//!     <lastmod>2025-01-01</lastmod>
//!     <changefreq>daily</changefreq>
//!     <priority>0.8</priority>
//!   </url>
//! </urlset>
//! ```

use crate::config::Site;
use chrono::NaiveDate;
use std::borrow::Cow;
use std::path::Path;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Renders the sitemap for `pages`. Every `<lastmod>` is `date`, the day of
/// the build.
pub fn generate(pages: &[String], site: &Site, date: NaiveDate) -> String {
    let lastmod = date.format("%Y-%m-%d").to_string();
    let mut xml = String::with_capacity(128 + pages.len() * 160);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"");
    xml.push_str(SITEMAP_NS);
    xml.push_str("\">\n");

    for page in pages {
        let loc = format!("{}/{}", site.url, page);
        xml.push_str("  <url>\n    <loc>");
        xml.push_str(&escape_xml(&loc));
        xml.push_str("</loc>\n    <lastmod>");
        xml.push_str(&lastmod);
        xml.push_str("</lastmod>\n");
        xml.push_str("    <changefreq>daily</changefreq>\n");
        xml.push_str("    <priority>0.8</priority>\n");
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

/// Writes the sitemap to `path` unless the site disables it. Returns whether
/// anything was written.
pub fn write_sitemap(
    path: &Path,
    pages: &[String],
    site: &Site,
    date: NaiveDate,
) -> std::io::Result<bool> {
    if !site.sitemap {
        log::debug!("Sitemap disabled");
        return Ok(false);
    }
    std::fs::write(path, generate(pages, site, date))?;
    log::info!("Sitemap: {} ({} pages)", path.display(), pages.len());
    Ok(true)
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains(|c: char| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;"),
    )
}
