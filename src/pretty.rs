//! A small HTML pretty-printer. Every tag and every non-blank run of text
//! goes on its own line, indented one space per level of nesting. The
//! contents of `<pre>`, `<script>`, `<style>` and `<textarea>` elements are
//! emitted verbatim since whitespace matters there.

use regex::Regex;
use std::sync::OnceLock;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_ELEMENTS: [&str; 4] = ["pre", "script", "style", "textarea"];

pub fn prettify(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + html.len() / 4);
    let (doctype, rest) = split_doctype(html);
    if let Some(doctype) = doctype {
        line(&mut out, 0, doctype);
    }

    let dom = match tl::parse(rest, tl::ParserOptions::default()) {
        Ok(dom) => dom,
        Err(err) => {
            log::warn!("Leaving unparseable HTML as is: {:?}", err);
            return html.to_owned();
        }
    };
    let parser = dom.parser();
    for handle in dom.children() {
        write_node(&mut out, 0, *handle, parser);
    }
    out
}

fn write_node(out: &mut String, depth: usize, handle: tl::NodeHandle, parser: &tl::Parser) {
    let node = match handle.get(parser) {
        Some(node) => node,
        None => return,
    };
    match node {
        tl::Node::Tag(tag) => {
            let raw = tag.raw().as_utf8_str();
            let name = tag.name().as_utf8_str();
            let lower = name.to_ascii_lowercase();
            if RAW_ELEMENTS.contains(&lower.as_str()) {
                // Keep the element and its body untouched, at column 0.
                out.push_str(&raw);
                out.push('\n');
                return;
            }

            let start = start_tag(&raw);
            line(out, depth, start);
            let void = VOID_ELEMENTS.contains(&lower.as_str()) || start.ends_with("/>");
            let inner = if void { depth } else { depth + 1 };
            for child in tag.children().top().iter() {
                write_node(out, inner, *child, parser);
            }
            if !void {
                line(out, depth, &format!("</{}>", name));
            }
        }
        tl::Node::Raw(text) => {
            let text = text.as_utf8_str();
            let text = text.trim();
            if !text.is_empty() {
                line(out, depth, text);
            }
        }
        tl::Node::Comment(comment) => {
            let comment = comment.as_utf8_str();
            if comment.starts_with("<!--") {
                line(out, depth, &comment);
            } else {
                line(out, depth, &format!("<!--{}-->", comment));
            }
        }
    }
}

// The opening tag of an element's outer HTML: everything up to the first `>`
// that isn't inside a quoted attribute value.
fn start_tag(raw: &str) -> &str {
    let mut quote = None;
    for (i, c) in raw.char_indices() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, '>') => return &raw[..=i],
            _ => {}
        }
    }
    raw
}

// Splits a leading `<!DOCTYPE ...>` off `html`.
fn split_doctype(html: &str) -> (Option<&str>, &str) {
    let trimmed = html.trim_start();
    let is_doctype = trimmed
        .get(..9)
        .map(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
        .unwrap_or(false);
    match trimmed.find('>') {
        Some(end) if is_doctype => (Some(&trimmed[..=end]), &trimmed[end + 1..]),
        _ => (None, html),
    }
}

fn line(out: &mut String, depth: usize, s: &str) {
    for _ in 0..depth {
        out.push(' ');
    }
    out.push_str(s);
    out.push('\n');
}

/// Removes whitespace immediately before `</code>`, so code samples don't end
/// in a trailing blank line once pretty-printed.
pub fn trim_code_blocks(html: &str) -> String {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING
        .get_or_init(|| Regex::new(r"\s+</code>").expect("static regex"))
        .replace_all(html, "</code>")
        .into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prettify_nesting() {
        assert_eq!(
            prettify("<html><body><p>Hello <b>world</b></p><br><img src=\"a.png\"/></body></html>"),
            "<html>\n <body>\n  <p>\n   Hello\n   <b>\n    world\n   </b>\n  </p>\n  <br>\n  <img src=\"a.png\"/>\n </body>\n</html>\n"
        );
    }

    #[test]
    fn test_prettify_doctype_and_comments() {
        assert_eq!(
            prettify("<!DOCTYPE html>\n<!-- hi <b> -->\n<div>\n\n</div>"),
            "<!DOCTYPE html>\n<!-- hi <b> -->\n<div>\n</div>\n"
        );
    }

    #[test]
    fn test_prettify_keeps_raw_elements() {
        assert_eq!(
            prettify("<div><pre>  a\n    b  </pre><script>if (a) {}</script></div>"),
            "<div>\n<pre>  a\n    b  </pre>\n<script>if (a) {}</script>\n</div>\n"
        );
    }

    #[test]
    fn test_prettify_quoted_angle_bracket() {
        assert_eq!(
            prettify("<p><a title=\"a>b\" href='x>y'>x</a></p>"),
            "<p>\n <a title=\"a>b\" href='x>y'>\n  x\n </a>\n</p>\n"
        );
    }

    #[test]
    fn test_prettify_is_idempotent() {
        let once = prettify("<ul><li>a</li><li>b</li></ul>");
        assert_eq!(prettify(&once), once);
    }

    #[test]
    fn test_trim_code_blocks() {
        assert_eq!(
            trim_code_blocks("<code>\n  let x = 1;\n  </code>"),
            "<code>\n  let x = 1;</code>"
        );
        assert_eq!(trim_code_blocks("<code>x</code>"), "<code>x</code>");
    }
}
