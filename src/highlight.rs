//! The `highlight` template function:
//!
//! ```text
//! {{highlight "rust" "fn main() {}"}}
//! ```
//!
//! renders the code as a syntax-colored `<pre>` block. Unknown languages are
//! highlighted as plain text.

use gtmpl::Value;
use std::sync::OnceLock;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

/// The name the function is registered under in every template.
pub const FUNCTION_NAME: &str = "highlight";

const THEME: &str = "base16-ocean.dark";

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme() -> Option<&'static Theme> {
    static THEMES: OnceLock<ThemeSet> = OnceLock::new();
    let themes = THEMES.get_or_init(ThemeSet::load_defaults);
    themes
        .themes
        .get(THEME)
        .or_else(|| themes.themes.values().next())
}

/// Highlights `code` written in `language` (a name or file extension such
/// as `rust` or `py`).
pub fn highlight_code(language: &str, code: &str) -> String {
    let syntaxes = syntax_set();
    let syntax = syntaxes
        .find_syntax_by_token(language)
        .unwrap_or_else(|| syntaxes.find_syntax_plain_text());
    match theme() {
        Some(theme) => match highlighted_html_for_string(code, syntaxes, syntax, theme) {
            Ok(html) => html,
            Err(err) => {
                log::warn!("Highlighting `{}` code: {}", language, err);
                plain(language, code)
            }
        },
        None => plain(language, code),
    }
}

fn plain(language: &str, code: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        escape_html(language),
        escape_html(code)
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// The template-facing wrapper around [`highlight_code`]: takes the language
/// and the code as two string arguments.
pub fn highlight(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::String(language), Value::String(code)] => {
            Ok(Value::from(highlight_code(language, code)))
        }
        _ => Err(format!(
            "{} expects a language and a code string, got {} arguments",
            FUNCTION_NAME,
            args.len()
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_highlight_rust() {
        let html = highlight_code("rust", "fn main() {\n    let x = 1;\n}\n");
        assert!(html.starts_with("<pre"));
        assert!(html.contains("<span"));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_highlight_unknown_language_escapes() {
        let html = highlight_code("no-such-language", "a < b && c\n");
        assert!(html.starts_with("<pre"));
        assert!(html.contains("a &lt; b &amp;&amp; c"));
    }

    #[test]
    fn test_highlight_function_arguments() {
        let value = highlight(&[Value::from("py"), Value::from("print(1)\n")]).unwrap();
        match value {
            Value::String(html) => assert!(html.contains("print")),
            other => panic!("unexpected value {:?}", other),
        }
        assert!(highlight(&[Value::from("py")]).is_err());
    }
}
