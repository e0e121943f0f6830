//! A development server for the built site. Requests whose first path
//! segment names a registered [`Handler`] are dispatched to it; everything
//! else is served from the output directory.

use crate::config::{Layout, Site};
use percent_encoding::percent_decode_str;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A request as seen by a [`Handler`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub method: String,

    /// Decoded, non-empty path segments. For a dispatched request the
    /// handler's own name is stripped off.
    pub segments: Vec<String>,

    /// Query parameters merged with url-encoded form parameters from the
    /// body. Body parameters win.
    pub params: BTreeMap<String, String>,
}

impl Request {
    /// Parses the request line's `url` and an optional form `body`.
    pub fn parse(method: &str, url: &str, body: &[u8]) -> Request {
        let (path, query) = match url.find('?') {
            Some(i) => (&url[..i], &url[i + 1..]),
            None => (url, ""),
        };
        // Decode before splitting so an encoded `/` can't hide a `..`.
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let segments = decoded
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let mut params: BTreeMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        params.extend(url::form_urlencoded::parse(body).into_owned());
        Request {
            method: method.to_owned(),
            segments,
            params,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Response {
        Response {
            status: 200,
            content_type,
            body: body.into(),
        }
    }

    pub fn not_found() -> Response {
        Response {
            status: 404,
            content_type: mime::PLAIN,
            body: b"Not Found".to_vec(),
        }
    }
}

/// A server-side request handler registered under a name.
pub trait Handler {
    fn handle(&self, request: &Request) -> Response;
}

/// Lists the pages of the last build as a JSON array.
pub struct PageIndex {
    pages: Vec<String>,
}

impl PageIndex {
    pub fn new(pages: Vec<String>) -> PageIndex {
        PageIndex { pages }
    }
}

impl Handler for PageIndex {
    fn handle(&self, _: &Request) -> Response {
        match serde_json::to_vec(&self.pages) {
            Ok(body) => Response::ok(mime::JSON, body),
            Err(err) => Response {
                status: 500,
                content_type: mime::PLAIN,
                body: err.to_string().into_bytes(),
            },
        }
    }
}

/// The handler table. Names are registered once, before serving starts.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register(&mut self, name: &str, handler: Box<dyn Handler>) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(Error::DuplicateHandler(name.to_owned()));
        }
        self.handlers.insert(name.to_owned(), handler);
        Ok(())
    }

    /// Routes `request` to the handler named by its first segment, or to a
    /// file under `output_root`.
    pub fn dispatch(&self, request: &Request, output_root: &Path) -> Response {
        if request.segments.iter().any(|s| s == ".." || s.contains('\\')) {
            return Response::not_found();
        }
        if let Some((name, rest)) = request.segments.split_first() {
            if let Some(handler) = self.handlers.get(name) {
                log::debug!("Dispatching to handler `{}`", name);
                let request = Request {
                    method: request.method.clone(),
                    segments: rest.to_vec(),
                    params: request.params.clone(),
                };
                return handler.handle(&request);
            }
        }
        match resolve_path(&request.segments, output_root) {
            Some(path) => match std::fs::read(&path) {
                Ok(body) => Response::ok(mime::from_path(&path), body),
                Err(err) => {
                    log::warn!("Reading `{}`: {}", path.display(), err);
                    Response::not_found()
                }
            },
            None => Response::not_found(),
        }
    }
}

/// Maps path segments to a file under `root`, using `index.html` for
/// directories.
fn resolve_path(segments: &[String], root: &Path) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in segments {
        if Path::new(segment).has_root() {
            return None;
        }
        path.push(segment);
    }

    // Symlinks may still point elsewhere; the target has to stay in `root`.
    let mut canonical = path.canonicalize().ok()?;
    if !canonical.starts_with(root.canonicalize().ok()?) {
        return None;
    }
    if canonical.is_dir() {
        canonical.push("index.html");
    }
    if canonical.is_file() {
        Some(canonical)
    } else {
        None
    }
}

/// Serves `layout`'s output directory on `site.host:site.port` until the
/// process is killed. Requests are handled one at a time.
pub fn serve(layout: &Layout, site: &Site, registry: &Registry) -> Result<()> {
    let address = format!("{}:{}", site.host, site.port);
    let server = tiny_http::Server::http(&address).map_err(|err| Error::Bind {
        address: address.clone(),
        reason: err.to_string(),
    })?;
    log::info!("Serving `{}` on http://{}", layout.output_directory.display(), address);

    for mut request in server.incoming_requests() {
        let mut body = Vec::new();
        if let Err(err) = request.as_reader().read_to_end(&mut body) {
            log::warn!("Reading request body: {}", err);
            body.clear();
        }
        let parsed = Request::parse(request.method().as_str(), request.url(), &body);
        let response = registry.dispatch(&parsed, &layout.output_directory);
        log::info!("{} {} {}", request.method(), request.url(), response.status);

        let mut reply =
            tiny_http::Response::from_data(response.body).with_status_code(response.status);
        if let Ok(header) = tiny_http::Header::from_bytes("Content-Type", response.content_type) {
            reply = reply.with_header(header);
        }
        if let Err(err) = request.respond(reply) {
            log::warn!("Responding: {}", err);
        }
    }
    Ok(())
}

mod mime {
    use std::path::Path;

    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const XML: &str = "application/xml";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub fn from_path(path: &Path) -> &'static str {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("html") | Some("htm") => HTML,
            Some("css") => CSS,
            Some("js") | Some("mjs") => JAVASCRIPT,
            Some("json") => JSON,
            Some("xml") => XML,
            Some("txt") => PLAIN,
            Some("svg") => "image/svg+xml",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("ico") => "image/x-icon",
            Some("woff") => "font/woff",
            Some("woff2") => "font/woff2",
            Some("pdf") => "application/pdf",
            _ => OCTET_STREAM,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The listening socket couldn't be bound.
    Bind { address: String, reason: String },

    /// Two handlers were registered under one name.
    DuplicateHandler(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Bind { address, reason } => {
                write!(f, "Binding `{}`: {}", address, reason)
            }
            Error::DuplicateHandler(name) => {
                write!(f, "A handler named `{}` is already registered", name)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Echo {
        seen: Rc<RefCell<Vec<Request>>>,
    }

    impl Handler for Echo {
        fn handle(&self, request: &Request) -> Response {
            self.seen.borrow_mut().push(request.clone());
            Response::ok(mime::PLAIN, request.segments.join(","))
        }
    }

    fn registry() -> (Registry, Rc<RefCell<Vec<Request>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        registry
            .register(
                "echo",
                Box::new(Echo {
                    seen: Rc::clone(&seen),
                }),
            )
            .unwrap();
        (registry, seen)
    }

    #[test]
    fn test_parse() {
        let request = Request::parse("POST", "/api/a%20b/c/?x=1&y=2", b"y=3&z=4");
        assert_eq!(request.segments, vec!["api", "a b", "c"]);
        let params: Vec<(&str, &str)> = request
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(params, vec![("x", "1"), ("y", "3"), ("z", "4")]);
    }

    #[test]
    fn test_dispatch_to_handler() {
        let (registry, seen) = registry();
        let dir = tempfile::tempdir().unwrap();
        let response = registry.dispatch(
            &Request::parse("GET", "/echo/one/two?q=1", b""),
            dir.path(),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"one,two");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].params.get("q").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_duplicate_handler() {
        let (mut registry, _) = registry();
        let err = registry
            .register("echo", Box::new(PageIndex::new(Vec::new())))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler(name) if name == "echo"));
    }

    #[test]
    fn test_static_files() {
        let (registry, seen) = registry();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<p>home</p>").unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<p>docs</p>").unwrap();
        std::fs::write(dir.path().join("docs/site.css"), "body{}").unwrap();

        let get = |url: &str| registry.dispatch(&Request::parse("GET", url, b""), dir.path());

        let home = get("/");
        assert_eq!((home.status, home.content_type), (200, mime::HTML));
        assert_eq!(home.body, b"<p>home</p>");
        assert_eq!(get("/docs").body, b"<p>docs</p>");
        assert_eq!(get("/docs/site.css").content_type, mime::CSS);
        assert_eq!(get("/missing.html"), Response::not_found());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_parent_segments_are_rejected() {
        let (registry, seen) = registry();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();

        for url in &[
            "/../secret.txt",
            "/%2e%2e/secret.txt",
            "/..%2Fsecret.txt",
            "/..%5Csecret.txt",
            "/echo/../x",
        ] {
            let response = registry.dispatch(&Request::parse("GET", url, b""), &root);
            assert_eq!(response, Response::not_found(), "{}", url);
        }
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_encoded_absolute_path_stays_in_root() {
        let (registry, _) = registry();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build");
        std::fs::create_dir_all(&root).unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "secret").unwrap();

        let url = format!("/{}", secret.to_string_lossy().replace('/', "%2F"));
        let response = registry.dispatch(&Request::parse("GET", &url, b""), &root);
        assert_eq!(response, Response::not_found());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root() {
        let (registry, _) = registry();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();

        let response = registry.dispatch(&Request::parse("GET", "/link.txt", b""), &root);
        assert_eq!(response, Response::not_found());
    }

    #[test]
    fn test_page_index() {
        let mut registry = Registry::new();
        registry
            .register(
                "_pages",
                Box::new(PageIndex::new(vec!["a.html".to_owned(), "posts/p.html".to_owned()])),
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let response = registry.dispatch(&Request::parse("GET", "/_pages", b""), dir.path());
        assert_eq!(response.content_type, mime::JSON);
        assert_eq!(response.body, br#"["a.html","posts/p.html"]"#);
    }
}
