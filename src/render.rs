//! Defines the [`Renderer`], which templates the content tree and the blog
//! posts into the output tree. Every page is a Go-style template (see
//! [`gtmpl`]) executed against the global site context merged with a few
//! page-specific keys, then pretty-printed and written to disk.
//!
//! Templates can share markup through partials: every file in the templates
//! directory whose name begins with `_` is prepended to each page before it
//! is parsed, so `{{define "header"}}...{{end}}` blocks declared there can be
//! used anywhere with `{{template "header" .}}`.

use crate::highlight;
use crate::pretty;
use crate::site::SiteData;
use gtmpl::{Context, Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// The extension of content files that are rendered. Everything else in the
/// content tree is ignored.
pub const PAGE_EXTENSION: &str = ".html";

/// Responsible for templating pages and writing them to disk.
pub struct Renderer<'a> {
    site: &'a SiteData,

    /// The global context, computed once and shared by every page.
    globals: HashMap<String, Value>,

    /// The concatenated partial templates.
    partials: String,
}

impl<'a> Renderer<'a> {
    /// Constructs a renderer for `site`, loading partials from
    /// `templates_directory` (which may not exist).
    pub fn new(site: &'a SiteData, templates_directory: &Path) -> Result<Renderer<'a>> {
        let globals = match site.to_value() {
            Value::Object(m) => m,
            _ => HashMap::new(),
        };
        Ok(Renderer {
            site,
            globals,
            partials: load_partials(templates_directory)?,
        })
    }

    /// Expands `template` (read from `source`) against `context` merged over
    /// the global context, then normalizes the result. Templates may call
    /// [`highlight`](crate::highlight) to syntax-color code.
    pub fn render_page(
        &self,
        source: &Path,
        template: &str,
        context: HashMap<String, Value>,
    ) -> Result<String> {
        let mut merged = self.globals.clone();
        merged.extend(context);

        let mut text = String::with_capacity(self.partials.len() + template.len());
        text.push_str(&self.partials);
        text.push_str(template);

        let template_error = |reason: String| Error::Template {
            path: source.to_owned(),
            reason,
        };
        let mut tmpl = Template::default();
        tmpl.add_func(highlight::FUNCTION_NAME, highlight::highlight);
        tmpl.parse(text).map_err(template_error)?;
        let context = Context::from(Value::Object(merged)).map_err(template_error)?;
        let rendered = tmpl.render(&context).map_err(template_error)?;
        let rendered = if self.site.config.site.pretty {
            pretty::prettify(&rendered)
        } else {
            rendered
        };
        Ok(pretty::trim_code_blocks(&rendered))
    }

    /// Renders the content tree, then the blog posts, into `output_root`.
    /// Returns the path of every page written, relative to `output_root`, in
    /// the order they were written.
    pub fn render_all(
        &self,
        content_root: &Path,
        output_root: &Path,
        blog_template: &Path,
    ) -> Result<Vec<String>> {
        let mut pages = Vec::new();
        self.render_content(content_root, output_root, &mut pages)?;
        self.render_posts(blog_template, output_root, &mut pages)?;
        Ok(pages)
    }

    fn render_content(
        &self,
        content_root: &Path,
        output_root: &Path,
        pages: &mut Vec<String>,
    ) -> Result<()> {
        if !content_root.is_dir() {
            log::warn!(
                "No content directory at `{}`",
                content_root.display()
            );
            return create_dir(output_root, true);
        }

        let walk = WalkDir::new(content_root).sort_by(|a, b| a.file_name().cmp(b.file_name()));
        for result in walk {
            let entry = result?;
            // strip_prefix() can't fail; every entry is under `content_root`
            let relative = entry.path().strip_prefix(content_root).unwrap();
            let destination = output_root.join(relative);

            if entry.file_type().is_dir() {
                create_dir(&destination, entry.depth() == 0)?;
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !file_name.ends_with(PAGE_EXTENSION) {
                continue;
            }

            log::info!("Processing: {}", entry.path().display());
            let mut context = HashMap::new();
            context.insert(
                "page".to_owned(),
                Value::from(entry.path().to_string_lossy().into_owned()),
            );
            self.render_file(entry.path(), &destination, context)?;
            pages.push(page_path(relative));
        }
        Ok(())
    }

    fn render_posts(
        &self,
        blog_template: &Path,
        output_root: &Path,
        pages: &mut Vec<String>,
    ) -> Result<()> {
        if self.site.posts.is_empty() || !blog_template.is_file() {
            return Ok(());
        }

        let blog_dir = Path::new(&self.site.config.site.blog_dir);
        let directory = output_root.join(blog_dir);
        create_dir(&directory, true)?;

        for post in &self.site.posts {
            let name = post.output_name();
            log::info!("Processing post: {}", post.file);
            let mut context = HashMap::new();
            context.insert("post".to_owned(), Value::from(post));
            context.insert(
                "page".to_owned(),
                Value::from(blog_template.to_string_lossy().into_owned()),
            );
            self.render_file(blog_template, &directory.join(&name), context)?;
            pages.push(page_path(&blog_dir.join(&name)));
        }
        Ok(())
    }

    fn render_file(
        &self,
        source: &Path,
        destination: &Path,
        context: HashMap<String, Value>,
    ) -> Result<()> {
        let template = std::fs::read_to_string(source).map_err(|err| Error::Io {
            path: source.to_owned(),
            err,
        })?;
        let rendered = self.render_page(source, &template, context)?;
        std::fs::write(destination, rendered).map_err(|err| Error::Io {
            path: destination.to_owned(),
            err,
        })
    }
}

// Creates `dir` if it doesn't exist yet. Only the root of a walk may need
// intermediate directories; below it the walk creates parents first.
fn create_dir(dir: &Path, root: bool) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let result = if root {
        std::fs::create_dir_all(dir)
    } else {
        std::fs::create_dir(dir)
    };
    result.map_err(|err| Error::Io {
        path: dir.to_owned(),
        err,
    })
}

/// Joins the normal components of `relative` with `/`, regardless of
/// platform, e.g. `posts/p1.html`.
fn page_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn load_partials(templates_directory: &Path) -> Result<String> {
    let io_err = |err| Error::Io {
        path: templates_directory.to_owned(),
        err,
    };
    if !templates_directory.is_dir() {
        return Ok(String::new());
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for result in std::fs::read_dir(templates_directory).map_err(io_err)? {
        let entry = result.map_err(io_err)?;
        if entry.file_name().to_string_lossy().starts_with('_')
            && entry.file_type().map_err(io_err)?.is_file()
        {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut partials = String::new();
    for path in paths {
        let contents = std::fs::read_to_string(&path).map_err(|err| Error::Io {
            path: path.clone(),
            err,
        })?;
        partials.push_str(contents.trim());
    }
    Ok(partials)
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error rendering pages.
#[derive(Debug)]
pub enum Error {
    /// A template failed to parse or execute.
    Template { path: PathBuf, reason: String },

    /// A file or directory couldn't be read or written.
    Io { path: PathBuf, err: io::Error },

    /// The content tree couldn't be walked.
    Walk(walkdir::Error),
}

impl Error {
    /// The file the error concerns, if known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Template { path, .. } => Some(path),
            Error::Io { path, .. } => Some(path),
            Error::Walk(err) => err.path(),
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. This allows us to use
    /// the `?` operator while walking the content tree.
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template { path, reason } => {
                write!(f, "Templating `{}`: {}", path.display(), reason)
            }
            Error::Io { path, err } => write!(f, "`{}`: {}", path.display(), err),
            Error::Walk(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template { .. } => None,
            Error::Io { path: _, err } => Some(err),
            Error::Walk(err) => Some(err),
        }
    }
}
