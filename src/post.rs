//! Defines the [`Post`] type and the logic for parsing blog posts from the
//! blog directory. A post's date and default title come from its file name
//! (`<year>-<month>-<day>-<title-words>.<ext>`); an optional leading YAML
//! front matter block can override the title and supply an author and tags:
//!
//! ```md
//! ---
//! title: Hello, world!
//! author: Jane
//! tags: [greet]
//! ---
//! <p>Hello</p>
//! ```

use chrono::NaiveDate;
use pulldown_cmark::{html, Parser};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A blog post. Posts are parsed fresh on every build and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub title: String,
    pub date: NaiveDate,
    pub author: Option<String>,

    /// The post body, i.e., everything after the front matter.
    pub content: String,

    /// The body as HTML: rendered from Markdown for `.md` posts, otherwise
    /// identical to `content`.
    pub html: String,

    pub tags: Vec<String>,

    /// The front matter exactly as parsed. Empty when the post has none.
    pub meta: serde_yaml::Mapping,

    /// The source file name.
    pub file: String,
}

impl Post {
    /// The file name the rendered post is written to: the source file name,
    /// with Markdown extensions swapped for `.html`.
    pub fn output_name(&self) -> String {
        match markdown_stem(&self.file) {
            Some(stem) => format!("{}.html", stem),
            None => self.file.clone(),
        }
    }

    /// Parses a post from its file name and contents.
    pub fn parse(file: &str, input: &str) -> Result<Post> {
        let (date, default_title) = parse_file_name(file)?;

        let (meta, content) = match frontmatter_indices(input) {
            None => (serde_yaml::Mapping::new(), input.to_owned()),
            Some((yaml_start, yaml_stop, body_start)) => {
                let yaml = &input[yaml_start..yaml_stop];
                let meta = if yaml.trim().is_empty() {
                    serde_yaml::Mapping::new()
                } else {
                    match serde_yaml::from_str(yaml)? {
                        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
                        serde_yaml::Value::Mapping(m) => m,
                        _ => return Err(Error::FrontmatterNotMapping),
                    }
                };
                (meta, input[body_start..].trim().to_owned())
            }
        };

        let frontmatter: Frontmatter =
            serde_yaml::from_value(serde_yaml::Value::Mapping(meta.clone()))?;

        let html = if markdown_stem(file).is_some() {
            let mut html = String::with_capacity(content.len());
            html::push_html(&mut html, Parser::new(&content));
            html
        } else {
            content.clone()
        };

        Ok(Post {
            title: frontmatter.title.unwrap_or(default_title),
            date,
            author: frontmatter.author,
            content,
            html,
            tags: frontmatter.tags,
            meta,
            file: file.to_owned(),
        })
    }
}

/// The fields of the front matter the build understands. Anything else is
/// only reachable through [`Post::meta`].
#[derive(Deserialize)]
struct Frontmatter {
    #[serde(default)]
    title: Option<String>,

    #[serde(default)]
    author: Option<String>,

    #[serde(default)]
    tags: Vec<String>,
}

const FENCE: &str = "---";

// Returns `None` when the post has no front matter, otherwise the offsets of
// the start and end of the YAML and the start of the body. Front matter needs
// both fences; a lone leading `---` is part of the content.
fn frontmatter_indices(input: &str) -> Option<(usize, usize, usize)> {
    if !input.starts_with(FENCE) {
        return None;
    }
    let offset = input[FENCE.len()..].find(FENCE)?;
    Some((
        FENCE.len(),                        // yaml_start
        FENCE.len() + offset,               // yaml_stop
        FENCE.len() + offset + FENCE.len(), // body_start
    ))
}

// Splits `2023-04-01-hello-world.md` into its date and the default title
// `hello world`.
fn parse_file_name(file: &str) -> Result<(NaiveDate, String)> {
    let stem = match file.rfind('.') {
        Some(i) => &file[..i],
        None => file,
    };
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() < 3 {
        return Err(Error::InvalidDate);
    }

    let year: i32 = parts[0].parse().map_err(|_| Error::InvalidDate)?;
    let month: u32 = parts[1].parse().map_err(|_| Error::InvalidDate)?;
    let day: u32 = parts[2].parse().map_err(|_| Error::InvalidDate)?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or(Error::InvalidDate)?;

    Ok((date, parts[3..].join(" ")))
}

fn markdown_stem(file: &str) -> Option<&str> {
    const MARKDOWN_EXTENSIONS: [&str; 2] = [".md", ".markdown"];
    MARKDOWN_EXTENSIONS
        .iter()
        .find_map(|extension| file.strip_suffix(extension))
}

/// Parses every post in `directory`, in file name order (and therefore date
/// order). Hidden files and sub-directories are skipped. A missing directory
/// yields no posts.
pub fn parse_posts(directory: &Path) -> std::result::Result<Vec<Post>, ParseError> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }

    let io_err = |err| ParseError {
        path: directory.to_owned(),
        err: Error::Io(err),
    };
    let mut files = Vec::new();
    for result in std::fs::read_dir(directory).map_err(io_err)? {
        let entry = result.map_err(io_err)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.starts_with('.') && entry.file_type().map_err(io_err)?.is_file() {
            files.push(file_name);
        }
    }
    files.sort();

    let mut posts = Vec::with_capacity(files.len());
    for file_name in files {
        let path = directory.join(&file_name);
        log::info!("Loading post: {}", path.display());
        let post = std::fs::read_to_string(&path)
            .map_err(Error::Io)
            .and_then(|contents| Post::parse(&file_name, &contents))
            .map_err(|err| ParseError { path, err })?;
        posts.push(post);
    }
    Ok(posts)
}

/// Represents the result of a [`Post`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Post`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the first three dash-separated segments of the file name
    /// aren't a valid year, month and day.
    InvalidDate,

    /// Returned when the front matter is YAML but not a mapping.
    FrontmatterNotMapping,

    /// Returned when there was an error parsing the front matter as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for I/O errors reading the post.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidDate => write!(
                f,
                "file name must begin with `<year>-<month>-<day>-`"
            ),
            Error::FrontmatterNotMapping => {
                write!(f, "front matter must be a mapping")
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidDate => None,
            Error::FrontmatterNotMapping => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

/// An [`Error`] annotated with the post file it came from.
#[derive(Debug)]
pub struct ParseError {
    pub path: PathBuf,
    pub err: Error,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "parsing post `{}`: {}", self.path.display(), self.err)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}
