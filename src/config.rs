//! Defines the [`Layout`] of a project on disk and the [`Config`] loaded from
//! its `data/config.yml` file. The config file is the one hard precondition
//! of a build: if it is missing or can't be parsed, nothing else runs.

use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The fixed locations of a project's inputs and outputs, all relative to a
/// project root.
#[derive(Clone, Debug)]
pub struct Layout {
    pub root: PathBuf,
    pub content_directory: PathBuf,
    pub output_directory: PathBuf,
    pub data_directory: PathBuf,
    pub static_directory: PathBuf,
    pub blog_directory: PathBuf,
    pub templates_directory: PathBuf,
    pub cache_file: PathBuf,
}

impl Layout {
    /// Constructs the layout for the project rooted at `root`.
    pub fn new(root: &Path) -> Layout {
        Layout {
            root: root.to_owned(),
            content_directory: root.join("content"),
            output_directory: root.join("build"),
            data_directory: root.join("data"),
            static_directory: root.join("static"),
            blog_directory: root.join("blog"),
            templates_directory: root.join("templates"),
            cache_file: root.join(".cache"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_directory.join(CONFIG_FILE_NAME)
    }

    /// The template rendered once per blog post.
    pub fn blog_template(&self) -> PathBuf {
        self.templates_directory.join("page.html")
    }

    /// Static assets keep their directory name in the output tree, so
    /// `static/site.sass` ends up at `build/static/site.css`.
    pub fn static_output_directory(&self) -> PathBuf {
        match self.static_directory.file_name() {
            Some(name) => self.output_directory.join(name),
            None => self.output_directory.clone(),
        }
    }

    pub fn sitemap_file(&self) -> PathBuf {
        self.output_directory.join("sitemap.xml")
    }
}

pub const CONFIG_FILE_NAME: &str = "config.yml";

/// The `site` section of the config file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// The base URL of the published site, used to build sitemap locations.
    pub url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to write `sitemap.xml` after a successful build.
    #[serde(default = "default_true")]
    pub sitemap: bool,

    /// Whether rendered pages are passed through the HTML pretty-printer.
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Optional sub-directory of the output tree for rendered blog posts.
    /// Must be relative and stay inside the output tree.
    #[serde(default, deserialize_with = "relative_dir")]
    pub blog_dir: String,
}

fn relative_dir<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let dir = String::deserialize(deserializer)?;
    let escapes = Path::new(&dir)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(serde::de::Error::custom(format!(
            "`{}` must be a relative directory inside the output tree",
            dir
        )));
    }
    Ok(dir)
}

fn default_host() -> String {
    String::from("127.0.0.1")
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

/// Command lines for the external asset compilers. Each command receives the
/// source text on stdin and writes the compiled text to stdout.
#[derive(Clone, Debug, Deserialize)]
pub struct Assets {
    #[serde(default = "default_sass")]
    pub sass: Vec<String>,

    #[serde(default = "default_scss")]
    pub scss: Vec<String>,

    #[serde(default = "default_coffee")]
    pub coffee: Vec<String>,
}

impl Default for Assets {
    fn default() -> Self {
        Assets {
            sass: default_sass(),
            scss: default_scss(),
            coffee: default_coffee(),
        }
    }
}

fn default_sass() -> Vec<String> {
    vec!["sass".into(), "--stdin".into(), "--indented".into()]
}

fn default_scss() -> Vec<String> {
    vec!["sass".into(), "--stdin".into()]
}

fn default_coffee() -> Vec<String> {
    vec![
        "coffee".into(),
        "--compile".into(),
        "--print".into(),
        "--stdio".into(),
    ]
}

#[derive(Deserialize)]
struct Project {
    site: Site,

    #[serde(default)]
    assets: Assets,
}

/// The loaded configuration. `site` and `assets` are the sections the build
/// understands; `raw` is the whole document, handed to templates as `config`.
#[derive(Clone, Debug)]
pub struct Config {
    pub site: Site,
    pub assets: Assets,
    pub raw: serde_yaml::Value,
}

impl Config {
    /// Loads the config file at `path`.
    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Config::from_str(&contents).map_err(|e| Error {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Parses a config document. Fails if the `site` section is absent or
    /// malformed.
    pub fn from_str(input: &str) -> std::result::Result<Config, serde_yaml::Error> {
        let raw: serde_yaml::Value = serde_yaml::from_str(input)?;
        let project: Project = serde_yaml::from_value(raw.clone())?;
        Ok(Config {
            site: project.site,
            assets: project.assets,
            raw,
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned when the config file can't be read or parsed. Either way the
/// build can't proceed.
#[derive(Debug)]
pub struct Error {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "No configuration found at `{}`: {}",
            self.path.display(),
            self.reason
        )
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_site_defaults() -> std::result::Result<(), serde_yaml::Error> {
        let config = Config::from_str("site:\n  url: https://example.org\n")?;
        assert_eq!(config.site.url, "https://example.org");
        assert_eq!(config.site.host, "127.0.0.1");
        assert_eq!(config.site.port, 8000);
        assert!(config.site.sitemap);
        assert!(config.site.pretty);
        assert_eq!(config.site.blog_dir, "");
        assert_eq!(config.assets.coffee[0], "coffee");
        Ok(())
    }

    #[test]
    fn test_site_overrides() -> std::result::Result<(), serde_yaml::Error> {
        let config = Config::from_str(
            "site:\n  url: https://example.org\n  sitemap: false\n  pretty: false\n  blogDir: posts\n  port: 9000\nassets:\n  sass: [sassc, --sass]\nnav: [home, about]\n",
        )?;
        assert!(!config.site.sitemap);
        assert!(!config.site.pretty);
        assert_eq!(config.site.blog_dir, "posts");
        assert_eq!(config.site.port, 9000);
        assert_eq!(config.assets.sass, vec!["sassc", "--sass"]);
        assert_eq!(config.assets.scss, default_scss());
        assert!(config.raw.get("nav").is_some());
        Ok(())
    }

    #[test]
    fn test_blog_dir_must_stay_inside_output() {
        for dir in &["../x", "/abs", "posts/../../x"] {
            let yaml = format!("site:\n  url: x\n  blogDir: {}\n", dir);
            let err = Config::from_str(&yaml).unwrap_err();
            assert!(err.to_string().contains("relative directory"), "{}", err);
        }
        let config = Config::from_str("site:\n  url: x\n  blogDir: posts/2023\n").unwrap();
        assert_eq!(config.site.blog_dir, "posts/2023");
    }

    #[test]
    fn test_missing_site_section() {
        assert!(Config::from_str("title: nope\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/does/not/exist/config.yml"))
            .unwrap_err();
        assert!(err.to_string().starts_with("No configuration found"));
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new(Path::new("/site"));
        assert_eq!(layout.config_file(), Path::new("/site/data/config.yml"));
        assert_eq!(
            layout.static_output_directory(),
            Path::new("/site/build/static")
        );
        assert_eq!(layout.blog_template(), Path::new("/site/templates/page.html"));
    }
}
