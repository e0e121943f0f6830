//! Defines [`SiteData`], everything loaded before rendering starts: the
//! configuration, the auxiliary data records and the blog posts. It is built
//! once per build and only ever read afterwards.

use crate::config::{self, Config, Layout, CONFIG_FILE_NAME};
use crate::data::{self, Record};
use crate::post::{self, Post};
use crate::value;
use chrono::{DateTime, Local};
use gtmpl::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Clone, Debug)]
pub struct SiteData {
    pub config: Config,
    pub records: BTreeMap<String, Record>,

    /// Blog posts in file name (and therefore date) order.
    pub posts: Vec<Post>,

    /// When the build started.
    pub created: DateTime<Local>,
}

impl SiteData {
    /// Loads the config file, the data records and the blog posts for
    /// `layout`. The config file is mandatory; the blog directory is not.
    pub fn load(layout: &Layout) -> Result<SiteData> {
        let config = Config::from_file(&layout.config_file())?;
        let records = data::load_records(&layout.data_directory, CONFIG_FILE_NAME)?;
        let posts = post::parse_posts(&layout.blog_directory)?;
        Ok(SiteData {
            config,
            records,
            posts,
            created: Local::now(),
        })
    }

    /// The global template context: `config`, each data record under its
    /// name, `blog` and `created`.
    pub fn to_value(&self) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        for (name, record) in &self.records {
            m.insert(name.clone(), record.into());
        }
        m.insert("config".to_owned(), value::from_yaml(&self.config.raw));
        m.insert(
            "blog".to_owned(),
            Value::Array(self.posts.iter().map(Value::from).collect()),
        );
        m.insert(
            "created".to_owned(),
            self.created.format("%Y-%m-%d %H:%M:%S").to_string().into(),
        );
        Value::Object(m)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure while loading site data.
#[derive(Debug)]
pub enum Error {
    /// The config file is missing or invalid.
    Config(config::Error),

    /// A data file couldn't be read or parsed.
    Data(data::Error),

    /// A blog post couldn't be read or parsed.
    Post(post::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Data(err) => err.fmt(f),
            Error::Post(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Data(err) => Some(err),
            Error::Post(err) => Some(err),
        }
    }
}

impl From<config::Error> for Error {
    fn from(err: config::Error) -> Error {
        Error::Config(err)
    }
}

impl From<data::Error> for Error {
    fn from(err: data::Error) -> Error {
        Error::Data(err)
    }
}

impl From<post::ParseError> for Error {
    fn from(err: post::ParseError) -> Error {
        Error::Post(err)
    }
}
