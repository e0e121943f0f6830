//! Conversions from the build's types into [`gtmpl::Value`]s for templating.

use crate::data::Record;
use crate::post::Post;
use gtmpl::Value;
use std::collections::HashMap;

/// Converts an arbitrary YAML value. Mapping keys that aren't strings are
/// rendered to strings, so `{1: a}` is reachable as `."1"` via `index`.
pub fn from_yaml(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::from(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        Yaml::String(s) => Value::from(s.as_str()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(from_yaml).collect()),
        Yaml::Mapping(mapping) => from_mapping(mapping),
    }
}

pub fn from_mapping(mapping: &serde_yaml::Mapping) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    for (k, v) in mapping {
        m.insert(key_string(k), from_yaml(v));
    }
    Value::Object(m)
}

fn key_string(key: &serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;
    match key {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => String::from("null"),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_start_matches("---").trim().to_owned())
            .unwrap_or_default(),
    }
}

impl From<&Record> for Value {
    /// Tables become arrays of arrays of strings; structured records keep
    /// their shape.
    fn from(record: &Record) -> Value {
        match record {
            Record::Table(rows) => Value::Array(
                rows.iter()
                    .map(|row| Value::Array(row.iter().map(|cell| cell.as_str().into()).collect()))
                    .collect(),
            ),
            Record::Structured(value) => from_yaml(value),
        }
    }
}

impl From<&Post> for Value {
    /// Converts a [`Post`] into a [`Value`] with fields `title`, `date`
    /// (`YYYY-MM-DD`), `author` (nil when absent), `content`, `html`, `tags`,
    /// `meta` and `file`.
    fn from(post: &Post) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), post.title.as_str().into());
        m.insert(
            "date".to_owned(),
            post.date.format("%Y-%m-%d").to_string().into(),
        );
        m.insert(
            "author".to_owned(),
            match &post.author {
                Some(author) => author.as_str().into(),
                None => Value::Nil,
            },
        );
        m.insert("content".to_owned(), post.content.as_str().into());
        m.insert("html".to_owned(), post.html.as_str().into());
        m.insert(
            "tags".to_owned(),
            Value::Array(post.tags.iter().map(|t| t.as_str().into()).collect()),
        );
        m.insert("meta".to_owned(), from_mapping(&post.meta));
        m.insert("file".to_owned(), post.file.as_str().into());
        Value::Object(m)
    }
}
