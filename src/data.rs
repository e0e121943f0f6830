//! Loads the auxiliary data files from the data directory. Each file becomes
//! one [`Record`] keyed by its base name (everything before the first `.`),
//! so `data/team.csv` is available to templates as `team`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The contents of one data file.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// Every row of a CSV file, header row included.
    Table(Vec<Vec<String>>),

    /// A parsed YAML or JSON document.
    Structured(serde_yaml::Value),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Csv,
    Yaml,
    Json,
}

impl Format {
    fn from_file_name(file_name: &str) -> Option<Format> {
        if file_name.ends_with(".csv") {
            Some(Format::Csv)
        } else if file_name.ends_with(".yml") || file_name.ends_with(".yaml") {
            Some(Format::Yaml)
        } else if file_name.ends_with(".json") {
            Some(Format::Json)
        } else {
            None
        }
    }
}

/// Returns the lookup key for a data file: its name up to the first `.`.
pub fn record_name(file_name: &str) -> &str {
    match file_name.find('.') {
        Some(i) => &file_name[..i],
        None => file_name,
    }
}

/// Loads every data file in `directory` except `skip` (the config file).
/// Files are visited in name order; when two files share a base name the
/// later one wins and a warning is logged.
pub fn load_records(directory: &Path, skip: &str) -> Result<BTreeMap<String, Record>> {
    let io_err = |err| Error::Io {
        path: directory.to_owned(),
        err,
    };
    let mut file_names = Vec::new();
    for result in std::fs::read_dir(directory).map_err(io_err)? {
        let entry = result.map_err(io_err)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name != skip
            && !file_name.starts_with('.')
            && entry.file_type().map_err(io_err)?.is_file()
        {
            file_names.push(file_name);
        }
    }
    file_names.sort();

    let mut records = BTreeMap::new();
    let mut origins: BTreeMap<String, String> = BTreeMap::new();
    for file_name in file_names {
        let format = match Format::from_file_name(&file_name) {
            Some(format) => format,
            None => continue,
        };
        let name = record_name(&file_name).to_owned();
        log::info!("Loading: {}", name);

        let record = load_record(&directory.join(&file_name), format)?;
        if let Some(previous) = origins.insert(name.clone(), file_name.clone()) {
            log::warn!(
                "Data files `{}` and `{}` both define `{}`; using `{}`",
                previous,
                file_name,
                name,
                file_name
            );
        }
        records.insert(name, record);
    }
    Ok(records)
}

fn load_record(path: &Path, format: Format) -> Result<Record> {
    let contents = std::fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    let parse_err = |reason: String| Error::Parse {
        path: path.to_owned(),
        reason,
    };

    match format {
        Format::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(contents.as_bytes());
            let mut rows = Vec::new();
            for result in reader.records() {
                let row = result.map_err(|e| parse_err(e.to_string()))?;
                rows.push(row.iter().map(str::to_owned).collect());
            }
            Ok(Record::Table(rows))
        }
        Format::Yaml => serde_yaml::from_str(&contents)
            .map(Record::Structured)
            .map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str::<serde_json::Value>(&contents)
            .map_err(|e| parse_err(e.to_string()))
            .and_then(|json| serde_yaml::to_value(json).map_err(|e| parse_err(e.to_string())))
            .map(Record::Structured),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading a data file.
#[derive(Debug)]
pub enum Error {
    /// Returned when the directory or a file can't be read.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned when a file isn't valid CSV, YAML or JSON.
    Parse { path: PathBuf, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => write!(f, "`{}`: {}", path.display(), err),
            Error::Parse { path, reason } => {
                write!(f, "parsing data file `{}`: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::Parse { .. } => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_name() {
        assert_eq!(record_name("team.csv"), "team");
        assert_eq!(record_name("nav.en.yml"), "nav");
        assert_eq!(record_name("README"), "README");
    }

    #[test]
    fn test_load_records() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yml"), "site: {url: x}").unwrap();
        std::fs::write(dir.path().join("team.csv"), "name,role\nAda,eng\nBo,ops,extra\n")
            .unwrap();
        std::fs::write(dir.path().join("nav.yml"), "- home\n- about\n").unwrap();
        std::fs::write(dir.path().join("stats.json"), "{\"visits\": 3}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join(".hidden.yml"), "ignored: true").unwrap();

        let records = load_records(dir.path(), "config.yml")?;
        assert_eq!(
            records.keys().collect::<Vec<_>>(),
            vec!["nav", "stats", "team"]
        );
        assert_eq!(
            records["team"],
            Record::Table(vec![
                vec!["name".to_owned(), "role".to_owned()],
                vec!["Ada".to_owned(), "eng".to_owned()],
                vec!["Bo".to_owned(), "ops".to_owned(), "extra".to_owned()],
            ])
        );
        assert_eq!(
            records["nav"],
            Record::Structured(serde_yaml::from_str("[home, about]").unwrap())
        );
        match &records["stats"] {
            Record::Structured(value) => {
                assert_eq!(value.get("visits").and_then(|v| v.as_i64()), Some(3))
            }
            other => panic!("unexpected record {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_duplicate_names_last_wins() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.csv"), "a,b\n").unwrap();
        std::fs::write(dir.path().join("foo.yml"), "winner: true\n").unwrap();

        let records = load_records(dir.path(), "config.yml")?;
        assert_eq!(records.len(), 1);
        assert!(matches!(records["foo"], Record::Structured(_)));
        Ok(())
    }

    #[test]
    fn test_malformed_data_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yml"), "a: [unclosed").unwrap();
        let err = load_records(dir.path(), "config.yml").unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }
}
