//! Defines the [`StalenessCache`], the persistent store that decides whether
//! a static asset needs to be recompiled. Each source path maps to a
//! fingerprint of its modification time as of the last build that examined
//! it. The store lives in a single JSON file next to the project and
//! survives across builds; it is never pruned.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub struct StalenessCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl StalenessCache {
    /// Opens the store at `path`, reusing whatever a previous build left
    /// there. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<StalenessCache> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| Error::Decode {
                path: path.to_owned(),
                err,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(Error::Io {
                    path: path.to_owned(),
                    err,
                })
            }
        };
        log::debug!("Opened cache `{}`", path.display());
        Ok(StalenessCache {
            path: path.to_owned(),
            entries,
        })
    }

    /// Opens an empty store at `path`, ignoring any previous contents. They
    /// are replaced when the store is closed.
    pub fn fresh(path: &Path) -> StalenessCache {
        StalenessCache {
            path: path.to_owned(),
            entries: BTreeMap::new(),
        }
    }

    /// Reports whether `source` must be (re)built into `destination`: it has
    /// never been seen, or `destination` is gone, or its fingerprint changed.
    /// The current fingerprint is recorded either way.
    pub fn should_compile(&mut self, source: &Path, destination: &Path) -> Result<bool> {
        let current = fingerprint(source)?;
        let key = source.to_string_lossy().into_owned();

        let stale = match self.entries.get(&key) {
            None => true,
            Some(_) if !destination.exists() => true,
            Some(previous) => previous.as_bytes() != current.as_bytes(),
        };

        self.entries.insert(key, current);
        Ok(stale)
    }

    /// The fingerprint last recorded for `source`, if any.
    pub fn fingerprint(&self, source: &Path) -> Option<&str> {
        self.entries
            .get(source.to_string_lossy().as_ref())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flushes the store to disk. The file is replaced through a sibling
    /// temporary file so an interrupted write never leaves half a store.
    pub fn close(self) -> Result<()> {
        let io_err = |err| Error::Io {
            path: self.path.clone(),
            err,
        };
        let bytes = serde_json::to_vec_pretty(&self.entries).map_err(|err| Error::Decode {
            path: self.path.clone(),
            err,
        })?;
        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        std::fs::write(&temporary, bytes).map_err(io_err)?;
        std::fs::rename(&temporary, &self.path).map_err(io_err)?;
        log::debug!(
            "Closed cache `{}` ({} entries)",
            self.path.display(),
            self.entries.len()
        );
        Ok(())
    }
}

/// Encodes the modification time of `path` as `<seconds>.<nanoseconds>`
/// since the epoch.
pub fn fingerprint(path: &Path) -> Result<String> {
    let io_err = |err| Error::Io {
        path: path.to_owned(),
        err,
    };
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(io_err)?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(format!(
        "{}.{:09}",
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    ))
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading, fingerprinting, or writing the cache.
#[derive(Debug)]
pub enum Error {
    /// Returned when a source can't be stat'ed or the store can't be read or
    /// written.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned when the store file isn't a JSON object of strings.
    Decode {
        path: PathBuf,
        err: serde_json::Error,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => write!(f, "`{}`: {}", path.display(), err),
            Error::Decode { path, err } => {
                write!(f, "Decoding cache `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::Decode { path: _, err } => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn touch(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_unseen_source_is_stale() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        std::fs::write(&source, "a").unwrap();
        std::fs::write(&destination, "a").unwrap();

        let mut cache = StalenessCache::fresh(&dir.path().join(".cache"));
        assert!(cache.should_compile(&source, &destination)?);
        assert!(!cache.should_compile(&source, &destination)?);
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_destination_is_stale() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        std::fs::write(&source, "a").unwrap();

        let mut cache = StalenessCache::fresh(&dir.path().join(".cache"));
        assert!(cache.should_compile(&source, &destination)?);
        // Still missing, still stale, even though the fingerprint matches.
        assert!(cache.should_compile(&source, &destination)?);
        std::fs::write(&destination, "a").unwrap();
        assert!(!cache.should_compile(&source, &destination)?);
        Ok(())
    }

    #[test]
    fn test_changed_fingerprint_is_stale() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        std::fs::write(&source, "a").unwrap();
        std::fs::write(&destination, "a").unwrap();
        touch(&source, 1_000);

        let mut cache = StalenessCache::fresh(&dir.path().join(".cache"));
        cache.should_compile(&source, &destination)?;
        assert_eq!(cache.fingerprint(&source), Some("1000.000000000"));

        touch(&source, 2_000);
        assert!(cache.should_compile(&source, &destination)?);
        assert_eq!(cache.fingerprint(&source), Some("2000.000000000"));
        assert!(!cache.should_compile(&source, &destination)?);
        Ok(())
    }

    #[test]
    fn test_entries_survive_close_and_open() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join(".cache");
        let source = dir.path().join("a.txt");
        let destination = dir.path().join("b.txt");
        std::fs::write(&source, "a").unwrap();
        std::fs::write(&destination, "a").unwrap();

        let mut cache = StalenessCache::open(&store)?;
        assert!(cache.is_empty());
        assert!(cache.should_compile(&source, &destination)?);
        cache.close()?;

        let mut cache = StalenessCache::open(&store)?;
        assert_eq!(cache.len(), 1);
        assert!(!cache.should_compile(&source, &destination)?);
        cache.close()?;

        let mut cache = StalenessCache::fresh(&store);
        assert!(cache.should_compile(&source, &destination)?);
        Ok(())
    }

    #[test]
    fn test_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join(".cache");
        std::fs::write(&store, "not json").unwrap();
        assert!(matches!(
            StalenessCache::open(&store),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StalenessCache::fresh(&dir.path().join(".cache"));
        let result = cache.should_compile(&dir.path().join("nope"), &dir.path().join("x"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
