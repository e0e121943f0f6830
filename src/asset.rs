//! Defines the asset pipeline: the walk over the static directory that
//! compiles style sheets and scripts and copies everything else into the
//! output tree. Each file goes through the [`StalenessCache`] first and is
//! skipped when its output is already up to date.

use crate::cache::{self, StalenessCache};
use crate::config::Assets;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::{DirEntry, WalkDir};

/// Turns source text into compiled text. Errors are the compiler's own
/// diagnostics.
pub trait Compiler {
    fn compile(&self, source: &str) -> std::result::Result<String, String>;
}

/// A [`Compiler`] that runs an external program, writing the source to its
/// stdin and reading the compiled text from its stdout. A non-zero exit
/// status is a compile error carrying the program's stderr.
pub struct CommandCompiler {
    argv: Vec<String>,
}

impl CommandCompiler {
    pub fn new(argv: Vec<String>) -> CommandCompiler {
        CommandCompiler { argv }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, source: &str) -> std::result::Result<String, String> {
        let (program, args) = match self.argv.split_first() {
            Some(split) => split,
            None => return Err(String::from("no compiler command configured")),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn `{}`: {}", program, e))?;

        // stdin is written from its own thread while `wait_with_output`
        // drains stdout and stderr.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = source.as_bytes().to_vec();
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for `{}`: {}", program, e))?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The compiler may exit without reading all of its input; its
                // exit status is reported below.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(format!("failed to write stdin to `{}`: {}", program, e))
                }
                Err(_) => return Err(format!("stdin writer for `{}` panicked", program)),
            }
        }
        if !output.status.success() {
            return Err(format!(
                "`{}` exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| format!("`{}` produced invalid UTF-8: {}", program, e))
    }
}

/// The compilers for each kind of compiled asset.
pub struct Toolchain {
    pub sass: Box<dyn Compiler>,
    pub scss: Box<dyn Compiler>,
    pub coffee: Box<dyn Compiler>,
}

impl Toolchain {
    /// Builds a toolchain of external commands from the `assets` config
    /// section.
    pub fn from_config(assets: &Assets) -> Toolchain {
        Toolchain {
            sass: Box::new(CommandCompiler::new(assets.sass.clone())),
            scss: Box::new(CommandCompiler::new(assets.scss.clone())),
            coffee: Box::new(CommandCompiler::new(assets.coffee.clone())),
        }
    }

    fn compiler(&self, kind: Kind) -> Option<&dyn Compiler> {
        match kind {
            Kind::Sass => Some(self.sass.as_ref()),
            Kind::Scss => Some(self.scss.as_ref()),
            Kind::CoffeeScript => Some(self.coffee.as_ref()),
            Kind::Copy => None,
        }
    }
}

/// How a static file is turned into its output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kind {
    Sass,
    Scss,
    CoffeeScript,
    Copy,
}

impl Kind {
    /// Classifies a file by its extension.
    pub fn from_file_name(file_name: &str) -> Kind {
        if file_name.ends_with(".sass") {
            Kind::Sass
        } else if file_name.ends_with(".scss") {
            Kind::Scss
        } else if file_name.ends_with(".coffee") {
            Kind::CoffeeScript
        } else {
            Kind::Copy
        }
    }

    /// The output file name for `file_name`.
    pub fn output_name(self, file_name: &str) -> String {
        let swap = |from: &str, to: &str| match file_name.strip_suffix(from) {
            Some(stem) => format!("{}{}", stem, to),
            None => file_name.to_owned(),
        };
        match self {
            Kind::Sass => swap(".sass", ".css"),
            Kind::Scss => swap(".scss", ".css"),
            Kind::CoffeeScript => swap(".coffee", ".js"),
            Kind::Copy => file_name.to_owned(),
        }
    }
}

/// Counts of what a [`Pipeline::compile_all`] pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Report {
    pub compiled: usize,
    pub copied: usize,
    pub skipped: usize,
}

/// The mode written files get, so the server can always read them.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

pub struct Pipeline<'a> {
    pub toolchain: &'a Toolchain,
    pub cache: &'a mut StalenessCache,
}

impl Pipeline<'_> {
    /// Walks `static_root` in name order and brings `output_root` up to date.
    /// Hidden files and directories are skipped entirely. The first compile
    /// error stops the walk.
    pub fn compile_all(&mut self, static_root: &Path, output_root: &Path) -> Result<Report> {
        let mut report = Report::default();
        if !static_root.is_dir() {
            log::warn!("No static directory at `{}`", static_root.display());
            return Ok(report);
        }

        let walk = WalkDir::new(static_root)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for result in walk {
            let entry = result?;
            // strip_prefix() can't fail; every entry is under `static_root`
            let relative = entry.path().strip_prefix(static_root).unwrap();
            let destination = output_root.join(relative);

            if entry.file_type().is_dir() {
                if !destination.exists() {
                    let created = if entry.depth() == 0 {
                        std::fs::create_dir_all(&destination)
                    } else {
                        std::fs::create_dir(&destination)
                    };
                    created.map_err(|err| Error::Io {
                        path: destination.clone(),
                        err,
                    })?;
                }
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            let kind = Kind::from_file_name(&file_name);
            let destination = destination.with_file_name(kind.output_name(&file_name));

            if !self.cache.should_compile(entry.path(), &destination)? {
                log::debug!("Up to date: {}", entry.path().display());
                report.skipped += 1;
                continue;
            }

            match self.toolchain.compiler(kind) {
                Some(compiler) => {
                    log::info!("Compiling: {}", entry.path().display());
                    compile_file(compiler, entry.path(), &destination)?;
                    report.compiled += 1;
                }
                None => {
                    log::info!("Copying: {}", entry.path().display());
                    std::fs::copy(entry.path(), &destination).map_err(|err| Error::Io {
                        path: entry.path().to_owned(),
                        err,
                    })?;
                    report.copied += 1;
                }
            }
            set_output_mode(&destination)?;
        }
        Ok(report)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn compile_file(compiler: &dyn Compiler, source: &Path, destination: &Path) -> Result<()> {
    let text = std::fs::read_to_string(source).map_err(|err| Error::Io {
        path: source.to_owned(),
        err,
    })?;
    let compiled = compiler.compile(&text).map_err(|reason| Error::Compile {
        path: source.to_owned(),
        reason,
    })?;
    std::fs::write(destination, compiled).map_err(|err| Error::Io {
        path: destination.to_owned(),
        err,
    })
}

#[cfg(unix)]
fn set_output_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(OUTPUT_MODE)).map_err(
        |err| Error::Io {
            path: path.to_owned(),
            err,
        },
    )
}

#[cfg(not(unix))]
fn set_output_mode(_path: &Path) -> Result<()> {
    Ok(())
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure in the asset pipeline.
#[derive(Debug)]
pub enum Error {
    /// An external compiler rejected a source file.
    Compile { path: PathBuf, reason: String },

    /// A file couldn't be read, written or copied.
    Io { path: PathBuf, err: std::io::Error },

    /// The static tree couldn't be walked.
    Walk(walkdir::Error),

    /// The cache couldn't fingerprint a source.
    Cache(cache::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Compile { path, reason } => {
                write!(f, "Compiling `{}`: {}", path.display(), reason)
            }
            Error::Io { path, err } => write!(f, "`{}`: {}", path.display(), err),
            Error::Walk(err) => err.fmt(f),
            Error::Cache(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Compile { .. } => None,
            Error::Io { path: _, err } => Some(err),
            Error::Walk(err) => Some(err),
            Error::Cache(err) => Some(err),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}

impl From<cache::Error> for Error {
    fn from(err: cache::Error) -> Error {
        Error::Cache(err)
    }
}
