//! Exports the [`build_site`] function which stitches together the stages of
//! a build, always in this order:
//!
//! 1. Loading the configuration, data records and blog posts
//!    ([`crate::site`])
//! 2. Rendering the content tree and the blog posts ([`crate::render`])
//! 3. Compiling and copying static assets ([`crate::asset`]), consulting the
//!    [`StalenessCache`]
//! 4. Writing the sitemap ([`crate::sitemap`])
//!
//! Any failure aborts the build. Outputs already written stay on disk; the
//! next build's staleness checks pick up where this one stopped.

use crate::asset::{self, Pipeline, Toolchain};
use crate::cache::{self, StalenessCache};
use crate::config::{self, Layout};
use crate::data;
use crate::render::{self, Renderer};
use crate::site::{self, SiteData};
use crate::sitemap;
use std::fmt;
use std::path::PathBuf;

/// Options for a single build.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildOptions {
    /// Ignore the cache and rebuild every asset.
    pub force: bool,
}

/// What a build did.
#[derive(Debug)]
pub struct BuildReport {
    /// Every rendered page relative to the output directory, in render order.
    pub pages: Vec<String>,
    pub assets: asset::Report,
    pub sitemap: bool,
}

/// Builds the site described by `layout` with the compilers named in its
/// config file.
pub fn build_site(layout: &Layout, options: BuildOptions) -> Result<(SiteData, BuildReport)> {
    let site = SiteData::load(layout)?;
    let toolchain = Toolchain::from_config(&site.config.assets);
    let report = build_loaded(layout, options, &site, &toolchain)?;
    Ok((site, report))
}

/// Builds the site from already loaded `site` data using `toolchain` for
/// asset compilation.
pub fn build_loaded(
    layout: &Layout,
    options: BuildOptions,
    site: &SiteData,
    toolchain: &Toolchain,
) -> Result<BuildReport> {
    let renderer = Renderer::new(site, &layout.templates_directory)?;
    let pages = renderer.render_all(
        &layout.content_directory,
        &layout.output_directory,
        &layout.blog_template(),
    )?;

    let mut cache = if options.force {
        log::info!("Forcing a full rebuild");
        StalenessCache::fresh(&layout.cache_file)
    } else {
        StalenessCache::open(&layout.cache_file)?
    };
    let assets = Pipeline {
        toolchain,
        cache: &mut cache,
    }
    .compile_all(&layout.static_directory, &layout.static_output_directory())?;
    // Only a successful asset stage is remembered.
    cache.close()?;

    let sitemap = sitemap::write_sitemap(
        &layout.sitemap_file(),
        &pages,
        &site.config.site,
        site.created.naive_local().date(),
    )
    .map_err(|err| Error::Io {
        stage: Stage::Sitemap,
        source: Box::new(IoError {
            path: layout.sitemap_file(),
            err,
        }),
    })?;

    log::info!(
        "Built {} pages; {} assets compiled, {} copied, {} up to date",
        pages.len(),
        assets.compiled,
        assets.copied,
        assets.skipped
    );
    Ok(BuildReport {
        pages,
        assets,
        sitemap,
    })
}

/// The stage of the build an [`Error`] came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stage {
    Load,
    Render,
    Assets,
    Sitemap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Load => "load",
            Stage::Render => "render",
            Stage::Assets => "assets",
            Stage::Sitemap => "sitemap",
        })
    }
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Every variant identifies the stage
/// and the file that failed.
#[derive(Debug)]
pub enum Error {
    /// The config file is missing or unparsable.
    ConfigurationMissing(config::Error),

    /// A blog post or data file couldn't be parsed.
    MalformedContent { path: PathBuf, reason: String },

    /// A template failed to parse or execute.
    Render { path: PathBuf, reason: String },

    /// An asset compiler rejected a file.
    Compile { path: PathBuf, reason: String },

    /// A filesystem operation failed.
    Io {
        stage: Stage,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::ConfigurationMissing(_) => Stage::Load,
            Error::MalformedContent { .. } => Stage::Load,
            Error::Render { .. } => Stage::Render,
            Error::Compile { .. } => Stage::Assets,
            Error::Io { stage, .. } => *stage,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} stage failed: ", self.stage())?;
        match self {
            Error::ConfigurationMissing(err) => err.fmt(f),
            Error::MalformedContent { path, reason } => {
                write!(f, "malformed content `{}`: {}", path.display(), reason)
            }
            Error::Render { path, reason } => {
                write!(f, "templating `{}`: {}", path.display(), reason)
            }
            Error::Compile { path, reason } => {
                write!(f, "compiling `{}`: {}", path.display(), reason)
            }
            Error::Io { stage: _, source } => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigurationMissing(err) => Some(err),
            Error::Io { stage: _, source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<site::Error> for Error {
    fn from(err: site::Error) -> Error {
        match err {
            site::Error::Config(err) => Error::ConfigurationMissing(err),
            site::Error::Post(err) => Error::MalformedContent {
                reason: err.err.to_string(),
                path: err.path,
            },
            site::Error::Data(data::Error::Parse { path, reason }) => {
                Error::MalformedContent { path, reason }
            }
            site::Error::Data(err) => Error::Io {
                stage: Stage::Load,
                source: Box::new(err),
            },
        }
    }
}

impl From<render::Error> for Error {
    fn from(err: render::Error) -> Error {
        match err {
            render::Error::Template { path, reason } => Error::Render { path, reason },
            err => Error::Io {
                stage: Stage::Render,
                source: Box::new(err),
            },
        }
    }
}

impl From<asset::Error> for Error {
    fn from(err: asset::Error) -> Error {
        match err {
            asset::Error::Compile { path, reason } => Error::Compile { path, reason },
            err => Error::Io {
                stage: Stage::Assets,
                source: Box::new(err),
            },
        }
    }
}

impl From<cache::Error> for Error {
    fn from(err: cache::Error) -> Error {
        Error::Io {
            stage: Stage::Assets,
            source: Box::new(err),
        }
    }
}

/// An I/O error annotated with the path it concerns.
#[derive(Debug)]
struct IoError {
    path: PathBuf,
    err: std::io::Error,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "`{}`: {}", self.path.display(), self.err)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}
