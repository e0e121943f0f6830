//! The library code for the `kiln` static site builder. A build runs four
//! stages in a fixed order (see [`crate::build`]):
//!
//! 1. Loading the config file, the data records and the blog posts into a
//!    read-only [`crate::site::SiteData`]
//! 2. Rendering every page of the content tree and every blog post through
//!    the templates ([`crate::render`])
//! 3. Compiling or copying the static assets that changed since the last
//!    build ([`crate::asset`]), as decided by the staleness cache
//!    ([`crate::cache`])
//! 4. Listing the rendered pages in a sitemap ([`crate::sitemap`])
//!
//! The third stage is the incremental one. Every examined source file has
//! its modification time recorded in `.cache`; a file is recompiled only
//! when its destination is missing or its modification time changed.
//!
//! Built sites can be served locally together with small request handlers
//! ([`crate::serve`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod asset;
pub mod build;
pub mod cache;
pub mod config;
pub mod data;
pub mod highlight;
pub mod post;
pub mod pretty;
pub mod render;
pub mod serve;
pub mod site;
pub mod sitemap;
pub mod value;
