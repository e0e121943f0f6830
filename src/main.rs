use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches, SubCommand};
use kiln::build::{build_site, BuildOptions};
use kiln::config::Layout;
use kiln::serve::{self, PageIndex, Registry};
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("kiln")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds a static site from templates, data files, blog posts and assets")
        .arg(
            Arg::with_name("force")
                .long("force")
                .global(true)
                .help("Rebuilds every asset, ignoring the cache"),
        )
        .arg(
            Arg::with_name("root")
                .long("root")
                .takes_value(true)
                .value_name("DIR")
                .global(true)
                .help("The project directory [default: .]"),
        )
        .subcommand(SubCommand::with_name("run").about("Builds the site and serves it"))
        .get_matches();

    if let Err(err) = run(&matches) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let serve_after = matches.subcommand_matches("run");
    // Global arguments given after `run` only show up in its matches.
    let sub = serve_after.unwrap_or(matches);
    let force = matches.is_present("force") || sub.is_present("force");
    let root = sub
        .value_of("root")
        .or_else(|| matches.value_of("root"))
        .unwrap_or(".");

    let layout = Layout::new(Path::new(root));
    // The cache is closed by the time the build returns.
    let (site, report) = build_site(&layout, BuildOptions { force })
        .with_context(|| format!("Building `{}`", layout.root.display()))?;

    if serve_after.is_some() {
        let mut registry = Registry::new();
        registry.register("_pages", Box::new(PageIndex::new(report.pages)))?;
        serve::serve(&layout, &site.config.site, &registry)?;
    }
    Ok(())
}
