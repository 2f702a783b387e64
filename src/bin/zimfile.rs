//! zimfile
//!
//! Command-line inspector for archive files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use zimfile_rs::{Archive, ArticleSearch, ReaderConfig};

#[derive(Parser, Debug)]
#[command(name = "zimfile")]
#[command(about = "Inspect and query compressed article archives")]
#[command(version)]
struct Args {
    /// Reader settings in TOML (defaults come from ZIM_* environment variables)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Skip checksum verification at open
    #[arg(long, global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print archive header and index summary
    Info {
        archive: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List entries in dirent-table order
    List {
        archive: PathBuf,

        /// Only entries in this namespace
        #[arg(short, long)]
        namespace: Option<char>,

        /// List in title order instead
        #[arg(long)]
        by_title: bool,
    },

    /// Write an entry's content to stdout
    Cat {
        archive: PathBuf,

        /// Entry as namespace/url (e.g. A/Cat)
        url: String,
    },

    /// Find entries whose title contains a string
    Search {
        archive: PathBuf,

        query: String,

        /// Only entries in this namespace
        #[arg(short, long)]
        namespace: Option<char>,
    },

    /// Titles starting with a prefix, in title order
    Suggest {
        archive: PathBuf,

        prefix: String,

        #[arg(short, long, default_value_t = 'A')]
        namespace: char,

        /// Maximum number of titles
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print a metadata value (e.g. Title, Language)
    Meta { archive: PathBuf, name: String },

    /// Recompute and check the archive checksum
    Verify { archive: PathBuf },
}

fn reader_config(args: &Args) -> Result<ReaderConfig> {
    let config = match &args.config {
        Some(path) => ReaderConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ReaderConfig::from_env(),
    };
    Ok(config.with_verify_checksum(!args.no_verify))
}

fn open(path: &Path, config: &ReaderConfig) -> Result<Archive> {
    Archive::open_with_config(path, config)
        .with_context(|| format!("opening {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = reader_config(&args)?;

    match &args.command {
        Command::Info { archive, json } => {
            let archive = open(archive, &config)?;
            let summary = archive.info()?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("uuid:      {}", summary.uuid);
            println!("version:   {}", summary.version);
            println!("size:      {} bytes", summary.file_size);
            println!("entries:   {}", summary.entry_count);
            println!("clusters:  {}", summary.cluster_count);
            println!(
                "checksum:  {}",
                summary.checksum.as_deref().unwrap_or("(none)")
            );
            println!(
                "main page: {}",
                summary.main_page.as_deref().unwrap_or("(none)")
            );
            println!("mime types:");
            for (i, mime) in summary.mime_types.iter().enumerate() {
                println!("  {:>3} {}", i, mime);
            }
            println!("namespaces:");
            for ns in &summary.namespaces {
                println!("  {} {:>8}", ns.namespace, ns.entries);
            }
        }

        Command::List {
            archive,
            namespace,
            by_title,
        } => {
            let archive = open(archive, &config)?;
            let entries = match (namespace, by_title) {
                (Some(_), true) => bail!("--namespace and --by-title cannot be combined"),
                (Some(ns), false) => archive.iter_namespace(*ns)?,
                (None, true) => archive.iter_by_title(),
                (None, false) => archive.iter(),
            };

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for entry in entries {
                match entry {
                    Ok(dirent) => match dirent.redirect_target() {
                        Some(target) => {
                            writeln!(out, "{}\t{}\t-> {}", dirent.long_url(), dirent.title(), target)?
                        }
                        None => writeln!(out, "{}\t{}", dirent.long_url(), dirent.title())?,
                    },
                    Err(e) => eprintln!("warning: {}", e),
                }
            }
        }

        Command::Cat { archive, url } => {
            let archive = open(archive, &config)?;
            let dirent = archive.lookup_long_url(url)?;
            let blob = archive.content(&dirent)?;
            info!("{}: {} bytes", dirent.long_url(), blob.len());
            std::io::stdout().write_all(&blob)?;
        }

        Command::Search {
            archive,
            query,
            namespace,
        } => {
            let archive = open(archive, &config)?;
            let mut search = ArticleSearch::new(&archive);
            if let Some(ns) = namespace {
                search = search.in_namespace(*ns);
            }

            let report = search.search_report(query)?;
            for dirent in &report.matches {
                println!("{}\t{}", dirent.long_url(), dirent.title());
            }
            for skipped in &report.skipped {
                eprintln!("warning: skipped entry {}: {}", skipped.position, skipped.error);
            }
        }

        Command::Suggest {
            archive,
            prefix,
            namespace,
            limit,
        } => {
            let archive = open(archive, &config)?;
            for dirent in archive.suggest(*namespace, prefix, *limit)? {
                println!("{}\t{}", dirent.long_url(), dirent.title());
            }
        }

        Command::Meta { archive, name } => {
            let archive = open(archive, &config)?;
            println!("{}", archive.metadata(name)?);
        }

        Command::Verify { archive } => {
            let archive = open(archive, &config.clone().with_verify_checksum(false))?;
            match archive.checksum() {
                None => println!("no checksum stored"),
                Some(digest) => {
                    archive.verify()?;
                    println!("checksum OK ({})", digest);
                }
            }
        }
    }

    Ok(())
}
