//! `mimedb`: query the shared MIME-info database from the command line.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use mimedb_config::Config;
use mimedb_provider::{ContentMatch, MimeDatabase, PeekableReader};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mimedb", version, about = "Identify MIME types by file name and content")]
struct Cli {
    /// Configuration file (YAML, TOML or JSON); the default layers are used when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the types matching each file name, best first.
    Name {
        #[arg(required = true)]
        file_names: Vec<String>,
    },
    /// Identify a file (or `-` for stdin) by its content alone.
    Content { path: PathBuf },
    /// Identify files using both their name and content.
    File {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the canonical name and the aliases of a type.
    Alias { name: String },
    /// List every ancestor of a type, nearest first.
    Ancestors { name: String },
    /// Exit successfully only if the type is defined.
    Known { name: String },
    /// Show each configured layer and whether its cache loaded.
    Layers,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let database = MimeDatabase::from_config(&config);
    match cli.command {
        Command::Name { file_names } => {
            for file_name in file_names {
                for found in database.classify_by_name(&file_name) {
                    println!("{file_name}\t{}\t{}\t{}", found.mime, found.weight, found.pattern);
                }
            }
        },
        Command::Content { path } => {
            let limit = config.sniff_buffer_size.max(database.chain().max_extent());
            let found = if path == Path::new("-") {
                sniff(&database, io::stdin().lock(), limit)
            } else {
                let file = File::open(&path).or_raise(|| ErrorKind::Classify(path.display().to_string()))?;
                sniff(&database, file, limit)
            };
            let found = found.or_raise(|| ErrorKind::Classify(path.display().to_string()))?;
            println!("{}\t{}", found.mime, found.accuracy);
        },
        Command::File { paths } => {
            let mut failed = false;
            for path in paths {
                match database.classify_file(&path) {
                    Ok(mime) => println!("{}: {mime}", path.display()),
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = ?err, "Could not classify file");
                        failed = true;
                    },
                }
            }
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Alias { name } => {
            let canonical = database.resolve_alias(&name);
            println!("{canonical}");
            for alias in database.aliases_of(&canonical) {
                println!("  alias: {alias}");
            }
        },
        Command::Ancestors { name } => {
            for ancestor in database.ancestors_of(&name) {
                println!("{ancestor}");
            }
        },
        Command::Known { name } => {
            if !database.is_known_type(&name) {
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Layers => {
            for layer in database.chain().layers() {
                let _ = layer.snapshot();
                let reason = layer.invalid_reason().map(|reason| format!("\t{reason}")).unwrap_or_default();
                println!("{}\t{}\t{}{reason}", layer.name(), layer.status(), layer.cache_path().display());
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn sniff<R: Read>(database: &MimeDatabase, reader: R, limit: usize) -> mimedb_provider::error::Result<ContentMatch> {
    let mut reader = PeekableReader::new(reader);
    Ok(database.sniff_content(reader.peek(limit)?))
}
