//! pagedkv CLI
//!
//! Inspect and edit maps and streams in a local data directory.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pagedkv::config::JournalSync;
use pagedkv::map::KeyParser;
use pagedkv::stream;
use pagedkv::{
    Config, EntityStore, LocalEntityStore, OpenMode, PagedStreamReader, PagedStreamWriter, Result,
    TransactionalMap, UpdatableMap,
};
use tracing_subscriber::{fmt, EnvFilter};

/// pagedkv CLI
#[derive(Parser, Debug)]
#[command(name = "pagedkv-cli")]
#[command(about = "Transactional maps and paged streams over a local entity store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./pagedkv_data")]
    data_dir: PathBuf,

    /// Fsync the journal after every commit
    #[arg(long)]
    sync_every_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operate on a string-to-string map
    Map {
        /// Entity kind the map lives under
        #[arg(short, long, default_value = "default")]
        kind: String,

        #[command(subcommand)]
        op: MapOp,
    },

    /// Operate on a paged byte stream
    Stream {
        #[command(subcommand)]
        op: StreamOp,
    },
}

#[derive(Subcommand, Debug)]
enum MapOp {
    /// Store a value, printing the one it replaced
    Put { key: String, value: String },

    /// Print the value stored under a key
    Get { key: String },

    /// Remove a key, printing the value it held
    Remove { key: String },

    /// Print every entry
    List,

    /// Print the number of entries
    Size,

    /// Remove every entry
    Clear,
}

#[derive(Subcommand, Debug)]
enum StreamOp {
    /// Replace the stream's content with stdin
    Write { name: String },

    /// Append stdin to the stream
    Append { name: String },

    /// Copy the stream to stdout
    Cat { name: String },

    /// Print the stream's metadata
    Stat { name: String },

    /// Delete the stream
    Rm { name: String },
}

fn main() {
    // Logs go to stderr; stdout carries command output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pagedkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let journal_sync = if args.sync_every_write {
        JournalSync::EveryWrite
    } else {
        Config::default().journal_sync
    };
    let config = Config::builder().journal_sync(journal_sync).build();

    let local = Arc::new(LocalEntityStore::open(&args.data_dir, config.journal_sync)?);
    tracing::debug!("Data directory: {}", args.data_dir.display());

    let store: Arc<dyn EntityStore> = local.clone();
    let result = match args.command {
        Commands::Map { kind, op } => run_map(store, kind, op, config),
        Commands::Stream { op } => run_stream(store, op, &config),
    };

    local.sync()?;
    result
}

fn run_map(store: Arc<dyn EntityStore>, kind: String, op: MapOp, config: Config) -> Result<()> {
    let map: TransactionalMap<String, String> =
        TransactionalMap::new(store, kind, config)?.with_key_parser(KeyParser::via_from_str());
    let mut out = io::stdout().lock();

    match op {
        MapOp::Put { key, value } => {
            if let Some(previous) = map.put(&key, value)? {
                writeln!(out, "{}", previous)?;
            }
        }
        MapOp::Get { key } => match map.get(&key)? {
            Some(value) => writeln!(out, "{}", value)?,
            None if map.contains_key(&key)? => writeln!(out, "(null)")?,
            None => tracing::info!("no such key: {}", key),
        },
        MapOp::Remove { key } => {
            if let Some(previous) = map.remove(&key)? {
                writeln!(out, "{}", previous)?;
            }
        }
        MapOp::List => {
            for (key, value) in map.entries()?.to_vec()? {
                match value {
                    Some(value) => writeln!(out, "{}\t{}", key, value)?,
                    None => writeln!(out, "{}\t(null)", key)?,
                }
            }
        }
        MapOp::Size => writeln!(out, "{}", map.len()?)?,
        MapOp::Clear => map.clear()?,
    }
    Ok(())
}

fn run_stream(store: Arc<dyn EntityStore>, op: StreamOp, config: &Config) -> Result<()> {
    match op {
        StreamOp::Write { name } => copy_stdin(store, &name, OpenMode::Truncate, config),
        StreamOp::Append { name } => copy_stdin(store, &name, OpenMode::Append, config),
        StreamOp::Cat { name } => {
            let mut reader = PagedStreamReader::open(store, &name, config)?;
            let mut out = io::stdout().lock();
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
            Ok(())
        }
        StreamOp::Stat { name } => {
            let mut out = io::stdout().lock();
            match stream::stat(store.as_ref(), &name)? {
                Some(metadata) => {
                    writeln!(out, "length:   {}", metadata.len(config.page_size))?;
                    writeln!(out, "pages:    {}", metadata.page_count)?;
                    writeln!(out, "cursor:   {}", metadata.cursor)?;
                    writeln!(out, "version:  {}", metadata.version)?;
                    writeln!(out, "locked:   {}", metadata.locked)?;
                    writeln!(out, "created:  {}", metadata.created_at)?;
                    writeln!(out, "updated:  {}", metadata.updated_at)?;
                }
                None => tracing::info!("no such stream: {}", name),
            }
            Ok(())
        }
        StreamOp::Rm { name } => {
            let deleted = stream::delete(store.as_ref(), &name, config)?;
            tracing::info!("Deleted {} record(s) of stream {}", deleted, name);
            Ok(())
        }
    }
}

fn copy_stdin(store: Arc<dyn EntityStore>, name: &str, mode: OpenMode, config: &Config) -> Result<()> {
    let mut writer = PagedStreamWriter::open(store, name, mode, config)?;
    let mut input = io::stdin().lock();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_bytes(&buf[..n])?;
    }

    let written = writer.position();
    writer.close()?;
    tracing::info!("Stream {} now holds {} byte(s)", name, written);
    Ok(())
}
