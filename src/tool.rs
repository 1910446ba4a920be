// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for inspecting mer count dump files

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use humansize::{SizeFormatter, BINARY};
use mercount::{
    dump::{Query, Reader},
    mer,
};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    registry::Registry,
};

macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        std::process::exit(1);
    }};

    ($msg:literal) => {{
        eprintln!($msg);
        std::process::exit(1);
    }};
}

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub fn init_tracing(quiet: bool, verbose: u8) -> (bool, LevelFilter) {
    let is_verbose = !quiet && verbose > 0;

    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    // Bridge log crate macros to tracing (for library code that uses log::*)
    if tracing_log::LogTracer::init().is_err() {
        die!("INTERNAL ERROR: setting log tracer failed");
    }

    let registry = Registry::default();

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("MER_LOG")
        .from_env_lossy();

    let subscriber = registry.with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        die!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info); // daisy-chain to old panic hook
    }));

    (is_verbose, level_filter)
}

/// CLI tool for inspecting mer count dump files
#[derive(Parser, Debug)]
#[command(name = "mer")]
#[command(about = "CLI tool for inspecting mer count dump files")]
struct ToolArgs {
    /// Suppress all output except for errors. This overrides the -v flag.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Turn on verbose output. Supply -v multiple times to increase verbosity.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the dump file
    dump_path: PathBuf,

    /// Read the whole file into memory instead of memory-mapping it
    #[arg(short, long, default_value_t = false)]
    buffered: bool,

    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ToolCommand {
    /// Show the file header and statistics
    Info,

    /// Get the counts of keys
    Get {
        /// Keys to look up, as numbers (decimal or 0x-prefixed hex) or ACGT strings
        #[arg(required = true)]
        keys: Vec<String>,

        /// Fold keys onto their canonical form (the smaller of the mer and
        /// its reverse complement)
        #[arg(short, long, default_value_t = false)]
        canonical: bool,
    },

    /// Print all records in file order
    Dump {
        /// Print keys as ACGT strings
        #[arg(short, long, default_value_t = false)]
        mers: bool,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Parses a key given as a number or as a string of exactly `mer_len` bases.
fn parse_key(s: &str, mer_len: usize) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }

    if let Ok(key) = s.parse() {
        return Some(key);
    }

    if s.len() != mer_len {
        return None;
    }

    mer::encode(s.as_bytes())
}

fn format_key(key: u64, key_bits: u32, mers: bool) -> String {
    if mers {
        mer::decode(key, key_bits as usize / 2)
    } else {
        key.to_string()
    }
}

fn open_query(args: &ToolArgs) -> mercount::Result<Query> {
    if args.buffered {
        Query::open_buffered(&args.dump_path)
    } else {
        Query::open(&args.dump_path)
    }
}

fn info(args: &ToolArgs) -> mercount::Result<()> {
    let query = open_query(args)?;
    let header = query.header();
    let file_size = std::fs::metadata(&args.dump_path)?.len();

    println!("file:        {}", args.dump_path.display());
    println!("file size:   {}", SizeFormatter::new(file_size, BINARY));
    println!("key length:  {} bits", header.key_len);
    println!("value bytes: {}", header.val_len);
    println!("table size:  {}", header.size);
    println!("max reprobe: {}", header.max_reprobe);
    println!("unique:      {}", header.stats.unique);
    println!("distinct:    {}", header.stats.distinct);
    println!("total:       {}", header.stats.total);
    println!("max count:   {}", header.stats.max_count);

    Ok(())
}

fn get(args: &ToolArgs, keys: &[String], canonical: bool) -> mercount::Result<()> {
    let mut query = open_query(args)?;
    query.set_canonical(canonical);

    let mer_len = (query.header().key_bits() / 2) as usize;

    for key in keys {
        let Some(parsed) = parse_key(key, mer_len) else {
            die!("Invalid key: {} (expected a number or {} bases)", key, mer_len);
        };

        debug!("Looking up {key} ({parsed:#x}) at position {}", query.position(parsed));
        println!("{key} {}", query.get(parsed));
    }

    Ok(())
}

fn dump(args: &ToolArgs, mers: bool, limit: Option<usize>) -> mercount::Result<()> {
    let reader = Reader::open(&args.dump_path)?;
    let key_bits = reader.header().key_bits();

    let mut out = BufWriter::new(io::stdout().lock());

    for record in reader.take(limit.unwrap_or(usize::MAX)) {
        let (key, value) = record?;

        if writeln!(out, "{} {value}", format_key(key, key_bits, mers)).is_err() {
            // Broken pipe
            return Ok(());
        }
    }

    out.flush()?;

    Ok(())
}

fn main() {
    let args = ToolArgs::parse();
    let (verbose, level_filter) = init_tracing(args.quiet, args.verbose);

    let cmd = ToolArgs::command();

    info!(
        "starting {} ({} {}), log level: {level_filter}",
        cmd.get_name(),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let result = match &args.command {
        ToolCommand::Info => info(&args),
        ToolCommand::Get { keys, canonical } => get(&args, keys, *canonical),
        ToolCommand::Dump { mers, limit } => dump(&args, *mers, *limit),
    };

    if let Err(e) = result {
        let note = if verbose {
            ""
        } else {
            ". Note: Use -v (one or multiple times) for more information"
        };
        die!("Error reading {}: {}{}", args.dump_path.display(), e, note);
    }
}
