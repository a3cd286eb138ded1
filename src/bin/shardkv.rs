//! shardkv Binary
//!
//! Builds shards from tab-separated key/value files and inspects them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use tracing_subscriber::{fmt, EnvFilter};

use shardkv::shard::hex_name;
use shardkv::{
    AliasTable, AliasTableWriter, BlobFlags, BlobKind, ChunkSizing, Config, JListWriter,
    LoadedBlob, Result, ShardError, ShardFile, ShardWriter,
};

/// shardkv
#[derive(Parser, Debug)]
#[command(name = "shardkv")]
#[command(about = "Build and query immutable key-value shards")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a shard from a `key<TAB>value` file
    Build {
        /// Input file, one entry per line
        input: PathBuf,

        /// Output shard path
        output: PathBuf,

        /// Entries per JList chunk (default: square root of the entry count)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Embed a bloom filter in the JList with this false positive rate
        #[arg(long)]
        jlist_bloom_fp: Option<f64>,

        /// Skip the alias table
        #[arg(long)]
        no_alias: bool,
    },

    /// List the records of a shard
    List {
        shard: PathBuf,
    },

    /// Look up keys in a shard
    Get {
        shard: PathBuf,

        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Build {
            input,
            output,
            chunk_size,
            jlist_bloom_fp,
            no_alias,
        } => {
            let mut builder = Config::builder().jlist_bloom_fp_rate(jlist_bloom_fp);
            if let Some(n) = chunk_size {
                builder = builder.chunk_sizing(ChunkSizing::Fixed(n));
            }
            build(&input, &output, &builder.build(), !no_alias)
        }
        Commands::List { shard } => list(&shard),
        Commands::Get { shard, keys } => get(&shard, &keys),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parse `key<TAB>value` lines; later duplicates are rejected
fn read_entries(input: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    let text = std::fs::read(input)?;
    let mut entries = BTreeMap::new();
    for (line_no, line) in text.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let tab = line.iter().position(|&b| b == b'\t').ok_or_else(|| {
            ShardError::InvalidEntry(format!("line {}: missing tab separator", line_no + 1))
        })?;
        let (key, value) = (&line[..tab], &line[tab + 1..]);
        if entries.insert(key.to_vec(), value.to_vec()).is_some() {
            return Err(ShardError::DuplicateKey(key.to_vec()));
        }
    }
    Ok(entries)
}

/// Content-derived record name: first 20 bytes of the SHA-256 of the payload
fn content_name(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&digest[..20]);
    hex_name(&raw)
}

fn build(input: &Path, output: &Path, config: &Config, with_alias: bool) -> Result<ExitCode> {
    let entries = read_entries(input)?;
    tracing::info!(entries = entries.len(), input = %input.display(), "Building shard");

    let mut jlist = JListWriter::with_config(entries.len(), config)?;
    for (key, value) in &entries {
        jlist.add_entry(key, value)?;
    }
    let jlist_bytes = jlist.finish()?;

    let mut writer = ShardWriter::with_config(config.clone())?;
    writer.add_record(&content_name(&jlist_bytes))?;
    writer.add_blob(
        BlobKind::Data,
        jlist_bytes,
        shardkv::jlist::MEDIA_TYPE,
        BlobFlags::NONE,
    )?;

    if with_alias {
        let mut alias = AliasTableWriter::with_config(entries.len(), config)?;
        for (key, value) in &entries {
            alias.add_entry(key, value)?;
        }
        alias.write_to_shard(&mut writer)?;
    }

    let summary = writer.write(output)?;
    println!(
        "{}: {} records, {} blobs, {} bytes",
        summary.path.display(),
        summary.record_count,
        summary.blob_count,
        summary.file_size
    );
    Ok(ExitCode::SUCCESS)
}

fn list(path: &Path) -> Result<ExitCode> {
    let shard = ShardFile::open(path)?;
    for record in shard.records() {
        let record = record?;
        for blob in record.blobs() {
            println!(
                "{}\t{}\t{}\t{}\t{}{}",
                record.hex_name(),
                blob.kind(),
                blob.media_type(),
                blob.size(),
                blob.uncompressed_size(),
                if blob.flags().is_compressed() { "\tlz4" } else { "" }
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn get(path: &Path, keys: &[String]) -> Result<ExitCode> {
    let shard = ShardFile::open(path)?;
    let alias = AliasTable::new_from_shard(&shard)?;

    // Fall back to scanning every JList blob when there is no alias table
    let mut jlists = Vec::new();
    if alias.is_none() {
        for record in shard.records() {
            for blob in record?.blobs() {
                if let LoadedBlob::JList(jlist) = blob.load()? {
                    jlists.push(jlist);
                }
            }
        }
    }

    let mut missing = 0usize;
    for key in keys {
        let value = match &alias {
            Some(table) => table.find_entry(key.as_bytes())?,
            None => {
                let mut found = None;
                for jlist in &jlists {
                    if let Some(v) = jlist.lookup_key(key.as_bytes())? {
                        found = Some(v);
                        break;
                    }
                }
                found
            }
        };
        match value {
            Some(v) => println!("{}\t{}", key, String::from_utf8_lossy(v)),
            None => {
                missing += 1;
                println!("{}\t(not found)", key);
            }
        }
    }

    Ok(if missing == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
