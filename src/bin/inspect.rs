//! TideKV value log inspector
//!
//! Offline tool for looking at the segments of a value log directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use tidekv::vlog::{now_unix, FileKind, Segment};
use tidekv::{Config, IoType, Result, ValueLog};

/// TideKV inspector
#[derive(Parser, Debug)]
#[command(name = "tidekv-inspect")]
#[command(about = "Inspect TideKV value log segments")]
struct Args {
    /// Value log directory
    #[arg(short, long, default_value = "./tidekv_data")]
    dir: PathBuf,

    /// Segment block size in bytes
    #[arg(short, long, default_value_t = 64 * 1024 * 1024)]
    block_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List segments with their sizes
    Segments,

    /// Print every entry of a segment
    Scan {
        /// Segment id
        id: u32,
    },

    /// Print the value stored at a position
    Read {
        /// Segment id
        id: u32,

        /// Byte offset of the entry
        offset: i64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Segments => {
            let vlog = open_log(args)?;
            let active = vlog.active_segment_id();
            for id in vlog.segment_ids() {
                let path = Segment::path_for(&args.dir, id, FileKind::ValueLog);
                let len = std::fs::metadata(&path)?.len();
                let marker = if Some(id) == active { " (active)" } else { "" };
                println!("{:>8}  {:>12} bytes{}", id, len, marker);
            }
            vlog.close()
        }
        Commands::Scan { id } => {
            let segment = open_segment(&args.dir, *id, args.block_size)?;
            for item in segment.iter() {
                let (offset, entry) = item?;
                println!(
                    "{:>10}  size={:<6} expired_at={:<10} key={} value={}",
                    offset,
                    entry.size(),
                    entry.expired_at,
                    String::from_utf8_lossy(&entry.key),
                    String::from_utf8_lossy(&entry.value)
                );
            }
            Ok(())
        }
        Commands::Read { id, offset } => {
            let segment = open_segment(&args.dir, *id, args.block_size)?;
            let entry = segment.read_at(*offset)?;
            if entry.is_expired(now_unix()) {
                println!("(no value)");
            } else {
                println!("{}", String::from_utf8_lossy(&entry.value));
            }
            Ok(())
        }
    }
}

fn open_log(args: &Args) -> Result<ValueLog> {
    let config = Config::builder()
        .data_dir(&args.dir)
        .block_size(args.block_size)
        .io_type(IoType::FileIo)
        .build();
    ValueLog::open(config)
}

fn open_segment(dir: &Path, id: u32, block_size: u64) -> Result<Segment> {
    Segment::open_existing(dir, id, block_size, FileKind::ValueLog, IoType::FileIo)
}
