//! diskspan CLI
//!
//! Operator commands against a remote disk service: read or write a byte
//! range of the virtualized volume, or verify a write by reading it back.

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use diskspan_block::{MAX_IO_LEN, VolumeDriver};
use diskspan_client::{DiskClient, TcpTransport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "diskspan-cli")]
#[command(about = "diskspan volume CLI")]
#[command(version)]
struct Args {
    /// Disk service host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Disk service port
    #[arg(short, long, default_value_t = 9010)]
    port: u16,

    /// Cache capacity in blocks (0 disables the cache)
    #[arg(long, default_value_t = 0)]
    cache_entries: usize,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a byte range and print it as a hex dump
    Read {
        /// Logical byte address
        #[arg(long)]
        addr: u64,

        /// Number of bytes
        #[arg(long)]
        len: usize,

        /// Write the raw bytes to stdout instead of a hex dump
        #[arg(long)]
        raw: bool,
    },
    /// Write hex-encoded bytes at an address
    Write {
        /// Logical byte address
        #[arg(long)]
        addr: u64,

        /// Payload as a hex string
        #[arg(long)]
        data: String,
    },
    /// Write hex-encoded bytes, read them back, and compare
    Verify {
        /// Logical byte address
        #[arg(long)]
        addr: u64,

        /// Payload as a hex string
        #[arg(long)]
        data: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let client = DiskClient::connect(&args.host, args.port)
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;
    let mut driver = VolumeDriver::new(client);
    if args.cache_entries > 0 {
        driver
            .cache_mut()
            .create(args.cache_entries)
            .context("enabling cache")?;
    }

    driver.mount().context("mounting volume")?;
    let outcome = run(&mut driver, &args.command);
    if let Err(err) = driver.unmount() {
        tracing::warn!(%err, "unmount failed");
    }

    if args.cache_entries > 0 {
        let stats = driver.cache().stats();
        eprintln!(
            "cache: {} queries, {} hits, hit rate {:.1}%",
            stats.queries,
            stats.hits,
            stats.hit_rate() * 100.0
        );
    }
    outcome
}

fn run(driver: &mut VolumeDriver<TcpTransport>, command: &Commands) -> Result<()> {
    match command {
        Commands::Read { addr, len, raw } => {
            if *len > MAX_IO_LEN {
                bail!("len exceeds the {MAX_IO_LEN}-byte request cap");
            }
            let mut buf = vec![0u8; *len];
            driver.read(*addr, &mut buf)?;
            if *raw {
                io::stdout().write_all(&buf).context("writing to stdout")?;
            } else {
                print_hex(*addr, &buf);
            }
        }
        Commands::Write { addr, data } => {
            let bytes = hex::decode(data).context("payload must be a hex string")?;
            driver.grant_write()?;
            let written = driver.write(*addr, &bytes)?;
            println!("wrote {written} bytes at address {addr}");
        }
        Commands::Verify { addr, data } => {
            let bytes = hex::decode(data).context("payload must be a hex string")?;
            driver.grant_write()?;
            driver.write(*addr, &bytes)?;

            let mut back = vec![0u8; bytes.len()];
            driver.read(*addr, &mut back)?;
            if back != bytes {
                bail!("read-back mismatch at address {addr}");
            }
            println!("verified {} bytes at address {addr}", bytes.len());
        }
    }
    Ok(())
}

fn print_hex(addr: u64, buf: &[u8]) {
    for (i, chunk) in buf.chunks(16).enumerate() {
        let line: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:08x}  {}", addr + (i * 16) as u64, line.join(" "));
    }
}
