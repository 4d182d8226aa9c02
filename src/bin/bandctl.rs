//! bandctl
//!
//! Inspect and move files in and out of a bandstore device.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use bandstore::{AppendWrite, BandEnv, Config, SequentialRead};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// bandstore device tool
#[derive(Parser, Debug)]
#[command(name = "bandctl")]
#[command(about = "Inspect and edit a bandstore device")]
#[command(version)]
struct Args {
    /// Raw device or backing file
    #[arg(short, long, default_value = "/dev/sdb")]
    device: PathBuf,

    /// Mapped capacity in MB
    #[arg(short, long, default_value = "1024")]
    capacity_mb: u64,

    /// Band size in KB
    #[arg(short, long, default_value = "4096")]
    band_kb: u64,

    /// Create and size a regular backing file if needed
    #[arg(long)]
    create: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a fresh, empty metadata table
    Format,

    /// List files and their sizes
    Ls,

    /// Show geometry and occupancy
    Stat,

    /// Copy a local file onto the device
    Put {
        /// Name on the device
        name: String,

        /// Local file to copy
        source: PathBuf,
    },

    /// Write a file's content to stdout
    Get {
        /// Name on the device
        name: String,
    },
}

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,bandstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder()
        .device_path(&args.device)
        .capacity(args.capacity_mb * 1024 * 1024)
        .band_size(args.band_kb * 1024)
        .create_if_missing(args.create)
        .format(matches!(args.command, Commands::Format))
        .build();

    let env = BandEnv::open(config)?;

    match args.command {
        Commands::Format => {
            let stats = env.stats();
            println!(
                "formatted {}: {} slots of {} bytes",
                args.device.display(),
                stats.slot_count,
                stats.band_size
            );
        }
        Commands::Ls => {
            for name in env.list() {
                println!("{:>12}  {}", env.file_size(&name)?, name);
            }
        }
        Commands::Stat => {
            let stats = env.stats();
            println!("device:          {}", args.device.display());
            println!("slots:           {}", stats.slot_count);
            println!("band size:       {}", stats.band_size);
            println!("live files:      {}", stats.live_files);
            match stats.high_water_mark {
                Some(mark) => println!("high-water mark: {}", mark),
                None => println!("high-water mark: none"),
            }
        }
        Commands::Put { name, source } => {
            let data = std::fs::read(&source)?;
            let mut file = env.open_or_create_for_write(&name)?;
            file.append(&data)?;
            file.close()?;
            tracing::info!(file = %name, bytes = data.len(), "stored");
        }
        Commands::Get { name } => {
            let size = env.file_size(&name)?;
            let mut file = env.open_sequential(&name)?;
            let data = file.read(size as usize)?;
            std::io::stdout().write_all(&data)?;
        }
    }

    env.close()?;
    Ok(())
}
