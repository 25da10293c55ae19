use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use memmgr_core::{
    calculate_crc, AddressSpec, CrcAlgorithm, InterruptsDisabledLoad, MemoryType, MemoryWidth,
};
use memmgr_file::{read_headers, DumpRequest, LoadRequest, TransferOutcome, TransferRequest};
use memmgr_platform::{Event, Severity};
use serde_json::json;

use memmgr_cli::parse::{parse_address, parse_hex_bytes, parse_u32};
use memmgr_cli::{log_filter, CliConfig, Session, TargetImage};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MemTypeArg {
    Ram,
    Eeprom,
}

impl From<MemTypeArg> for MemoryType {
    fn from(arg: MemTypeArg) -> Self {
        match arg {
            MemTypeArg::Ram => MemoryType::Volatile,
            MemTypeArg::Eeprom => MemoryType::Durable,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WidthArg {
    #[value(name = "8")]
    W8,
    #[value(name = "16")]
    W16,
    #[value(name = "32")]
    W32,
    Untyped,
}

impl From<WidthArg> for MemoryWidth {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::W8 => MemoryWidth::Bits8,
            WidthArg::W16 => MemoryWidth::Bits16,
            WidthArg::W32 => MemoryWidth::Bits32,
            WidthArg::Untyped => MemoryWidth::Untyped,
        }
    }
}

/// Raw payload bytes given as hex digits.
#[derive(Debug, Clone)]
struct HexData(Vec<u8>);

fn parse_hex_data(s: &str) -> Result<HexData, String> {
    parse_hex_bytes(s).map(HexData)
}

#[derive(Debug, Clone, Args)]
struct Target {
    /// Address: `0x1000`, `symbol` or `symbol+0x10`.
    #[arg(long, value_parser = parse_address)]
    addr: AddressSpec,

    /// Memory type.
    #[arg(long = "type", value_enum, default_value = "ram")]
    mem_type: MemTypeArg,
}

#[derive(Debug, Parser)]
#[command(
    name = "memmgr",
    version,
    about = "Inspect and patch target memory, and move memory to and from transfer files."
)]
struct Cli {
    /// JSON config: target layout, symbol table and memory manager tunables.
    ///
    /// Environment variable: `MEMMGR_CONFIG`.
    #[arg(long, global = true, env = "MEMMGR_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated target image, created from the config on first use.
    ///
    /// Environment variable: `MEMMGR_IMAGE`.
    #[arg(long, global = true, env = "MEMMGR_IMAGE", default_value = "memmgr-image.json")]
    image: PathBuf,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `MEMMGR_LOG_LEVEL`.
    #[arg(long, global = true, env = "MEMMGR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Read one element.
    Peek {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "32")]
        width: WidthArg,
    },
    /// Write one element.
    Poke {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "32")]
        width: WidthArg,
        #[arg(long, value_parser = parse_u32)]
        value: u32,
    },
    /// Fill a range with a pattern.
    Fill {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "8")]
        width: WidthArg,
        #[arg(long, value_parser = parse_u32)]
        bytes: u32,
        #[arg(long, value_parser = parse_u32)]
        pattern: u32,
    },
    /// Report up to 15 bytes as a hex event.
    DumpEvent {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "8")]
        width: WidthArg,
        #[arg(long, value_parser = parse_u32)]
        bytes: u32,
    },
    /// Write a small CRC-checked patch in one uninterruptible copy.
    LoadWid {
        #[command(flatten)]
        target: Target,
        /// Payload as hex digits.
        #[arg(long, value_parser = parse_hex_data)]
        data: HexData,
        /// Expected CRC-16 of the payload (computed from the data when omitted).
        #[arg(long, value_parser = parse_u32)]
        crc: Option<u32>,
    },
    /// Dump a memory range to a transfer file.
    Dump {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "8")]
        width: WidthArg,
        #[arg(long, value_parser = parse_u32)]
        bytes: u32,
        #[arg(long)]
        file: PathBuf,
    },
    /// Load a transfer file into memory.
    Load {
        #[arg(long)]
        file: PathBuf,
        /// Destination override (defaults to the address recorded in the file).
        #[arg(long, value_parser = parse_address)]
        addr: Option<AddressSpec>,
    },
    /// Resolve a symbol name.
    Lookup { name: String },
    /// Print the headers of a transfer file.
    Inspect { file: PathBuf },
    /// Write the symbol table to a file.
    DumpSymbols { file: PathBuf },
    /// Write-enable an EEPROM bank.
    EepromEnable {
        #[arg(long, default_value_t = 0)]
        bank: u32,
    },
    /// Write-protect an EEPROM bank.
    EepromDisable {
        #[arg(long, default_value_t = 0)]
        bank: u32,
    },
    /// Print the status report.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.log_level.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Inspect { file } = &cli.command {
        return inspect(file);
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let image = TargetImage::load_or_create(&cli.image, &config)?;
    let session = Session::open(config, &image)?;

    let result = execute(&session, cli.command);
    for event in session.take_events() {
        print_event(&event);
    }
    session.save(&cli.image)?;
    result
}

fn execute(session: &Session, command: Commands) -> Result<()> {
    let ops = session.ops();
    match command {
        Commands::Peek { target, width } => {
            ops.peek(&target.addr, target.mem_type.into(), width.into())?;
        }
        Commands::Poke {
            target,
            width,
            value,
        } => ops.poke(&target.addr, target.mem_type.into(), width.into(), value)?,
        Commands::Fill {
            target,
            width,
            bytes,
            pattern,
        } => ops.fill(
            &target.addr,
            target.mem_type.into(),
            width.into(),
            bytes,
            pattern,
        )?,
        Commands::DumpEvent {
            target,
            width,
            bytes,
        } => {
            ops.dump_to_event(&target.addr, target.mem_type.into(), width.into(), bytes)?;
        }
        Commands::LoadWid {
            target,
            data: HexData(data),
            crc,
        } => {
            let crc = match crc {
                Some(crc) => crc,
                None => calculate_crc(&data, 0, CrcAlgorithm::Crc16)?,
            };
            ops.load_with_interrupts_disabled(&InterruptsDisabledLoad {
                dest: target.addr,
                mem_type: target.mem_type.into(),
                data,
                crc,
                crc_algorithm: CrcAlgorithm::Crc16,
            })?;
        }
        Commands::Dump {
            target,
            width,
            bytes,
            file,
        } => {
            let outcome = session.transfer(TransferRequest::Dump(DumpRequest {
                source: target.addr,
                mem_type: target.mem_type.into(),
                width: width.into(),
                byte_count: bytes,
                path: file,
            }))?;
            print_outcome(&outcome)?;
        }
        Commands::Load { file, addr } => {
            let outcome = session.transfer(TransferRequest::Load(LoadRequest {
                path: file,
                dest: addr,
            }))?;
            print_outcome(&outcome)?;
        }
        Commands::Lookup { name } => {
            ops.lookup_symbol(&name)?;
        }
        Commands::DumpSymbols { file } => {
            session.transfer(TransferRequest::DumpSymbolTable(file))?;
        }
        Commands::EepromEnable { bank } => ops.enable_durable_write(bank)?,
        Commands::EepromDisable { bank } => ops.disable_durable_write(bank)?,
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&ops.status_report())?);
        }
        Commands::Inspect { file } => inspect(&file)?,
    }
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let mut reader =
        File::open(file).with_context(|| format!("open transfer file {}", file.display()))?;
    let (primary, secondary) = read_headers(&mut reader)
        .with_context(|| format!("read headers of {}", file.display()))?;
    let report = json!({ "primary": primary, "secondary": secondary });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_outcome(outcome: &TransferOutcome) -> Result<()> {
    match outcome {
        TransferOutcome::Dumped(summary) | TransferOutcome::Loaded(summary) => {
            println!("{}", serde_json::to_string(summary)?);
        }
        TransferOutcome::SymbolTableDumped(_) | TransferOutcome::Reset => {}
    }
    Ok(())
}

fn print_event(event: &Event) {
    let level = match event.severity {
        Severity::Debug => "DEBUG",
        Severity::Information => "INFO",
        Severity::Error => "ERROR",
        Severity::Critical => "CRIT",
    };
    println!("[{level:<5} {}] {}", event.id, event.message);
}
