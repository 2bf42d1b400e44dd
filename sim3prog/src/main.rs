// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! sim3prog
//!
//! Command line SiM3 flash and SRAM programmer.
//!
//! No USB adapter driver is built in, so commands run against the simulated
//! SiM3 target from `sim3prog-swd`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use sim3prog_swd::sim::SimTarget;
use sim3prog_swd::{
    FlashEngine, ImageLoader, LoadReport, MemoryImage, PollLimit, ProgrammerConfig, Session,
    SwdError,
};

// Words written by the demo sequence
const DEMO_WORDS: [u32; 4] = [0xA5A5_0000, 0x8888_5A5A, 0x1111_FFEE, 0x11FF_EEEE];
const DEMO_ADDRESS: u32 = 0x0000_0200;
const DEMO_REVERSED_ADDRESS: u32 = 0x0000_0400;

// Largest read accepted, the whole of a 256 KiB SiM3 flash
const MAX_READ_WORDS: u32 = 0x1_0000;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Swd(#[from] SwdError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Verification failed: {0}")]
    Verify(String),
}

fn parse_u32(src: &str) -> Result<u32, String> {
    let src = src.trim();
    let result = match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => src.parse(),
    };
    result.map_err(|e| format!("invalid number '{src}': {e}"))
}

fn parse_count(src: &str) -> Result<u32, String> {
    match parse_u32(src)? {
        count @ 1..=MAX_READ_WORDS => Ok(count),
        count => Err(format!("count {count} is not between 1 and {MAX_READ_WORDS}")),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "sim3prog",
    version,
    about = "Flash and SRAM programmer for SiLabs SiM3 microcontrollers"
)]
struct Opts {
    /// JSON programmer configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Increase logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Give up erase polls after this many attempts
    #[arg(long)]
    poll_attempts: Option<u32>,

    /// Words per SRAM load chunk
    #[arg(long)]
    chunk_words: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Erase, program, verify and page erase flash, then load an SRAM image
    Demo {
        /// Binary image to load, instead of the built-in one
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Erase all flash, or a single page
    Erase {
        /// Erase only the page containing this address
        #[arg(long, value_parser = parse_u32)]
        page: Option<u32>,
    },

    /// Program words into erased flash
    Write {
        #[arg(value_parser = parse_u32)]
        address: u32,
        #[arg(required = true, value_parser = parse_u32)]
        words: Vec<u32>,
    },

    /// Read words from flash or SRAM
    Read {
        #[arg(value_parser = parse_u32)]
        address: u32,
        #[arg(default_value = "1", value_parser = parse_count)]
        count: u32,
    },

    /// Load a binary image into SRAM and run it
    Load {
        image: PathBuf,
    },
}

#[derive(Debug, Default, Serialize)]
struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    idcode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    words: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load: Option<LoadReport>,
}

fn load_config(opts: &Opts) -> Result<ProgrammerConfig, CliError> {
    let mut config = match &opts.config {
        Some(path) => ProgrammerConfig::from_json(&read_file_string(path)?)?,
        None => ProgrammerConfig::default(),
    };
    if let Some(attempts) = opts.poll_attempts {
        config.poll_limit = PollLimit::Attempts(attempts);
    }
    if let Some(chunk_words) = opts.chunk_words {
        config.chunk_words = chunk_words;
    }
    config.validate()?;
    debug!("Using {config:?}");
    Ok(config)
}

fn read_file_string(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_image(path: &Path, config: &ProgrammerConfig) -> Result<MemoryImage, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(MemoryImage::from_bytes(config.sram_base, &bytes)?)
}

fn check_read_range(address: u32, count: u32) -> Result<(), CliError> {
    let last = count.saturating_mul(4).saturating_sub(1);
    if address.checked_add(last).is_none() {
        return Err(SwdError::InvalidArgument(format!(
            "{count} words at 0x{address:08X} runs past the end of the address space"
        ))
        .into());
    }
    Ok(())
}

// Opens the adapter, connects and identifies the SiM3.
fn connect(session: &mut Session<SimTarget>, config: &ProgrammerConfig) -> Result<(), CliError> {
    session.set_poll_limit(config.poll_limit);
    session.open()?;
    let idcode = session.connect()?;
    info!("Connected to {idcode:#}");
    session.line_reset()?;
    session.swd_if().power_up_debug_domain()?;
    session.identify()?;
    Ok(())
}

// Powers down and closes the adapter, from whatever state the session is in.
fn disconnect(session: &mut Session<SimTarget>) -> Result<(), CliError> {
    let powered_down = if session.is_connected() {
        session.swd_if().power_down_debug_domain()
    } else {
        Ok(())
    };
    session.close()?;
    powered_down?;

    let errors = session.error_counters();
    if errors.errors_found > 0 {
        warn!("{} error clears found errors", errors.errors_found);
    }
    Ok(())
}

fn demo(
    session: &mut Session<SimTarget>,
    config: &ProgrammerConfig,
    image: Option<&Path>,
    output: &mut Output,
) -> Result<(), CliError> {
    // Read the image first, so a bad path fails before erasing anything
    let image = match image {
        Some(path) => read_image(path, config)?,
        // A minimal vector table, with the reset handler just after it
        None => MemoryImage::new(
            config.sram_base,
            vec![config.initial_sp, config.sram_base + 0x11, 0, 0, 0xE7FE_E7FE],
        )?,
    };

    FlashEngine::new(session).bulk_erase()?;
    session.halt_and_reset()?;

    let reversed: Vec<u32> = DEMO_WORDS.iter().rev().copied().collect();
    let mut flash = FlashEngine::new(session).with_config(config);
    flash.enable_clock()?;
    flash.write_sequential_words(DEMO_ADDRESS, &DEMO_WORDS)?;
    flash.write_sequential_words(DEMO_REVERSED_ADDRESS, &reversed)?;

    let read = flash.read_sequential_words(DEMO_ADDRESS, DEMO_WORDS.len())?;
    check(DEMO_ADDRESS, &DEMO_WORDS, &read)?;
    let read = flash.read_sequential_words(DEMO_REVERSED_ADDRESS, reversed.len())?;
    check(DEMO_REVERSED_ADDRESS, &reversed, &read)?;

    flash.erase_page(DEMO_ADDRESS)?;
    let read = flash.read_sequential_words(DEMO_ADDRESS, DEMO_WORDS.len())?;
    check(DEMO_ADDRESS, &[0xFFFF_FFFF; 4], &read)?;
    info!("Flash write, verify and page erase passed");

    let report = ImageLoader::new(session).with_config(config).load(&image)?;
    output.load = Some(report);
    Ok(())
}

fn check(address: u32, expected: &[u32], read: &[u32]) -> Result<(), CliError> {
    if expected == read {
        Ok(())
    } else {
        Err(CliError::Verify(format!(
            "0x{address:08X}: expected {expected:08X?}, read {read:08X?}"
        )))
    }
}

fn run(opts: &Opts) -> Result<Output, CliError> {
    run_on(opts, &mut Session::new(SimTarget::new()))
}

// Runs the command, leaving the adapter closed whether or not it succeeds.
fn run_on(opts: &Opts, session: &mut Session<SimTarget>) -> Result<Output, CliError> {
    let config = load_config(opts)?;
    if let Command::Read { address, count } = opts.command {
        check_read_range(address, count)?;
    }

    let result = run_command(opts, &config, session);
    let closed = disconnect(session);
    if let (Err(_), Err(e)) = (&result, &closed) {
        warn!("Failed to close adapter after error: {e}");
    }
    let output = result?;
    closed?;
    Ok(output)
}

fn run_command(
    opts: &Opts,
    config: &ProgrammerConfig,
    session: &mut Session<SimTarget>,
) -> Result<Output, CliError> {
    connect(session, config)?;
    let mut output = Output {
        idcode: session.idcode().map(u32::from),
        ..Default::default()
    };

    match &opts.command {
        Command::Demo { image } => demo(session, config, image.as_deref(), &mut output)?,
        Command::Erase { page: None } => FlashEngine::new(session).bulk_erase()?,
        Command::Erase { page: Some(page) } => {
            session.halt_and_reset()?;
            FlashEngine::new(session)
                .with_config(config)
                .erase_page(*page)?;
            output.address = Some(*page);
        }
        Command::Write { address, words } => {
            session.halt_and_reset()?;
            FlashEngine::new(session)
                .with_config(config)
                .write_sequential_words(*address, words)?;
            output.address = Some(*address);
        }
        Command::Read { address, count } => {
            session.halt_and_reset()?;
            output.words = session.swd_if().read_block(*address, *count as usize)?;
            output.address = Some(*address);
        }
        Command::Load { image } => {
            let image = read_image(image, config)?;
            session.halt_and_reset()?;
            let report = ImageLoader::new(session)
                .with_config(config)
                .load(&image)?;
            output.load = Some(report);
        }
    }

    Ok(output)
}

fn print(opts: &Opts, output: &Output) {
    if opts.json {
        match serde_json::to_string_pretty(output) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize output: {e}"),
        }
        return;
    }

    if let Some(address) = output.address {
        for (ii, word) in output.words.iter().enumerate() {
            println!(
                "0x{:08X}: 0x{word:08X}",
                address.wrapping_add(ii as u32 * 4)
            );
        }
    }
    if let Some(report) = &output.load {
        println!(
            "Loaded {} words in {} chunks, {} mismatches, PC 0x{:08X}",
            report.words_written, report.chunks, report.mismatch_count, report.pc_readback
        );
    }
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    let level = match opts.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&opts) {
        Ok(output) => {
            print(&opts, &output);
            if output.load.as_ref().is_some_and(|report| !report.verified()) {
                error!("SRAM image did not verify");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let (true, CliError::Swd(swd)) = (opts.json, &e) {
                match serde_json::to_string(swd) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!("Failed to serialize error: {e}"),
                }
            }
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_u32("0x200"), Ok(0x200));
        assert_eq!(parse_u32("0XA5A5_0000"), Ok(0xA5A5_0000));
        assert_eq!(parse_u32("1024"), Ok(1024));
        assert!(parse_u32("0x").is_err());
        assert!(parse_u32("twelve").is_err());
    }

    #[test]
    fn demo_runs() {
        let opts = Opts::parse_from(["sim3prog", "demo"]);
        let output = run(&opts).unwrap();
        assert_eq!(output.idcode, Some(0x2BA0_1477));
        assert!(output.load.unwrap().verified());
    }

    #[test]
    fn write_then_read_commands() {
        let opts = Opts::parse_from(["sim3prog", "write", "0x400", "0x12345678"]);
        assert!(run(&opts).is_ok());

        // Each run is a fresh target
        let opts = Opts::parse_from(["sim3prog", "--json", "read", "0x400", "2"]);
        let output = run(&opts).unwrap();
        assert_eq!(output.words, vec![0xFFFF_FFFF, 0xFFFF_FFFF]);
    }

    #[test]
    fn overrides_applied() {
        let opts = Opts::parse_from(["sim3prog", "--poll-attempts", "50", "--chunk-words", "16", "erase"]);
        let config = load_config(&opts).unwrap();
        assert_eq!(config.poll_limit, PollLimit::Attempts(50));
        assert_eq!(config.chunk_words, 16);

        let opts = Opts::parse_from(["sim3prog", "--chunk-words", "0", "erase"]);
        assert!(matches!(load_config(&opts), Err(CliError::Swd(_))));
    }

    #[test]
    fn read_count_bounded() {
        assert!(Opts::try_parse_from(["sim3prog", "read", "0x0", "0x10000"]).is_ok());
        assert!(Opts::try_parse_from(["sim3prog", "read", "0x0", "0x10001"]).is_err());
        assert!(Opts::try_parse_from(["sim3prog", "read", "0x0", "0"]).is_err());

        assert!(check_read_range(0xFFFF_FFF0, 4).is_ok());
        let opts = Opts::parse_from(["sim3prog", "read", "0xFFFF_FFF0", "8"]);
        assert!(matches!(
            run(&opts),
            Err(CliError::Swd(SwdError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn failed_command_closes_adapter() {
        let opts = Opts::parse_from(["sim3prog", "write", "0x202", "0x12345678"]);
        let mut session = Session::new(SimTarget::new());
        assert!(matches!(
            run_on(&opts, &mut session),
            Err(CliError::Swd(SwdError::InvalidArgument(_)))
        ));
        assert!(!session.is_connected());
        assert!(!session.swd_if().transport().is_open());

        // A session left open by a failed connect is closed too
        let opts = Opts::parse_from(["sim3prog", "erase"]);
        let mut target = SimTarget::new();
        target.set_chip_ap_id(0x1234_5678);
        let mut session = Session::new(target);
        assert!(matches!(
            run_on(&opts, &mut session),
            Err(CliError::Swd(SwdError::ChipApMismatch { .. }))
        ));
        assert!(!session.swd_if().transport().is_open());
    }

    #[test]
    fn missing_image_fails_before_erase() {
        let opts = Opts::parse_from(["sim3prog", "demo", "--image", "/nonexistent/image.bin"]);
        assert!(matches!(run(&opts), Err(CliError::Io { .. })));
    }

    #[test]
    fn verify_mismatch_reported() {
        assert!(check(0, &[1, 2], &[1, 2]).is_ok());
        assert!(matches!(check(0, &[1, 2], &[1, 3]), Err(CliError::Verify(_))));
    }
}
