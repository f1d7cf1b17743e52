//! moteboot CLI - Command-line tool for flashing wireless sensor motes.
//!
//! ## Features
//!
//! - Program images into Jennic JN51xx and Pacemate (LPC2136) motes
//! - Erase, read back and reset
//! - Read the factory MAC address and chip type (Jennic)
//! - Write the image CRC block (Pacemate)
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use {
    anyhow::Result,
    clap::{ArgGroup, Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    moteboot::{CancelToken, ChipFamily},
    std::{
        env,
        path::PathBuf,
        sync::{
            OnceLock,
            atomic::{AtomicBool, Ordering},
        },
    },
    thiserror::Error,
};

mod commands;
mod config;
mod serial;

use {
    config::Config,
    serial::{SerialOptions, ask_remember_port, select_serial_port},
};

/// Name of the installed binary.
pub(crate) const BIN_NAME: &str = "moteboot";

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

static CANCEL: OnceLock<CancelToken> = OnceLock::new();

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Cancel token shared by every operation of this process.
pub(crate) fn cancel_token() -> CancelToken {
    CANCEL.get_or_init(CancelToken::new).clone()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    cancel_token().is_canceled()
}

/// Failures classified by exit code.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Invalid invocation or ambiguous setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration (exit code 3).
    #[error("{0}")]
    Config(String),
    /// Interrupted by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// moteboot - Flash Jennic and Pacemate sensor motes over their serial boot loaders.
///
/// Environment variables:
///   MOTEBOOT_PORT              - Default serial port
///   MOTEBOOT_BAUD              - Boot loader baud rate (default depends on the chip)
///   MOTEBOOT_CHIP              - Chip family (jennic, pacemate)
///   MOTEBOOT_NO_ECHO           - Line boot loader does not echo commands
///   MOTEBOOT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "moteboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MOTEBOOT_PORT")]
    pub(crate) port: Option<String>,

    /// Boot loader baud rate.
    #[arg(short, long, global = true, env = "MOTEBOOT_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Target chip family (default: jennic).
    #[arg(short, long, global = true, env = "MOTEBOOT_CHIP")]
    pub(crate) chip: Option<Chip>,

    /// The line boot loader does not echo commands (Pacemate).
    #[arg(long, global = true, env = "MOTEBOOT_NO_ECHO")]
    pub(crate) no_echo: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "MOTEBOOT_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    pub(crate) confirm_port: bool,

    /// Offer all ports, including unknown USB devices.
    #[arg(long, global = true)]
    pub(crate) list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Supported chip families.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum Chip {
    /// Jennic JN51xx (binary boot loader).
    Jennic,
    /// Pacemate board with an NXP LPC2136 (line ISP).
    Pacemate,
}

impl From<Chip> for ChipFamily {
    fn from(chip: Chip) -> Self {
        match chip {
            Chip::Jennic => ChipFamily::Jennic,
            Chip::Pacemate => ChipFamily::Pacemate,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Erase the flash and program an image.
    Flash {
        /// Path to the raw binary image.
        image: PathBuf,

        /// Flash address in hex.
        #[arg(short, long, default_value = "0", value_parser = parse_hex_u32)]
        address: u32,

        /// Write without erasing the flash first.
        #[arg(long)]
        no_erase: bool,

        /// Leave the mote in its boot loader afterwards.
        #[arg(long)]
        no_reset: bool,
    },

    /// Erase flash memory.
    #[command(group(ArgGroup::new("target").required(true).args(["all", "sector"])))]
    Erase {
        /// Erase the entire flash.
        #[arg(long)]
        all: bool,

        /// Erase a single sector.
        #[arg(long)]
        sector: Option<u8>,
    },

    /// Read flash memory.
    Read {
        /// Start address in hex.
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (decimal, or hex with 0x prefix).
        #[arg(short, long, value_parser = parse_number)]
        length: u32,

        /// Write the data to a file instead of a hex dump on stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read the factory MAC address (Jennic).
    Mac {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Identify the chip (Jennic).
    ChipType {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Write the image CRC block (Pacemate).
    WriteCrc {
        /// CRC value (decimal, or hex with 0x prefix).
        #[arg(value_parser = parse_crc)]
        crc: u16,
    },

    /// Reset the mote into its application.
    Reset,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a decimal number, or hex with a 0x prefix.
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => parse_hex_u32(hex),
        None => s
            .parse()
            .map_err(|e| format!("Invalid number '{s}': {e}")),
    }
}

fn parse_crc(s: &str) -> Result<u16, String> {
    let value = parse_number(s)?;
    u16::try_from(value).map_err(|_| format!("CRC {value:#x} does not fit in 16 bits"))
}

/// Exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<moteboot::Error>() {
        Some(moteboot::Error::Canceled) => 130,
        Some(moteboot::Error::Unsupported(_) | moteboot::Error::InvalidArgument(_)) => 2,
        Some(moteboot::Error::Config(_)) => 3,
        Some(moteboot::Error::DeviceNotFound | moteboot::Error::Serial(_)) => 4,
        _ => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

/// First Ctrl-C stops at the next protocol step, the second aborts.
fn install_interrupt_handler() {
    let token = cancel_token();
    let installed = ctrlc::set_handler(move || {
        if token.is_canceled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!(
            "\n{} Interrupted, stopping after the current step",
            style("⚠").yellow()
        );
    });
    if let Err(e) = installed {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "moteboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            exit_code(&err)
        },
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    match &cli.command {
        Commands::Flash {
            image,
            address,
            no_erase,
            no_reset,
        } => commands::flash::cmd_flash(cli, &mut config, image, *address, !no_erase, !no_reset),
        Commands::Erase { sector, .. } => commands::flash::cmd_erase(cli, &mut config, *sector),
        Commands::Read {
            address,
            length,
            output,
        } => commands::read::cmd_read(cli, &mut config, *address, *length, output.as_deref()),
        Commands::Mac { json } => commands::read::cmd_mac(cli, &mut config, *json),
        Commands::ChipType { json } => commands::read::cmd_chip_type(cli, &mut config, *json),
        Commands::WriteCrc { crc } => commands::flash::cmd_write_crc(cli, &mut config, *crc),
        Commands::Reset => commands::flash::cmd_reset(cli, &mut config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(format!(
                        "specify a shell type, e.g. `{BIN_NAME} completions bash`, or use --install"
                    ))
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}

/// Get serial port from CLI args or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.info.name)
}
