//! iqrf-ota CLI - over-the-air code upload for IQRF networks.
//!
//! ## Features
//!
//! - Upload custom DPA handlers and IQRF plugins to one node or the whole network
//! - Verify stored code and load it into flash
//! - Inspect image files without hardware
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use iqrf_ota::LoadingAction;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// iqrf-ota - Over-the-air code upload for IQRF networks.
///
/// Environment variables:
///   IQRF_OTA_PORT              - Default serial port
///   IQRF_OTA_BAUD              - Default baud rate (default: 57600)
///   IQRF_OTA_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "iqrf-ota")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  \
    iqrf-ota upload -a 3 CustomDpaHandler.hex\n  \
    iqrf-ota load -a 255 --hwpid 0x1234 --repeat 2 CustomDpaHandler.hex\n  \
    iqrf-ota info --json plugin.iqrf")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port of the coordinator (auto-detected if not specified).
    #[arg(short, long, global = true, env = "IQRF_OTA_PORT")]
    port: Option<String>,

    /// Baud rate of the coordinator UART.
    #[arg(short, long, global = true, env = "IQRF_OTA_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "IQRF_OTA_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by upload, verify and load.
#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
struct OtaArgs {
    /// Image file (.hex custom DPA handler or .iqrf plugin).
    file: PathBuf,

    /// Target address: 0 coordinator, 1-239 node, 255 whole network.
    #[arg(short, long, default_value = "0", value_parser = parse_u16)]
    address: u16,

    /// Hardware profile ID broadcast requests are limited to.
    #[arg(long, default_value = "0xFFFF", value_parser = parse_u16)]
    hwpid: u16,

    /// External EEPROM address the code is stored at.
    #[arg(long, default_value = "0x0300", value_parser = parse_u16)]
    start_addr: u16,

    /// Extra attempts per command (0-3).
    #[arg(short, long)]
    repeat: Option<u8>,

    /// Allow writing internal EEPROM data contained in the image.
    #[arg(long)]
    upload_eeprom: bool,

    /// Allow writing external EEPROM data contained in the image.
    #[arg(long)]
    upload_eeeprom: bool,

    /// Output the result as JSON to stdout.
    #[arg(long)]
    json: bool,

    /// Include every transaction in the output.
    #[arg(long)]
    raw: bool,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Write code into the external EEPROM of the target.
    Upload(OtaArgs),

    /// Check code stored in the external EEPROM of the target.
    Verify(OtaArgs),

    /// Verify stored code and load it into flash.
    Load(OtaArgs),

    /// Show information about an image file.
    Info {
        /// Image file (.hex or .iqrf).
        file: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or unusable environment (exit 2).
    #[error("{0}")]
    Usage(String),
    /// OTA request finished with a non-zero status (exit 1).
    #[error("{message} (status {status})")]
    Request {
        /// Numeric status of the request.
        status: i32,
        /// Status message.
        message: String,
    },
    /// Cancelled by the user (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        _ => 1,
    }
}

/// Parse a 16-bit value given in decimal or with a `0x` prefix.
fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("Invalid value '{s}': {e}"))
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
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

    debug!(
        "iqrf-ota v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Upload(args) => {
            commands::ota::cmd_ota(cli, &mut config, LoadingAction::Upload, args)
        },
        Commands::Verify(args) => {
            commands::ota::cmd_ota(cli, &mut config, LoadingAction::Verify, args)
        },
        Commands::Load(args) => commands::ota::cmd_ota(cli, &mut config, LoadingAction::Load, args),
        Commands::Info { file, json } => commands::info::cmd_info(file, *json),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: iqrf-ota completions bash\n  \
                         Or use `iqrf-ota completions --install` to auto-install completions."
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}

/// Get serial port from CLI args or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

/// Baud rate from the command line, then the config, then the default.
fn baud_rate(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.port.connection.baud)
        .unwrap_or(iqrf_ota::port::DEFAULT_BAUD_RATE)
}
