//! Interactive serial port selection.
//!
//! Ports come from [`moteboot::detect_ports`]. Known USB bridges (built-in
//! list plus devices remembered in the configuration) are offered first;
//! several candidates lead to a prompt unless `--non-interactive` is set.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    moteboot::{DetectedPort, PortInfo, detect_ports, select_port},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Offer all ports, not only known bridges.
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if the choice is ambiguous).
    pub non_interactive: bool,
    /// Confirm even a single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port.
    pub port: DetectedPort,
    /// Whether this port matched a known or configured device.
    pub is_known: bool,
}

impl SelectedPort {
    fn new(port: DetectedPort, config: &Config) -> Self {
        Self {
            is_known: is_known_device(&port, config),
            port,
        }
    }
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn cancelled() -> anyhow::Error {
    CliError::Cancelled("Port selection cancelled".to_string()).into()
}

fn select_non_interactive_port(
    candidates: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    match candidates.len() {
        0 => Err(usage_err("No serial ports available")),
        1 => Ok(SelectedPort::new(select_port(candidates)?, config)),
        _ => Err(usage_err(
            "Found multiple serial ports; pass --port to choose one",
        )),
    }
}

/// Ports worth offering, best first.
///
/// Known bridges only, unless there are none or `--list-all-ports` is set.
fn candidates(ports: Vec<DetectedPort>, list_all: bool, config: &Config) -> Vec<DetectedPort> {
    let (mut known, unknown): (Vec<_>, Vec<_>) =
        ports.into_iter().partition(|p| is_known_device(p, config));
    if list_all || known.is_empty() {
        known.extend(unknown);
    }
    known.sort_by_key(DetectedPort::rank);
    known
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    let explicit = options.port.as_ref().or(config.port.connection.serial.as_ref());
    if let Some(port_name) = explicit {
        debug!("Using port {port_name}");
        return Ok(find_port_by_name(port_name, detect_ports(), config));
    }

    let ports = detect_ports();
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }
    let candidates = candidates(ports, options.list_all_ports, config);

    if options.non_interactive {
        return select_non_interactive_port(candidates, config);
    }

    if candidates.len() > 1 {
        ensure_interactive_terminal()?;
        return select_port_interactive(candidates, config);
    }

    let selected = SelectedPort::new(select_port(candidates)?, config);
    if selected.is_known && !options.confirm_port {
        info!(
            "Auto-selected port: {} [{}]",
            selected.port.name(),
            selected.port.device.name()
        );
        Ok(selected)
    } else {
        ensure_interactive_terminal()?;
        confirm_single_port(selected)
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            cancelled()
        },
        DialoguerError::IO(io_err) => usage_err(&format!("Prompt failed: {io_err}")),
    }
}

/// Look `name` up among `ports`, falling back to an unclassified entry.
fn find_port_by_name(name: &str, ports: Vec<DetectedPort>, config: &Config) -> SelectedPort {
    let (exact, other): (Vec<_>, Vec<_>) = ports.into_iter().partition(|p| p.name() == name);
    let port = exact
        .into_iter()
        .chain(other.into_iter().filter(|p| p.name().eq_ignore_ascii_case(name)))
        .next()
        .unwrap_or_else(|| DetectedPort::classify(PortInfo::named(name)));
    SelectedPort::new(port, config)
}

/// Check if a port matches a known bridge or a remembered device.
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    port.device.is_known()
        || matches!(
            (port.info.vid, port.info.pid),
            (Some(vid), Some(pid)) if config.knows_usb_device(vid, pid)
        )
}

fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(port.name()).bold().to_string()
    } else {
        port.name().to_string()
    };

    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .info
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device_info}{product}")
}

fn select_port_interactive(ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );
    eprintln!("{}", style("FTDI bridges are listed first").dim());

    let term_width = usize::from(console::Term::stderr().size().1);
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| {
            console::truncate_str(&port_label(port, config), max_item_width, "\u{2026}")
                .into_owned()
        })
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the mote's serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    let index = selection.ok_or_else(cancelled)?;
    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
    Ok(SelectedPort::new(port, config))
}

fn confirm_single_port(selected: SelectedPort) -> Result<SelectedPort> {
    let port = &selected.port;
    let product_info = port
        .info
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}{product_info}?", port.name()))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed { Ok(selected) } else { Err(cancelled()) }
}

/// Ask the user whether to remember this port's USB bridge.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) else {
        return Ok(());
    };
    if config.knows_usb_device(vid, pid) {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this USB device for auto-detection?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}
