//! List-ports command implementation.

use {
    anyhow::Result,
    console::style,
    moteboot::{detect_ports, format_port_list, select_port},
};

/// List serial ports; `--json` writes the classified ports to stdout.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for line in format_port_list(&detected) {
        eprintln!("  {} {line}", style("•").green());
    }

    if let Ok(port) = select_port(detected) {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(port.name()).cyan().bold()
        );
    }
    Ok(())
}
