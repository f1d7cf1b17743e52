//! Read, MAC address and chip type command implementations.

use {
    super::{finish, monitor, note, progress_bar, with_flasher},
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    moteboot::Capability,
    std::{fs, path::Path},
};

/// Read command implementation.
pub(crate) fn cmd_read(
    cli: &Cli,
    config: &mut Config,
    address: u32,
    length: u32,
    output: Option<&Path>,
) -> Result<()> {
    if length == 0 {
        return Err(CliError::Usage("Length must be at least 1".to_string()).into());
    }
    let len = usize::try_from(length).context("Length does not fit in memory")?;

    let data = with_flasher(cli, config, Capability::ReadFlash, |flasher| {
        note(
            cli,
            style("📖").cyan(),
            format_args!("Reading {len} bytes at {address:#010x}"),
        );
        let pb = progress_bar(cli, "reading");
        let result = flasher.read_flash(address, len, &mut monitor(&pb));
        finish(&pb, result)
    })?;

    match output {
        Some(path) => {
            fs::write(path, &data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            note(
                cli,
                style("✓").green().bold(),
                format_args!("Saved {} bytes to {}", data.len(), path.display()),
            );
        },
        None => print!("{}", hex_dump(address, &data)),
    }
    Ok(())
}

/// MAC command implementation.
pub(crate) fn cmd_mac(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let mac = with_flasher(cli, config, Capability::ReadMacAddress, |flasher| {
        let pb = progress_bar(cli, "reading MAC");
        let result = flasher.read_mac_address(&mut monitor(&pb));
        finish(&pb, result)
    })?;

    if json {
        let value = serde_json::json!({
            "mac": mac,
            "short_id": format!("{:#06x}", mac.short_id()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{mac}");
    }
    Ok(())
}

/// Chip type command implementation.
pub(crate) fn cmd_chip_type(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let chip = with_flasher(cli, config, Capability::GetChipType, |flasher| {
        let pb = progress_bar(cli, "identifying");
        let result = flasher.chip_type(&mut monitor(&pb));
        finish(&pb, result)
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "chip": chip }))?
        );
    } else {
        println!("{chip}");
    }
    Ok(())
}

/// Sixteen bytes per row, prefixed with the row address.
fn hex_dump(address: u32, data: &[u8]) -> String {
    let mut out = String::new();
    let mut row_address = address;
    for row in data.chunks(16) {
        let hex: String = row.iter().map(|byte| format!("{byte:02x} ")).collect();
        let ascii: String = row
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '.' })
            .collect();
        out.push_str(&format!("{row_address:08x}  {hex:<48} |{ascii}|\n"));
        row_address = row_address.wrapping_add(16);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        let data: Vec<u8> = (0x41..0x53).collect();
        let dump = hex_dump(0x30, &data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000030  41 42 43"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        assert!(lines[1].starts_with("00000040  51 52 "));
        assert!(lines[1].ends_with("|QR|"));
        assert_eq!(lines[0].len(), lines[1].len() + 14);
        assert_eq!(lines[0].find('|'), Some(59));
        assert_eq!(lines[1].find('|'), Some(59));
    }

    #[test]
    fn test_hex_dump_masks_control_bytes() {
        assert!(hex_dump(0, &[0x00, 0x7F, b'a']).ends_with("|..a|\n"));
    }
}
