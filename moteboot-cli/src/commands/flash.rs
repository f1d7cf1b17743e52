//! Flash, erase, CRC and reset command implementations.

use {
    super::{finish, monitor, note, progress_bar, with_flasher},
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    moteboot::Capability,
    std::{fs, path::Path},
};

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    image: &Path,
    address: u32,
    erase: bool,
    reset: bool,
) -> Result<()> {
    note(
        cli,
        style("📦").cyan(),
        format_args!("Loading image {}", image.display()),
    );
    let data =
        fs::read(image).with_context(|| format!("Failed to read image {}", image.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("Image {} is empty", image.display())).into());
    }
    note(
        cli,
        style("ℹ").blue(),
        format_args!("{} bytes at {address:#010x}", data.len()),
    );

    with_flasher(cli, config, Capability::WriteFlash, |flasher| {
        let pb = progress_bar(cli, if erase { "programming" } else { "writing" });
        let mut monitor = monitor(&pb);
        let result = if erase {
            flasher.program(address, &data, &mut monitor)
        } else {
            flasher.write_flash(address, &data, &mut monitor)
        };
        finish(&pb, result)?;

        if reset {
            note(cli, style("🔄").cyan(), "Resetting device");
            flasher.reset()?;
        }
        Ok(())
    })?;

    note(cli, style("🎉").green().bold(), "Flashing completed");
    Ok(())
}

/// Erase command implementation. `None` erases the whole flash.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config, sector: Option<u8>) -> Result<()> {
    with_flasher(cli, config, Capability::EraseFlash, |flasher| {
        match sector {
            Some(sector) => note(cli, style("🗑").red(), format_args!("Erasing sector {sector}")),
            None => note(cli, style("🗑").red(), "Erasing flash"),
        }
        let pb = progress_bar(cli, "erasing");
        let result = flasher.erase_flash(sector, &mut monitor(&pb));
        finish(&pb, result)
    })?;

    note(cli, style("✓").green().bold(), "Erase completed");
    Ok(())
}

/// Write-CRC command implementation.
pub(crate) fn cmd_write_crc(cli: &Cli, config: &mut Config, crc: u16) -> Result<()> {
    let written = with_flasher(cli, config, Capability::WriteCrc, |flasher| {
        note(cli, style("✎").cyan(), format_args!("Writing CRC {crc:#06x}"));
        let pb = progress_bar(cli, "writing CRC");
        let result = flasher.write_crc(crc, &mut monitor(&pb));
        finish(&pb, result)
    })?;
    if !written {
        anyhow::bail!("Writing CRC {crc:#06x} failed; run with -v for the failing step");
    }

    note(cli, style("✓").green().bold(), "CRC block written");
    Ok(())
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &mut Config) -> Result<()> {
    with_flasher(cli, config, Capability::Reset, |flasher| Ok(flasher.reset()?))?;
    note(cli, style("🔄").cyan(), "Device reset");
    Ok(())
}
