//! Command implementations.
//!
//! Device commands share [`with_flasher`]: resolve the chip configuration,
//! select the port, connect, run the action and always close the port.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod ports;
pub(crate) mod read;

use {
    crate::{Cli, CliError, cancel_token, config::Config, get_port, use_fancy_output, was_interrupted},
    anyhow::Result,
    console::{StyledObject, style},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    log::warn,
    moteboot::{Capability, ChipConfig, ChipFamily, Flasher, Monitor},
    std::fmt::Display,
};

/// Print a status line to stderr unless `--quiet`.
pub(crate) fn note(cli: &Cli, icon: StyledObject<&str>, message: impl Display) {
    if !cli.quiet {
        eprintln!("{icon} {message}");
    }
}

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Resolve the chip configuration from CLI flags, config file and defaults.
pub(crate) fn chip_config(cli: &Cli, config: &Config) -> Result<ChipConfig> {
    let device = &config.device;
    let family = match (cli.chip, device.chip.as_deref()) {
        (Some(chip), _) => chip.into(),
        (None, Some(name)) => name
            .parse::<ChipFamily>()
            .map_err(|e| CliError::Config(e.to_string()))?,
        (None, None) => ChipFamily::default(),
    };

    let echo = !cli.no_echo && device.echo.unwrap_or(true);
    let mut chip = ChipConfig::new(family).with_echo(echo);
    if let Some(baud) = cli.baud.or(config.port.connection.baud) {
        chip = chip.with_baud(baud);
    }
    if !family.supported_bauds().contains(&chip.baud) {
        warn!("{} baud is not a standard {family} boot loader rate", chip.baud);
    }
    if let Some(timeout) = device.reply_timeout() {
        chip = chip.with_reply_timeout(timeout);
    }
    if let Some(pulse) = device.reset_pulse() {
        chip = chip.with_reset_pulse(pulse);
    }
    if let Some(attempts) = device.connect_attempts {
        chip = chip.with_connect_attempts(attempts);
    }
    Ok(chip)
}

/// Open, connect and run `action` on a flasher, closing the port afterwards.
pub(crate) fn with_flasher<T>(
    cli: &Cli,
    config: &mut Config,
    capability: Capability,
    action: impl FnOnce(&mut dyn Flasher) -> Result<T>,
) -> Result<T> {
    let chip = chip_config(cli, config)?;
    let family = chip.family;
    if !family.supports(capability) {
        return Err(CliError::Usage(format!("the {family} boot loader cannot {capability}")).into());
    }

    let port = get_port(cli, config)?;
    note(
        cli,
        style("🔌").cyan(),
        format_args!("Using {port} at {} baud ({family})", chip.baud),
    );

    let mut flasher = family.create_flasher(&chip, &port)?;
    let result = connect_then(cli, flasher.as_mut(), action);
    flasher.close();
    result
}

fn connect_then<T>(
    cli: &Cli,
    flasher: &mut dyn Flasher,
    action: impl FnOnce(&mut dyn Flasher) -> Result<T>,
) -> Result<T> {
    ensure_not_interrupted()?;
    note(cli, style("⏳").yellow(), "Waiting for the boot loader...");
    flasher.connect()?;
    ensure_not_interrupted()?;
    note(cli, style("✓").green(), "Connected");
    action(flasher)
}

/// Progress bar on stderr, hidden when quiet or not on a terminal.
pub(crate) fn progress_bar(cli: &Cli, message: &'static str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb
}

/// Monitor that drives `pb` and observes Ctrl-C.
pub(crate) fn monitor(pb: &ProgressBar) -> Monitor<'_> {
    Monitor::new(cancel_token()).with_progress(move |p| pb.set_position(percent(p)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(fraction: f32) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u64
}

/// Finish `pb` according to `result`.
pub(crate) fn finish<T>(pb: &ProgressBar, result: moteboot::Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            pb.finish_with_message("done");
            Ok(value)
        },
        Err(e) => {
            pb.abandon();
            Err(e.into())
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser, std::time::Duration};

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(["moteboot"].iter().chain(args)).unwrap()
    }

    #[test]
    fn test_chip_config_defaults_to_jennic() {
        let chip = chip_config(&cli(&["reset"]), &Config::default()).unwrap();
        assert_eq!(chip.family, ChipFamily::Jennic);
        assert_eq!(chip.baud, 38_400);
        assert!(chip.echo);
    }

    #[test]
    fn test_chip_config_cli_overrides_file() {
        let mut config = Config::default();
        config.device.chip = Some("jennic".to_string());
        config.port.connection.baud = Some(19_200);
        config.device.reply_timeout_ms = Some(4000);
        config.device.connect_attempts = Some(3);

        let chip = chip_config(
            &cli(&["--chip", "pacemate", "--baud", "57600", "--no-echo", "reset"]),
            &config,
        )
        .unwrap();
        assert_eq!(chip.family, ChipFamily::Pacemate);
        assert_eq!(chip.baud, 57_600);
        assert!(!chip.echo);
        assert_eq!(chip.reply_timeout, Duration::from_millis(4000));
        assert_eq!(chip.connect_attempts, 3);
    }

    #[test]
    fn test_chip_config_from_file() {
        let mut config = Config::default();
        config.device.chip = Some("lpc2136".to_string());
        config.device.echo = Some(false);
        let chip = chip_config(&cli(&["reset"]), &config).unwrap();
        assert_eq!(chip.family, ChipFamily::Pacemate);
        assert_eq!(chip.baud, 115_200);
        assert!(!chip.echo);
        assert!(!chip.dialect().echo);
    }

    #[test]
    fn test_chip_config_unknown_family_is_config_error() {
        let mut config = Config::default();
        config.device.chip = Some("telosb".to_string());
        let err = chip_config(&cli(&["reset"]), &config).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Config(_))));
    }

    #[test]
    fn test_unsupported_capability_fails_before_port_selection() {
        let err = with_flasher(
            &cli(&["--chip", "pacemate", "--port", "/dev/null-mote", "mac"]),
            &mut Config::default(),
            Capability::ReadMacAddress,
            |_| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.0), 0);
        assert_eq!(percent(0.555), 56);
        assert_eq!(percent(1.5), 100);
    }
}
