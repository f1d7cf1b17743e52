//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("moteboot")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("moteboot"))
        .stdout(predicate::str::contains("Usage"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("moteboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_mote_commands() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("write-crc"))
        .stdout(predicate::str::contains("chip-type"))
        .stdout(predicate::str::contains("MOTEBOOT_PORT"));
}

#[test]
fn colors_disabled_when_not_tty() {
    let output = cli_cmd().arg("--help").output().expect("command should execute");
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(!stdout.contains("\x1b["), "colors should be disabled in non-TTY mode");
}

#[test]
fn completions_command_writes_to_stdout() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_moteboot()"));
}

#[test]
fn completions_without_shell_is_usage_error() {
    cli_cmd()
        .arg("completions")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn list_ports_json_is_an_array_without_stderr() {
    let dir = tempdir().expect("tempdir should be created");
    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert!(parsed.is_array(), "list-ports --json should return an array");
    assert!(output.stderr.is_empty(), "JSON output should not write stderr");
}

#[test]
fn invalid_config_file_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("moteboot.toml"), "invalid toml [[[").expect("write config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");
    assert!(output.status.success(), "invalid config should not be fatal");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML: {stderr}");
}

#[test]
fn unknown_chip_in_config_is_config_error() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("moteboot.toml"), "[device]\nchip = \"telosb\"\n")
        .expect("write config");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/null-mote", "reset"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("telosb"));
}

#[test]
fn unknown_command_is_usage_error() {
    cli_cmd()
        .arg("falsh")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("flash"));
}

#[test]
fn unknown_flag_is_usage_error() {
    cli_cmd().arg("--invalid-flag-xyz").assert().code(2);
}

#[test]
fn flash_without_image_is_usage_error() {
    cli_cmd()
        .arg("flash")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("<IMAGE>"));
}

#[test]
fn erase_without_target_is_usage_error() {
    cli_cmd()
        .arg("erase")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn crc_out_of_range_is_usage_error() {
    cli_cmd().args(["write-crc", "0x1FFFF"]).assert().code(2);
}

#[test]
fn missing_image_fails_before_touching_the_port() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("missing.bin");

    cli_cmd()
        .args(["--port", "/dev/null-mote", "flash"])
        .arg(&image)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Failed to read image"))
        .stderr(predicate::str::contains("Using").not());
}

#[test]
fn empty_image_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("empty.bin");
    fs::write(&image, b"").expect("write image");

    cli_cmd()
        .args(["--port", "/dev/null-mote", "flash"])
        .arg(&image)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn unopenable_port_is_device_error() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("app.bin");
    fs::write(&image, [0xFF; 64]).expect("write image");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "INVALID_PORT_NAME_XYZ", "flash"])
        .arg(&image)
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty());
}

#[test]
fn unsupported_operation_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd()
        .current_dir(dir.path())
        .args(["--chip", "pacemate", "--port", "/dev/null-mote", "mac"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("read MAC address"));

    cli_cmd()
        .current_dir(dir.path())
        .args(["--chip", "jennic", "--port", "/dev/null-mote", "write-crc", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("write CRC"));
}

#[test]
fn non_interactive_environment_variable_works() {
    cli_cmd()
        .env("MOTEBOOT_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn option_terminator_allows_dash_prefixed_image() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/null-mote", "flash", "--", "-image.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("-image.bin"));
}
