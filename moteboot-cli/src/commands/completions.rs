//! Shell completion generation and installation.

use {
    crate::{BIN_NAME, Cli},
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    std::{
        env, fs,
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

/// Write the completion script for `shell` to `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let name = Path::new(shell_path).file_name()?.to_str()?;
    match name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    env::var(var).map_or_else(
        |_| {
            fallback
                .iter()
                .fold(home_dir().unwrap_or_default(), |dir, part| dir.join(part))
        },
        PathBuf::from,
    )
}

fn install_path(shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => xdg_dir("XDG_DATA_HOME", &[".local", "share"])
            .join("bash-completion/completions")
            .join(BIN_NAME),
        Shell::Zsh => home_dir()?.join(".zfunc").join(format!("_{BIN_NAME}")),
        Shell::Fish => xdg_dir("XDG_CONFIG_HOME", &[".config"])
            .join("fish/completions")
            .join(format!("{BIN_NAME}.fish")),
        Shell::Elvish => xdg_dir("XDG_CONFIG_HOME", &[".config"])
            .join("elvish/lib")
            .join(format!("{BIN_NAME}.elv")),
        Shell::PowerShell => {
            let dir = match env::var("PROFILE") {
                Ok(profile) => PathBuf::from(profile)
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                Err(_) => home_dir()?.join(".config/powershell/completions"),
            };
            dir.join(format!("{BIN_NAME}.ps1"))
        },
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

/// Install completions into the shell's completion directory.
pub(crate) fn cmd_completions_install(shell: Option<Shell>) -> Result<()> {
    let shell = match shell {
        Some(shell) => shell,
        None => detect_shell_type().with_context(|| {
            format!("Could not detect your shell; try `{BIN_NAME} completions --install bash`")
        })?,
    };

    let path = install_path(shell)?;
    let mut script = Vec::new();
    write_completions(shell, &mut script);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &script)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    if shell == Shell::Zsh {
        let zshrc = home_dir()?.join(".zshrc");
        let fpath_line = "fpath=(~/.zfunc $fpath)";
        let present = fs::read_to_string(&zshrc).is_ok_and(|c| c.contains(fpath_line));
        if !present {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&zshrc)
                .with_context(|| format!("Failed to update {}", zshrc.display()))?;
            writeln!(file, "\n# {BIN_NAME} completions\n{fpath_line}")?;
            writeln!(file, "autoload -Uz compinit && compinit")?;
        }
    }

    eprintln!("Completions load in new {shell:?} sessions.");
    Ok(())
}
