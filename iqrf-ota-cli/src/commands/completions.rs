//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;
use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::Cli;

const BIN_NAME: &str = "iqrf-ota";

fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Map a shell binary path to its `Shell`.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path).file_name()?.to_str()?;
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Completion script location for `shell` under the given base directories.
fn completion_path(shell: Shell, home: &Path, data: &Path, config: &Path) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => data.join("bash-completion/completions").join(BIN_NAME),
        Shell::Zsh => home.join(".zfunc").join(format!("_{BIN_NAME}")),
        Shell::Fish => config.join("fish/completions").join(format!("{BIN_NAME}.fish")),
        Shell::Elvish => config.join("elvish/lib").join(format!("{BIN_NAME}.elv")),
        Shell::PowerShell => {
            let dir = env::var("PROFILE").ok().and_then(|profile| {
                Path::new(&profile).parent().map(Path::to_path_buf)
            });
            dir.unwrap_or_else(|| config.join("powershell/completions"))
                .join(format!("{BIN_NAME}.ps1"))
        },
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

/// Make sure `~/.zfunc` is on the zsh function path.
fn ensure_zsh_fpath(home: &Path) -> Result<()> {
    let zshrc = home.join(".zshrc");
    let fpath_line = "fpath=(~/.zfunc $fpath)";
    if fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(fpath_line)) {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# {BIN_NAME} completions")?;
    writeln!(file, "{fpath_line}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;
    eprintln!(
        "{} Added fpath to {}",
        style("✓").green().bold(),
        style(zshrc.display()).yellow()
    );
    Ok(())
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().with_context(|| {
            format!(
                "Could not detect your shell. Please specify it explicitly:\n  \
                 {BIN_NAME} completions --install bash"
            )
        })?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = completion_path(shell, dirs.home_dir(), dirs.data_dir(), dirs.config_dir())?;

    let mut buf = Vec::new();
    write_completions(shell, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    eprintln!();
    match shell {
        Shell::Bash => eprintln!(
            "To activate now: {}",
            style(format!("source {}", path.display())).cyan()
        ),
        Shell::Zsh => {
            ensure_zsh_fpath(dirs.home_dir())?;
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => eprintln!(
            "Add this to your PowerShell profile: {}",
            style(format!("Import-Module {}", path.display())).cyan()
        ),
        _ => eprintln!("Completions will be loaded by new shell sessions."),
    }

    Ok(())
}
