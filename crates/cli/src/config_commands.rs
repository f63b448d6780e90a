use std::path::{Path, PathBuf};

use {
    airbot_config::{
        DEFAULT_CONFIG_TEMPLATE,
        validate::{self, Severity},
    },
    anyhow::{Context, Result, bail},
};

const DEFAULT_CONFIG_PATH: &str = "airbot.toml";

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            );
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

pub fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    write_template(&path, force)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_written_once_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/airbot.toml");

        write_template(&path, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            DEFAULT_CONFIG_TEMPLATE
        );

        std::fs::write(&path, "[bot]\n").unwrap();
        assert!(write_template(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[bot]\n");

        write_template(&path, true).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            DEFAULT_CONFIG_TEMPLATE
        );
    }
}
