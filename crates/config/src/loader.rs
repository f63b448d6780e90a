use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{env_subst::substitute_env, schema::AirbotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["airbot.toml", "airbot.yaml", "airbot.yml", "airbot.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AirbotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load `explicit` if given, else the first discovered config file, else
/// defaults.
///
/// An unreadable or invalid file is an error.
pub fn discover_and_load(explicit: Option<&Path>) -> anyhow::Result<(AirbotConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let config = load_config(&path)?;
            Ok((config, Some(path)))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok((AirbotConfig::default(), None))
        },
    }
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./airbot.{toml,yaml,yml,json}`
/// 2. `~/.config/airbot/airbot.{toml,yaml,yml,json}`
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/airbot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "airbot").map(|d| d.config_dir().to_path_buf())
}

/// Parse any supported format into a JSON value tree.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AirbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
