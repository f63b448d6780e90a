//! Lifecycle of the Node.js Baileys sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
    },
    tracing::{Level, debug, error, info, warn},
};

const SIDECAR_DIR_ENV: &str = "AIRBOT_SIDECAR_DIR";
const SIDECAR_PORT_ENV: &str = "AIRBOT_SIDECAR_PORT";
const SIDECAR_REL_PATH: &str = "sidecar/whatsapp-baileys";
const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, then kill if it has not exited within a few seconds.
    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping whatsapp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "whatsapp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for whatsapp sidecar"),
            Err(_) => {
                warn!("whatsapp sidecar did not exit after SIGTERM, killing");
                let _ = self.child.kill().await;
            },
        }
        Ok(())
    }
}

/// Locate the sidecar directory.
///
/// Searches in order: the explicit path, `AIRBOT_SIDECAR_DIR`, next to the
/// executable (`../sidecar/whatsapp-baileys`, `../../sidecar/whatsapp-baileys`),
/// then relative to the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_package_json(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(&dir);
        if has_package_json(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_ENV} set but package.json not found");
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        for up in ["..", "../.."] {
            let candidate = exe_dir.join(up).join(SIDECAR_REL_PATH);
            if has_package_json(&candidate) {
                return Ok(candidate);
            }
        }
    }

    for up in [".", "..", "../.."] {
        let candidate = Path::new(up).join(SIDECAR_REL_PATH);
        if has_package_json(&candidate) {
            return Ok(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    bail!("whatsapp sidecar not found; set {SIDECAR_DIR_ENV} or create {SIDECAR_REL_PATH}")
}

fn has_package_json(dir: &Path) -> bool {
    dir.join("package.json").exists()
}

/// Install dependencies and build the sidecar when `dist/index.js` is missing.
pub async fn ensure_built(sidecar_dir: &Path) -> Result<()> {
    if sidecar_dir.join("dist/index.js").exists() {
        return Ok(());
    }
    info!(path = %sidecar_dir.display(), "building whatsapp sidecar");
    if !sidecar_dir.join("node_modules").exists() {
        run_npm(sidecar_dir, &["install"]).await?;
    }
    run_npm(sidecar_dir, &["run", "build"]).await
}

async fn run_npm(sidecar_dir: &Path, args: &[&str]) -> Result<()> {
    let label = args.join(" ");
    info!(path = %sidecar_dir.display(), "running npm {label}");
    let output = Command::new("npm")
        .args(args)
        .current_dir(sidecar_dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {label}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("npm {label} failed: {stderr}");
    }
    Ok(())
}

/// Build (if needed) and spawn the sidecar, forwarding its output to tracing.
pub async fn start_sidecar(sidecar_dir: &Path, port: u16) -> Result<SidecarProcess> {
    if !has_package_json(sidecar_dir) {
        bail!(
            "whatsapp sidecar not found at {}; run `npm install && npm run build` there first",
            sidecar_dir.display()
        );
    }
    ensure_built(sidecar_dir).await?;

    info!(path = %sidecar_dir.display(), port, "starting whatsapp sidecar");
    let mut child = Command::new("node")
        .arg("dist/index.js")
        .current_dir(sidecar_dir)
        .env(SIDECAR_PORT_ENV, port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn whatsapp sidecar")?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, Level::INFO));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, Level::WARN));
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    match child.try_wait() {
        Ok(Some(status)) => bail!("whatsapp sidecar exited immediately with status: {status}"),
        Ok(None) => {},
        Err(e) => bail!("failed to check whatsapp sidecar status: {e}"),
    }

    info!(port, "whatsapp sidecar started");
    Ok(SidecarProcess { child, port })
}

async fn forward_lines(stream: impl AsyncRead + Unpin, plain_level: Level) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let (level, msg) = parse_log_line(&line).unwrap_or_else(|| (plain_level, line.clone()));
        match level {
            Level::TRACE | Level::DEBUG => debug!(target: "whatsapp_sidecar", "{msg}"),
            Level::INFO => info!(target: "whatsapp_sidecar", "{msg}"),
            Level::WARN => warn!(target: "whatsapp_sidecar", "{msg}"),
            _ => error!(target: "whatsapp_sidecar", "{msg}"),
        }
    }
}

/// Split a pino JSON log line into level and message.
fn parse_log_line(line: &str) -> Option<(Level, String)> {
    if !line.starts_with('{') {
        return None;
    }
    let log: serde_json::Value = serde_json::from_str(line).ok()?;
    let level = match log.get("level").and_then(|v| v.as_u64()).unwrap_or(30) {
        0..=29 => Level::DEBUG,
        30..=39 => Level::INFO,
        40..=49 => Level::WARN,
        _ => Level::ERROR,
    };
    let msg = log
        .get("msg")
        .and_then(|v| v.as_str())
        .unwrap_or(line)
        .to_string();
    Some((level, msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pino_message_is_extracted() {
        let (_, msg) = parse_log_line(r#"{"level":30,"msg":"connected to WA"}"#).unwrap();
        assert_eq!(msg, "connected to WA");
    }

    #[test]
    fn plain_lines_are_not_pino() {
        assert!(parse_log_line("listening on 9277").is_none());
        assert!(parse_log_line("{broken").is_none());
    }

    #[test]
    fn pino_levels_map_to_tracing() {
        assert_eq!(
            parse_log_line(r#"{"level":20,"msg":"x"}"#).map(|(l, _)| l),
            Some(Level::DEBUG)
        );
        assert_eq!(
            parse_log_line(r#"{"level":30,"msg":"x"}"#).map(|(l, _)| l),
            Some(Level::INFO)
        );
        assert_eq!(
            parse_log_line(r#"{"level":40,"msg":"x"}"#).map(|(l, _)| l),
            Some(Level::WARN)
        );
        assert_eq!(
            parse_log_line(r#"{"level":50,"msg":"x"}"#).map(|(l, _)| l),
            Some(Level::ERROR)
        );
    }

    #[test]
    fn explicit_dir_requires_package_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_sidecar_dir(Some(dir.path())).is_err());
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(
            find_sidecar_dir(Some(dir.path())).unwrap(),
            dir.path().to_path_buf()
        );
    }
}
