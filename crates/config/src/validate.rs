//! Configuration validation engine.
//!
//! Validates config files against the known schema, detects unknown or
//! misspelled fields, and checks values the bot cannot run with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use regex::Regex;

use crate::{env_subst::substitute_env, loader::parse_config_value, schema::AirbotConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "bot.ownrs"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// Scalar or list of scalars; recursion stops here.
    Leaf,
}

/// Build the schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "bot",
            Struct(HashMap::from([
                ("prefix", Leaf),
                ("fallback_prefix", Leaf),
                ("owners", Leaf),
                ("public", Leaf),
                ("pairing_number", Leaf),
                ("pairing_delay_ms", Leaf),
                ("session_dir", Leaf),
                ("admin_contact", Leaf),
                ("notify_owner_on_connect", Leaf),
            ])),
        ),
        (
            "sidecar",
            Struct(HashMap::from([
                ("port", Leaf),
                ("dir", Leaf),
                ("auto_start", Leaf),
                ("connect_retries", Leaf),
                ("request_timeout_secs", Leaf),
            ])),
        ),
        (
            "reconnect",
            Struct(HashMap::from([
                ("base_delay_ms", Leaf),
                ("max_delay_ms", Leaf),
                ("immediate_first", Leaf),
            ])),
        ),
        (
            "ledger",
            Struct(HashMap::from([
                ("path", Leaf),
                ("history_path", Leaf),
                ("qris_image", Leaf),
                ("timezone", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Best match for `needle` among `candidates` within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(actual_path) {
        Ok(content) => validate_str(&substitute_env(&content), actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    validate_str(toml_str, Path::new("airbot.toml"))
}

/// Validate `raw` in the format implied by `path`'s extension.
fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    // 3. Types, then 4. values on a config that deserializes
    match serde_json::from_value::<AirbotConfig>(value) {
        Ok(config) => check_values(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let msg = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            msg.trim(),
        ));
    }
}

/// Checks on a successfully parsed config.
fn check_values(config: &AirbotConfig, diagnostics: &mut Vec<Diagnostic>) {
    let bot = &config.bot;

    if let Err(e) = Regex::new(&bot.prefix) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "bot.prefix",
            format!("invalid prefix pattern: {e}"),
        ));
    }
    if bot.fallback_prefix.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "bot.fallback_prefix",
            "fallback prefix must not be empty",
        ));
    }

    if bot.owners.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "bot.owners",
            "no owners configured; admin commands are unusable",
        ));
    }
    for (idx, owner) in bot.owners.iter().enumerate() {
        if !owner.chars().any(|c| c.is_ascii_digit()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "value",
                format!("bot.owners[{idx}]"),
                format!("owner \"{owner}\" contains no digits"),
            ));
        }
    }

    if let Some(number) = &bot.pairing_number
        && !number.chars().any(|c| c.is_ascii_digit())
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "bot.pairing_number",
            format!("pairing number \"{number}\" contains no digits"),
        ));
    }

    if config.ledger.timezone.parse::<chrono_tz::Tz>().is_err() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "ledger.timezone",
            format!("unknown timezone \"{}\"", config.ledger.timezone),
        ));
    }

    let reconnect = &config.reconnect;
    if reconnect.base_delay_ms > reconnect.max_delay_ms {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "reconnect",
            format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                reconnect.base_delay_ms, reconnect.max_delay_ms
            ),
        ));
    }
    if !reconnect.immediate_first && reconnect.base_delay_ms == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "reconnect.base_delay_ms",
            "base delay is 0; reconnects are never delayed",
        ));
    }

    if config.sidecar.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "sidecar.request_timeout_secs",
            "request timeout must be at least one second",
        ));
    }
    if config.sidecar.connect_retries == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "sidecar.connect_retries",
            "connect_retries must be at least 1",
        ));
    }

    if !config.ledger.qris_image.exists() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "file-ref",
            "ledger.qris_image",
            format!(
                "file not found: {}; deposit will ask users to contact the admin",
                config.ledger.qris_image.display()
            ),
        ));
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
