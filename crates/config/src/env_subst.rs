//! `${VAR}` and `${VAR:-default}` expansion over raw config text.

/// Expand placeholders from the process environment.
///
/// `${VAR}` with `VAR` unset stays in the text verbatim so the parse error
/// or validation diagnostic points at it. `${VAR:-fallback}` uses
/// `fallback` when `VAR` is unset or empty.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &after[..end];
        let (name, fallback) = match placeholder.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (placeholder, None),
        };

        let value = if name.is_empty() {
            None
        } else {
            match (lookup(name), fallback) {
                (Some(v), Some(_)) if !v.is_empty() => Some(v),
                (Some(v), None) => Some(v),
                (_, Some(fallback)) => Some(fallback.to_string()),
                (None, None) => None,
            }
        };
        match value {
            Some(v) => out.push_str(&v),
            None => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
