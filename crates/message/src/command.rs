//! Command prefix matching and tokenization.

use regex::Regex;

pub const DEFAULT_PREFIX_PATTERN: &str = "^[./!#]";
pub const DEFAULT_FALLBACK_PREFIX: &str = "#";

/// Command-shaped view of a text body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandParts {
    /// Matched prefix, or the fallback prefix when the pattern did not match.
    pub prefix: String,
    /// Whether `prefix` came from the pattern.
    pub matched: bool,
    /// Lower-cased first token after the prefix; empty for an empty body.
    pub command: String,
    pub args: Vec<String>,
    /// `args` joined by single spaces.
    pub text: String,
}

impl CommandParts {
    /// Whether the body is an invocation (starts with its prefix and names a
    /// command).
    #[must_use]
    pub fn is_command(&self, body: &str) -> bool {
        !self.command.is_empty() && body.starts_with(&self.prefix)
    }
}

/// Compiled prefix pattern plus fallback.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    pattern: Regex,
    fallback: String,
}

impl PrefixMatcher {
    pub fn new(pattern: &str, fallback: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            fallback: fallback.into(),
        })
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// The prefix for `body`: the pattern's first non-empty match, else the
    /// fallback.
    #[must_use]
    pub fn prefix_of<'a>(&'a self, body: &'a str) -> (&'a str, bool) {
        match self.pattern.find(body) {
            Some(m) if !m.as_str().is_empty() => (m.as_str(), true),
            _ => (self.fallback.as_str(), false),
        }
    }

    #[must_use]
    pub fn parse(&self, body: &str) -> CommandParts {
        let (prefix, matched) = self.prefix_of(body);
        let rest = body.replacen(prefix, "", 1);
        let mut tokens = rest.split_whitespace();
        let command = tokens.next().map(str::to_lowercase).unwrap_or_default();
        let args: Vec<String> = tokens.map(str::to_string).collect();
        let text = args.join(" ");
        CommandParts {
            prefix: prefix.to_string(),
            matched,
            command,
            args,
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn default_matcher() -> PrefixMatcher {
        PrefixMatcher::new(DEFAULT_PREFIX_PATTERN, DEFAULT_FALLBACK_PREFIX).unwrap()
    }

    #[rstest]
    #[case(".saldo", ".", true, "saldo", &[])]
    #[case("#addsaldo 6281234|50000", "#", true, "addsaldo", &["6281234|50000"])]
    #[case("!MENU", "!", true, "menu", &[])]
    #[case("/filter8  111  222", "/", true, "filter8", &["111", "222"])]
    #[case("hello there", "#", false, "hello", &["there"])]
    #[case("", "#", false, "", &[])]
    #[case(".", ".", true, "", &[])]
    fn parses_commands(
        #[case] body: &str,
        #[case] prefix: &str,
        #[case] matched: bool,
        #[case] command: &str,
        #[case] args: &[&str],
    ) {
        let parts = default_matcher().parse(body);
        assert_eq!(parts.prefix, prefix);
        assert_eq!(parts.matched, matched);
        assert_eq!(parts.command, command);
        assert_eq!(parts.args, args);
        assert_eq!(parts.text, args.join(" "));
    }

    #[test]
    fn text_is_args_joined() {
        let parts = default_matcher().parse(".addvip   628123|1   extra\ttab");
        assert_eq!(parts.args, ["628123|1", "extra", "tab"]);
        assert_eq!(parts.text, "628123|1 extra tab");
        assert_eq!(parts.args.join(" "), parts.text);
    }

    #[test]
    fn empty_match_uses_fallback() {
        let matcher = PrefixMatcher::new("^[.]?", "#").unwrap();
        let parts = matcher.parse("menu");
        assert_eq!(parts.prefix, "#");
        assert!(!parts.matched);
    }

    #[test]
    fn custom_pattern() {
        let matcher = PrefixMatcher::new("^(air|bot)!", "#").unwrap();
        let parts = matcher.parse("air!Saldo now");
        assert_eq!(parts.prefix, "air!");
        assert_eq!(parts.command, "saldo");
        assert_eq!(parts.text, "now");
    }

    #[test]
    fn fallback_prefix_still_recognized() {
        let matcher = PrefixMatcher::new("^[.]", "#").unwrap();
        let parts = matcher.parse("#menu");
        assert_eq!(parts.prefix, "#");
        assert!(!parts.matched);
        assert_eq!(parts.command, "menu");
        assert!(parts.is_command("#menu"));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        let parts = default_matcher().parse("hello");
        assert!(!parts.is_command("hello"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PrefixMatcher::new("^[", "#").is_err());
    }
}
