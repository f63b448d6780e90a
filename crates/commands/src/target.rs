//! Argument parsing for the admin commands (`nomor|jumlah`).

use airbot_protocol::jid::{self, Namespace};

/// Resolve a loosely typed phone number or LID to an account JID.
///
/// Non-digits are dropped; 14+ digits are a LID; a local `08...` number is
/// rewritten to `628...`. `None` when no digits remain.
#[must_use]
pub fn parse_target(input: &str) -> Option<String> {
    let digits = jid::digits_only(input);
    if digits.is_empty() {
        return None;
    }
    Some(match Namespace::classify(&digits) {
        Namespace::Lid => format!("{digits}@{}", jid::LID_SERVER),
        Namespace::User => {
            let digits = match digits.strip_prefix("08") {
                Some(rest) => format!("628{rest}"),
                None => digits,
            };
            format!("{digits}@{}", jid::USER_SERVER)
        },
    })
}

/// Split `left|right`; extra segments are ignored. `None` without a `|`.
#[must_use]
pub fn split_pair(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.split('|');
    let left = parts.next()?;
    let right = parts.next()?;
    Some((left, right))
}

/// Leading integer of `input` (after whitespace), like a lenient number
/// parse. Only positive amounts are accepted.
#[must_use]
pub fn parse_amount(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '+' || *c == '-'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse::<i64>().ok().filter(|n| *n > 0)
}

/// Group digits in thousands: `50000` → `50,000`.
#[must_use]
pub fn rupiah(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
