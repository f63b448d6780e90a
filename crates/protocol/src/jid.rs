//! WhatsApp JID (`user[:device]@server`) helpers.
//!
//! Two addressing namespaces exist for people: classic phone-number JIDs on
//! `s.whatsapp.net` and long opaque LIDs on `lid`. Bare numeric identifiers
//! are classified by digit count.

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const LID_SERVER: &str = "lid";
pub const GROUP_SERVER: &str = "g.us";
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Numeric identifiers with at least this many digits are LIDs.
pub const LID_MIN_DIGITS: usize = 14;

/// Addressing namespace for a bare numeric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Long device-scoped identifier (`@lid`).
    Lid,
    /// Phone-number identifier (`@s.whatsapp.net`).
    User,
}

impl Namespace {
    /// Classify a digits-only identifier.
    #[must_use]
    pub fn classify(digits: &str) -> Self {
        if digits.len() >= LID_MIN_DIGITS {
            Self::Lid
        } else {
            Self::User
        }
    }

    #[must_use]
    pub fn server(self) -> &'static str {
        match self {
            Self::Lid => LID_SERVER,
            Self::User => USER_SERVER,
        }
    }
}

/// Keep only ASCII digits.
#[must_use]
pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Build a person JID from a loosely formatted number or LID.
///
/// Returns `None` when the input carries no digits at all.
#[must_use]
pub fn user_jid(number: &str) -> Option<String> {
    let digits = digits_only(number);
    if digits.is_empty() {
        return None;
    }
    let server = Namespace::classify(&digits).server();
    Some(format!("{digits}@{server}"))
}

/// Collapse a device-scoped JID (`628123:12@s.whatsapp.net`) to the
/// canonical user JID. Anything else is returned unchanged.
#[must_use]
pub fn decode_jid(jid: &str) -> String {
    if has_device_suffix(jid)
        && let Some(normalized) = normalized_user(jid)
    {
        return normalized;
    }
    jid.to_string()
}

/// `user@server` with agent and device parts removed and `c.us` mapped to
/// `s.whatsapp.net`.
#[must_use]
pub fn normalized_user(jid: &str) -> Option<String> {
    let (combined, server) = jid.split_once('@')?;
    let user = combined
        .split(':')
        .next()
        .and_then(|ua| ua.split('_').next())
        .unwrap_or(combined);
    let server = if server == LEGACY_USER_SERVER {
        USER_SERVER
    } else {
        server
    };
    Some(format!("{user}@{server}"))
}

/// The user part of a JID (everything before `@`, without device suffix).
#[must_use]
pub fn user_part(jid: &str) -> &str {
    let combined = jid.split('@').next().unwrap_or(jid);
    combined.split(':').next().unwrap_or(combined)
}

#[must_use]
pub fn is_group(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

#[must_use]
pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST
}

/// Matches `:<digits>@`, the marker of a device-scoped JID.
fn has_device_suffix(jid: &str) -> bool {
    let Some((combined, _)) = jid.split_once('@') else {
        return false;
    };
    match combined.rsplit_once(':') {
        Some((_, device)) => !device.is_empty() && device.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
