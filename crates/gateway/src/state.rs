use airbot_protocol::DisconnectReason;

/// Why the supervisor gave up the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The device was unlinked; the session is dead.
    LoggedOut,
    /// Authentication material was rejected.
    BadSession,
    /// Everything else: network loss, timeouts, replaced sockets, restarts.
    Other(DisconnectReason),
}

impl DisconnectCause {
    #[must_use]
    pub fn from_reason(reason: DisconnectReason) -> Self {
        match reason {
            DisconnectReason::LoggedOut => Self::LoggedOut,
            DisconnectReason::BadSession => Self::BadSession,
            other => Self::Other(other),
        }
    }

    /// Whether the supervisor should open a fresh connection.
    #[must_use]
    pub fn reconnects(self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

impl std::fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::BadSession => write!(f, "bad session"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// Lifecycle of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed(DisconnectCause),
}

/// How [`crate::Supervisor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Logged out remotely; the session has been deleted.
    LoggedOut,
    /// Stopped through the shutdown token.
    Stopped,
}
