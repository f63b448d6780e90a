//! Message normalization: one raw Baileys event in, one [`Message`] out.
//!
//! Resolution runs in fixed order: identity (device-scoped JIDs collapse to
//! user JIDs), content (first content-bearing key by priority), command
//! (prefix pattern or fallback), then reply context. Events missing a key,
//! a chat JID or content normalize to `None`.

pub mod command;
pub mod content;
pub mod handler;
pub mod message;

pub use {
    command::{CommandParts, DEFAULT_FALLBACK_PREFIX, DEFAULT_PREFIX_PATTERN, PrefixMatcher},
    content::ContentKind,
    handler::MessageHandler,
    message::{Content, Identity, Message, Normalizer, QuotedMessage},
};
