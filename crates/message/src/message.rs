use {
    airbot_protocol::{MediaRef, MessageKey, OutboundContent, RawMessage, SendOptions, jid},
    airbot_transport::{Connection, Error as TransportError, Result as TransportResult},
};

use crate::{
    command::{CommandParts, PrefixMatcher},
    content::{self, ContentKind},
};

pub const DEFAULT_PUSH_NAME: &str = "User";

/// Who sent a message and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Conversation JID, device suffix removed.
    pub chat: String,
    /// Sender JID, device suffix removed.
    pub sender: String,
    pub from_me: bool,
    pub is_group: bool,
    pub push_name: String,
}

impl Identity {
    /// The sender's number or LID.
    #[must_use]
    pub fn sender_number(&self) -> &str {
        jid::user_part(&self.sender)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub kind: ContentKind,
    pub body: String,
    pub has_media: bool,
    pub mimetype: Option<String>,
}

/// The message a reply points at.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotedMessage {
    /// Stanza id of the quoted message.
    pub id: Option<String>,
    pub sender: Option<String>,
    pub kind: ContentKind,
    pub body: String,
    pub has_media: bool,
    media: Option<MediaRef>,
}

impl QuotedMessage {
    /// Fetch the quoted message's media.
    pub async fn download(&self, conn: &dyn Connection) -> TransportResult<Vec<u8>> {
        let media = self
            .media
            .as_ref()
            .ok_or_else(|| TransportError::unavailable("quoted message has no media"))?;
        conn.download_media(media).await
    }
}

/// Normalized inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub timestamp: Option<u64>,
    pub identity: Identity,
    pub content: Content,
    pub command: CommandParts,
    pub quoted: Option<QuotedMessage>,
    media: Option<MediaRef>,
    raw: RawMessage,
}

impl Message {
    /// Whether the body invokes a command.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.command.is_command(&self.content.body)
    }

    /// Reply with text in the same conversation, quoting this message.
    pub async fn reply(
        &self,
        conn: &dyn Connection,
        text: impl Into<String> + Send,
    ) -> TransportResult<Option<String>> {
        self.reply_with(conn, OutboundContent::text(text)).await
    }

    /// Reply with arbitrary content, quoting this message.
    pub async fn reply_with(
        &self,
        conn: &dyn Connection,
        content: OutboundContent,
    ) -> TransportResult<Option<String>> {
        conn.send_message(
            &self.identity.chat,
            content,
            SendOptions::quoting(self.raw.clone()),
        )
        .await
    }

    /// Fetch this message's media.
    pub async fn download(&self, conn: &dyn Connection) -> TransportResult<Vec<u8>> {
        let media = self
            .media
            .as_ref()
            .ok_or_else(|| TransportError::unavailable("message has no media"))?;
        conn.download_media(media).await
    }
}

/// Turns raw transport events into [`Message`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    prefix: PrefixMatcher,
}

impl Normalizer {
    pub fn new(prefix: PrefixMatcher) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &PrefixMatcher {
        &self.prefix
    }

    /// Normalize one raw event. `self_id` is our own JID, used as the sender
    /// of messages we sent.
    ///
    /// Returns `None` when the event has no key, no chat JID or no content.
    #[must_use]
    pub fn normalize(&self, raw: &RawMessage, self_id: Option<&str>) -> Option<Message> {
        let key = raw.key.as_ref()?;
        let remote_jid = key.remote_jid.as_deref().filter(|j| !j.is_empty())?;
        let resolved = content::resolve(raw.message.as_ref()?)?;

        let identity = resolve_identity(key, remote_jid, raw.push_name.as_deref(), self_id);
        let command = self.prefix.parse(&resolved.body);
        let quoted = resolved.context_info().and_then(resolve_quoted);
        let media = resolved.media_ref();

        Some(Message {
            id: key.id.clone(),
            timestamp: raw.timestamp(),
            identity,
            content: Content {
                kind: resolved.kind,
                body: resolved.body,
                has_media: resolved.has_media,
                mimetype: resolved.mimetype,
            },
            command,
            quoted,
            media,
            raw: raw.clone(),
        })
    }
}

fn resolve_identity(
    key: &MessageKey,
    remote_jid: &str,
    push_name: Option<&str>,
    self_id: Option<&str>,
) -> Identity {
    let chat = jid::decode_jid(remote_jid);
    let from_me = key.from_me.unwrap_or(false);
    let participant = key.participant.as_deref().filter(|p| !p.is_empty());
    let sender_source = match (from_me, self_id) {
        (true, Some(me)) => me,
        _ => participant.unwrap_or(&chat),
    };
    Identity {
        sender: jid::decode_jid(sender_source),
        is_group: jid::is_group(&chat),
        chat,
        from_me,
        push_name: push_name
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PUSH_NAME)
            .to_string(),
    }
}

fn resolve_quoted(ctx: &serde_json::Map<String, serde_json::Value>) -> Option<QuotedMessage> {
    let quoted = ctx.get("quotedMessage").filter(|q| q.is_object())?;
    let sender = ctx
        .get("participant")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .map(jid::decode_jid);
    let id = ctx
        .get("stanzaId")
        .and_then(|s| s.as_str())
        .map(str::to_string);

    Some(match content::resolve(quoted) {
        Some(resolved) => QuotedMessage {
            id,
            sender,
            media: resolved.media_ref(),
            kind: resolved.kind,
            body: resolved.body,
            has_media: resolved.has_media,
        },
        None => QuotedMessage {
            id,
            sender,
            kind: ContentKind::Other(String::new()),
            body: String::new(),
            has_media: false,
            media: None,
        },
    })
}
