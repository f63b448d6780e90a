//! Content resolution for the Baileys `message` tree.

use {
    airbot_protocol::MediaRef,
    serde_json::{Map, Value},
};

/// Keys checked first, in order, when picking the content-bearing node.
const PRIORITY: &[&str] = &[
    "conversation",
    "extendedTextMessage",
    "imageMessage",
    "videoMessage",
    "ptvMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
    "contactMessage",
    "contactsArrayMessage",
    "locationMessage",
    "liveLocationMessage",
    "reactionMessage",
    "pollCreationMessage",
    "pollCreationMessageV2",
    "pollCreationMessageV3",
];

/// Wrappers whose inner `message` carries the real content.
const WRAPPERS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
    "editedMessage",
];

const MAX_UNWRAP_DEPTH: usize = 5;

/// Coarse content classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Contact,
    Location,
    Reaction,
    Poll,
    /// Any other content key, verbatim.
    Other(String),
}

impl ContentKind {
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "conversation" | "extendedTextMessage" => Self::Text,
            "imageMessage" => Self::Image,
            "videoMessage" | "ptvMessage" => Self::Video,
            "audioMessage" => Self::Audio,
            "documentMessage" => Self::Document,
            "stickerMessage" => Self::Sticker,
            "contactMessage" | "contactsArrayMessage" => Self::Contact,
            "locationMessage" | "liveLocationMessage" => Self::Location,
            "reactionMessage" => Self::Reaction,
            "pollCreationMessage" | "pollCreationMessageV2" | "pollCreationMessageV3" => Self::Poll,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

/// Outcome of content resolution for one message tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    /// The content key that was picked (`imageMessage`, `conversation`, ...).
    pub key: String,
    pub kind: ContentKind,
    /// Text body; empty when the content carries none.
    pub body: String,
    pub has_media: bool,
    pub mimetype: Option<String>,
    /// The content node itself.
    pub node: Value,
}

impl ResolvedContent {
    /// Download handle for media-bearing content.
    #[must_use]
    pub fn media_ref(&self) -> Option<MediaRef> {
        if !self.has_media {
            return None;
        }
        let media_type = self.key.strip_suffix("Message").unwrap_or(&self.key);
        Some(MediaRef {
            media_type: media_type.to_string(),
            node: self.node.clone(),
        })
    }

    /// Reply context attached to the content node, if any.
    #[must_use]
    pub fn context_info(&self) -> Option<&Map<String, Value>> {
        self.node.get("contextInfo")?.as_object()
    }
}

/// Peel ephemeral, view-once, document-with-caption and edit wrappers.
#[must_use]
pub fn unwrap_content(message: &Value) -> &Value {
    let mut current = message;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner = WRAPPERS
            .iter()
            .find_map(|w| current.get(*w).and_then(|node| node.get("message")));
        match inner {
            Some(inner) if inner.is_object() => current = inner,
            _ => break,
        }
    }
    current
}

/// Pick the content-bearing key of a message tree.
///
/// Priority keys win; otherwise the first key that looks like content
/// (`conversation` or ending in `Message`/`V2`/`V3`, excluding sender key
/// distribution); otherwise the first key.
#[must_use]
pub fn content_type(message: &Map<String, Value>) -> Option<&str> {
    if let Some(key) = PRIORITY.iter().find(|k| message.contains_key(**k)) {
        return Some(*key);
    }
    message
        .keys()
        .find(|k| looks_like_content(k))
        .or_else(|| message.keys().next())
        .map(String::as_str)
}

fn looks_like_content(key: &str) -> bool {
    (key == "conversation"
        || key.ends_with("Message")
        || key.ends_with("V2")
        || key.ends_with("V3"))
        && key != "senderKeyDistributionMessage"
}

/// Resolve content of a raw message tree. `None` for an empty or non-object
/// tree.
#[must_use]
pub fn resolve(message: &Value) -> Option<ResolvedContent> {
    let message = unwrap_content(message);
    let map = message.as_object()?;
    let key = content_type(map)?.to_string();
    let raw_node = map.get(&key)?;
    let node = unwrap_content(raw_node).clone();

    let body = match &node {
        Value::String(text) => text.clone(),
        _ => first_text(&node, &["text", "conversation", "caption"])
            .or_else(|| non_empty_str(map.get("conversation")))
            .unwrap_or_default(),
    };
    let mimetype = non_empty_str(node.get("mimetype"));
    let has_media = mimetype.is_some() || is_truthy(node.get("thumbnailDirectPath"));

    Some(ResolvedContent {
        kind: ContentKind::from_key(&key),
        key,
        body,
        has_media,
        mimetype,
        node,
    })
}

fn first_text(node: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| non_empty_str(node.get(*f)))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case(json!({"conversation": "hi"}), "conversation", ContentKind::Text, "hi")]
    #[case(json!({"extendedTextMessage": {"text": ".menu"}, "messageContextInfo": {}}), "extendedTextMessage", ContentKind::Text, ".menu")]
    #[case(json!({"imageMessage": {"caption": "#scan", "mimetype": "image/jpeg"}}), "imageMessage", ContentKind::Image, "#scan")]
    #[case(json!({"stickerMessage": {"mimetype": "image/webp"}}), "stickerMessage", ContentKind::Sticker, "")]
    #[case(json!({"senderKeyDistributionMessage": {}, "conversation": "x"}), "conversation", ContentKind::Text, "x")]
    #[case(json!({"buttonsResponseMessage": {}}), "buttonsResponseMessage", ContentKind::Other("buttonsResponseMessage".into()), "")]
    fn resolves_content(
        #[case] message: Value,
        #[case] key: &str,
        #[case] kind: ContentKind,
        #[case] body: &str,
    ) {
        let resolved = resolve(&message).unwrap();
        assert_eq!(resolved.key, key);
        assert_eq!(resolved.kind, kind);
        assert_eq!(resolved.body, body);
    }

    #[test]
    fn empty_tree_is_none() {
        assert!(resolve(&json!({})).is_none());
        assert!(resolve(&Value::Null).is_none());
        assert!(resolve(&json!("text")).is_none());
    }

    #[test]
    fn fallback_takes_first_key() {
        let resolved = resolve(&json!({"protocolMessage": {"type": 0}})).unwrap();
        assert_eq!(resolved.key, "protocolMessage");
        let resolved = resolve(&json!({"messageContextInfo": {}})).unwrap();
        assert_eq!(resolved.key, "messageContextInfo");
    }

    #[test]
    fn unwraps_nested_wrappers() {
        let message = json!({
            "ephemeralMessage": {"message": {
                "viewOnceMessageV2": {"message": {
                    "imageMessage": {"caption": "secret", "mimetype": "image/jpeg"}
                }}
            }}
        });
        let resolved = resolve(&message).unwrap();
        assert_eq!(resolved.kind, ContentKind::Image);
        assert_eq!(resolved.body, "secret");
        assert!(resolved.has_media);
    }

    #[test]
    fn document_with_caption_is_unwrapped() {
        let message = json!({
            "documentWithCaptionMessage": {"message": {
                "documentMessage": {"caption": "invoice", "mimetype": "application/pdf"}
            }}
        });
        let resolved = resolve(&message).unwrap();
        assert_eq!(resolved.kind, ContentKind::Document);
        assert_eq!(resolved.body, "invoice");
        assert_eq!(resolved.mimetype.as_deref(), Some("application/pdf"));
    }

    #[rstest]
    #[case(json!({"imageMessage": {"mimetype": "image/jpeg"}}), true)]
    #[case(json!({"imageMessage": {"thumbnailDirectPath": "/v/t62"}}), true)]
    #[case(json!({"imageMessage": {"mimetype": ""}}), false)]
    #[case(json!({"extendedTextMessage": {"text": "x"}}), false)]
    fn media_flag(#[case] message: Value, #[case] expected: bool) {
        assert_eq!(resolve(&message).unwrap().has_media, expected);
    }

    #[test]
    fn media_ref_strips_message_suffix() {
        let resolved =
            resolve(&json!({"videoMessage": {"mimetype": "video/mp4", "url": "u"}})).unwrap();
        let media = resolved.media_ref().unwrap();
        assert_eq!(media.media_type, "video");
        assert_eq!(media.node["url"], "u");

        let text = resolve(&json!({"conversation": "x"})).unwrap();
        assert!(text.media_ref().is_none());
    }

    #[test]
    fn body_falls_back_to_top_level_conversation() {
        let resolved = resolve(&json!({
            "conversation": "",
            "extendedTextMessage": {"text": ""},
        }))
        .unwrap();
        assert_eq!(resolved.body, "");

        let resolved = resolve(&json!({
            "reactionMessage": {"text": ""},
            "conversation": "top",
        }))
        .unwrap();
        assert_eq!(resolved.key, "conversation");
        assert_eq!(resolved.body, "top");
    }
}
