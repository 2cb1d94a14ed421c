use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Where the upload lives. May be site-relative (`/uploads/...`).
    #[serde(rename = "data", default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlainTurn {
    pub chat: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnWithAttachments {
    pub chat: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Client -> server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "ai-message")]
    AiMessage(PlainTurn),

    #[serde(rename = "ai-message-with-files")]
    AiMessageWithFiles(TurnWithAttachments),

    #[serde(rename = "ping")]
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    #[serde(rename = "chat")]
    pub chat_id: Uuid,
}

/// Server -> client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "ai-response")]
    AiResponse(Reply),

    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_both_turn_variants() {
        let chat = Uuid::new_v4();

        let plain: InboundEvent = serde_json::from_value(json!({
            "event": "ai-message",
            "data": { "chat": chat, "content": "hello" }
        }))
        .unwrap();
        assert!(matches!(plain, InboundEvent::AiMessage(turn) if turn.content == "hello"));

        let with_files: InboundEvent = serde_json::from_value(json!({
            "event": "ai-message-with-files",
            "data": {
                "chat": chat,
                "text": "see attached",
                "attachments": [{ "name": "a.pdf", "type": "application/pdf", "data": "/uploads/a.pdf" }]
            }
        }))
        .unwrap();
        match with_files {
            InboundEvent::AiMessageWithFiles(turn) => {
                assert_eq!(turn.chat, chat);
                assert_eq!(turn.attachments[0].content_type, "application/pdf");
                assert_eq!(turn.attachments[0].url, "/uploads/a.pdf");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn ping_needs_no_payload() {
        let ping: InboundEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert!(matches!(ping, InboundEvent::Ping));
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<InboundEvent>(r#"{"event":"shutdown","data":{}}"#).is_err());
    }

    #[test]
    fn reply_serializes_with_chat_field() {
        let chat = Uuid::new_v4();
        let frame = serde_json::to_value(OutboundEvent::AiResponse(Reply {
            content: "hi".to_string(),
            chat_id: chat,
        }))
        .unwrap();
        assert_eq!(
            frame,
            json!({ "event": "ai-response", "data": { "content": "hi", "chat": chat } })
        );
    }
}
