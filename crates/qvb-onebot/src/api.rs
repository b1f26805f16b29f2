//! OneBot v11 wire types: just the frames and fields this bot consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use qvb_core::{
    domain::{GroupId, Role, UserId},
    message::{IncomingMessage, MessageKind, Segment},
};

/// One message segment on the wire: `{"type": "...", "data": {...}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

pub fn text_segment(text: &str) -> WireSegment {
    WireSegment {
        kind: "text".to_string(),
        data: serde_json::json!({ "text": text }),
    }
}

/// Inbound `post_type: "message"` event.
#[derive(Clone, Debug, Deserialize)]
pub struct MessageEvent {
    pub message_type: String,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub message: Vec<WireSegment>,
}

impl MessageEvent {
    /// Map to the core model. Unknown message types are dropped.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let kind = match self.message_type.as_str() {
            "private" => MessageKind::Private,
            "group" => MessageKind::Group(GroupId(self.group_id?)),
            _ => return None,
        };

        let segments = self
            .message
            .into_iter()
            .map(|s| {
                if s.kind == "text" {
                    let text = s
                        .data
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Segment::Text(text.to_string())
                } else {
                    Segment::Other(s.kind)
                }
            })
            .collect();

        Some(IncomingMessage {
            kind,
            sender: UserId(self.user_id),
            segments,
        })
    }
}

/// API response, correlated by `echo`.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse {
    pub echo: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
}

/// A classified inbound frame.
#[derive(Clone, Debug)]
pub enum Frame {
    Message(MessageEvent),
    Api(ApiResponse),
    Other,
}

/// Classify one text frame. Anything unparseable or irrelevant is `Other`;
/// the read loop never fails on foreign frames.
pub fn parse_frame(raw: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Frame::Other;
    };

    if value.get("echo").and_then(Value::as_str).is_some() {
        return match serde_json::from_value::<ApiResponse>(value) {
            Ok(resp) => Frame::Api(resp),
            Err(_) => Frame::Other,
        };
    }

    if value.get("post_type").and_then(Value::as_str) == Some("message") {
        return match serde_json::from_value::<MessageEvent>(value) {
            Ok(event) => Frame::Message(event),
            Err(_) => Frame::Other,
        };
    }

    Frame::Other
}

/// Entry of a `get_group_member_list` / `get_group_member_info` payload.
#[derive(Clone, Debug, Deserialize)]
pub struct WireGroupMember {
    pub user_id: i64,
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub fn role_from_wire(role: &str) -> Option<Role> {
    match role {
        "owner" => Some(Role::Owner),
        "admin" => Some(Role::Admin),
        "member" => Some(Role::Member),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_message_event_maps_to_the_tagged_model() {
        let raw = r#"{
            "post_type": "message",
            "message_type": "private",
            "user_id": 10001,
            "message": [
                {"type": "image", "data": {"file": "x.png"}},
                {"type": "text", "data": {"text": "1234"}}
            ]
        }"#;

        let Frame::Message(event) = parse_frame(raw) else {
            panic!("expected message frame");
        };
        let msg = event.into_incoming().unwrap();
        assert_eq!(msg.kind, MessageKind::Private);
        assert_eq!(msg.sender, UserId(10001));
        assert_eq!(
            msg.segments,
            vec![
                Segment::Other("image".to_string()),
                Segment::Text("1234".to_string())
            ]
        );
    }

    #[test]
    fn group_message_event_carries_its_group() {
        let raw = r#"{
            "post_type": "message",
            "message_type": "group",
            "group_id": 777,
            "user_id": 10001,
            "message": [{"type": "text", "data": {"text": "hi"}}]
        }"#;

        let Frame::Message(event) = parse_frame(raw) else {
            panic!("expected message frame");
        };
        let msg = event.into_incoming().unwrap();
        assert_eq!(msg.kind, MessageKind::Group(GroupId(777)));
    }

    #[test]
    fn echo_frames_classify_as_api_responses() {
        let raw = r#"{"status": "ok", "retcode": 0, "data": [], "echo": "7"}"#;
        let Frame::Api(resp) = parse_frame(raw) else {
            panic!("expected api frame");
        };
        assert_eq!(resp.echo, "7");
        assert_eq!(resp.retcode, 0);
    }

    #[test]
    fn foreign_frames_are_other() {
        assert!(matches!(parse_frame("not json"), Frame::Other));
        assert!(matches!(
            parse_frame(r#"{"post_type": "meta_event"}"#),
            Frame::Other
        ));
    }

    #[test]
    fn wire_roles_map_to_domain_roles() {
        assert_eq!(role_from_wire("owner"), Some(Role::Owner));
        assert_eq!(role_from_wire("admin"), Some(Role::Admin));
        assert_eq!(role_from_wire("member"), Some(Role::Member));
        assert_eq!(role_from_wire("ghost"), None);
    }

    #[test]
    fn member_list_payload_parses() {
        let raw = r#"[
            {"user_id": 1, "card": "Alice", "role": "admin"},
            {"user_id": 2, "card": ""}
        ]"#;
        let members: Vec<WireGroupMember> = serde_json::from_str(raw).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role.as_deref(), Some("admin"));
        assert!(members[1].role.is_none());
    }
}
