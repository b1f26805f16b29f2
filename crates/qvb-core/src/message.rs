use crate::domain::{GroupId, UserId};

/// One segment of an inbound QQ message.
///
/// OneBot messages are arrays of typed segments; only text segments carry
/// meaning for this bot. Everything else (images, faces, replies, ...) is
/// kept as `Other` with its segment type so handlers can match exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Other(String),
}

/// Where an inbound message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Private,
    Group(GroupId),
}

/// Adapter-independent inbound message model.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub kind: MessageKind,
    pub sender: UserId,
    pub segments: Vec<Segment>,
}

impl IncomingMessage {
    /// Trimmed, non-empty text segments in order.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Text(t) => {
                let t = t.trim();
                (!t.is_empty()).then_some(t)
            }
            Segment::Other(_) => None,
        })
    }

    /// The first non-empty text segment, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.text_segments().next()
    }
}

#[cfg(test)]
pub(crate) fn private_text(sender: UserId, text: &str) -> IncomingMessage {
    IncomingMessage {
        kind: MessageKind::Private,
        sender,
        segments: vec![Segment::Text(text.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_segments_skip_non_text_and_blank() {
        let msg = IncomingMessage {
            kind: MessageKind::Private,
            sender: UserId(1),
            segments: vec![
                Segment::Other("image".to_string()),
                Segment::Text("  ".to_string()),
                Segment::Text(" 1234 ".to_string()),
                Segment::Text("hello".to_string()),
            ],
        };

        let texts: Vec<&str> = msg.text_segments().collect();
        assert_eq!(texts, vec!["1234", "hello"]);
        assert_eq!(msg.first_text(), Some("1234"));
    }
}
