//! Group chat archival: a bounded FIFO log, no invariants beyond its cap.

use serde::{Deserialize, Serialize};

use crate::{
    domain::UserId,
    message::{IncomingMessage, Segment},
    records::local_time_string,
    store::RecordStore,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub sender: UserId,
    pub time: String,
    pub text: String,
}

/// Wire container: `{"records": [...]}`, same pattern as the other stores.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(default)]
    pub records: Vec<ArchivedMessage>,
}

pub struct ChatArchiver {
    store: RecordStore<ChatHistory>,
    max: usize,
}

impl ChatArchiver {
    pub fn new(store: RecordStore<ChatHistory>, max: usize) -> Self {
        Self { store, max }
    }

    /// Append one message, evicting oldest-first at the cap.
    ///
    /// The backing file must pre-exist; a missing or unconfigured file means
    /// archiving is off and surfaces as `StorageUnavailable`.
    pub async fn record(&self, msg: &IncomingMessage) -> Result<()> {
        if self.max == 0 {
            return Ok(());
        }

        let _guard = self.store.guard().await;
        let mut history = self.store.load()?;
        while history.records.len() >= self.max {
            history.records.remove(0);
        }
        history.records.push(ArchivedMessage {
            sender: msg.sender,
            time: local_time_string(),
            text: render_text(msg),
        });
        self.store.save(&history)
    }
}

fn render_text(msg: &IncomingMessage) -> String {
    msg.segments
        .iter()
        .map(|s| match s {
            Segment::Text(t) => t.clone(),
            Segment::Other(kind) => format!("[{kind}]"),
        })
        .collect::<Vec<_>>()
        .join("")
}
