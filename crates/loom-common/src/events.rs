use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ChatSummary, HistoryEntry};

/// Why a `ChatUpdate` was sent, when it is not a plain streaming chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateTag {
    /// Final snapshot of a generation (finished, cancelled or exhausted).
    Stop,
    /// Snapshot after a branch switch.
    Navigation,
}

/// Outbound events for whatever transport sits in front of a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    NewChatStarted {
        id: String,
    },
    ChatHistory(Vec<HistoryEntry>),
    ChatUpdate {
        history: Vec<HistoryEntry>,
        tag: Option<UpdateTag>,
    },
    ChatList(Vec<ChatSummary>),
    ChatSaved {
        id: String,
        location: String,
    },
    Error(String),
    #[serde(other)]
    Unknown,
}

pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ChatEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn entry(role: Role, content: &str) -> HistoryEntry {
        HistoryEntry {
            role,
            content: content.into(),
            sibling_position: 1,
            sibling_count: 1,
        }
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ChatEvent::NewChatStarted { id: "c1".into() });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ChatEvent::NewChatStarted { ref id } if id == "c1"));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(ChatEvent::Error("boom".into()));

        assert!(matches!(rx1.recv().await.unwrap(), ChatEvent::Error(_)));
        assert!(matches!(rx2.recv().await.unwrap(), ChatEvent::Error(_)));
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(ChatEvent::ChatList(vec![])), 0);
    }

    #[test]
    fn chat_update_wire_shape() {
        let event = ChatEvent::ChatUpdate {
            history: vec![entry(Role::System, "S")],
            tag: Some(UpdateTag::Stop),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat_update");
        assert_eq!(json["data"]["tag"], "stop");
        assert_eq!(json["data"]["history"][0]["role"], "system");
        assert_eq!(json["data"]["history"][0]["sibling_position"], 1);
    }

    #[test]
    fn untagged_update_serializes_null_tag() {
        let event = ChatEvent::ChatUpdate {
            history: vec![],
            tag: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["data"]["tag"].is_null());
    }

    #[test]
    fn unknown_event_deserializes() {
        let json = r#"{"type":"something_new","data":null}"#;
        let event: ChatEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ChatEvent::Unknown));
    }
}
