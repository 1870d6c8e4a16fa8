use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix that asks the receiving agent to echo the rest of the content.
pub const REPLY_PREFIX: &str = "Reply with: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<DateTime<Utc>>,
}

impl BasicMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sent_time: Some(Utc::now()),
        }
    }

    /// The requested echo, when the content asks for one.
    pub fn requested_reply(&self) -> Option<&str> {
        self.content.strip_prefix(REPLY_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_reply() {
        assert_eq!(
            BasicMessage::new("Reply with: hello").requested_reply(),
            Some("hello")
        );
        assert_eq!(BasicMessage::new("hello").requested_reply(), None);
    }
}
