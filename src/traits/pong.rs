//! Pong recognition for the heartbeat filter
//!
//! Servers answer application-level pings in different shapes (plain text,
//! JSON envelopes), so recognition is a trait. A message recognized as a
//! pong is consumed by the heartbeat controller and never reaches message
//! listeners.

use crate::traits::transport::Message;

/// Trait for recognizing pong responses in the inbound message stream
pub trait PongMatcher: Send + Sync {
    /// Check if the given message is a pong response
    fn is_pong(&self, message: &Message) -> bool;
}

/// Matches pongs that are exactly the configured text
pub struct TextPongMatcher {
    pong_text: String,
}

impl TextPongMatcher {
    /// Create a matcher for the exact text `pong_text`
    pub fn new(pong_text: impl Into<String>) -> Self {
        Self { pong_text: pong_text.into() }
    }
}

impl PongMatcher for TextPongMatcher {
    fn is_pong(&self, message: &Message) -> bool {
        message
            .as_text()
            .map(|text| text == self.pong_text)
            .unwrap_or(false)
    }
}

/// Matches JSON pongs by a field/value pair
///
/// # Example
/// ```ignore
/// // Recognizes {"type":"pong", ...}
/// let matcher = JsonPongMatcher::new("type", "pong");
/// ```
pub struct JsonPongMatcher {
    field_name: String,
    pong_value: String,
}

impl JsonPongMatcher {
    /// Create a matcher checking that `field_name` equals `pong_value`
    pub fn new(field_name: impl Into<String>, pong_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            pong_value: pong_value.into(),
        }
    }
}

impl PongMatcher for JsonPongMatcher {
    fn is_pong(&self, message: &Message) -> bool {
        if let Some(text) = message.as_text() {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(value) = json.get(&self.field_name) {
                    return value.as_str() == Some(&self.pong_value);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_matcher_is_exact() {
        let matcher = TextPongMatcher::new("pong");

        assert!(matcher.is_pong(&Message::Text("pong".to_string())));
        assert!(!matcher.is_pong(&Message::Text("PONG".to_string())));
        assert!(!matcher.is_pong(&Message::Text("ping".to_string())));
        assert!(!matcher.is_pong(&Message::Binary(vec![1, 2, 3])));
    }

    #[test]
    fn json_matcher_checks_field() {
        let matcher = JsonPongMatcher::new("type", "pong");

        assert!(matcher.is_pong(&Message::Text(r#"{"type":"pong"}"#.to_string())));
        assert!(matcher.is_pong(&Message::Text(r#"{"type":"pong","ts":5}"#.to_string())));
        assert!(!matcher.is_pong(&Message::Text(r#"{"type":"ping"}"#.to_string())));
        assert!(!matcher.is_pong(&Message::Text("pong".to_string())));
        assert!(!matcher.is_pong(&Message::Text("not json".to_string())));
    }
}
