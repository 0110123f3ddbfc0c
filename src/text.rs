//! Minimal chat-component support: wrapping a plain message into the
//! JSON form the protocol expects, and pulling readable text back out of
//! a server-supplied component for log lines and error reporting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextComponent {
    pub text: String,
}

/// Wraps a plain message as chat-component JSON.
pub fn component(text: &str) -> String {
    serde_json::to_string(&TextComponent {
        text: text.to_owned(),
    })
    .expect("a plain text component always serializes")
}

/// Best-effort extraction of readable text from a component. Backends may
/// send arbitrary component trees; anything we cannot parse is returned
/// verbatim.
pub fn plain_text(component_json: &str) -> String {
    match serde_json::from_str::<TextComponent>(component_json) {
        Ok(component) => component.text,
        Err(_) => component_json.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_plain_text() {
        assert_eq!(component("kicked"), r#"{"text":"kicked"}"#);
    }

    #[test]
    fn extracts_text_and_falls_back_verbatim() {
        assert_eq!(plain_text(r#"{"text":"kicked"}"#), "kicked");
        assert_eq!(plain_text("not json"), "not json");
    }
}
