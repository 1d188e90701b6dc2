//! Wire format of the pedal signal.
//!
//! A payload is a JSON document carried as the single string argument of the signal:
//!
//! ```json
//! { "notifications": [ ["left", { "icon": "media-record-symbolic", "state": "pressed" }] ] }
//! ```
//!
//! Decoding is all-or-nothing: one bad entry rejects the whole payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level key holding the list of key actions.
pub const CONTAINER_KEY: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyState {
    Pressed,
    Held,
    Released,
}

/// One key of the pedal and what should be shown for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAction {
    pub key: String,
    pub icon: String,
    pub state: KeyState,
}

impl KeyAction {
    pub fn new(key: impl Into<String>, icon: impl Into<String>, state: KeyState) -> Self {
        Self { key: key.into(), icon: icon.into(), state }
    }
}

/// A batch of key actions, in the order they were sent. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyActionEvent {
    entries: Vec<KeyAction>,
}

impl KeyActionEvent {
    pub fn new(entries: Vec<KeyAction>) -> Result<Self, DecodeError> {
        if entries.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[KeyAction] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<KeyAction> {
        self.entries
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not a JSON object: {0}")]
    MalformedEnvelope(String),
    #[error("payload has no `{CONTAINER_KEY}` entry")]
    MissingContainer,
    #[error("payload contains no key actions")]
    EmptyPayload,
    #[error("key action at index {index} is malformed: {reason}")]
    MalformedEntry { index: usize, reason: String },
}

/// The value side of an entry: `{"icon": ..., "state": ...}`.
#[derive(Serialize, Deserialize)]
struct WireAction {
    icon: String,
    state: KeyState,
}

/// Encode an event into its wire representation. Keys are emitted in a fixed order, so the same
/// event always encodes to the same string.
pub fn encode(event: &KeyActionEvent) -> String {
    let entries = event
        .entries
        .iter()
        .map(|action| serde_json::json!([action.key, { "icon": action.icon, "state": action.state }]))
        .collect::<Vec<_>>();
    serde_json::json!({ CONTAINER_KEY: entries }).to_string()
}

pub fn decode(payload: &str) -> Result<KeyActionEvent, DecodeError> {
    let envelope = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => return Err(DecodeError::MalformedEnvelope(format!("got {}", json_kind(&other)))),
        Err(e) => return Err(DecodeError::MalformedEnvelope(e.to_string())),
    };

    let container = envelope.get(CONTAINER_KEY).ok_or(DecodeError::MissingContainer)?;
    let elements = container
        .as_array()
        .ok_or_else(|| DecodeError::MalformedEnvelope(format!("`{}` is {}, not an array", CONTAINER_KEY, json_kind(container))))?;

    let entries = elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let (key, action) = serde_json::from_value::<(String, WireAction)>(element.clone())
                .map_err(|e| DecodeError::MalformedEntry { index, reason: e.to_string() })?;
            Ok(KeyAction { key, icon: action.icon, state: action.state })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    KeyActionEvent::new(entries)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(entries: &[(&str, &str, KeyState)]) -> KeyActionEvent {
        KeyActionEvent::new(entries.iter().map(|(k, i, s)| KeyAction::new(*k, *i, *s)).collect()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let original = event(&[
            ("left", "media-record-symbolic", KeyState::Pressed),
            ("middle", "face-smile-symbolic", KeyState::Held),
            ("left", "media-playback-stop-symbolic", KeyState::Released),
        ]);
        assert_eq!(decode(&encode(&original)), Ok(original));
    }

    #[test]
    fn test_round_trip_edge_cases() {
        let cases = vec![
            event(&[("left", "a", KeyState::Pressed)]),
            event(&[("a", "x", KeyState::Pressed), ("b", "y", KeyState::Held), ("c", "z", KeyState::Released)]),
            event(&[("pédale-gauche", "媒体", KeyState::Held), ("🦶", "icon", KeyState::Released)]),
            event(&[("quote\"key", "icon \"with\" quotes", KeyState::Pressed), ("back\\slash", "C:\\icons\\x\n", KeyState::Held)]),
            event(&[("", "", KeyState::Released)]),
        ];
        for original in cases {
            assert_eq!(decode(&encode(&original)), Ok(original.clone()));
            assert_eq!(decode(&encode(&original)).unwrap().into_entries(), original.into_entries());
        }
    }

    #[test]
    fn test_encode_is_stable() {
        let e = event(&[("left", "a", KeyState::Pressed)]);
        insta::assert_snapshot!(encode(&e), @r###"{"notifications":[["left",{"icon":"a","state":"pressed"}]]}"###);
        assert_eq!(encode(&e), encode(&e.clone()));
    }

    #[test]
    fn test_decode_preserves_order() {
        let decoded = decode(
            r#"{"notifications": [["b", {"icon": "x", "state": "held"}], ["a", {"icon": "y", "state": "released"}]]}"#,
        )
        .unwrap();
        let keys = decoded.entries().iter().map(|e| e.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_decode_errors() {
        insta::assert_debug_snapshot!(decode(r#"{"other": []}"#), @r###"
        Err(
            MissingContainer,
        )
        "###);
        insta::assert_debug_snapshot!(decode(r#"{"notifications": []}"#), @r###"
        Err(
            EmptyPayload,
        )
        "###);
        assert!(matches!(decode("[1, 2]"), Err(DecodeError::MalformedEnvelope(_))));
        assert!(matches!(decode("not json"), Err(DecodeError::MalformedEnvelope(_))));
        assert!(matches!(decode(r#"{"notifications": "left"}"#), Err(DecodeError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_names_bad_entry() {
        let payload = r#"{"notifications": [
            ["left", {"icon": "a", "state": "pressed"}],
            ["right", {"icon": "b", "state": "squished"}]
        ]}"#;
        assert!(matches!(decode(payload), Err(DecodeError::MalformedEntry { index: 1, .. })));

        let payload = r#"{"notifications": [["left"]]}"#;
        assert!(matches!(decode(payload), Err(DecodeError::MalformedEntry { index: 0, .. })));
    }

    #[test]
    fn test_parse_key_state() {
        assert_eq!("held".parse::<KeyState>(), Ok(KeyState::Held));
        assert_eq!("Held".parse::<KeyState>(), Err(strum::ParseError::VariantNotFound));
        assert_eq!(KeyState::Released.to_string(), "released");
    }
}
