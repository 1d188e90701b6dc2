use crate::codec::{KeyActionEvent, KeyState};

/// What is currently shown for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDisplay {
    pub icon: String,
    pub state: KeyState,
}

/// Accumulated icon state of all keys seen so far.
///
/// Events are merged entry by entry in sequence order, so when the same key shows up more than
/// once the last entry wins. Keys keep the position at which they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    keys: Vec<(String, KeyDisplay)>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &KeyActionEvent) {
        for action in event.entries() {
            let display = KeyDisplay { icon: action.icon.clone(), state: action.state };
            match self.keys.iter_mut().find(|(key, _)| *key == action.key) {
                Some((_, existing)) => *existing = display,
                None => self.keys.push((action.key.clone(), display)),
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&KeyDisplay> {
        self.keys.iter().find(|(k, _)| k == key).map(|(_, display)| display)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyDisplay)> {
        self.keys.iter().map(|(key, display)| (key.as_str(), display))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
