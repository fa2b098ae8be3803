//! Runtime toggles that survive restarts.
//!
//! The state is always a fully defaulted object. An absent or empty state
//! file silently yields the defaults, while a file with content that does
//! not parse is reported as corrupt instead of being papered over.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::store::traits::StateStore;

fn default_true() -> bool {
    true
}

/// Persisted toggles. Field order is the on-disk key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Whether content relay is active.
    #[serde(rename = "menfess_watch", default = "default_true")]
    pub watch_enabled: bool,
    /// Whether relay requires the bot to follow the sender back.
    #[serde(rename = "menfess_require_followback", default = "default_true")]
    pub require_followback: bool,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            watch_enabled: true,
            require_followback: true,
        }
    }
}

/// A toggle the owner can flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    Watch,
    RequireFollowback,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Watch => "watch",
            Self::RequireFollowback => "require_followback",
        };
        write!(f, "{s}")
    }
}

impl RuntimeState {
    /// Flip one field and return its new value.
    pub fn toggle(&mut self, field: StateField) -> bool {
        let slot = match field {
            StateField::Watch => &mut self.watch_enabled,
            StateField::RequireFollowback => &mut self.require_followback,
        };
        *slot = !*slot;
        *slot
    }

    /// Parse persisted contents. `None` or blank content gives the defaults.
    pub fn parse(raw: Option<&[u8]>) -> Result<Self, StateError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let corrupt = |reason: String| StateError::Corrupt { reason };
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| corrupt(e.to_string()))?;
        if !value.is_object() {
            return Err(corrupt(format!("expected a JSON object, found {value}")));
        }
        serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
    }

    /// Serialize the full object, pretty-printed for humans.
    pub fn to_json(&self) -> Result<String, StateError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Load from a store.
    pub async fn load(store: &dyn StateStore) -> Result<Self, StateError> {
        let raw = store.read_all().await?;
        Self::parse(raw.as_deref())
    }

    /// Overwrite the store with the full state.
    pub async fn save(&self, store: &dyn StateStore) -> Result<(), StateError> {
        let json = self.to_json()?;
        store.write_all(json.as_bytes()).await
    }
}
