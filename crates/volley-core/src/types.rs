use crate::error::{Result, VolleyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A map cell. Villages occupy exactly one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Straight-line distance in fields.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Where an action lands: a raw coordinate pair or an opaque village handle
/// that must be resolved through the world map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Coordinates { x: i32, y: i32 },
    Village { id: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Coordinates { x, y } => write!(f, "{x}|{y}"),
            Target::Village { id } => write!(f, "village {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    #[serde(alias = "offense", alias = "farm")]
    Attack,
    #[serde(alias = "reinforcement")]
    Support,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Attack => "attack",
            ActionKind::Support => "support",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = VolleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "attack" | "offense" | "farm" => Ok(ActionKind::Attack),
            "support" | "reinforcement" => Ok(ActionKind::Support),
            other => Err(VolleyError::InvalidInput(format!(
                "unknown action kind '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// Unit kind → quantity. Ordered so serialized payloads are stable.
pub type Payload = BTreeMap<String, u32>;

/// An immutable intent to send troops from `origin` to `target`.
///
/// Built once by the loader and never changed afterwards; the schedule store
/// only ever moves whole requests around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    /// Village id of the sending village.
    pub origin: String,
    pub target: Target,
    pub payload: Payload,
    #[serde(default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ActionRequest {
    /// Build a request, rejecting payloads with no positive quantity.
    pub fn new(
        id: impl Into<String>,
        origin: impl Into<String>,
        target: Target,
        payload: Payload,
        kind: ActionKind,
    ) -> Result<Self> {
        let id = id.into();
        if !payload.values().any(|q| *q > 0) {
            return Err(VolleyError::EmptyPayload { id });
        }
        Ok(Self {
            id,
            origin: origin.into(),
            target,
            payload,
            kind,
            note: String::new(),
            enabled: true,
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Units that are actually sent (quantity above zero).
    pub fn units(&self) -> impl Iterator<Item = (&str, u32)> {
        self.payload
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(u, q)| (u.as_str(), *q))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
