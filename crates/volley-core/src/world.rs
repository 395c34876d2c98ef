//! Village positions known to this account.
//!
//! The map file is produced by whatever scrapes the game map; this module
//! only reads, writes and answers lookups. A village that is missing from the
//! map cannot be resolved, and callers fail closed on that.

use crate::error::Result;
use crate::io::atomic_write;
use crate::paths;
use crate::types::{Position, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldMap {
    #[serde(default)]
    pub villages: BTreeMap<String, Position>,
}

impl WorldMap {
    /// Load `.volley/map.json`. A missing file is an empty map.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::map_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(&paths::map_path(root), data.as_bytes())
    }

    pub fn insert(&mut self, village: impl Into<String>, pos: Position) {
        self.villages.insert(village.into(), pos);
    }

    pub fn village(&self, id: &str) -> Option<Position> {
        self.villages.get(id).copied()
    }

    pub fn resolve(&self, target: &Target) -> Option<Position> {
        match target {
            Target::Coordinates { x, y } => Some(Position::new(*x, *y)),
            Target::Village { id } => self.village(id),
        }
    }
}
