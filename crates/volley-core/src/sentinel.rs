//! Durable "human needed" marker.
//!
//! While the file exists the request gate stays blocked. The engine creates
//! it; an operator (or a companion tool) deletes it once the challenge has
//! been solved in a browser. The file carries no payload.

use crate::error::Result;
use crate::paths;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Sentinel {
    path: PathBuf,
}

impl Sentinel {
    /// Marker at `<root>/.volley/cache/captcha.flag`.
    pub fn new(root: &Path) -> Self {
        Self::at(paths::sentinel_path(root))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raise(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)?;
        Ok(())
    }

    pub fn is_raised(&self) -> bool {
        self.path.exists()
    }

    /// Remove the marker. Returns whether it was present.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
