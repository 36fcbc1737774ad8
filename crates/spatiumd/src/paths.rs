//! Where the daemon keeps its files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ENV_HOME: &str = "SPATIUM_HOME";

#[derive(Debug, thiserror::Error)]
pub enum PathsError {
    #[error("no data directory on this platform, set SPATIUM_HOME")]
    NoDataDir,
    #[error("cannot create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// `$SPATIUM_HOME` when set, else `<data_dir>/spatium`.
    pub fn resolve() -> Result<Self, PathsError> {
        let root = match std::env::var_os(ENV_HOME) {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => dirs::data_dir()
                .ok_or(PathsError::NoDataDir)?
                .join("spatium"),
        };
        Self::at(root)
    }

    /// Use `root` as the data directory, creating it if needed.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, PathsError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| PathsError::Create {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
