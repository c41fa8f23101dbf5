/// Error types for the I/O edges (config and level files).
///
/// Gameplay itself never fails: missing level data falls back to defaults,
/// duplicate or late events are dropped. Only reading from disk can error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} parse error: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("could not read level file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("level '{name}' has no map rows")]
    Empty { name: String },
    #[error("no levels found in {}", dir.display())]
    NoLevels { dir: PathBuf },
}
