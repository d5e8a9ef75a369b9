//! Per-instance run state persisted between invocations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kl_infra::RunState;

use crate::error::CliError;

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, instance: &str) -> PathBuf {
        self.dir.join(format!("{instance}.json"))
    }

    /// Load the stored state, or an empty one when nothing was saved yet.
    pub fn load(&self, instance: &str) -> Result<RunState, CliError> {
        let path = self.path(instance);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|source| CliError::StateFormat { path, source }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RunState::default()),
            Err(source) => Err(CliError::StateIo { path, source }),
        }
    }

    pub fn save(&self, instance: &str, state: &RunState) -> Result<(), CliError> {
        let path = self.path(instance);
        let io_err = |path: &Path, source| CliError::StateIo {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let body = serde_json::to_string_pretty(state).map_err(|source| CliError::StateFormat {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, body).map_err(|e| io_err(&path, e))
    }
}
