//! Directory-backed combination store

use ore_core::persist::{CombinationStore, PersistError};
use std::path::{Path, PathBuf};

/// Stores each table as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        key: key.to_string(),
        source,
    }
}

impl CombinationStore for JsonDirStore {
    fn load_combination(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match std::fs::read(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    fn persist_combination(&self, key: &str, blob: &[u8]) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(key))?;

        // Write then rename so a crash never leaves a torn table behind
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob).map_err(io_error(key))?;
        std::fs::rename(&tmp, &path).map_err(io_error(key))?;
        Ok(())
    }
}
