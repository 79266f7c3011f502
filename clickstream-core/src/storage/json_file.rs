//! File-backed `KeyValueStore`: one JSON file per key under a base
//! directory. `set` writes to a temp file in the same directory and then
//! persists it over the target, so readers never observe a half-written
//! value.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clickstream_common::error::Error;
use clickstream_common::traits::KeyValueStore;
use tempfile::NamedTempFile;
use tracing::warn;

pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, Error> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        // Keys are fixed identifiers, not user input; reject anything that
        // would escape the base directory.
        if key.is_empty() || key.contains(['/', '\\', '.']) {
            return Err(Error::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!("failed to read {:?}: {}", path, e);
                Err(e.into())
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.base_dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path)
            .map_err(|e| Error::Storage(format!("persist {path:?}: {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
