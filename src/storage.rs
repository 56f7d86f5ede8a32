use crate::core::error::PromptgenError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory-backed key/value store. Each key holds one JSON document in
/// `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Absent or unreadable values come back as `None`; malformed ones are logged.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored value");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring malformed stored value");
                None
            }
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key).unwrap_or_default()
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PromptgenError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        let data = serde_json::to_string(value)?;
        fs::write(self.path_for(key), data)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), PromptgenError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn absent_key_reads_as_default() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let value: Vec<u32> = store.get_or_default("missing");

        assert!(value.is_empty());
    }

    #[test]
    fn set_creates_root_and_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("a").join("b"));
        let mut value = BTreeMap::new();
        value.insert("k".to_string(), 7u32);

        store.set("counts", &value).unwrap();

        assert_eq!(store.get::<BTreeMap<String, u32>>("counts"), Some(value));
    }

    #[test]
    fn wrong_shape_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.set("numbers", &"a string").unwrap();

        assert_eq!(store.get::<Vec<u32>>("numbers"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.set("gone", &1).unwrap();

        store.remove("gone").unwrap();
        store.remove("gone").unwrap();

        assert_eq!(store.get::<u32>("gone"), None);
    }
}
