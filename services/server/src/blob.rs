//! Photo blob store: flat files under the configured photo directory.
//!
//! Registration writes `<user>.<suffix>`; lookups read `<user>.png`. Names
//! are rejected if they could escape the directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    /// Root the store at `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` under `name`, overwriting; the full path is returned.
    pub fn put(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.resolve(name)?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// `Ok(None)` when no blob by that name exists.
    pub fn get(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe blob name {name:?}"),
            ));
        }
        Ok(self.dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PhotoStore::new(dir.path().join("photos")).expect("store");
        store.put("alice.png", b"\x89PNG fake").expect("put");
        let bytes = store.get("alice.png").expect("get").expect("present");
        assert_eq!(bytes, b"\x89PNG fake");
    }

    #[test]
    fn missing_blob_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PhotoStore::new(dir.path()).expect("store");
        assert!(store.get("ghost.png").expect("get").is_none());
    }

    #[test]
    fn traversal_names_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PhotoStore::new(dir.path()).expect("store");
        assert!(store.put("../evil.png", b"x").is_err());
        assert!(store.get("a/b.png").is_err());
        assert!(store.put("", b"x").is_err());
    }
}
