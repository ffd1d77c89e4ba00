use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::debug;
use modsync_backend::DurableStore;

use crate::write::write_atomic;

const ENTRY_EXTENSION: &str = "json";

/// Durable cache layer keeping one file per entry.
///
/// File names are the hex encoding of the namespaced key, so a key prefix
/// maps onto a file-name prefix and any key is a valid file name.
#[derive(Debug, Clone)]
pub struct FileEntryStore {
    dir: PathBuf,
}

impl FileEntryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", hex_encode(key)))
    }
}

impl DurableStore for FileEntryStore {
    fn load_entry(&self, key: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn persist_entry(&self, key: &str, serialized: &str) -> std::io::Result<()> {
        write_atomic(&self.entry_path(key), serialized.as_bytes())
    }

    fn delete_entry(&self, key: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.entry_path(key)) {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error),
            _ => Ok(()),
        }
    }

    fn delete_by_prefix(&self, prefix: &str) -> std::io::Result<()> {
        let matching = self.entries_with_prefix(prefix)?;
        for path in &matching {
            std::fs::remove_file(path)?;
        }

        debug!(
            "Removed {} durable cache entries with prefix {prefix} from {}",
            matching.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn count_by_prefix(&self, prefix: &str) -> std::io::Result<usize> {
        Ok(self.entries_with_prefix(prefix)?.len())
    }
}

impl FileEntryStore {
    fn entries_with_prefix(&self, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let encoded_prefix = hex_encode(prefix);
        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(std::ffi::OsStr::to_str) == Some(ENTRY_EXTENSION)
                    && path
                        .file_stem()
                        .and_then(std::ffi::OsStr::to_str)
                        .is_some_and(|stem| stem.starts_with(&encoded_prefix))
            })
            .collect())
    }
}

fn hex_encode(key: &str) -> String {
    key.bytes().fold(String::with_capacity(key.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use modsync_backend::DurableStore;

    use super::{FileEntryStore, hex_encode};

    #[test]
    fn hex_encoding_preserves_prefixes() {
        assert_eq!(hex_encode("a:"), "613a");
        assert!(hex_encode("github::owner/pack@u1").starts_with(&hex_encode("github::")));
    }

    #[test]
    fn persists_loads_and_deletes_entries() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = FileEntryStore::new(dir.path().join("bundles"));

        assert_eq!(store.load_entry("github::a").expect("load"), None);

        store
            .persist_entry("github::a", r#"{"value":1}"#)
            .expect("persist");
        assert_eq!(
            store.load_entry("github::a").expect("load").as_deref(),
            Some(r#"{"value":1}"#)
        );

        store.delete_entry("github::a").expect("delete");
        store.delete_entry("github::a").expect("deleting twice is fine");
        assert_eq!(store.load_entry("github::a").expect("load"), None);
    }

    #[test]
    fn delete_by_prefix_only_touches_that_namespace() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = FileEntryStore::new(dir.path());
        store.persist_entry("github::r@u1", "1").expect("persist");
        store.persist_entry("github::r@u2", "2").expect("persist");
        store.persist_entry("config::r@u1", "3").expect("persist");
        std::fs::write(dir.path().join("unrelated.txt"), "keep").expect("seed");

        assert_eq!(store.count_by_prefix("github::").expect("count"), 2);
        store.delete_by_prefix("github::").expect("delete");

        assert_eq!(store.count_by_prefix("github::").expect("count"), 0);
        assert_eq!(store.load_entry("github::r@u1").expect("load"), None);
        assert_eq!(store.load_entry("github::r@u2").expect("load"), None);
        assert_eq!(
            store.load_entry("config::r@u1").expect("load").as_deref(),
            Some("3")
        );
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn delete_by_prefix_on_missing_dir_is_ok() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = FileEntryStore::new(dir.path().join("never-created"));
        assert!(store.delete_by_prefix("github::").is_ok());
        assert_eq!(store.count_by_prefix("github::").expect("count"), 0);
    }
}
