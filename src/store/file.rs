//! TOML-file backed [`SaltStore`].
//!
//! The whole file is read on `load` and rewritten on `save`.  Changes
//! made through the trait stay in memory until `save` is called.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{get_in, keys_in, remove_in, set_in, SaltStore, Sections};
use crate::errors::{Result, ShellVaultError};

#[derive(Debug)]
pub struct FileSaltStore {
    path: PathBuf,
    sections: Sections,
}

impl FileSaltStore {
    /// Start an empty store that will be written to `path`.
    pub fn create(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            sections: Sections::new(),
        }
    }

    /// Read an existing store file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let sections: Sections = toml::from_str(&contents).map_err(|e| {
            ShellVaultError::SerializationError(format!("{}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    /// Write the store to disk atomically.
    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string(&self.sections)
            .map_err(|e| ShellVaultError::SerializationError(format!("key store: {e}")))?;
        write_atomic(&self.path, contents.as_bytes())?;
        debug!(path = %self.path.display(), "saved key store");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaltStore for FileSaltStore {
    fn get(&self, section: &str, key: &str) -> Result<String> {
        get_in(&self.sections, section, key)
    }

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        set_in(&mut self.sections, section, key, value)
    }

    fn remove(&mut self, section: &str, key: &str) -> Result<bool> {
        Ok(remove_in(&mut self.sections, section, key))
    }

    fn keys(&self, section: &str) -> Vec<String> {
        keys_in(&self.sections, section)
    }
}

/// Write `data` to `path` via a temp file in the same directory and a
/// rename, so readers never see a half-written file.  Owner-only on Unix.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    // Left behind by an interrupted save.
    match fs::remove_file(&tmp_path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    let mut file = create_private(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Create a new file that is owner-only from the moment it exists.
fn create_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.toml");

        let mut store = FileSaltStore::create(&path);
        store.set("kdf", "bcrypt_salt", "$2b$10$abcdefghijklmnopqrstuu").unwrap();
        store.set("keys", "public", "-----BEGIN PUBLIC KEY-----\nAAAA\n").unwrap();
        store.save().unwrap();

        let loaded = FileSaltStore::load(&path).unwrap();
        assert_eq!(
            loaded.get("kdf", "bcrypt_salt").unwrap(),
            "$2b$10$abcdefghijklmnopqrstuu"
        );
        assert_eq!(
            loaded.get("keys", "public").unwrap(),
            "-----BEGIN PUBLIC KEY-----\nAAAA\n"
        );
    }

    #[test]
    fn changes_are_not_written_until_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.toml");

        let mut store = FileSaltStore::create(&path);
        store.set("kdf", "x", "1").unwrap();
        store.save().unwrap();
        store.set("kdf", "y", "2").unwrap();

        let loaded = FileSaltStore::load(&path).unwrap();
        assert!(loaded.contains("kdf", "x"));
        assert!(!loaded.contains("kdf", "y"));
    }

    #[test]
    fn load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.toml");
        fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            FileSaltStore::load(&path),
            Err(ShellVaultError::SerializationError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.toml");
        let mut store = FileSaltStore::create(&path);
        store.set("kdf", "x", "1").unwrap();
        store.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp.path().join(".keys.toml.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn temp_file_is_owner_only_before_any_data_is_written() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".keys.toml.tmp");
        let file = create_private(&path).unwrap();

        let mode = file.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(create_private(&path).is_err());
    }

    #[test]
    fn stale_temp_file_does_not_block_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.toml");
        fs::write(tmp.path().join(".keys.toml.tmp"), "half written").unwrap();

        let mut store = FileSaltStore::create(&path);
        store.set("kdf", "x", "1").unwrap();
        store.save().unwrap();

        assert_eq!(FileSaltStore::load(&path).unwrap().get("kdf", "x").unwrap(), "1");
        assert!(!tmp.path().join(".keys.toml.tmp").exists());
    }
}
