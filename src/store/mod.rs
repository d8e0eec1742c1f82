//! Sectioned key/value stores for salts and wrapped keys.
//!
//! Every read and write names its section explicitly; a store has no
//! notion of a "current" section.

pub mod file;

use std::collections::BTreeMap;

use crate::errors::{Result, ShellVaultError};

pub use file::FileSaltStore;

/// A two-level string map: `section -> key -> value`.
pub trait SaltStore {
    /// Look up a value.  Missing entries are `StoreKeyMissing`.
    fn get(&self, section: &str, key: &str) -> Result<String>;

    /// Insert or replace a value.
    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a value.  Returns whether it was present.
    fn remove(&mut self, section: &str, key: &str) -> Result<bool>;

    /// Keys of a section in sorted order.  Unknown sections are empty.
    fn keys(&self, section: &str) -> Vec<String>;

    fn contains(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_ok()
    }
}

pub(crate) type Sections = BTreeMap<String, BTreeMap<String, String>>;

pub(crate) fn missing(section: &str, key: &str) -> ShellVaultError {
    ShellVaultError::StoreKeyMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShellVaultError::Validation(format!("{kind} name cannot be empty")));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ShellVaultError::Validation(format!(
            "{kind} name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

pub(crate) fn get_in(sections: &Sections, section: &str, key: &str) -> Result<String> {
    sections
        .get(section)
        .and_then(|entries| entries.get(key))
        .cloned()
        .ok_or_else(|| missing(section, key))
}

pub(crate) fn set_in(sections: &mut Sections, section: &str, key: &str, value: &str) -> Result<()> {
    validate_name("section", section)?;
    validate_name("key", key)?;
    sections
        .entry(section.to_string())
        .or_default()
        .insert(key.to_string(), value.to_string());
    Ok(())
}

pub(crate) fn remove_in(sections: &mut Sections, section: &str, key: &str) -> bool {
    let Some(entries) = sections.get_mut(section) else {
        return false;
    };
    let removed = entries.remove(key).is_some();
    if entries.is_empty() {
        sections.remove(section);
    }
    removed
}

pub(crate) fn keys_in(sections: &Sections, section: &str) -> Vec<String> {
    sections
        .get(section)
        .map(|entries| entries.keys().cloned().collect())
        .unwrap_or_default()
}

/// In-memory store, used by tests and as a scratch buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySaltStore {
    sections: Sections,
}

impl MemorySaltStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaltStore for MemorySaltStore {
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
