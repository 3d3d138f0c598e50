use std::fmt;
use std::path::Path;

use log::warn;
use serde::Deserialize;

/// One configured ESP account: a site id, a label and its API key.
#[derive(Clone, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub key: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    items: Vec<Account>,
}

/// Reads `{"items": [{"id": ..., "name": ..., "key": ...}]}` from `path`.
///
/// A missing or malformed file yields no accounts.
pub fn load_accounts(path: &Path) -> Vec<Account> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("no accounts loaded from {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<AccountsFile>(&text) {
        Ok(file) => file.items,
        Err(e) => {
            warn!("ignoring malformed accounts file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn file_with(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_items() {
        let f = file_with(
            r#"{"items": [
                {"id": 557, "name": "News", "key": "k1"},
                {"id": 812, "key": "k2"}
            ]}"#,
        );
        let accounts = load_accounts(f.path());
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, 557);
        assert_eq!(accounts[0].name, "News");
        assert_eq!(accounts[1].name, "");
        assert!(!format!("{:?}", accounts[0]).contains("k1"));
    }

    #[test]
    fn missing_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_accounts(&dir.path().join("keys.json")).is_empty());
    }

    #[test]
    fn malformed_file_yields_nothing() {
        let f = file_with("{not json");
        assert!(load_accounts(f.path()).is_empty());

        let f = file_with(r#"{"other": []}"#);
        assert!(load_accounts(f.path()).is_empty());
    }
}
