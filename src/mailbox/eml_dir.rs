//! [`MailStore`] over a directory tree of `.eml` files.
//!
//! Useful for exported mailboxes and for running the pipeline offline. A
//! message id is the file's path relative to the root, with `/`
//! separators; ids are listed in lexicographic order.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use walkdir::WalkDir;

use mailsift_core::models::RawMessage;

use super::{parse_rfc822, MailStore};

pub struct EmlDirStore {
    root: PathBuf,
}

impl EmlDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!("Mail directory does not exist: {}", self.root.display());
        }
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let rel = Path::new(id);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("Invalid message id: {}", id);
        }
        Ok(self.root.join(rel))
    }
}

impl MailStore for EmlDirStore {
    fn test_connection(&mut self) -> Result<()> {
        self.ensure_root()
    }

    fn count_all(&mut self) -> Result<usize> {
        Ok(self.list_ids()?.len())
    }

    fn list_ids(&mut self) -> Result<Vec<String>> {
        self.ensure_root()?;
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry
                .with_context(|| format!("Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_eml = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("eml"))
                .unwrap_or(false);
            if !is_eml {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root)?;
            let id = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            ids.push(id);
        }
        ids.sort();
        Ok(ids)
    }

    fn fetch_by_id(&mut self, id: &str) -> Result<RawMessage> {
        let path = self.resolve(id)?;
        // A vanished file is a per-message problem, not a broken mailbox.
        let raw = std::fs::read(&path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        parse_rfc822(id, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn eml(subject: &str, body: &str) -> String {
        format!(
            "From: sender@example.com\r\nTo: me@example.com\r\nSubject: {}\r\n\r\n{}\r\n",
            subject, body
        )
    }

    fn mail_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("archive")).unwrap();
        fs::write(tmp.path().join("b.eml"), eml("B", "second")).unwrap();
        fs::write(tmp.path().join("a.eml"), eml("A", "first")).unwrap();
        fs::write(tmp.path().join("archive/c.EML"), eml("C", "third")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "not mail").unwrap();
        tmp
    }

    #[test]
    fn test_lists_sorted_relative_ids() {
        let tmp = mail_dir();
        let mut store = EmlDirStore::new(tmp.path());
        assert_eq!(
            store.list_ids().unwrap(),
            vec!["a.eml", "archive/c.EML", "b.eml"]
        );
        assert_eq!(store.count_all().unwrap(), 3);
    }

    #[test]
    fn test_fetch_by_id() {
        let tmp = mail_dir();
        let mut store = EmlDirStore::new(tmp.path());
        let msg = store.fetch_by_id("archive/c.EML").unwrap();
        assert_eq!(msg.id, "archive/c.EML");
        assert_eq!(msg.subject, "C");
        assert!(msg.body.contains("third"));
    }

    #[test]
    fn test_rejects_escaping_ids() {
        let tmp = mail_dir();
        let mut store = EmlDirStore::new(tmp.path());
        assert!(store.fetch_by_id("../etc/passwd").is_err());
        assert!(store.fetch_by_id("/etc/passwd").is_err());
    }

    #[test]
    fn test_missing_root() {
        let mut store = EmlDirStore::new("/nonexistent/mailsift-mail");
        assert!(store.test_connection().is_err());
        assert!(store.list_ids().is_err());
    }

    #[test]
    fn test_fetch_unseen_in_order() {
        let tmp = mail_dir();
        let mut store = EmlDirStore::new(tmp.path());
        let exclude: HashSet<String> = ["a.eml".to_string()].into();
        let got = store.fetch_unseen(1, &exclude).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "archive/c.EML");
    }
}
