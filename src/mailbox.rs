//! Mailbox sources of raw messages.
//!
//! A [`Mailbox`] yields every message once, or fails as a whole. The
//! bundled [`DirectoryMailbox`] reads RFC 5322 files (`.eml` exports,
//! maildir `cur/` folders) from a directory tree.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::MailboxConfig;

/// One undecoded message and a stable identifier for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    pub bytes: Vec<u8>,
}

pub trait Mailbox {
    /// All messages, in a deterministic order.
    fn messages(&self) -> Result<Vec<RawMessage>>;
}

/// Messages stored as files under a root directory.
pub struct DirectoryMailbox {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl DirectoryMailbox {
    pub fn new(root: PathBuf, include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root,
            include: build_globset(include_globs)?,
            exclude: build_globset(exclude_globs)?,
        })
    }

    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        Self::new(
            config.root.clone(),
            &config.include_globs,
            &config.exclude_globs,
        )
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl Mailbox for DirectoryMailbox {
    fn messages(&self) -> Result<Vec<RawMessage>> {
        if !self.root.is_dir() {
            bail!("mailbox root does not exist: {}", self.root.display());
        }

        let mut messages = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.with_context(|| format!("walking {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let bytes = std::fs::read(path)
                .with_context(|| format!("reading message {}", path.display()))?;
            messages.push(RawMessage { id: rel_str, bytes });
        }

        messages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(messages)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob `{pattern}`"))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_selects_and_sorts_messages() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("inbox/sub")).unwrap();
        std::fs::write(tmp.path().join("inbox/b.eml"), "B").unwrap();
        std::fs::write(tmp.path().join("inbox/sub/a.eml"), "A").unwrap();
        std::fs::write(tmp.path().join("a.eml"), "root").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "skip").unwrap();
        std::fs::write(tmp.path().join("inbox/spam.eml"), "skip").unwrap();

        let mailbox = DirectoryMailbox::new(
            tmp.path().to_path_buf(),
            &globs(&["**/*.eml"]),
            &globs(&["**/spam.eml"]),
        )
        .unwrap();
        let ids: Vec<String> = mailbox
            .messages()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["a.eml", "inbox/b.eml", "inbox/sub/a.eml"]);
    }

    #[test]
    fn test_missing_root_fails_whole_sequence() {
        let tmp = TempDir::new().unwrap();
        let mailbox =
            DirectoryMailbox::new(tmp.path().join("absent"), &globs(&["**/*.eml"]), &[]).unwrap();
        let err = mailbox.messages().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(DirectoryMailbox::new(tmp.path().to_path_buf(), &globs(&["a{"]), &[]).is_err());
    }
}
