//! Output of the standalone `fetch` command.
//!
//! A snapshot directory gets one file per distinct response plus a log
//! mapping each identity list to its file:
//!
//! ```text
//! ["agent-a", "agent-c"] - /out/5b1f...e2.body
//! ["agent-b"] - /out/91aa...07.body
//! ------ http://landing.example/
//! ```
//!
//! A `------` line follows the entry whose response carried a `Refresh`
//! redirect.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::fetcher::{FetchFailure, FetchGroup, FetchOutcome};

/// Files written by [`write_snapshot`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub log: PathBuf,
    pub bodies: Vec<PathBuf>,
}

/// Write each group's body and the identity log into `dir`, creating it
/// when missing.
pub fn write_snapshot(groups: &[FetchGroup], dir: &Path) -> Result<Snapshot> {
    if dir.exists() && !dir.is_dir() {
        bail!("output path exists but is not a directory: {}", dir.display());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let mut log = String::new();
    let mut bodies = Vec::with_capacity(groups.len());
    for group in groups {
        let path = dir.join(format!("{}.body", Uuid::new_v4()));
        std::fs::write(&path, group.item.body_text())
            .with_context(|| format!("writing {}", path.display()))?;

        writeln!(log, "{:?} - {}", group.identities, path.display())?;
        if let Some(redirect) = &group.item.redirect {
            writeln!(log, "------ {redirect}")?;
        }
        bodies.push(path);
    }

    let log_path = dir.join(format!("log-{}.txt", Uuid::new_v4()));
    std::fs::write(&log_path, log).with_context(|| format!("writing {}", log_path.display()))?;

    Ok(Snapshot {
        log: log_path,
        bodies,
    })
}

#[derive(Debug, Serialize)]
struct GroupJson<'a> {
    identities: &'a [String],
    kind: &'static str,
    content_type: Option<&'a str>,
    redirect: Option<&'a str>,
    body_bytes: usize,
    links: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OutcomeJson<'a> {
    url: &'a str,
    cloaked: bool,
    groups: Vec<GroupJson<'a>>,
    failures: &'a [FetchFailure],
}

/// JSON rendering of a fetch outcome.
pub fn outcome_json(url: &str, outcome: &FetchOutcome) -> Result<String> {
    let groups = outcome
        .groups
        .iter()
        .map(|group| GroupJson {
            identities: &group.identities,
            kind: group.item.content.kind().as_str(),
            content_type: group.item.content_type.as_deref(),
            redirect: group.item.redirect.as_deref(),
            body_bytes: group.item.body_text().len(),
            links: group.item.extract_links(),
        })
        .collect();
    let json = OutcomeJson {
        url,
        cloaked: outcome.is_cloaked(),
        groups,
        failures: &outcome.failures,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Human-readable summary, one block per group.
pub fn print_outcome(url: &str, outcome: &FetchOutcome) {
    println!("fetch {url}");
    println!("  distinct responses: {}", outcome.groups.len());
    for (i, group) in outcome.groups.iter().enumerate() {
        println!(
            "  [{}] {} ({} bytes, {} identities)",
            i + 1,
            group.item.content_type.as_deref().unwrap_or("-"),
            group.item.body_text().len(),
            group.identities.len()
        );
        if let Some(redirect) = &group.item.redirect {
            println!("      redirect: {redirect}");
        }
        for identity in &group.identities {
            println!("      {identity}");
        }
    }
    println!("  failed attempts: {}", outcome.failures.len());
    if outcome.is_cloaked() {
        println!("  cloaking: responses differ by identity");
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::RetrievedItem;
    use crate::transport::FetchedResponse;
    use tempfile::TempDir;

    fn group(body: &str, refresh: Option<&str>, identities: &[&str]) -> FetchGroup {
        let mut headers = vec![("content-type".to_string(), "text/html".to_string())];
        if let Some(target) = refresh {
            headers.push(("refresh".to_string(), format!("0; url={target}")));
        }
        let response = FetchedResponse::new(body.as_bytes().to_vec(), headers);
        FetchGroup {
            item: RetrievedItem::from_response("http://x.test/", &response),
            identities: identities.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_snapshot_writes_bodies_and_log() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let groups = vec![
            group("<p>benign</p>", None, &["a", "c"]),
            group("<p>other</p>", Some("http://landing.test/"), &["b"]),
        ];

        let snapshot = write_snapshot(&groups, &out).unwrap();
        assert_eq!(snapshot.bodies.len(), 2);
        assert_eq!(
            std::fs::read_to_string(&snapshot.bodies[0]).unwrap(),
            "<p>benign</p>"
        );

        let log = std::fs::read_to_string(&snapshot.log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(r#"["a", "c"] - "#));
        assert!(lines[1].starts_with(r#"["b"] - "#));
        assert_eq!(lines[2], "------ http://landing.test/");
    }

    #[test]
    fn test_snapshot_rejects_file_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("taken");
        std::fs::write(&file, "x").unwrap();
        assert!(write_snapshot(&[], &file).is_err());
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = FetchOutcome {
            groups: vec![
                group(r#"<a href="/next">n</a>"#, None, &["a"]),
                group("<p>x</p>", None, &["b"]),
            ],
            ..FetchOutcome::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&outcome_json("http://x.test/", &outcome).unwrap()).unwrap();
        assert_eq!(json["cloaked"], true);
        assert_eq!(json["groups"][0]["kind"], "html");
        assert_eq!(json["groups"][0]["links"][0], "http://x.test/next");
        assert_eq!(json["groups"][1]["identities"][0], "b");
    }
}
