//! Tombstone artifact committed to a destination whose source was removed.

use chrono::{DateTime, Utc};

use crate::git::TombstoneCommit;

/// File name of the tombstone artifact.
pub const TOMBSTONE_PATH: &str = "TOMBSTONE.md";

/// Facts recorded in a tombstone.
#[derive(Debug, Clone)]
pub struct Tombstone<'a> {
    pub repo: &'a str,
    /// Source location, without credentials.
    pub source_url: &'a str,
    pub source_org: &'a str,
    pub removed_at: DateTime<Utc>,
    /// Last source commit marker pushed to this destination, if any.
    pub last_marker: Option<&'a str>,
}

impl Tombstone<'_> {
    pub fn render(&self) -> String {
        let mut body = format!(
            "# {repo} has been removed from its source\n\
             \n\
             This repository mirrored `{url}` from the `{org}` organization.\n\
             The source repository was no longer listed on {date}, so this\n\
             mirror has been archived. Its history is kept; check out the\n\
             parent of this commit to see the last mirrored state.\n\
             \n\
             - Source: {url}\n\
             - Removed at: {rfc3339}\n",
            repo = self.repo,
            url = self.source_url,
            org = self.source_org,
            date = self.removed_at.format("%Y-%m-%d"),
            rfc3339 = self.removed_at.to_rfc3339(),
        );
        if let Some(marker) = self.last_marker {
            body.push_str(&format!("- Last mirrored ref-set digest: `{marker}`\n"));
        }
        body
    }

    /// Commit carrying the tombstone as the only file on `branch`.
    pub fn commit(&self, branch: &str) -> TombstoneCommit {
        TombstoneCommit {
            branch: branch.to_string(),
            path: TOMBSTONE_PATH.to_string(),
            content: self.render(),
            message: format!(
                "Tombstone: {} removed from {}",
                self.repo, self.source_org
            ),
        }
    }
}
