use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Namespaces that make up a mirror: branches and tags.
pub const MIRRORED_NAMESPACES: [&str; 2] = ["refs/heads/", "refs/tags/"];

/// Ref name to object id, ordered by ref name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSet {
    refs: BTreeMap<String, String>,
}

impl RefSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `<sha> <ref>` or `<sha>\t<ref>` lines, as printed by
    /// `git ls-remote` and `git for-each-ref`.
    ///
    /// Only branches and tags are kept. Peeled tag lines (`^{}`) are dropped
    /// so remote and local listings of the same refs digest identically.
    pub fn parse(output: &str) -> Self {
        let refs = output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let sha = parts.next()?;
                let name = parts.next()?;
                Some((sha, name))
            })
            .filter(|(_, name)| !name.ends_with("^{}"))
            .filter(|(_, name)| MIRRORED_NAMESPACES.iter().any(|ns| name.starts_with(ns)))
            .map(|(sha, name)| (name.to_string(), sha.to_string()))
            .collect();
        Self { refs }
    }

    pub fn insert(&mut self, name: impl Into<String>, sha: impl Into<String>) {
        self.refs.insert(name.into(), sha.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.refs.get(name).map(String::as_str)
    }

    /// Object id of `refs/heads/<branch>`.
    pub fn branch_head(&self, branch: &str) -> Option<&str> {
        self.get(&format!("refs/heads/{branch}"))
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.refs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable digest of the whole ref set.
    ///
    /// SHA-256 over `<ref> <sha>\n` lines in ref order, hex encoded. Two ref
    /// sets have the same marker exactly when they map the same names to the
    /// same objects.
    pub fn marker(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, sha) in &self.refs {
            hasher.update(name.as_bytes());
            hasher.update(b" ");
            hasher.update(sha.as_bytes());
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl FromIterator<(String, String)> for RefSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}
