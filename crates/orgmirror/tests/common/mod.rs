//! In-memory forge used by the integration tests.
//!
//! [`FakeForge`] implements both [`HostClient`] and [`RefTransport`] over one
//! shared map of repositories, so a test can push to a destination through
//! the engine and then inspect exactly what landed there.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orgmirror::entity::code_visibility::CodeVisibility;
use orgmirror::git::{RefSet, RefTransport, Remote, TombstoneCommit};
use orgmirror::mirror::{
    Destination, DestinationAdapter, MirrorOptions, PairContext, ProgressCallback,
    RunCoordinator, SourceAccess,
};
use orgmirror::platform::{CreateOutcome, HostClient, HostRepo, PlatformError, RepoListing, Result};
use orgmirror::connect_and_migrate;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

pub const HOST: &str = "forge.test";
pub const SOURCE: &str = "acme";
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination ids and the organizations they point at.
pub const DESTINATIONS: [(&str, &str); 2] = [("x", "mirror-x"), ("y", "mirror-y")];

#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub refs: RefSet,
    pub archived: bool,
    pub visibility: CodeVisibility,
    pub default_branch: String,
    pub tombstones: Vec<TombstoneCommit>,
    pub protected: Vec<String>,
}

impl FakeRepo {
    fn empty(visibility: CodeVisibility) -> Self {
        Self {
            refs: RefSet::new(),
            archived: false,
            visibility,
            default_branch: "main".to_string(),
            tombstones: Vec::new(),
            protected: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ForgeState {
    pub repos: BTreeMap<(String, String), FakeRepo>,
    pub work: HashMap<PathBuf, RefSet>,
    /// Source listing fails outright.
    pub listing_fails: bool,
    /// Source listing drops its last repository but reports the full count.
    pub truncate_listing: bool,
    /// Pushes into these organizations fail with a network error.
    pub failing_orgs: HashSet<String>,
    /// Every write into these organizations is denied.
    pub denied_orgs: HashSet<String>,
    /// Archiving (but not unarchiving) fails in these organizations.
    pub archive_failing_orgs: HashSet<String>,
    /// `(org, repo)` of every successful mirror push.
    pub pushes: Vec<(String, String)>,
    pub creates: usize,
    /// Set this flag the first time a fetch runs.
    pub cancel_on_fetch: Option<Arc<AtomicBool>>,
    /// Set this flag the first time a tombstone lands.
    pub cancel_on_tombstone: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeForge {
    state: Arc<Mutex<ForgeState>>,
}

fn key(org: &str, name: &str) -> (String, String) {
    (org.to_string(), name.to_string())
}

fn parse_url(url: &str) -> (String, String) {
    let path = url
        .trim_start_matches(&format!("https://{HOST}/"))
        .trim_end_matches(".git");
    let (org, name) = path.split_once('/').unwrap_or((path, ""));
    key(org, name)
}

impl FakeForge {
    pub fn with<R>(&self, f: impl FnOnce(&mut ForgeState) -> R) -> R {
        let mut state = self.state.lock().expect("forge lock poisoned");
        f(&mut state)
    }

    /// Add a source repository with `main` at `head` and tag `v1`.
    pub fn add_repo(&self, org: &str, name: &str, head: &str) {
        let mut repo = FakeRepo::empty(CodeVisibility::Public);
        repo.refs.insert("refs/heads/main", head);
        repo.refs.insert("refs/tags/v1", format!("{head}-tag"));
        self.with(|s| s.repos.insert(key(org, name), repo));
    }

    pub fn set_ref(&self, org: &str, name: &str, reference: &str, sha: &str) {
        self.with(|s| {
            if let Some(repo) = s.repos.get_mut(&key(org, name)) {
                repo.refs.insert(reference, sha);
            }
        });
    }

    pub fn remove_repo(&self, org: &str, name: &str) {
        self.with(|s| s.repos.remove(&key(org, name)));
    }

    pub fn repo(&self, org: &str, name: &str) -> Option<FakeRepo> {
        self.with(|s| s.repos.get(&key(org, name)).cloned())
    }

    pub fn refs(&self, org: &str, name: &str) -> RefSet {
        self.repo(org, name).map(|r| r.refs).unwrap_or_default()
    }

    pub fn push_count(&self) -> usize {
        self.with(|s| s.pushes.len())
    }

    fn check_writable(state: &ForgeState, org: &str, name: &str) -> Result<()> {
        if state.denied_orgs.contains(org) {
            return Err(PlatformError::permission_denied(format!("write to {org} denied")));
        }
        match state.repos.get(&key(org, name)) {
            None => Err(PlatformError::not_found(format!("{org}/{name}"))),
            Some(repo) if repo.archived => Err(PlatformError::permission_denied(format!(
                "{org}/{name} is archived"
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl HostClient for FakeForge {
    fn host(&self) -> &str {
        HOST
    }

    fn clone_url(&self, org: &str, name: &str) -> String {
        format!("https://{HOST}/{org}/{name}.git")
    }

    async fn list_org_repos(
        &self,
        org: &str,
        _on_progress: Option<&ProgressCallback>,
    ) -> Result<RepoListing> {
        self.with(|s| {
            if s.listing_fails {
                return Err(PlatformError::network("connection reset while listing"));
            }
            let mut repos: Vec<HostRepo> = s
                .repos
                .iter()
                .filter(|((owner, _), _)| owner == org)
                .map(|((_, name), repo)| HostRepo {
                    name: name.clone(),
                    default_branch: repo.default_branch.clone(),
                    visibility: repo.visibility,
                    is_archived: repo.archived,
                })
                .collect();
            let expected_total = Some(repos.len());
            if s.truncate_listing {
                repos.pop();
            }
            Ok(RepoListing {
                repos,
                expected_total,
            })
        })
    }

    async fn repo_exists(&self, org: &str, name: &str) -> Result<bool> {
        Ok(self.with(|s| s.repos.contains_key(&key(org, name))))
    }

    async fn create_repo(
        &self,
        org: &str,
        name: &str,
        visibility: CodeVisibility,
        _description: &str,
    ) -> Result<CreateOutcome> {
        self.with(|s| {
            if s.denied_orgs.contains(org) {
                return Err(PlatformError::permission_denied(format!("create in {org} denied")));
            }
            if s.repos.contains_key(&key(org, name)) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            s.repos.insert(key(org, name), FakeRepo::empty(visibility));
            s.creates += 1;
            Ok(CreateOutcome::Created)
        })
    }

    async fn set_archived(&self, org: &str, name: &str, archived: bool) -> Result<()> {
        self.with(|s| {
            if archived && s.archive_failing_orgs.contains(org) {
                return Err(PlatformError::network(format!("archiving {org}/{name} failed")));
            }
            match s.repos.get_mut(&key(org, name)) {
                Some(repo) => {
                    repo.archived = archived;
                    Ok(())
                }
                None => Err(PlatformError::not_found(format!("{org}/{name}"))),
            }
        })
    }

    async fn protect_branch(&self, org: &str, name: &str, branch: &str) -> Result<()> {
        self.with(|s| match s.repos.get_mut(&key(org, name)) {
            Some(repo) => {
                repo.protected.push(branch.to_string());
                Ok(())
            }
            None => Err(PlatformError::not_found(format!("{org}/{name}"))),
        })
    }
}

#[async_trait]
impl RefTransport for FakeForge {
    async fn ls_remote(&self, remote: &Remote) -> Result<RefSet> {
        let (org, name) = parse_url(remote.url());
        self.repo(&org, &name)
            .map(|r| r.refs)
            .ok_or_else(|| PlatformError::not_found(remote.url()))
    }

    async fn fetch_mirror(&self, source: &Remote, work_dir: &Path) -> Result<RefSet> {
        let (org, name) = parse_url(source.url());
        self.with(|s| {
            if let Some(flag) = s.cancel_on_fetch.take() {
                flag.store(true, Ordering::SeqCst);
            }
            let refs = s
                .repos
                .get(&key(&org, &name))
                .map(|r| r.refs.clone())
                .ok_or_else(|| PlatformError::not_found(source.url()))?;
            s.work.insert(work_dir.to_path_buf(), refs.clone());
            Ok(refs)
        })
    }

    async fn push_mirror(&self, work_dir: &Path, destination: &Remote) -> Result<()> {
        let (org, name) = parse_url(destination.url());
        self.with(|s| {
            if s.failing_orgs.contains(&org) {
                return Err(PlatformError::network("remote hung up unexpectedly"));
            }
            Self::check_writable(s, &org, &name)?;
            let refs = s.work.get(work_dir).cloned().unwrap_or_default();
            if let Some(repo) = s.repos.get_mut(&key(&org, &name)) {
                repo.refs = refs;
            }
            s.pushes.push(key(&org, &name));
            Ok(())
        })
    }

    async fn push_tombstone(
        &self,
        _work_dir: &Path,
        destination: &Remote,
        commit: &TombstoneCommit,
    ) -> Result<()> {
        let (org, name) = parse_url(destination.url());
        self.with(|s| {
            Self::check_writable(s, &org, &name)?;
            if let Some(repo) = s.repos.get_mut(&key(&org, &name)) {
                let sha = format!("tombstone-{}", repo.tombstones.len() + 1);
                repo.refs.insert(format!("refs/heads/{}", commit.branch), sha);
                repo.tombstones.push(commit.clone());
            }
            if let Some(flag) = s.cancel_on_tombstone.take() {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        })
    }
}

/// Database, forge and working directory for one test.
pub struct Harness {
    pub forge: FakeForge,
    pub db: DatabaseConnection,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("state.db").display());
        let db = connect_and_migrate(&url)
            .await
            .expect("Failed to create test database");
        Self {
            forge: FakeForge::default(),
            db,
            dir,
        }
    }

    /// Options that never wait: no rate limiting and zero backoff.
    pub fn options(&self) -> MirrorOptions {
        let mut options = MirrorOptions::new(SOURCE, self.dir.path().join("work"));
        options.max_concurrency = 3;
        options.requests_per_second = 10_000;
        options.call_timeout = CALL_TIMEOUT;
        options.retry_base_delay = Duration::ZERO;
        options.retry_max_delay = Duration::ZERO;
        options
    }

    fn endpoints(&self) -> (Arc<dyn HostClient>, Arc<dyn RefTransport>) {
        let forge = Arc::new(self.forge.clone());
        let client: Arc<dyn HostClient> = forge.clone();
        let transport: Arc<dyn RefTransport> = forge;
        (client, transport)
    }

    pub fn source(&self) -> SourceAccess {
        let (client, transport) = self.endpoints();
        SourceAccess::new(SOURCE, client, transport, None, CALL_TIMEOUT)
    }

    pub fn adapter(&self, id: &str, options: &MirrorOptions) -> DestinationAdapter {
        let (client, transport) = self.endpoints();
        DestinationAdapter::new(
            Destination::new(id, Self::dest_org(id)),
            client,
            transport,
            None,
            &options.work_root,
            options.call_timeout,
            options.requests_per_second,
        )
    }

    pub fn coordinator(&self, options: MirrorOptions) -> RunCoordinator {
        let destinations = DESTINATIONS
            .iter()
            .map(|(id, _)| self.adapter(id, &options))
            .collect();
        RunCoordinator::new(self.db.clone(), self.source(), destinations, options)
    }

    /// Executor context for driving a single pair directly.
    pub fn pair_context(&self, id: &str, options: MirrorOptions) -> PairContext {
        PairContext {
            db: self.db.clone(),
            source: Arc::new(self.source()),
            adapter: Arc::new(self.adapter(id, &options)),
            options: Arc::new(options),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dest_org(id: &str) -> &'static str {
        DESTINATIONS
            .iter()
            .find(|(dest, _)| *dest == id)
            .map(|(_, org)| *org)
            .expect("unknown destination")
    }
}
