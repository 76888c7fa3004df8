use std::path::PathBuf;
use std::time::Duration;

use crate::entity::code_visibility::CodeVisibility;
use crate::entity::sync_state::Model as SyncStateModel;
use crate::entity::transition::Transition;
use crate::platform::HostRepo;

/// Default number of pairs executed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default number of consecutive failures tolerated before `degraded`.
pub const DEFAULT_RETRY_THRESHOLD: u32 = 5;
/// Default age after which an unfinished claim is considered abandoned.
pub const DEFAULT_CREATING_RETRY_AFTER: Duration = Duration::from_secs(30 * 60);
/// Default deadline for a single network call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);
/// Default concurrent `ls-remote` calls while computing source markers.
pub const DEFAULT_MARKER_CONCURRENCY: usize = 8;
/// First cross-run retry delay.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(60);
/// Longest cross-run retry delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(6 * 60 * 60);

/// One repository in the source inventory. Rebuilt every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    /// Repository name, unique within a run.
    pub name: String,
    pub visibility: CodeVisibility,
    pub default_branch: String,
    pub is_archived: bool,
    /// Whether the repository exists in the source. Records listed by the
    /// enumerator always exist; `false` is treated like absence.
    pub exists: bool,
    /// Digest of the source's branches and tags, `None` when it could not be
    /// computed cheaply.
    pub source_marker: Option<String>,
}

impl RepositoryRecord {
    pub fn from_host(repo: HostRepo, source_marker: Option<String>) -> Self {
        Self {
            name: repo.name,
            visibility: repo.visibility,
            default_branch: repo.default_branch,
            is_archived: repo.is_archived,
            exists: true,
            source_marker,
        }
    }
}

/// A destination organization as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Stable identifier used as the state store key.
    pub id: String,
    /// Organization on the host.
    pub org: String,
}

impl Destination {
    pub fn new(id: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org: org.into(),
        }
    }
}

/// Engine options, built once from configuration.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Source organization.
    pub source_org: String,
    /// Root for working mirrors: `<work_root>/<destination>/<repo>.git`.
    pub work_root: PathBuf,
    /// Pairs executed at once.
    pub max_concurrency: usize,
    /// Consecutive failures tolerated before a pair becomes `degraded`.
    pub retry_threshold: u32,
    /// Whether removed source repositories are tombstoned.
    pub soft_delete_enabled: bool,
    /// Age after which an unfinished claim may be retried.
    pub creating_retry_after: Duration,
    /// Deadline for a single network call.
    pub call_timeout: Duration,
    /// Destination API requests per second, shared by all workers.
    pub requests_per_second: u32,
    /// Concurrent `ls-remote` calls while enumerating.
    pub marker_concurrency: usize,
    /// Cross-run backoff bounds.
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Attempt branch protection on the default branch after a push.
    pub enforce_branch_protection: bool,
    /// Log the prior destination head when a push overwrites drift.
    pub audit_drift: bool,
    /// Reconcile and report without executing.
    pub dry_run: bool,
}

impl MirrorOptions {
    pub fn new(source_org: impl Into<String>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            source_org: source_org.into(),
            work_root: work_root.into(),
            max_concurrency: DEFAULT_CONCURRENCY,
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
            soft_delete_enabled: true,
            creating_retry_after: DEFAULT_CREATING_RETRY_AFTER,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            requests_per_second: crate::platform::rate_limits::GITHUB_DEFAULT_RPS,
            marker_concurrency: DEFAULT_MARKER_CONCURRENCY,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            enforce_branch_protection: false,
            audit_drift: true,
            dry_run: false,
        }
    }
}

/// A (repository, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairRef {
    pub repo: String,
    pub destination: String,
}

impl PairRef {
    pub fn new(repo: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            destination: destination.into(),
        }
    }
}

impl std::fmt::Display for PairRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.repo, self.destination)
    }
}

/// One required transition. Lives for a single run.
#[derive(Debug, Clone)]
pub struct WorklistItem {
    pub repo_name: String,
    pub destination: String,
    pub transition: Transition,
    /// The source record, or `None` when the repository is gone.
    pub evidence: Option<RepositoryRecord>,
    /// Stored state the plan was made from; the claim expects it unchanged.
    pub prior: Option<SyncStateModel>,
}

impl WorklistItem {
    pub fn pair(&self) -> PairRef {
        PairRef::new(&self.repo_name, &self.destination)
    }
}

/// Reconciliation result: items to execute plus pairs left alone, by reason.
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    pub items: Vec<WorklistItem>,
    /// Synced pairs whose marker matches the source.
    pub up_to_date: Vec<PairRef>,
    /// Pairs waiting out a retry backoff.
    pub deferred: Vec<PairRef>,
    /// Degraded pairs awaiting operator attention.
    pub suspended: Vec<PairRef>,
    /// Pairs claimed recently by an attempt that has not finished.
    pub in_flight: Vec<PairRef>,
    /// Records whose source is gone while soft delete is disabled.
    pub orphaned: Vec<PairRef>,
    /// Tombstoned pairs whose repository exists in the source again.
    pub tombstoned_reappeared: Vec<PairRef>,
}

impl Worklist {
    /// Number of items requiring `transition`.
    pub fn count(&self, transition: Transition) -> usize {
        self.items
            .iter()
            .filter(|item| item.transition == transition)
            .count()
    }
}
