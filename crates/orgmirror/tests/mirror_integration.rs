//! End-to-end mirror runs against an in-memory forge and a SQLite store.
//!
//! Key scenarios tested:
//! - Create, sync and tombstone across consecutive runs
//! - Idempotent re-runs
//! - Fail-closed enumeration
//! - Bounded retry, degradation and operator recovery
//! - Cancellation before and during work
//! - Destinations left diverged by failed or interrupted attempts

#![cfg(all(feature = "sqlite", feature = "migrate"))]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Harness, SOURCE};
use orgmirror::entity::error_kind::ErrorKind;
use orgmirror::entity::sync_status::SyncStatus;
use orgmirror::entity::transition::Transition;
use orgmirror::mirror::{
    MirrorProgress, OutcomeKind, ProgressCallback, RepositoryRecord, TOMBSTONE_PATH,
    WorklistItem, execute_item,
};
use orgmirror::state;

/// Maximum time any run should take. If exceeded, there's likely a hang.
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

async fn run(h: &Harness, options: orgmirror::MirrorOptions) -> orgmirror::RunSummary {
    tokio::time::timeout(RUN_TIMEOUT, h.coordinator(options).run(None))
        .await
        .expect("run timed out")
        .expect("run failed")
}

async fn status_of(h: &Harness, repo: &str, destination: &str) -> Option<SyncStatus> {
    state::find(&h.db, repo, destination)
        .await
        .expect("find")
        .map(|s| s.status)
}

#[tokio::test]
async fn test_create_sync_and_tombstone_across_runs() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");

    // Run 1: everything is new.
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.created, 4);
    assert!(summary.is_clean());

    for org in ["mirror-x", "mirror-y"] {
        for repo in ["api", "web"] {
            assert_eq!(h.forge.refs(org, repo), h.forge.refs(SOURCE, repo), "{org}/{repo}");
        }
    }
    let states = state::list_all(&h.db).await.expect("list");
    assert_eq!(states.len(), 4);
    for s in &states {
        assert_eq!(s.status, SyncStatus::Synced);
        assert_eq!(
            s.last_source_commit_marker,
            Some(h.forge.refs(SOURCE, &s.repo_name).marker())
        );
        assert_eq!(s.pending_transition, None);
    }

    // Run 2: one repository moved.
    h.forge.set_ref(SOURCE, "api", "refs/heads/main", "a2");
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.synced_changed, 2);
    assert_eq!(summary.synced_noop, 2);
    assert_eq!(h.forge.refs("mirror-x", "api").branch_head("main"), Some("a2"));
    assert_eq!(h.forge.refs("mirror-y", "api").branch_head("main"), Some("a2"));

    // Run 3: one repository removed from the source.
    h.forge.remove_repo(SOURCE, "web");
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.tombstoned, 2);
    assert_eq!(summary.synced_noop, 2);

    for org in ["mirror-x", "mirror-y"] {
        let repo = h.forge.repo(org, "web").expect("destination kept");
        assert!(repo.archived, "{org}/web archived");
        assert_eq!(repo.tombstones.len(), 1);
        let tombstone = &repo.tombstones[0];
        assert_eq!(tombstone.path, TOMBSTONE_PATH);
        assert_eq!(tombstone.branch, "main");
        assert!(tombstone.content.contains("web"));
        assert!(tombstone.content.contains("https://forge.test/acme/web.git"));
        // History is kept: tags survive and main advances onto the tombstone.
        assert_eq!(repo.refs.get("refs/tags/v1"), Some("b1-tag"));
        assert_eq!(repo.refs.branch_head("main"), Some("tombstone-1"));
    }
    assert_eq!(status_of(&h, "web", "x").await, Some(SyncStatus::Tombstoned));
    assert_eq!(status_of(&h, "web", "y").await, Some(SyncStatus::Tombstoned));

    // Run 4: tombstones are terminal.
    let pushes = h.forge.push_count();
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.tombstoned, 0);
    assert_eq!(summary.synced_noop, 2);
    assert_eq!(h.forge.push_count(), pushes);
    assert_eq!(h.forge.repo("mirror-x", "web").expect("kept").tombstones.len(), 1);
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");

    run(&h, h.options()).await;
    let before = state::list_all(&h.db).await.expect("list");
    let pushes = h.forge.push_count();
    let creates = h.forge.with(|s| s.creates);

    let summary = run(&h, h.options()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.synced_changed, 0);
    assert_eq!(summary.synced_noop, 4);
    assert_eq!(h.forge.push_count(), pushes);
    assert_eq!(h.forge.with(|s| s.creates), creates);
    assert_eq!(state::list_all(&h.db).await.expect("list"), before);
}

#[tokio::test]
async fn test_listing_failure_aborts_without_tombstoning() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    run(&h, h.options()).await;
    let before = state::list_all(&h.db).await.expect("list");

    h.forge.with(|s| s.listing_fails = true);
    let err = h
        .coordinator(h.options())
        .run(None)
        .await
        .expect_err("listing failure must abort");
    assert!(err.is_source_unavailable());
    assert_eq!(state::list_all(&h.db).await.expect("list"), before);
    assert!(!h.forge.repo("mirror-x", "web").expect("kept").archived);
}

#[tokio::test]
async fn test_truncated_listing_aborts_without_tombstoning() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    run(&h, h.options()).await;

    h.forge.with(|s| s.truncate_listing = true);
    let err = h
        .coordinator(h.options())
        .run(None)
        .await
        .expect_err("truncated listing must abort");
    assert!(err.is_source_unavailable());

    for org in ["mirror-x", "mirror-y"] {
        let repo = h.forge.repo(org, "web").expect("kept");
        assert!(!repo.archived);
        assert!(repo.tombstones.is_empty());
    }
    assert_eq!(status_of(&h, "web", "x").await, Some(SyncStatus::Synced));
}

#[tokio::test]
async fn test_diverged_destination_is_overwritten() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    run(&h, h.options()).await;

    // Someone pushed straight to the mirror, and the source moved on.
    h.forge.set_ref("mirror-x", "api", "refs/heads/main", "rogue");
    h.forge.set_ref("mirror-x", "api", "refs/heads/hotfix", "rogue-2");
    h.forge.set_ref(SOURCE, "api", "refs/heads/main", "a2");

    let summary = run(&h, h.options()).await;
    assert_eq!(summary.synced_changed, 2);
    assert_eq!(h.forge.refs("mirror-x", "api"), h.forge.refs(SOURCE, "api"));
    assert_eq!(h.forge.refs("mirror-x", "api").get("refs/heads/hotfix"), None);
}

#[tokio::test]
async fn test_reset_pair_overwrites_diverged_destination_with_unchanged_source() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    run(&h, h.options()).await;

    // The mirror is pushed to directly, then a sync into it is denied.
    h.forge.set_ref("mirror-x", "api", "refs/heads/main", "rogue");
    h.forge.set_ref(SOURCE, "api", "refs/heads/main", "a2");
    h.forge.with(|s| {
        s.denied_orgs.insert("mirror-x".to_string());
    });
    run(&h, h.options()).await;
    assert_eq!(status_of(&h, "api", "x").await, Some(SyncStatus::Degraded));

    // The source goes back to what was last pushed before the operator
    // releases the pair.
    h.forge.set_ref(SOURCE, "api", "refs/heads/main", "a1");
    h.forge.with(|s| s.denied_orgs.clear());
    let reset = state::reset(&h.db, "api", "x").await.expect("reset");
    assert_eq!(reset.status, SyncStatus::Drifted);
    assert_eq!(
        reset.last_source_commit_marker,
        Some(h.forge.refs(SOURCE, "api").marker())
    );

    let summary = run(&h, h.options()).await;
    assert_eq!(summary.synced_changed, 2);
    assert_eq!(h.forge.refs("mirror-x", "api"), h.forge.refs(SOURCE, "api"));
    assert_eq!(status_of(&h, "api", "x").await, Some(SyncStatus::Synced));
}

#[tokio::test]
async fn test_returning_source_replaces_half_finished_tombstone() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    run(&h, h.options()).await;

    // The tombstone lands on mirror-x but archiving it fails.
    h.forge.with(|s| {
        s.archive_failing_orgs.insert("mirror-x".to_string());
    });
    h.forge.remove_repo(SOURCE, "web");
    run(&h, h.options()).await;

    let record = state::find(&h.db, "web", "x").await.expect("find").expect("record");
    assert_eq!(record.status, SyncStatus::Degraded);
    assert_eq!(record.pending_transition, Some(Transition::SoftDelete));
    assert_eq!(
        h.forge.refs("mirror-x", "web").branch_head("main"),
        Some("tombstone-1")
    );

    // The same repository comes back unchanged.
    h.forge.add_repo(SOURCE, "web", "b1");
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.synced_changed, 1);
    assert_eq!(summary.tombstoned_reappeared, 1);

    let repo = h.forge.repo("mirror-x", "web").expect("kept");
    assert!(!repo.archived);
    assert_eq!(repo.refs, h.forge.refs(SOURCE, "web"));
    assert_eq!(status_of(&h, "web", "x").await, Some(SyncStatus::Synced));
}

#[tokio::test]
async fn test_interrupted_soft_delete_is_undone_when_source_returns() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    run(&h, h.options()).await;

    h.forge.remove_repo(SOURCE, "web");
    let mut options = h.options();
    options.max_concurrency = 1;
    let coordinator = h.coordinator(options.clone());
    h.forge
        .with(|s| s.cancel_on_tombstone = Some(coordinator.shutdown_handle()));
    let summary = coordinator.run(None).await.expect("run");
    assert_eq!(summary.tombstoned, 0);
    assert_eq!(summary.skipped_cancelled, 2);

    let states = state::list_all(&h.db).await.expect("list");
    let interrupted = states
        .iter()
        .find(|s| s.pending_transition == Some(Transition::SoftDelete))
        .expect("one soft delete was interrupted");
    assert_eq!(interrupted.status, SyncStatus::Synced);
    let org = Harness::dest_org(&interrupted.destination);
    let repo = h.forge.repo(org, "web").expect("kept");
    assert!(!repo.archived);
    assert_eq!(repo.refs.branch_head("main"), Some("tombstone-1"));

    h.forge.add_repo(SOURCE, "web", "b1");
    let summary = run(&h, options).await;
    assert_eq!(summary.synced_changed, 1);
    assert!(summary.is_clean());
    for org in ["mirror-x", "mirror-y"] {
        assert_eq!(h.forge.refs(org, "web"), h.forge.refs(SOURCE, "web"), "{org}/web");
    }
}

#[tokio::test]
async fn test_removed_source_is_left_alone_without_soft_delete() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    let mut options = h.options();
    options.soft_delete_enabled = false;
    run(&h, options.clone()).await;

    h.forge.remove_repo(SOURCE, "web");
    let summary = run(&h, options).await;
    assert_eq!(summary.orphaned, 2);
    assert_eq!(summary.tombstoned, 0);
    assert!(!h.forge.repo("mirror-x", "web").expect("kept").archived);
    assert_eq!(status_of(&h, "web", "x").await, Some(SyncStatus::Synced));
}

#[tokio::test]
async fn test_repeated_failures_degrade_then_suspend_until_reset() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.with(|s| {
        s.failing_orgs.insert("mirror-y".to_string());
    });
    let mut options = h.options();
    options.retry_threshold = 2;

    let summary = run(&h, options.clone()).await;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed_this_run, 1);
    let record = state::find(&h.db, "api", "y").await.expect("find").expect("record");
    assert_eq!(record.status, SyncStatus::Creating);
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.last_error_kind, Some(ErrorKind::NetworkError));
    assert_eq!(record.pending_transition, Some(Transition::CreateAndSync));
    assert!(record.next_attempt_at.is_some());

    let summary = run(&h, options.clone()).await;
    assert_eq!(summary.failed_this_run, 1);
    assert_eq!(status_of(&h, "api", "y").await, Some(SyncStatus::Creating));

    let summary = run(&h, options.clone()).await;
    assert_eq!(summary.failed_this_run, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.degraded_pairs[0].repo, "api");
    assert_eq!(summary.degraded_pairs[0].destination, "y");
    assert_eq!(summary.degraded_pairs[0].failure_count, 3);

    // Degraded pairs wait for an operator.
    let summary = run(&h, options.clone()).await;
    assert_eq!(summary.suspended, 1);
    assert_eq!(summary.failed_this_run, 0);

    h.forge.with(|s| s.failing_orgs.clear());
    let reset = state::reset(&h.db, "api", "y").await.expect("reset");
    assert_eq!(reset.status, SyncStatus::Absent);

    let summary = run(&h, options).await;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.degraded, 0);
    let record = state::find(&h.db, "api", "y").await.expect("find").expect("record");
    assert_eq!(record.status, SyncStatus::Synced);
    assert_eq!(record.failure_count, 0);
    assert_eq!(record.last_error_kind, None);
    assert_eq!(h.forge.refs("mirror-y", "api"), h.forge.refs(SOURCE, "api"));
}

#[tokio::test]
async fn test_permission_denied_degrades_immediately() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.with(|s| {
        s.denied_orgs.insert("mirror-y".to_string());
    });

    let summary = run(&h, h.options()).await;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.degraded, 1);
    let record = state::find(&h.db, "api", "y").await.expect("find").expect("record");
    assert_eq!(record.status, SyncStatus::Degraded);
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.last_error_kind, Some(ErrorKind::PermissionDenied));
}

#[tokio::test]
async fn test_failed_pair_waits_out_backoff() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.with(|s| {
        s.failing_orgs.insert("mirror-y".to_string());
    });
    let mut options = h.options();
    options.retry_base_delay = Duration::from_secs(60);
    options.retry_max_delay = Duration::from_secs(3600);

    run(&h, options.clone()).await;
    let summary = run(&h, options).await;
    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.failed_this_run, 0);
}

#[tokio::test]
async fn test_tombstoned_pair_resumes_after_revive() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    run(&h, h.options()).await;
    h.forge.remove_repo(SOURCE, "web");
    run(&h, h.options()).await;

    // The source repository comes back.
    h.forge.add_repo(SOURCE, "web", "b2");
    let summary = run(&h, h.options()).await;
    assert_eq!(summary.tombstoned_reappeared, 2);
    assert_eq!(summary.created, 0);
    assert!(h.forge.repo("mirror-x", "web").expect("kept").archived);

    let revived = state::revive(&h.db, "web", "x").await.expect("revive");
    assert_eq!(revived.status, SyncStatus::Absent);

    let summary = run(&h, h.options()).await;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.tombstoned_reappeared, 1);
    let repo = h.forge.repo("mirror-x", "web").expect("kept");
    assert!(!repo.archived);
    assert_eq!(repo.refs, h.forge.refs(SOURCE, "web"));
    assert_eq!(status_of(&h, "web", "y").await, Some(SyncStatus::Tombstoned));
}

#[tokio::test]
async fn test_shutdown_before_dispatch_cancels_everything() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");

    let coordinator = h.coordinator(h.options());
    coordinator
        .shutdown_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let events: Arc<Mutex<Vec<MirrorProgress>>> = Arc::default();
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |event| {
        sink.lock().expect("events lock").push(event);
    });

    let summary = coordinator.run(Some(&callback)).await.expect("run");
    assert_eq!(summary.skipped_cancelled, 4);
    assert_eq!(summary.created, 0);
    assert!(state::list_all(&h.db).await.expect("list").is_empty());
    assert_eq!(h.forge.push_count(), 0);

    let events = events.lock().expect("events lock");
    assert!(
        events
            .iter()
            .any(|e| matches!(e, MirrorProgress::DispatchStopped { remaining: 4 }))
    );
}

#[tokio::test]
async fn test_cancellation_mid_work_is_recorded_and_resumed() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    let mut options = h.options();
    options.max_concurrency = 1;

    let coordinator = h.coordinator(options.clone());
    let flag = coordinator.shutdown_handle();
    h.forge.with(|s| s.cancel_on_fetch = Some(flag));

    let summary = coordinator.run(None).await.expect("run");
    assert_eq!(summary.skipped_cancelled, 2);
    assert_eq!(summary.created, 0);
    assert_eq!(h.forge.push_count(), 0);

    let states = state::list_all(&h.db).await.expect("list");
    assert_eq!(states.len(), 1, "only the interrupted pair was claimed");
    let interrupted = &states[0];
    assert_eq!(interrupted.status, SyncStatus::Creating);
    assert_eq!(interrupted.failure_count, 0);
    assert_eq!(interrupted.last_error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(interrupted.pending_transition, Some(Transition::CreateAndSync));

    let summary = run(&h, options).await;
    assert_eq!(summary.created, 2);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn test_dry_run_plans_without_writing() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    h.forge.add_repo(SOURCE, "web", "b1");
    let mut options = h.options();
    options.dry_run = true;

    let summary = run(&h, options).await;
    assert!(summary.dry_run);
    assert_eq!(summary.planned.len(), 4);
    assert!(
        summary
            .planned
            .iter()
            .all(|p| p.transition == Transition::CreateAndSync)
    );
    assert_eq!(summary.created, 0);
    assert!(state::list_all(&h.db).await.expect("list").is_empty());
    assert_eq!(h.forge.with(|s| s.creates), 0);
}

#[tokio::test]
async fn test_stale_plan_is_replanned_before_executing() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    run(&h, h.options()).await;

    let stale = state::find(&h.db, "api", "x").await.expect("find").expect("record");

    // Another writer touches the record after planning.
    let mut touched = stale.clone();
    touched.protection_attempted_at = Some(chrono::Utc::now().fixed_offset());
    state::compare_and_swap(&h.db, &stale, touched, "test").await.expect("swap");

    let marker = h.forge.refs(SOURCE, "api").marker();
    let item = WorklistItem {
        repo_name: "api".to_string(),
        destination: "x".to_string(),
        transition: Transition::Sync,
        evidence: Some(RepositoryRecord {
            name: "api".to_string(),
            visibility: stale.visibility,
            default_branch: "main".to_string(),
            is_archived: false,
            exists: true,
            source_marker: Some(marker),
        }),
        prior: Some(stale),
    };

    let pushes = h.forge.push_count();
    let outcome = execute_item(&h.pair_context("x", h.options()), item).await;
    assert_eq!(outcome.kind, OutcomeKind::Skipped);
    assert_eq!(h.forge.push_count(), pushes);
}

#[tokio::test]
async fn test_transitions_are_recorded_in_history() {
    let h = Harness::new().await;
    h.forge.add_repo(SOURCE, "api", "a1");
    run(&h, h.options()).await;

    let history = state::history(&h.db, "api", "x").await.expect("history");
    assert_eq!(history.len(), 3);
    for status in [SyncStatus::Absent, SyncStatus::Creating, SyncStatus::Synced] {
        assert!(
            history.iter().any(|t| t.to_status == status),
            "missing write to {status}"
        );
    }
    assert!(history.iter().all(|t| t.error_kind.is_none()));
}
