//! Run coordinator: enumerate, reconcile, execute, summarize.
//!
//! Items execute concurrently under a semaphore; every destination request
//! also passes through that destination's limiter. Setting the shutdown flag
//! stops dispatch: queued items are reported as cancelled and in-flight items
//! stop at their next network boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::sync::{Semaphore, mpsc};

use crate::entity::error_kind::ErrorKind;
use crate::entity::sync_status::SyncStatus;
use crate::state;

use super::adapter::{DestinationAdapter, SourceAccess};
use super::enumerate::enumerate_source;
use super::errors::RunError;
use super::executor::{PairContext, execute_item};
use super::progress::{MirrorProgress, ProgressCallback, emit};
use super::reconcile::{ReconcileOptions, reconcile};
use super::summary::{OutcomeKind, PairOutcome, PlannedItem, RunSummary};
use super::types::{MirrorOptions, Worklist, WorklistItem};

/// Drives one mirror run over every configured destination.
pub struct RunCoordinator {
    db: DatabaseConnection,
    source: Arc<SourceAccess>,
    destinations: Vec<Arc<DestinationAdapter>>,
    options: Arc<MirrorOptions>,
    shutdown: Arc<AtomicBool>,
}

impl RunCoordinator {
    pub fn new(
        db: DatabaseConnection,
        source: SourceAccess,
        destinations: Vec<DestinationAdapter>,
        options: MirrorOptions,
    ) -> Self {
        Self {
            db,
            source: Arc::new(source),
            destinations: destinations.into_iter().map(Arc::new).collect(),
            options: Arc::new(options),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag (e.g. one set by Ctrl+C).
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    fn destination_ids(&self) -> Vec<String> {
        self.destinations.iter().map(|d| d.id().to_string()).collect()
    }

    /// Execute one run.
    ///
    /// Fails only when the source inventory cannot be trusted or the state
    /// store cannot be read; per-pair failures land in the summary.
    pub async fn run(&self, on_progress: Option<&ProgressCallback>) -> Result<RunSummary, RunError> {
        let started = std::time::Instant::now();
        tracing::info!(
            source = %self.options.source_org,
            destinations = self.destinations.len(),
            dry_run = self.options.dry_run,
            "Starting mirror run"
        );

        let inventory =
            enumerate_source(&self.source, self.options.marker_concurrency, on_progress).await?;

        let destinations = self.destination_ids();
        let states = state::list_all(&self.db).await?;
        let worklist = reconcile(
            &inventory,
            &states,
            &destinations,
            &ReconcileOptions::from(self.options.as_ref()),
            Utc::now(),
        );
        report_worklist(&worklist, on_progress);

        let mut summary = RunSummary::from_worklist(&worklist);

        if self.options.dry_run {
            summary.dry_run = true;
            summary.planned = worklist
                .items
                .iter()
                .map(|item| PlannedItem {
                    repo: item.repo_name.clone(),
                    destination: item.destination.clone(),
                    transition: item.transition,
                })
                .collect();
        } else {
            self.execute_all(worklist.items, &mut summary, on_progress)
                .await;
        }

        let degraded: Vec<_> = state::list_by_status(&self.db, SyncStatus::Degraded)
            .await?
            .into_iter()
            .filter(|s| destinations.contains(&s.destination))
            .collect();
        summary.set_degraded(&degraded);

        tracing::info!(
            created = summary.created,
            synced_changed = summary.synced_changed,
            synced_noop = summary.synced_noop,
            tombstoned = summary.tombstoned,
            failed = summary.failed_this_run,
            degraded = summary.degraded,
            cancelled = summary.skipped_cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Mirror run complete"
        );

        Ok(summary)
    }

    async fn execute_all(
        &self,
        items: Vec<WorklistItem>,
        summary: &mut RunSummary,
        on_progress: Option<&ProgressCallback>,
    ) {
        if items.is_empty() {
            return;
        }

        let concurrency = self.options.max_concurrency.clamp(1, items.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (started_tx, mut started_rx) = mpsc::unbounded_channel::<MirrorProgress>();

        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let Some(adapter) = self
                .destinations
                .iter()
                .find(|d| d.id() == item.destination)
                .cloned()
            else {
                continue;
            };
            let ctx = PairContext {
                db: self.db.clone(),
                source: Arc::clone(&self.source),
                adapter,
                options: Arc::clone(&self.options),
                cancel: Arc::clone(&self.shutdown),
            };
            let semaphore = Arc::clone(&semaphore);
            let started_tx = started_tx.clone();
            let pair = item.pair();
            let transition = item.transition;

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            false,
                            PairOutcome {
                                pair: item.pair(),
                                transition: item.transition,
                                kind: OutcomeKind::Failed {
                                    kind: ErrorKind::Internal,
                                    message: "Semaphore closed unexpectedly".to_string(),
                                    status: item
                                        .prior
                                        .as_ref()
                                        .map(|p| p.status)
                                        .unwrap_or(SyncStatus::Absent),
                                },
                            },
                        );
                    }
                };

                if ctx.cancel.load(Ordering::SeqCst) {
                    return (
                        false,
                        PairOutcome {
                            pair: item.pair(),
                            transition: item.transition,
                            kind: OutcomeKind::Cancelled,
                        },
                    );
                }

                ctx.adapter.limiter().wait().await;

                let _ = started_tx.send(MirrorProgress::PairStarted {
                    repo: item.repo_name.clone(),
                    destination: item.destination.clone(),
                    transition: item.transition,
                });

                (true, execute_item(&ctx, item).await)
            });

            handles.push((pair, transition, handle));
        }
        drop(started_tx);

        let mut not_started = 0usize;
        for (pair, transition, handle) in handles {
            let result = handle.await;
            while let Ok(event) = started_rx.try_recv() {
                emit(on_progress, event);
            }

            let outcome = match result {
                Ok((started, outcome)) => {
                    if !started && outcome.kind == OutcomeKind::Cancelled {
                        not_started += 1;
                    }
                    outcome
                }
                Err(e) => {
                    tracing::error!(%pair, error = %e, "Pair task panicked");
                    PairOutcome {
                        pair,
                        transition,
                        kind: OutcomeKind::Failed {
                            kind: ErrorKind::Internal,
                            message: format!("Task panic: {e}"),
                            status: SyncStatus::Absent,
                        },
                    }
                }
            };

            report_outcome(&outcome, on_progress);
            summary.record(&outcome);
        }

        if not_started > 0 {
            tracing::warn!(remaining = not_started, "Dispatch stopped by shutdown");
            emit(
                on_progress,
                MirrorProgress::DispatchStopped {
                    remaining: not_started,
                },
            );
        }
    }
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("source", &self.source)
            .field("destinations", &self.destination_ids())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn report_worklist(worklist: &Worklist, on_progress: Option<&ProgressCallback>) {
    tracing::info!(
        items = worklist.items.len(),
        up_to_date = worklist.up_to_date.len(),
        deferred = worklist.deferred.len(),
        suspended = worklist.suspended.len(),
        in_flight = worklist.in_flight.len(),
        "Worklist ready"
    );
    for pair in &worklist.orphaned {
        tracing::warn!(%pair, "Source repository gone and soft delete disabled; leaving destination");
    }
    for pair in &worklist.tombstoned_reappeared {
        tracing::warn!(%pair, "Tombstoned repository exists again in the source; revive to resume");
    }

    emit(
        on_progress,
        MirrorProgress::WorklistReady {
            items: worklist.items.len(),
            up_to_date: worklist.up_to_date.len(),
            deferred: worklist.deferred.len(),
            suspended: worklist.suspended.len(),
            in_flight: worklist.in_flight.len(),
            orphaned: worklist.orphaned.len(),
            tombstoned_reappeared: worklist.tombstoned_reappeared.len(),
        },
    );
}

fn report_outcome(outcome: &PairOutcome, on_progress: Option<&ProgressCallback>) {
    let repo = outcome.pair.repo.clone();
    let destination = outcome.pair.destination.clone();
    let transition = outcome.transition;

    let event = match &outcome.kind {
        OutcomeKind::Created | OutcomeKind::SyncedChanged => MirrorProgress::PairSucceeded {
            repo,
            destination,
            transition,
            status: SyncStatus::Synced,
            changed: true,
        },
        OutcomeKind::SyncedNoop | OutcomeKind::Skipped => MirrorProgress::PairSucceeded {
            repo,
            destination,
            transition,
            status: SyncStatus::Synced,
            changed: false,
        },
        OutcomeKind::Tombstoned => MirrorProgress::PairSucceeded {
            repo,
            destination,
            transition,
            status: SyncStatus::Tombstoned,
            changed: true,
        },
        OutcomeKind::Failed {
            kind,
            message,
            status,
        } => MirrorProgress::PairFailed {
            repo,
            destination,
            transition,
            status: *status,
            kind: *kind,
            error: message.clone(),
        },
        OutcomeKind::Cancelled => return,
    };
    emit(on_progress, event);
}
