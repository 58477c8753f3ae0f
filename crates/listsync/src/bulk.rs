//! Bulk fan-out with bounded concurrency and cancellation.
//!
//! A bulk operation is a list of targets, each run as its own task. At most
//! `workers` tasks run at once (a [`Semaphore`] hands out permits). Once the
//! cancellation token fires no further target is dispatched; targets already
//! running finish, and the rest are reported as `cancelled`. A failing target
//! never affects the others.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use listsync_core::{CredentialId, Field, Listing, ListingId, LocationId, Platform};

use crate::engine::now_millis;
use crate::error::{EngineError, ErrorKind, Result};

/// What a job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Publish,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Listing is `synced`.
    Synced,
    /// Sync succeeded and found these fields divergent.
    Discrepant { fields: Vec<Field> },
    /// The job failed; `error` classifies the failure.
    Failed { error: ErrorKind, reason: String },
    /// Never dispatched.
    Cancelled,
}

/// Ephemeral record of one sync or publish on one target. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub kind: JobKind,
    /// `None` when no listing could be determined (ambiguous credentials).
    pub listing_id: Option<ListingId>,
    pub location_id: LocationId,
    pub platform: Platform,
    pub credential_id: Option<CredentialId>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl JobReport {
    /// A not-yet-run job. Its outcome stays `Cancelled` unless it runs.
    pub fn pending(
        kind: JobKind,
        location_id: LocationId,
        platform: Platform,
        credential_id: Option<CredentialId>,
    ) -> Self {
        let listing_id = credential_id
            .as_ref()
            .map(|c| ListingId::derive(&location_id, platform, c));
        Self {
            kind,
            listing_id,
            location_id,
            platform,
            credential_id,
            started_at: None,
            finished_at: None,
            outcome: JobOutcome::Cancelled,
        }
    }

    pub fn for_listing(kind: JobKind, listing: &Listing) -> Self {
        Self::pending(
            kind,
            listing.location_id.clone(),
            listing.platform,
            Some(listing.credential_id.clone()),
        )
    }

    /// Fill in the outcome of a job that started at `started_at`.
    pub fn complete(mut self, started_at: i64, result: &Result<Listing>) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(now_millis());
        self.outcome = match result {
            Ok(listing) if listing.has_discrepancies() => JobOutcome::Discrepant {
                fields: listing.discrepancies.fields().collect(),
            },
            Ok(_) => JobOutcome::Synced,
            Err(error) => JobOutcome::Failed {
                error: error.kind(),
                reason: error.to_string(),
            },
        };
        self
    }

    /// A job that failed before it could run.
    pub fn rejected(mut self, error: &EngineError) -> Self {
        self.outcome = JobOutcome::Failed {
            error: error.kind(),
            reason: error.to_string(),
        };
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            JobOutcome::Synced | JobOutcome::Discrepant { .. }
        )
    }
}

/// Outcome counts. `total = succeeded + discrepant + failed + cancelled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub discrepant: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Per-target results of a bulk operation, in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub jobs: Vec<JobReport>,
    /// Whether cancellation stopped dispatch before every target ran.
    pub cancelled: bool,
}

impl BulkResult {
    pub fn summary(&self) -> BulkSummary {
        let mut summary = BulkSummary {
            total: self.jobs.len(),
            ..BulkSummary::default()
        };
        for job in &self.jobs {
            match job.outcome {
                JobOutcome::Synced => summary.succeeded += 1,
                JobOutcome::Discrepant { .. } => summary.discrepant += 1,
                JobOutcome::Failed { .. } => summary.failed += 1,
                JobOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Report for `listing_id`, if it was a target.
    pub fn job(&self, listing_id: &ListingId) -> Option<&JobReport> {
        self.jobs
            .iter()
            .find(|j| j.listing_id.as_ref() == Some(listing_id))
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
    }

    pub(crate) fn extend(&mut self, reports: impl IntoIterator<Item = JobReport>) {
        self.jobs.extend(reports);
    }
}

/// Run `work` over `targets` with at most `workers` in flight.
///
/// Each target comes with its pending report, which is used as-is for
/// cancelled targets and as the base for a failed one if its task panics.
pub(crate) async fn run<T, F, Fut>(
    op: &'static str,
    targets: Vec<(JobReport, T)>,
    workers: usize,
    cancel: &CancellationToken,
    work: F,
) -> BulkResult
where
    T: Send + 'static,
    F: Fn(JobReport, T) -> Fut,
    Fut: Future<Output = JobReport> + Send + 'static,
{
    let templates: Vec<JobReport> = targets.iter().map(|(r, _)| r.clone()).collect();
    let mut slots: Vec<Option<JobReport>> = vec![None; templates.len()];
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut stopped = false;

    for (idx, (template, target)) in targets.into_iter().enumerate() {
        if stopped {
            slots[idx] = Some(template);
            continue;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            stopped = true;
            slots[idx] = Some(template);
            continue;
        };

        let job = work(template, target);
        tasks.spawn(async move {
            let _permit = permit;
            (idx, job.await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, report)) => slots[idx] = Some(report),
            Err(e) => tracing::warn!(op, error = %e, "bulk worker task failed"),
        }
    }

    let jobs = slots
        .into_iter()
        .zip(templates)
        .map(|(slot, template)| {
            slot.unwrap_or_else(|| {
                template.rejected(&EngineError::Internal("worker task failed".into()))
            })
        })
        .collect();

    let result = BulkResult {
        jobs,
        cancelled: stopped,
    };
    let summary = result.summary();
    tracing::info!(
        op,
        total = summary.total,
        succeeded = summary.succeeded,
        discrepant = summary.discrepant,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "bulk operation finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn template(n: usize) -> JobReport {
        JobReport::pending(
            JobKind::Sync,
            LocationId::new(format!("loc-{}", n)),
            Platform::Google,
            Some(CredentialId::new("c1")),
        )
    }

    fn targets(n: usize) -> Vec<(JobReport, usize)> {
        (0..n).map(|i| (template(i), i)).collect()
    }

    fn done(mut report: JobReport) -> JobReport {
        report.outcome = JobOutcome::Synced;
        report
    }

    #[tokio::test]
    async fn test_results_keep_target_order() {
        let cancel = CancellationToken::new();
        let result = run("test", targets(5), 2, &cancel, |report, i| async move {
            // later targets finish first
            tokio::time::sleep(Duration::from_millis(5 * (5 - i as u64))).await;
            done(report)
        })
        .await;

        let locations: Vec<_> = result.jobs.iter().map(|j| j.location_id.to_string()).collect();
        assert_eq!(locations, vec!["loc-0", "loc-1", "loc-2", "loc-3", "loc-4"]);
        assert_eq!(result.summary().succeeded, 5);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let result = run("test", targets(12), 3, &cancel, |report, _| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done(report)
            }
        })
        .await;

        assert_eq!(result.summary().succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dispatched = Arc::new(AtomicUsize::new(0));

        let result = run("test", targets(4), 2, &cancel, |report, _| {
            dispatched.fetch_add(1, Ordering::SeqCst);
            async move { done(report) }
        })
        .await;

        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert_eq!(result.summary().cancelled, 4);
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_failed() {
        let cancel = CancellationToken::new();
        let result = run("test", targets(3), 3, &cancel, |report, i| async move {
            if i == 1 {
                panic!("adapter bug");
            }
            done(report)
        })
        .await;

        let summary = result.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            result.jobs[1].outcome,
            JobOutcome::Failed {
                error: ErrorKind::Internal,
                ..
            }
        ));
    }

    #[test]
    fn test_report_json_shape() {
        let report = template(0).rejected(&EngineError::Conflict(ListingId::from_bytes([0; 32])));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["error"], "conflict");
        assert_eq!(json["kind"], "sync");
        assert_eq!(json["platform"], "google");
    }
}
