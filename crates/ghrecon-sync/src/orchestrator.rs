//! The two-phase reconciliation run.
//!
//! A batch is processed in two sequential phases: all issue candidates,
//! then all pull-request candidates. The issue phase must fully drain
//! first because a PR bundle patches payload rows the issue phase may
//! have written. Within a phase, candidates fan out over a bounded pool
//! of OS threads; each worker runs storage probe → divergence detection
//! → (skip | write) and reports one outcome on a completion channel.
//! The pool never holds more than the configured thread count in
//! flight: past the cap, one completion is received before the next
//! worker starts.
//!
//! Workers see immutable candidate snapshots (cloned at dispatch), so
//! no lock guards the candidate map; only the outcome counters and the
//! reason map are shared, each behind a mutex.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use ghrecon_core::candidate::{collapse_same_second, Batch, IssueCandidate};
use ghrecon_core::config::EngineConfig;
use ghrecon_core::github::RateLimitProbe;
use ghrecon_core::ids::{is_synthetic, synthetic_event_id};
use ghrecon_core::model::RemotePullRequest;
use ghrecon_core::redact::HideSet;
use ghrecon_core::timefmt::to_ymd_hms;
use tracing::{debug, error, info, warn};

use crate::diff::{diff_issue, diff_pr};
use crate::outcome::{Outcome, OutcomeCounters, ReasonLog};
use crate::store::{Store, StoreError};
use crate::writer::SnapshotWriter;

/// Per-phase outcome counters of one reconciliation run.
#[derive(Debug, Clone, Copy)]
pub struct BatchSummary {
    /// Issue-phase buckets 0-4 (bucket 4 stays zero in this phase).
    pub issue_counts: [u64; 5],
    /// PR-phase buckets 0-4.
    pub pr_counts: [u64; 5],
    /// Issue candidates processed.
    pub checked_issues: usize,
    /// PR candidates processed.
    pub checked_prs: usize,
}

/// One pull-request work item: the PR object plus the issue candidate
/// that carries its event context.
struct PrWork {
    carrier: IssueCandidate,
    pr: RemotePullRequest,
}

/// Drives one reconciliation run over a batch of candidates.
pub struct Reconciler {
    store: Store,
    writer: SnapshotWriter,
    config: EngineConfig,
    probe: Arc<dyn RateLimitProbe>,
}

impl Reconciler {
    /// Creates a reconciler over the given store.
    #[must_use]
    pub fn new(
        store: Store,
        hide: Arc<HideSet>,
        config: EngineConfig,
        probe: Arc<dyn RateLimitProbe>,
    ) -> Self {
        let writer = SnapshotWriter::new(store.clone(), hide, config.skip_writes);
        Self {
            store,
            writer,
            config,
            probe,
        }
    }

    /// Runs both phases over a batch and returns the outcome counters.
    ///
    /// Database failures abort the process (log, then panic): storage
    /// is the single source of truth and continuing past a write
    /// failure would corrupt future diff decisions.
    pub fn run(&self, mut batch: Batch) -> BatchSummary {
        let manual = self.config.mode.is_manual();
        let observations = batch.issue_candidates();

        // One representative per (issue, second); manual batches carry
        // exactly one present-state entry per issue already.
        if !manual {
            for list in batch.issues.values_mut() {
                let candidates = std::mem::take(list);
                *list = collapse_same_second(candidates);
            }
        }

        preflight_summary(&batch.issues);
        info!(
            issues = batch.issue_candidates(),
            prs = batch.prs.len(),
            observations,
            manual,
            "processing batch"
        );

        let issue_work: Vec<IssueCandidate> =
            batch.issues.values().flatten().cloned().collect();
        let (issue_counts, issue_reasons, checked_issues) =
            self.run_pool(&issue_work, |candidate| self.process_issue(candidate));
        self.emit_phase_summary("issues", checked_issues, &issue_counts, &issue_reasons);

        let mut pr_work = Vec::new();
        for (issue_id, pr_candidate) in &batch.prs {
            match batch.issues.get(issue_id).and_then(|list| list.last()) {
                Some(carrier) => pr_work.push(PrWork {
                    carrier: carrier.clone(),
                    pr: pr_candidate.pr.clone(),
                }),
                None => warn!(
                    issue_id,
                    pr_id = pr_candidate.pr.id,
                    "no issue candidate carries this PR, skipping"
                ),
            }
        }
        let (pr_counts, pr_reasons, checked_prs) =
            self.run_pool(&pr_work, |work| self.process_pr(work));
        self.emit_phase_summary("prs", checked_prs, &pr_counts, &pr_reasons);

        BatchSummary {
            issue_counts: issue_counts.counts(),
            pr_counts: pr_counts.counts(),
            checked_issues,
            checked_prs,
        }
    }

    /// Fans `items` out over the bounded worker pool and aggregates
    /// outcomes. Back-pressure is natural: once the pool is full, one
    /// completion is received before the next worker is spawned.
    fn run_pool<T, F>(&self, items: &[T], process: F) -> (OutcomeCounters, ReasonLog, usize)
    where
        T: Sync,
        F: Fn(&T) -> Result<(Outcome, Vec<(String, String)>), StoreError> + Sync,
    {
        let worker_cap = self.config.worker_count().max(1);
        let counters = Mutex::new(OutcomeCounters::default());
        let reasons = Mutex::new(ReasonLog::default());
        let (tx, rx) = mpsc::channel::<()>();
        let mut in_flight = 0usize;
        let mut checked = 0usize;

        thread::scope(|scope| {
            for item in items {
                let done = CompletionGuard(tx.clone());
                let counters = &counters;
                let reasons = &reasons;
                let process = &process;
                scope.spawn(move || {
                    let _done = done;
                    let (outcome, notes) = match process(item) {
                        Ok(result) => result,
                        Err(err) => fatal_db(&err),
                    };
                    lock_or_recover(counters).record(outcome);
                    if !notes.is_empty() {
                        let mut reasons = lock_or_recover(reasons);
                        for (why, what) in notes {
                            reasons.note(why, what);
                        }
                    }
                });
                in_flight += 1;
                if in_flight == worker_cap && rx.recv().is_ok() {
                    in_flight -= 1;
                    checked += 1;
                }
            }
            while in_flight > 0 {
                if rx.recv().is_err() {
                    break;
                }
                in_flight -= 1;
                checked += 1;
            }
        });

        let counters = *lock_or_recover(&counters);
        let reasons = lock_or_recover(&reasons).clone();
        (counters, reasons, checked)
    }

    fn process_issue(
        &self,
        candidate: &IssueCandidate,
    ) -> Result<(Outcome, Vec<(String, String)>), StoreError> {
        let manual = self.config.mode.is_manual();
        let second = to_ymd_hms(candidate.observed_at);
        if self.config.debug > 1 {
            debug!(candidate = %candidate, "processing issue candidate");
        }

        let stored = if manual {
            self.store.latest_issue_state(candidate.issue_id)?
        } else {
            self.store.issue_state_at(candidate.issue_id, &second)?
        };

        let Some(stored) = stored else {
            self.writer.write_issue_snapshot(candidate)?;
            if self.config.debug > 0 {
                debug!(candidate = %candidate, "added missing issue snapshot");
            }
            let note = if manual {
                (
                    "no previous issue state".to_string(),
                    format!("{} {}", candidate.repo, candidate.number),
                )
            } else {
                (
                    "no event at date".to_string(),
                    format!(
                        "{} {} {} {}",
                        candidate.repo, candidate.number, second, candidate.event_type
                    ),
                )
            };
            return Ok((Outcome::Missing, vec![note]));
        };

        // The normalizer guarantees the stored synthetic row is the
        // most up-to-date state for this second, so nothing is missed
        // by skipping.
        if !manual && is_synthetic(stored.event_id) {
            if self.config.debug > 0 {
                debug!(candidate = %candidate, "artificial snapshot already covers this second");
            }
            let what = format!(
                "{} {} {} {}",
                candidate.repo, candidate.number, second, candidate.event_type
            );
            return Ok((
                Outcome::SyntheticExists,
                vec![("already have artificial event at date".to_string(), what)],
            ));
        }

        let stored_labels = self.store.issue_label_ids(stored.event_id)?;
        let stored_assignees = self.store.issue_assignee_ids(stored.event_id)?;
        let divergence = diff_issue(candidate, &stored, &stored_labels, &stored_assignees);
        if !divergence.any_changed() {
            return Ok((Outcome::Unchanged, Vec::new()));
        }

        let notes = divergence
            .deltas
            .iter()
            .map(|delta| {
                let why = format!("changed issue {}", delta.field);
                let what = if manual {
                    format!("{} {}: {delta}", candidate.repo, candidate.number)
                } else {
                    format!(
                        "{} {} {} {}: {delta}",
                        candidate.repo, candidate.number, second, candidate.event_type
                    )
                };
                (why, what)
            })
            .collect();
        self.writer.write_issue_snapshot(candidate)?;
        if self.config.debug > 0 {
            debug!(
                candidate = %candidate,
                prior_event_id = stored.event_id,
                "patched diverged issue snapshot"
            );
        }
        Ok((Outcome::Patched, notes))
    }

    fn process_pr(&self, work: &PrWork) -> Result<(Outcome, Vec<(String, String)>), StoreError> {
        let manual = self.config.mode.is_manual();
        let carrier = &work.carrier;
        let pr = &work.pr;
        let updated_second = to_ymd_hms(pr.updated_at);
        if self.config.debug > 1 {
            debug!(pr_id = pr.id, candidate = %carrier, "processing PR candidate");
        }

        if !manual {
            let event_id = synthetic_event_id(carrier.event_id);
            if self.store.pr_collision(pr.id, event_id, &updated_second)? {
                if self.config.debug > 0 {
                    debug!(pr_id = pr.id, updated_at = %updated_second, "exact PR snapshot exists under another timestamp, skipping");
                }
                return Ok((Outcome::Collision, Vec::new()));
            }
        }

        let stored = if manual {
            self.store.latest_pr_state(pr.id)?
        } else {
            self.store.pr_state_at(pr.id, &updated_second)?
        };

        let Some(stored) = stored else {
            self.writer.write_pr_snapshot(carrier, pr)?;
            if self.config.debug > 0 {
                debug!(pr_id = pr.id, candidate = %carrier, "added missing PR snapshot");
            }
            let note = if manual {
                (
                    "no previous pr state".to_string(),
                    format!("{} {}", carrier.repo, pr.number),
                )
            } else {
                (
                    "no pr state at date".to_string(),
                    format!("{} {} {}", carrier.repo, pr.number, updated_second),
                )
            };
            return Ok((Outcome::Missing, vec![note]));
        };

        if !manual && is_synthetic(stored.event_id) {
            if self.config.debug > 0 {
                debug!(pr_id = pr.id, candidate = %carrier, "artificial PR snapshot already covers this second");
            }
            let what = format!("{} {} {}", carrier.repo, pr.number, updated_second);
            return Ok((
                Outcome::SyntheticExists,
                vec![("already have artificial pr event at date".to_string(), what)],
            ));
        }

        // Labels live on the carrying issue; assignees and reviewers
        // have dedicated PR joins.
        let stored_labels = self.store.issue_label_ids(stored.event_id)?;
        let stored_assignees = self.store.pr_assignee_ids(stored.event_id)?;
        let stored_reviewers = self.store.pr_reviewer_ids(stored.event_id)?;
        let divergence = diff_pr(
            carrier,
            pr,
            &stored,
            &stored_labels,
            &stored_assignees,
            &stored_reviewers,
        );
        if !divergence.any_changed() {
            return Ok((Outcome::Unchanged, Vec::new()));
        }

        let notes = divergence
            .deltas
            .iter()
            .map(|delta| {
                let why = format!("changed pr {}", delta.field);
                let what = if manual {
                    format!("{} {}: {delta}", carrier.repo, pr.number)
                } else {
                    format!("{} {} {}: {delta}", carrier.repo, pr.number, updated_second)
                };
                (why, what)
            })
            .collect();
        self.writer.write_pr_snapshot(carrier, pr)?;
        if self.config.debug > 0 {
            debug!(
                pr_id = pr.id,
                prior_event_id = stored.event_id,
                "patched diverged PR snapshot"
            );
        }
        Ok((Outcome::Patched, notes))
    }

    fn emit_phase_summary(
        &self,
        phase: &str,
        checked: usize,
        counters: &OutcomeCounters,
        reasons: &ReasonLog,
    ) {
        for (why, whats) in reasons.iter() {
            info!(phase, reason = why, affected = whats.len(), "reconciliation reason");
            for what in whats {
                debug!(phase, reason = why, entity = %what, "affected entity");
            }
        }
        let limits = self.probe.rate_limits(true);
        let counts = counters.counts();
        if self.config.mode.is_manual() {
            info!(
                phase,
                checked,
                new = counts[0],
                not_needed = counts[2],
                added = counts[3],
                api_points_remaining = limits.remaining,
                reset_in = ?limits.reset_in,
                "phase complete (manual mode)"
            );
        } else {
            info!(
                phase,
                checked,
                new_for_date = counts[0],
                artificial_exists = counts[1],
                not_needed = counts[2],
                added = counts[3],
                collisions = counts[4],
                api_points_remaining = limits.remaining,
                reset_in = ?limits.reset_in,
                "phase complete"
            );
        }
    }
}

/// Logs every (repo, number) key with its sorted per-second
/// observation history before a phase starts.
fn preflight_summary(issues: &BTreeMap<i64, Vec<IssueCandidate>>) {
    let mut data: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for candidate in issues.values().flatten() {
        data.entry(format!("{} {}", candidate.repo, candidate.number))
            .or_default()
            .push(format!(
                "{} {}",
                to_ymd_hms(candidate.observed_at),
                candidate.event_type
            ));
    }
    info!(entities = data.len(), "issues to process");
    for (key, mut values) in data {
        values.sort();
        info!(entity = %key, history = %values.join(", "), "observation history");
    }
}

/// Sends one completion token when dropped, so the pool's receive loop
/// advances even if the worker panicked.
struct CompletionGuard(Sender<()>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn fatal_db(err: &StoreError) -> ! {
    error!(error = %err, "database failure, aborting run");
    panic!("database failure: {err}");
}
