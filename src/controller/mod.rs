//! The batch loop that walks the duplicates queue.
//!
//! For every row the controller reads the pair identity, decides through the
//! configured [`MergePolicy`], and drives the adapter through selection and
//! merge. A failing pair is cancelled and recorded; only a
//! [`RunError`] (the queue itself is gone) ends the run early.

mod processed;
mod report;

pub use processed::{FailureLedger, PairKey, ProcessedSet};
pub use report::{PairOutcome, PairReport, PairState, RejectCause, RunSummary, SkipCause, StopReason};

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::{Instrument, debug, info, info_span, warn};

use crate::adapter::UiAdapter;
use crate::attributes::RecordAttributes;
use crate::config::{Config, RunConfig, TimeoutConfig};
use crate::error::{PairError, RunError, UiError};
use crate::policy::{self, MergeDecision, MergePolicy, RejectReason, Side, Verdict};
use crate::retry::{RetryDecision, RetryPolicy, RetryReason, retry_with_backoff};

/// What happened to a pair whose comparison view was opened.
enum Resolution {
    Merged(MergeDecision),
    Reject(RejectReason),
    DryRun(MergeDecision),
}

type PairObserver = Box<dyn FnMut(&PairReport) + Send>;

pub struct Controller<A: UiAdapter> {
    adapter: A,
    policy: Box<dyn MergePolicy>,
    run: RunConfig,
    extraction: RetryPolicy,
    verification: RetryPolicy,
    timeouts: TimeoutConfig,
    processed: ProcessedSet,
    failures: FailureLedger,
    /// Pairs deliberately left in the queue; the row scan steps over them.
    left_in_place: HashSet<PairKey>,
    /// Pairs reported at least once. Only a pair's first report counts
    /// toward the limit.
    seen: HashSet<PairKey>,
    observer: Option<PairObserver>,
}

impl<A: UiAdapter> Controller<A> {
    /// Build a controller with the policy selected by `config.policy`.
    pub fn new(adapter: A, config: &Config) -> Self {
        Self {
            adapter,
            policy: policy::from_config(&config.policy),
            run: config.run.clone(),
            extraction: config.retry.extraction.to_policy(),
            verification: config.retry.verification.to_policy(),
            timeouts: config.timeouts.clone(),
            processed: ProcessedSet::new(),
            failures: FailureLedger::default(),
            left_in_place: HashSet::new(),
            seen: HashSet::new(),
            observer: None,
        }
    }

    /// Call `observer` after every pair.
    pub fn on_pair(mut self, observer: impl FnMut(&PairReport) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn failures(&self) -> &FailureLedger {
        &self.failures
    }

    /// Work through the queue until the pair limit is reached or the queue
    /// runs out.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();

        let pending = self
            .step_retrying("count pending pairs", || self.adapter.count_pending())
            .await
            .map_err(fatal)?;
        let requested = self.run.effective_limit();
        let clamped = requested > pending;
        let limit = if clamped {
            warn!(requested, pending, "fewer pairs in the queue than requested");
            pending
        } else {
            requested
        };
        info!(
            adapter = self.adapter.name(),
            policy = self.policy.name(),
            limit,
            auto_skip = self.run.auto_skip,
            dry_run = self.run.dry_run,
            "starting batch"
        );

        let mut taken = 0;
        while taken < limit {
            let index = summary.attempted + 1;
            let Some(report) = self.process_next(index).await? else {
                info!(left_in_place = self.left_in_place.len(), "no more pairs in the queue");
                summary.stop = Some(StopReason::QueueEmpty);
                break;
            };

            summary.record(&report.outcome);
            if self.seen.insert(report.key.clone()) {
                taken += 1;
            }
            if let Some(observer) = self.observer.as_mut() {
                observer(&report);
            }

            self.refresh().await?;
        }

        summary.stop.get_or_insert(if clamped {
            StopReason::QueueEmpty
        } else {
            StopReason::LimitReached
        });
        info!(
            attempted = summary.attempted,
            merged = summary.merged,
            rejected = summary.rejected,
            skipped = summary.skipped,
            failed = summary.failed,
            succeeded = summary.succeeded(),
            "batch finished"
        );
        Ok(summary)
    }

    /// Handle the next row in the queue. `None` when no row is left to work on.
    pub async fn process_next(&mut self, index: usize) -> Result<Option<PairReport>, RunError> {
        let Some((row, key)) = self.next_row().await? else {
            return Ok(None);
        };

        let span = info_span!("pair", index, pair = %key);
        let report = self.handle_row(index, &row, key).instrument(span).await?;
        Ok(Some(report))
    }

    /// Scan from the top for the first row whose pair is not left in place.
    ///
    /// A row whose identity stays unreadable is stepped over for this scan
    /// only; the next scan reads it again.
    async fn next_row(&self) -> Result<Option<(A::Row, PairKey)>, RunError> {
        let mut position = 0;
        loop {
            let row = self
                .step_retrying("locate next row", || self.adapter.locate_next_row(position))
                .await
                .map_err(fatal)?;
            let Some(row) = row else {
                return Ok(None);
            };

            let identity = self
                .step_retrying("read pair identity", || self.adapter.extract_pair_identity(&row))
                .await;
            match identity {
                Ok((left_id, right_id)) => {
                    let key = PairKey::new(left_id, right_id);
                    if !self.left_in_place.contains(&key) {
                        return Ok(Some((row, key)));
                    }
                    debug!(position, pair = %key, "stepping over pair left in place");
                }
                Err(PairError::Ui(err)) if err.is_fatal() => return Err(err.into()),
                Err(err) => warn!(position, error = %err, "pair identity unreadable, stepping over row"),
            }
            position += 1;
        }
    }

    async fn refresh(&self) -> Result<(), RunError> {
        match self
            .step_retrying("refresh queue", || self.adapter.refresh_queue())
            .await
        {
            Ok(()) => Ok(()),
            Err(PairError::Ui(err)) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "queue refresh failed, carrying on");
                Ok(())
            }
        }
    }

    async fn handle_row(&mut self, index: usize, row: &A::Row, key: PairKey) -> Result<PairReport, RunError> {
        debug!(state = %PairState::RowLocated, "row located");

        if self.processed.contains(&key) {
            debug!(state = %PairState::AlreadyProcessed, "pair resurfaced, rejecting");
            // Rejected once; if it comes back again it stays where it is.
            self.left_in_place.insert(key.clone());
            let outcome = match self.step("reject row", self.adapter.reject(row)).await {
                Ok(()) => PairOutcome::Rejected(RejectCause::AlreadyProcessed),
                Err(PairError::Ui(err)) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(error = %err, "could not reject resurfaced pair");
                    self.failures.record(&key);
                    PairOutcome::Failed(err)
                }
            };
            return Ok(self.finish(index, key, outcome, PairState::AlreadyProcessed));
        }

        if self.failures.count(&key) >= self.run.max_pair_failures {
            warn!(
                failures = self.failures.count(&key),
                "pair already failed too often, leaving it in the queue"
            );
            self.left_in_place.insert(key.clone());
            let outcome = PairOutcome::Skipped(SkipCause::RepeatedFailure);
            return Ok(self.finish(index, key, outcome, PairState::RowLocated));
        }

        let mut state = PairState::RowLocated;
        let result = self.attempt(row, &mut state).await;

        let outcome = match result {
            Ok(Resolution::Merged(decision)) => {
                self.processed.insert(key.clone());
                PairOutcome::Merged(decision)
            }
            Ok(Resolution::Reject(reason)) => {
                self.processed.insert(key.clone());
                PairOutcome::Rejected(RejectCause::Policy(reason))
            }
            Ok(Resolution::DryRun(decision)) => {
                self.processed.insert(key.clone());
                self.left_in_place.insert(key.clone());
                PairOutcome::Skipped(SkipCause::DryRun(decision))
            }
            Err(PairError::Ui(err)) if err.is_fatal() => return Err(err.into()),
            Err(err) => self.recover(row, &key, err, state).await?,
        };

        Ok(self.finish(index, key, outcome, state))
    }

    fn finish(&self, index: usize, key: PairKey, outcome: PairOutcome, state: PairState) -> PairReport {
        let label = outcome.label();
        match &outcome {
            PairOutcome::Failed(_) => warn!(outcome = label, detail = %outcome, "pair done"),
            _ => info!(outcome = label, detail = %outcome, "pair done"),
        }
        PairReport {
            index,
            key,
            outcome,
            state,
        }
    }

    /// Record a pair-level failure and apply the skip policy.
    ///
    /// A failed pair left in the queue is tried again when the scan reaches
    /// it, until the failure ledger passes it over.
    async fn recover(
        &mut self,
        row: &A::Row,
        key: &PairKey,
        err: PairError,
        state: PairState,
    ) -> Result<PairOutcome, RunError> {
        let failures = self.failures.record(key);
        warn!(error = %err, %state, failures, "pair failed");
        debug!(state = %PairState::Idle, "pair abandoned");

        if !self.run.auto_skip {
            return Ok(PairOutcome::Failed(err));
        }

        match self.step("reject row", self.adapter.reject(row)).await {
            Ok(()) => {
                self.processed.insert(key.clone());
                Ok(PairOutcome::Skipped(SkipCause::AutoSkip(err)))
            }
            Err(PairError::Ui(reject_err)) if reject_err.is_fatal() => Err(reject_err.into()),
            Err(reject_err) => {
                warn!(error = %reject_err, "auto-skip could not reject the pair");
                Ok(PairOutcome::Failed(err))
            }
        }
    }

    /// Open the comparison view and take the pair as far as it goes.
    ///
    /// The view is always closed again unless the merge closed it.
    async fn attempt(&self, row: &A::Row, state: &mut PairState) -> Result<Resolution, PairError> {
        let modal = self
            .step("open comparison", self.adapter.open_comparison(row))
            .await?;
        *state = PairState::ModalOpened;
        debug!(state = %state, "comparison open");

        let result = self.resolve(&modal, state).await;
        match &result {
            Ok(Resolution::Merged(_)) => {}
            Ok(Resolution::Reject(_)) => {
                self.step("cancel comparison", self.adapter.cancel(&modal)).await?;
                self.step("reject row", self.adapter.reject(row)).await?;
            }
            Ok(Resolution::DryRun(_)) | Err(_) => {
                if let Err(err) = self.step("cancel comparison", self.adapter.cancel(&modal)).await {
                    warn!(error = %err, "could not close comparison view");
                }
            }
        }
        result
    }

    async fn resolve(&self, modal: &A::Modal, state: &mut PairState) -> Result<Resolution, PairError> {
        let (left, right) = self.extract(modal).await?;
        *state = PairState::AttributesExtracted;
        debug!(
            state = %state,
            left_count = ?left.contact_count,
            right_count = ?right.contact_count,
            left_domain = ?left.domain,
            right_domain = ?right.domain,
            "attributes read"
        );

        let verdict = self.policy.decide(&left, &right);
        *state = PairState::DecisionMade;
        let decision = match verdict {
            Verdict::Reject { reason } => {
                info!(%reason, "policy rejected pair");
                return Ok(Resolution::Reject(reason));
            }
            Verdict::Merge(decision) => decision,
        };
        if decision.is_ambiguous() {
            info!("no signal separates the records, keeping left");
        } else {
            debug!(state = %state, primary = %decision.primary, rule = %decision.rule, "decision made");
        }

        if self.run.dry_run {
            return Ok(Resolution::DryRun(decision));
        }

        self.reconcile_selection(modal, decision.primary).await?;
        *state = PairState::SelectionReconciled;

        self.step_within(self.timeouts.merge(), "confirm merge", self.adapter.confirm_merge(modal))
            .await?;
        *state = PairState::MergeConfirmed;
        debug!(state = %state, "merge completed");
        *state = PairState::Merged;

        Ok(Resolution::Merged(decision))
    }

    /// Read and parse both records, polling until they are readable.
    async fn extract(&self, modal: &A::Modal) -> Result<(RecordAttributes, RecordAttributes), PairError> {
        let result = retry_with_backoff(
            &self.extraction,
            |_attempt| async move {
                let left = self
                    .step("read left record", self.adapter.extract_attributes(modal, Side::Left))
                    .await?;
                let right = self
                    .step("read right record", self.adapter.extract_attributes(modal, Side::Right))
                    .await?;
                let left = RecordAttributes::parse(Side::Left, &left)?;
                let right = RecordAttributes::parse(Side::Right, &right)?;
                Ok::<_, PairError>((left, right))
            },
            classify_extraction,
            |info| {
                debug!(
                    attempt = info.attempt,
                    delay_ms = info.delay.as_millis() as u64,
                    reason = info.reason.as_str(),
                    "record fields not readable yet"
                )
            },
        )
        .await;

        result.map_err(|err| match err {
            PairError::Ui(source) if source.is_transient() => PairError::Transient {
                attempts: self.extraction.max_attempts.max(1),
                source,
            },
            other => other,
        })
    }

    /// Make `desired` the selected record, clicking only when needed.
    async fn reconcile_selection(&self, modal: &A::Modal, desired: Side) -> Result<(), PairError> {
        let current = self
            .step("read selection", self.adapter.current_selection(modal))
            .await?;
        if current == Some(desired) {
            debug!(side = %desired, "selection already correct");
            return Ok(());
        }

        debug!(from = ?current, to = %desired, "changing selection");
        self.step("set selection", self.adapter.set_selection(modal, desired))
            .await?;

        retry_with_backoff(
            &self.verification,
            |_attempt| async move {
                match self
                    .step("read selection", self.adapter.current_selection(modal))
                    .await?
                {
                    Some(side) if side == desired => Ok(()),
                    _ => Err(PairError::ActionVerificationFailed {
                        action: format!("selecting the {desired} record"),
                    }),
                }
            },
            classify_verification,
            |info| debug!(attempt = info.attempt, "selection not applied yet"),
        )
        .await
    }

    /// A queue-level step, retried on transient errors with the extraction
    /// policy.
    async fn step_retrying<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, PairError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UiError>>,
    {
        retry_with_backoff(
            &self.extraction,
            |_attempt| self.step(what, op()),
            classify_transient,
            |info| debug!(step = what, attempt = info.attempt, reason = info.reason.as_str(), "retrying"),
        )
        .await
    }

    async fn step<T, F>(&self, what: &'static str, fut: F) -> Result<T, PairError>
    where
        F: Future<Output = Result<T, UiError>>,
    {
        self.step_within(self.timeouts.step(), what, fut).await
    }

    async fn step_within<T, F>(&self, limit: Duration, what: &'static str, fut: F) -> Result<T, PairError>
    where
        F: Future<Output = Result<T, UiError>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(PairError::from),
            Err(_) => Err(PairError::Timeout {
                step: what,
                after: limit,
            }),
        }
    }
}

fn fatal(err: PairError) -> RunError {
    RunError::FatalEnvironment(err.to_string())
}

fn classify_transient<T>(result: &Result<T, PairError>) -> RetryDecision {
    match result {
        Err(PairError::Ui(err)) if err.is_transient() => RetryDecision::Retry {
            reason: RetryReason::NotReady,
        },
        Err(PairError::Timeout { .. }) => RetryDecision::Retry {
            reason: RetryReason::Timeout,
        },
        _ => RetryDecision::DoNotRetry,
    }
}

fn classify_extraction<T>(result: &Result<T, PairError>) -> RetryDecision {
    match result {
        Err(PairError::Ui(err)) if err.is_transient() => RetryDecision::Retry {
            reason: RetryReason::NotReady,
        },
        Err(PairError::ExtractionAmbiguous { .. }) => RetryDecision::Retry {
            reason: RetryReason::Unparseable,
        },
        Err(PairError::Timeout { .. }) => RetryDecision::Retry {
            reason: RetryReason::Timeout,
        },
        _ => RetryDecision::DoNotRetry,
    }
}

fn classify_verification<T>(result: &Result<T, PairError>) -> RetryDecision {
    match result {
        Err(PairError::ActionVerificationFailed { .. }) => RetryDecision::Retry {
            reason: RetryReason::NotApplied,
        },
        Err(PairError::Ui(err)) if err.is_transient() => RetryDecision::Retry {
            reason: RetryReason::NotReady,
        },
        Err(PairError::Timeout { .. }) => RetryDecision::Retry {
            reason: RetryReason::Timeout,
        },
        _ => RetryDecision::DoNotRetry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::scripted::{Behaviour, ScriptedPair, ScriptedQueue, ScriptedRecord, UiEvent};
    use crate::policy::DecisionRule;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.retry.extraction.base_delay_ms = 1;
        config.retry.extraction.max_delay_ms = 1;
        config.retry.verification.base_delay_ms = 1;
        config.retry.verification.max_delay_ms = 1;
        config
    }

    fn company(id: &str, count: &str, domain: &str) -> ScriptedRecord {
        ScriptedRecord::new(id).count(count).domain(domain)
    }

    #[tokio::test(start_paused = true)]
    async fn test_merges_higher_count_record() {
        let queue = ScriptedQueue::new(vec![ScriptedPair::new(
            company("Acme", "3", "acme.com"),
            company("Acme Inc", "7", "acme.io"),
        )]);
        let mut controller = Controller::new(queue, &fast_config());

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.merged, 1);
        assert_eq!(summary.stop, Some(StopReason::QueueEmpty));
        assert_eq!(controller.adapter().merged(), vec![(0, Side::Right)]);
        assert!(controller.processed().contains(&PairKey::new("Acme Inc", "Acme")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_carries_decision() {
        let queue = ScriptedQueue::new(vec![ScriptedPair::new(
            company("a", "--", "a.org"),
            company("b", "--", "b.com"),
        )]);
        let reports = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = reports.clone();
        let mut controller =
            Controller::new(queue, &fast_config()).on_pair(move |r| sink.lock().unwrap().push(r.clone()));

        controller.run().await.unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, PairState::Merged);
        assert_eq!(
            reports[0].outcome,
            PairOutcome::Merged(MergeDecision::new(Side::Right, DecisionRule::DomainRank))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_after_every_pair() {
        let queue = ScriptedQueue::new(vec![
            ScriptedPair::new(company("a", "1", "a.com"), company("b", "2", "b.com")),
            ScriptedPair::new(company("c", "1", "c.com"), company("d", "2", "d.com")),
        ]);
        let mut controller = Controller::new(queue, &fast_config());

        controller.run().await.unwrap();

        let refreshes = controller
            .adapter()
            .events()
            .into_iter()
            .filter(|e| *e == UiEvent::Refreshed)
            .count();
        assert_eq!(refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_reports_attempts() {
        let behaviour = Behaviour {
            not_ready_polls: 100,
            ..Behaviour::default()
        };
        let queue = ScriptedQueue::new(vec![
            ScriptedPair::new(company("a", "1", "a.com"), company("b", "2", "b.com")).with_behaviour(behaviour),
        ]);
        let mut controller = Controller::new(queue, &fast_config());

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(controller.failures().count(&PairKey::new("a", "b")), 1);
        assert!(controller.processed().is_empty());
    }

    #[test]
    fn test_classify_extraction() {
        let ambiguous: Result<(), PairError> = Err(PairError::ExtractionAmbiguous {
            side: Side::Left,
            field: "contact count",
            value: "x".into(),
        });
        assert_eq!(
            classify_extraction(&ambiguous),
            RetryDecision::Retry {
                reason: RetryReason::Unparseable
            }
        );

        let action: Result<(), PairError> = Err(PairError::Ui(UiError::Action("boom".into())));
        assert_eq!(classify_extraction(&action), RetryDecision::DoNotRetry);
        assert_eq!(classify_extraction(&Ok::<(), PairError>(())), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_classify_transient() {
        let not_ready: Result<(), PairError> = Err(PairError::Ui(UiError::NotReady("rows".into())));
        assert_eq!(
            classify_transient(&not_ready),
            RetryDecision::Retry {
                reason: RetryReason::NotReady
            }
        );

        let gone: Result<(), PairError> = Err(PairError::Ui(UiError::QueueUnavailable("closed".into())));
        assert_eq!(classify_transient(&gone), RetryDecision::DoNotRetry);
        let action: Result<(), PairError> = Err(PairError::Ui(UiError::Action("boom".into())));
        assert_eq!(classify_transient(&action), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_classify_verification() {
        let unapplied: Result<(), PairError> = Err(PairError::ActionVerificationFailed {
            action: "select".into(),
        });
        assert_eq!(
            classify_verification(&unapplied),
            RetryDecision::Retry {
                reason: RetryReason::NotApplied
            }
        );
    }
}
