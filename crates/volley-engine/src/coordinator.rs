//! One batch, start to finish.
//!
//! ```text
//! Idle → Validating → Waiting → Dispatching → Done → Idle
//! ```
//!
//! Validating prepares every request before anything is sent. If any
//! request's send instant is already too close, the whole batch is dropped:
//! a batch that cannot land together does not fire at all. The send instant
//! comes from the duration the server quoted while preparing; the coarse
//! estimator only decides which requests can be placed on the map.

use crate::clock::Clock;
use crate::error::{GateError, GatewayError};
use crate::gateway::{ActionGateway, PreparedAction};
use crate::notify::{notify, Notifier};
use crate::pacing::Pacing;
use crate::shutdown::{Cancelled, Shutdown};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use volley_core::config::DispatchConfig;
use volley_core::estimator::DurationEstimator;
use volley_core::report::{
    fmt_ts, AbortReason, BatchOutcome, DispatchReport, InfeasibleRequest, RequestOutcome,
    RequestReport,
};
use volley_core::types::ActionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Waiting,
    Dispatching,
    Done,
}

/// Per-request working state for one run. Never persisted.
struct DispatchPlan {
    request: ActionRequest,
    prepared: Option<PreparedAction>,
    required_send: Option<i64>,
    outcome: RequestOutcome,
}

impl DispatchPlan {
    fn new(request: ActionRequest) -> Self {
        Self {
            request,
            prepared: None,
            required_send: None,
            outcome: RequestOutcome::Pending,
        }
    }

    fn is_skipped(&self) -> bool {
        matches!(self.outcome, RequestOutcome::Skipped { .. })
    }

    fn report(&self) -> RequestReport {
        RequestReport {
            id: self.request.id.clone(),
            outcome: self.outcome.clone(),
            duration_secs: self.prepared.as_ref().map(|p| p.duration.as_secs()),
            required_send: self.required_send,
        }
    }
}

pub struct DispatchCoordinator<G> {
    gateway: G,
    estimator: DurationEstimator,
    pacing: Arc<Pacing>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
    cfg: DispatchConfig,
    account: String,
    phase: Phase,
}

impl<G: ActionGateway> DispatchCoordinator<G> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: G,
        estimator: DurationEstimator,
        pacing: Arc<Pacing>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        shutdown: Shutdown,
        cfg: DispatchConfig,
        account: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            estimator,
            pacing,
            notifier,
            clock,
            shutdown,
            cfg,
            account: account.into(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Run one batch to completion. Always returns a report; aborts are
    /// outcomes, not errors.
    pub async fn run(&mut self, completion: i64, batch: Vec<ActionRequest>) -> DispatchReport {
        let run_id = Uuid::new_v4();
        let started_at = self.clock.now();
        tracing::info!(
            %run_id,
            completion,
            at = %fmt_ts(completion),
            requests = batch.len(),
            "dispatch run started"
        );

        let mut plans: Vec<DispatchPlan> = batch.into_iter().map(DispatchPlan::new).collect();
        let (outcome, span) = self.execute(completion, &mut plans).await;
        self.phase = Phase::Done;

        let report = DispatchReport {
            run_id,
            completion,
            outcome,
            requests: plans.iter().map(DispatchPlan::report).collect(),
            started_at,
            finished_at: self.clock.now(),
            dispatch_ms: span.map(|(first, last)| (last - first).num_milliseconds().max(0) as u64),
        };
        self.announce(&report).await;
        self.phase = Phase::Idle;
        report
    }

    async fn execute(
        &mut self,
        completion: i64,
        plans: &mut [DispatchPlan],
    ) -> (BatchOutcome, Option<(DateTime<Utc>, DateTime<Utc>)>) {
        let aborted = |reason| (BatchOutcome::Aborted { reason }, None);

        self.phase = Phase::Validating;
        let now = self.clock.now_secs();
        if completion <= now {
            return aborted(AbortReason::CompletionPassed { now });
        }

        if let Err(reason) = self.advise(completion, now, plans) {
            return aborted(reason);
        }
        if let Err(reason) = self.prepare_all(completion, plans).await {
            return aborted(reason);
        }

        // Priority stays on until this guard drops, on every path out.
        self.phase = Phase::Waiting;
        let _priority = self.pacing.enter_priority();
        let Some(target_send) = plans.iter().filter_map(|p| p.required_send).min() else {
            return aborted(AbortReason::NothingToDispatch);
        };
        if self.wait_until(target_send).await.is_err() {
            return aborted(AbortReason::Cancelled);
        }

        self.phase = Phase::Dispatching;
        let span = self.dispatch(plans).await;

        let attempted = plans.iter().filter(|p| p.prepared.is_some()).count();
        let sent = plans
            .iter()
            .filter(|p| p.outcome == RequestOutcome::Sent)
            .count();
        let outcome = if sent == plans.len() {
            BatchOutcome::Success
        } else if sent > 0 {
            BatchOutcome::Partial
        } else {
            BatchOutcome::Failed
        };
        tracing::info!(sent, attempted, "dispatch finished");
        (outcome, span)
    }

    /// Coarse pass: drop requests that cannot be placed on the map and warn
    /// about estimates that already look too tight.
    fn advise(
        &self,
        completion: i64,
        now: i64,
        plans: &mut [DispatchPlan],
    ) -> Result<(), AbortReason> {
        let margin = self.cfg.min_margin_secs as i64;
        let only = plans.len() == 1;
        for plan in plans.iter_mut() {
            match self.estimator.estimate_request(&plan.request) {
                Ok(estimate) => {
                    let advisory_send = completion - estimate.as_secs() as i64;
                    if advisory_send <= now + margin {
                        tracing::warn!(
                            id = %plan.request.id,
                            estimate_secs = estimate.as_secs(),
                            "estimate says this request is already late; the confirmed duration decides"
                        );
                    }
                }
                Err(e) if only => {
                    return Err(AbortReason::Unresolvable {
                        id: plan.request.id.clone(),
                        detail: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(id = %plan.request.id, error = %e, "skipping unresolvable request");
                    plan.outcome = RequestOutcome::Skipped {
                        reason: e.to_string(),
                    };
                }
            }
        }
        if plans.iter().all(DispatchPlan::is_skipped) {
            return Err(AbortReason::NothingToDispatch);
        }
        Ok(())
    }

    /// Prepare every remaining request in order. Any failure or late send
    /// instant aborts the batch before anything is submitted.
    async fn prepare_all(
        &mut self,
        completion: i64,
        plans: &mut [DispatchPlan],
    ) -> Result<(), AbortReason> {
        let margin = self.cfg.min_margin_secs as i64;
        for plan in plans.iter_mut().filter(|p| !p.is_skipped()) {
            let prepared = match self.gateway.prepare(&plan.request).await {
                Ok(p) => p,
                Err(GatewayError::Gate(GateError::Cancelled)) => return Err(AbortReason::Cancelled),
                Err(e) => {
                    tracing::error!(id = %plan.request.id, error = %e, "preparation failed");
                    plan.outcome = RequestOutcome::Failed {
                        reason: e.to_string(),
                    };
                    return Err(AbortReason::PreparationFailed {
                        id: plan.request.id.clone(),
                        error: e.to_string(),
                    });
                }
            };
            let required = completion - prepared.duration.as_secs() as i64;
            tracing::debug!(
                id = %plan.request.id,
                duration_secs = prepared.duration.as_secs(),
                required_send = %fmt_ts(required),
                "prepared"
            );
            plan.required_send = Some(required);
            plan.prepared = Some(prepared);
            if required <= self.clock.now_secs() + margin {
                break;
            }
        }

        // Preparation takes time, so check every prepared request against a
        // fresh clock reading.
        let now = self.clock.now_secs();
        let offenders: Vec<InfeasibleRequest> = plans
            .iter()
            .filter_map(|p| {
                let required = p.required_send?;
                let duration = p.prepared.as_ref()?.duration.as_secs();
                (required <= now + margin).then(|| InfeasibleRequest {
                    id: p.request.id.clone(),
                    required_send: required,
                    duration_secs: duration,
                    earliest_completion: now + duration as i64 + margin,
                })
            })
            .collect();
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(AbortReason::Infeasible { offenders })
        }
    }

    /// Sleep until `target` (epoch seconds). Never returns early; overshoot
    /// is at most one fine step.
    async fn wait_until(&self, target: i64) -> Result<(), Cancelled> {
        let target_ms = target.saturating_mul(1000);
        let threshold_ms = (self.cfg.coarse_threshold_secs * 1000) as i64;
        let progress_ms = (self.cfg.progress_interval_secs * 1000) as i64;
        let coarse_ms = self.cfg.coarse_step_ms.max(1) as i64;
        let fine_ms = self.cfg.fine_step_ms.max(1) as i64;
        let mut last_progress: Option<i64> = None;

        tracing::info!(send_at = %fmt_ts(target), "waiting for send instant");
        loop {
            let now_ms = self.clock.now_millis();
            let remaining = target_ms - now_ms;
            if remaining <= 0 {
                return Ok(());
            }
            let step = if remaining > threshold_ms {
                if last_progress.map_or(true, |at| now_ms - at >= progress_ms) {
                    tracing::info!(remaining_secs = remaining / 1000, "waiting");
                    last_progress = Some(now_ms);
                }
                coarse_ms.min(remaining)
            } else {
                fine_ms.min(remaining)
            };
            self.shutdown
                .sleep(&*self.clock, Duration::from_millis(step as u64))
                .await?;
        }
    }

    /// Submit every prepared request in insertion order. Failures stay local
    /// to their request. Returns the first and last submission instants.
    async fn dispatch(
        &self,
        plans: &mut [DispatchPlan],
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let spacing = Duration::from_millis(self.cfg.spacing_ms);
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for plan in plans.iter_mut() {
            let Some(prepared) = &plan.prepared else {
                continue;
            };
            if self.shutdown.sleep(&*self.clock, spacing).await.is_err() {
                tracing::warn!("shutdown during dispatch, remaining requests not sent");
                break;
            }
            let at = self.clock.now();
            span = Some(span.map_or((at, at), |(first, _)| (first, at)));
            match self.gateway.submit(prepared).await {
                Ok(ack) => {
                    tracing::info!(
                        id = %plan.request.id,
                        reply = ack.message.as_deref().unwrap_or(""),
                        "sent"
                    );
                    plan.outcome = RequestOutcome::Sent;
                }
                Err(e) => {
                    tracing::warn!(id = %plan.request.id, error = %e, "submit failed");
                    plan.outcome = RequestOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }
        span
    }

    async fn announce(&self, report: &DispatchReport) {
        let text = format!("{}: {}", self.account, report.summary());
        match &report.outcome {
            BatchOutcome::Success => tracing::info!("{text}"),
            BatchOutcome::Partial => {
                tracing::warn!("{text}");
                notify(&*self.notifier, &text, false).await;
            }
            BatchOutcome::Failed | BatchOutcome::Aborted { .. } => {
                tracing::error!("{text}");
                notify(&*self.notifier, &text, true).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
