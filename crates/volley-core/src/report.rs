//! Outcome records written after every dispatch run.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestOutcome
// ---------------------------------------------------------------------------

/// Final state of one request within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Prepared (or not yet reached) when the run ended without sending.
    Pending,
    Sent,
    Failed { reason: String },
    /// Dropped before preparation because its positions could not be resolved.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestReport {
    pub id: String,
    pub outcome: RequestOutcome,
    /// Server-confirmed travel time, once prepared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// `completion - duration`, once prepared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_send: Option<i64>,
}

impl RequestReport {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: RequestOutcome::Pending,
            duration_secs: None,
            required_send: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AbortReason / BatchOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfeasibleRequest {
    pub id: String,
    pub required_send: i64,
    pub duration_secs: u64,
    /// `now + duration + margin` at the moment of the check.
    pub earliest_completion: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    /// The completion instant was not in the future when the run started.
    CompletionPassed { now: i64 },
    /// The only request of the batch could not be placed on the map.
    Unresolvable { id: String, detail: String },
    /// Nothing left to prepare after skipping unresolvable requests.
    NothingToDispatch,
    /// Preparation failed for one request; nothing was sent.
    PreparationFailed { id: String, error: String },
    /// At least one request could no longer be sent in time.
    Infeasible { offenders: Vec<InfeasibleRequest> },
    /// Shutdown arrived while waiting.
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::CompletionPassed { now } => {
                write!(f, "completion instant already passed (now {})", fmt_ts(*now))
            }
            AbortReason::Unresolvable { id, detail } => {
                write!(f, "request '{id}' cannot be resolved: {detail}")
            }
            AbortReason::NothingToDispatch => f.write_str("no dispatchable requests"),
            AbortReason::PreparationFailed { id, error } => {
                write!(f, "preparing '{id}' failed: {error}")
            }
            AbortReason::Infeasible { offenders } => {
                f.write_str("cannot land in time:")?;
                for o in offenders {
                    write!(
                        f,
                        " '{}' needed to leave at {} ({}s travel), earliest completion {};",
                        o.id,
                        fmt_ts(o.required_send),
                        o.duration_secs,
                        fmt_ts(o.earliest_completion)
                    )?;
                }
                Ok(())
            }
            AbortReason::Cancelled => f.write_str("cancelled by shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every prepared request was acknowledged.
    Success,
    /// Some requests were acknowledged, some were not.
    Partial,
    /// Dispatch ran but no request was acknowledged.
    Failed,
    /// Nothing was sent.
    Aborted { reason: AbortReason },
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Success => f.write_str("success"),
            BatchOutcome::Partial => f.write_str("partial"),
            BatchOutcome::Failed => f.write_str("failed"),
            BatchOutcome::Aborted { .. } => f.write_str("aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub run_id: Uuid,
    pub completion: i64,
    pub outcome: BatchOutcome,
    pub requests: Vec<RequestReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall time between the first and last submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_ms: Option<u64>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.outcome == RequestOutcome::Sent)
            .count()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Aborted { .. })
    }

    /// At least one request was acknowledged.
    pub fn landed_any(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Success | BatchOutcome::Partial)
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            BatchOutcome::Aborted { reason } => format!(
                "batch for {} aborted: {reason}",
                fmt_ts(self.completion)
            ),
            other => format!(
                "batch for {}: {other}, {}/{} sent",
                fmt_ts(self.completion),
                self.sent(),
                self.requests.len()
            ),
        }
    }
}

/// Render epoch seconds as `YYYY-mm-dd HH:MM:SS` UTC.
pub fn fmt_ts(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: BatchOutcome, outcomes: Vec<RequestOutcome>) -> DispatchReport {
        let now = Utc::now();
        DispatchReport {
            run_id: Uuid::new_v4(),
            completion: 1_700_000_000,
            outcome,
            requests: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, o)| RequestReport {
                    id: format!("r{i}"),
                    outcome: o,
                    duration_secs: Some(300),
                    required_send: Some(1_700_000_000 - 300),
                })
                .collect(),
            started_at: now,
            finished_at: now,
            dispatch_ms: None,
        }
    }

    #[test]
    fn partial_summary_counts_sent() {
        let r = report(
            BatchOutcome::Partial,
            vec![
                RequestOutcome::Sent,
                RequestOutcome::Failed {
                    reason: "timeout".into(),
                },
            ],
        );
        assert_eq!(r.sent(), 1);
        assert!(r.landed_any());
        assert!(r.summary().contains("1/2 sent"));
    }

    #[test]
    fn infeasible_reason_names_offenders() {
        let reason = AbortReason::Infeasible {
            offenders: vec![InfeasibleRequest {
                id: "late-one".into(),
                required_send: 1_700_000_000,
                duration_secs: 500,
                earliest_completion: 1_700_000_540,
            }],
        };
        let text = reason.to_string();
        assert!(text.contains("late-one"));
        assert!(text.contains("500s"));
    }

    #[test]
    fn outcome_json_is_tagged() {
        let r = report(
            BatchOutcome::Aborted {
                reason: AbortReason::Cancelled,
            },
            vec![RequestOutcome::Pending],
        );
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"type\":\"aborted\""));
        assert!(json.contains("\"status\":\"pending\""));
        let parsed: DispatchReport = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_aborted());
    }
}
