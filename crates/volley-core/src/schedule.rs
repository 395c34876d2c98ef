//! Pending action requests indexed by desired completion instant.
//!
//! Keys are whole epoch seconds. Every request id appears in at most one
//! batch across the whole store; a second insert with a known id is a no-op.
//! Batches keep insertion order, which is also dispatch order.

use crate::types::ActionRequest;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleStore {
    batches: BTreeMap<i64, Vec<ActionRequest>>,
    /// id → completion key, for duplicate checks.
    index: HashMap<String, i64>,
}

/// One row of `ScheduleStore::overview`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub completion: i64,
    pub request_ids: Vec<String>,
    /// Seconds until the batch enters the activation horizon; zero when it
    /// is already inside, negative once the completion instant has passed.
    pub activates_in: i64,
    pub expired: bool,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `request` to the batch completing at `completion`.
    ///
    /// Returns `false` and leaves the store untouched when a request with the
    /// same id is already scheduled anywhere.
    pub fn insert(&mut self, completion: i64, request: ActionRequest) -> bool {
        if let Some(existing) = self.index.get(&request.id) {
            tracing::warn!(
                id = %request.id,
                completion,
                existing = *existing,
                "request already scheduled, ignoring duplicate"
            );
            return false;
        }
        self.index.insert(request.id.clone(), completion);
        self.batches.entry(completion).or_default().push(request);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Completion key of the batch holding `id`.
    pub fn completion_of(&self, id: &str) -> Option<i64> {
        self.index.get(id).copied()
    }

    /// Earliest completion `t` with `0 < t - now <= horizon`.
    pub fn next_activation(&self, now: i64, horizon: Duration) -> Option<i64> {
        let horizon = horizon.as_secs() as i64;
        self.batches
            .range(now.saturating_add(1)..=now.saturating_add(horizon))
            .map(|(t, _)| *t)
            .next()
    }

    /// Earliest batch whose completion instant is not in the future. Such a
    /// batch can never activate again.
    pub fn first_expired(&self, now: i64) -> Option<i64> {
        self.batches.range(..=now).map(|(t, _)| *t).next()
    }

    /// Remove and return the batch for `completion`. Empty if none.
    pub fn take(&mut self, completion: i64) -> Vec<ActionRequest> {
        let batch = self.batches.remove(&completion).unwrap_or_default();
        for req in &batch {
            self.index.remove(&req.id);
        }
        batch
    }

    /// Union keyed by request id. Requests already present are skipped, so
    /// merging the same store twice changes nothing.
    pub fn merge(&mut self, other: &ScheduleStore) -> usize {
        let mut added = 0;
        for (completion, batch) in &other.batches {
            for req in batch {
                if !self.contains(&req.id) && self.insert(*completion, req.clone()) {
                    added += 1;
                }
            }
        }
        added
    }

    pub fn batch(&self, completion: i64) -> Option<&[ActionRequest]> {
        self.batches.get(&completion).map(|b| b.as_slice())
    }

    /// Batches in completion order.
    pub fn batches(&self) -> impl Iterator<Item = (i64, &[ActionRequest])> {
        self.batches.iter().map(|(t, b)| (*t, b.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn request_count(&self) -> usize {
        self.index.len()
    }

    pub fn overview(&self, now: i64, horizon: Duration) -> Vec<BatchSummary> {
        let horizon = horizon.as_secs() as i64;
        self.batches
            .iter()
            .map(|(t, batch)| BatchSummary {
                completion: *t,
                request_ids: batch.iter().map(|r| r.id.clone()).collect(),
                activates_in: if *t <= now {
                    *t - now
                } else {
                    (*t - horizon - now).max(0)
                },
                expired: *t <= now,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
