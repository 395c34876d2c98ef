//! In-memory collaborators shared by the engine's unit tests.

use crate::clock::Clock;
use crate::error::GatewayError;
use crate::gateway::{Ack, ActionGateway, PreparedAction};
use crate::notify::{Delivery, Notifier, NotifyError};
use crate::pacing::{Pacing, PacingMode};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use volley_core::types::{ActionKind, ActionRequest, Target};

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn forced(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, f)| *f)
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn forced_count(&self) -> usize {
        self.forced().len()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        message: &'a str,
        forced: bool,
    ) -> BoxFuture<'a, Result<Delivery, NotifyError>> {
        self.sent.lock().unwrap().push((message.to_string(), forced));
        Box::pin(async { Ok(Delivery::Sent) })
    }
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

/// Quotes a fixed duration per request id and records every call together
/// with the virtual time it happened at.
pub struct FakeGateway {
    clock: Arc<dyn Clock>,
    pacing: Option<Arc<Pacing>>,
    durations: HashMap<String, u64>,
    fail_prepare: HashSet<String>,
    fail_submit: HashSet<String>,
    pub prepared: Mutex<Vec<String>>,
    /// (request id, epoch millis, pacing mode at the time)
    pub submitted: Mutex<Vec<(String, i64, PacingMode)>>,
}

impl FakeGateway {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pacing: None,
            durations: HashMap::new(),
            fail_prepare: HashSet::new(),
            fail_submit: HashSet::new(),
            prepared: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pacing(mut self, pacing: Arc<Pacing>) -> Self {
        self.pacing = Some(pacing);
        self
    }

    pub fn quote(mut self, id: &str, secs: u64) -> Self {
        self.durations.insert(id.to_string(), secs);
        self
    }

    pub fn failing_prepare(mut self, id: &str) -> Self {
        self.fail_prepare.insert(id.to_string());
        self
    }

    pub fn failing_submit(mut self, id: &str) -> Self {
        self.fail_submit.insert(id.to_string());
        self
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

impl ActionGateway for FakeGateway {
    fn prepare<'a>(
        &'a self,
        request: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<PreparedAction, GatewayError>> {
        self.prepared.lock().unwrap().push(request.id.clone());
        let result = if self.fail_prepare.contains(&request.id) {
            Err(GatewayError::Transport("connection reset".into()))
        } else {
            let secs = self.durations.get(&request.id).copied().unwrap_or(600);
            Ok(PreparedAction {
                request_id: request.id.clone(),
                origin: request.origin.clone(),
                kind: request.kind,
                form: Vec::new(),
                duration: Duration::from_secs(secs),
            })
        };
        Box::pin(async move { result })
    }

    fn submit<'a>(&'a self, prepared: &'a PreparedAction) -> BoxFuture<'a, Result<Ack, GatewayError>> {
        let mode = self
            .pacing
            .as_ref()
            .map(|p| p.mode())
            .unwrap_or(PacingMode::Normal);
        self.submitted.lock().unwrap().push((
            prepared.request_id.clone(),
            self.clock.now_millis(),
            mode,
        ));
        let result = if self.fail_submit.contains(&prepared.request_id) {
            Err(GatewayError::Rejected("no units".into()))
        } else {
            Ok(Ack {
                request_id: prepared.request_id.clone(),
                message: None,
            })
        };
        Box::pin(async move { result })
    }
}

pub fn request(id: &str, origin: &str, target: Target) -> ActionRequest {
    ActionRequest::new(
        id,
        origin,
        target,
        [("axe".to_string(), 100)].into_iter().collect(),
        ActionKind::Attack,
    )
    .unwrap()
}
