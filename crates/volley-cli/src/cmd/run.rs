use crate::cmd::load::merge_input;
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use volley_core::{
    config::{Config, WarnLevel},
    estimator::DurationEstimator,
    persistence::SchedulePersistence,
    report::{BatchOutcome, DispatchReport},
    sentinel::Sentinel,
    world::WorldMap,
};
use volley_engine::{
    notify, shutdown, CaptchaGate, Clock, DispatchCoordinator, GateError, HttpGateway, Pacing,
    Runner, SessionStore, Shutdown, SystemClock,
};

// ---------------------------------------------------------------------------
// DispatchExit — typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DispatchExit {
    /// The batch was aborted before anything was sent.
    Aborted { summary: String },
    /// Dispatch ran but no request was acknowledged.
    NothingSent { summary: String },
}

impl DispatchExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchExit::Aborted { .. } | DispatchExit::NothingSent { .. } => 2,
        }
    }

    fn from_report(report: &DispatchReport) -> Option<Self> {
        match report.outcome {
            BatchOutcome::Aborted { .. } => Some(DispatchExit::Aborted {
                summary: report.summary(),
            }),
            BatchOutcome::Failed => Some(DispatchExit::NothingSent {
                summary: report.summary(),
            }),
            BatchOutcome::Success | BatchOutcome::Partial => None,
        }
    }
}

impl std::fmt::Display for DispatchExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchExit::Aborted { summary } => f.write_str(summary),
            DispatchExit::NothingSent { summary } => {
                write!(f, "{summary} (no request acknowledged)")
            }
        }
    }
}

impl std::error::Error for DispatchExit {}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

struct Engine {
    runner: Runner<HttpGateway>,
    gate: Arc<CaptchaGate>,
}

fn build(root: &Path, shutdown: Shutdown) -> anyhow::Result<Engine> {
    let config = Config::load(root).context("failed to load config")?;
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    let map = WorldMap::load(root).context("failed to load world map")?;
    let cookie = SessionStore::new(root).cookie();
    if cookie.is_none() {
        tracing::warn!("no stored session; requests will be sent without cookies");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = notify::from_config(&config.notifications, clock.clone());
    let gate = Arc::new(CaptchaGate::new(
        &config.gate,
        &config.account,
        Sentinel::new(root),
        notifier.clone(),
        clock.clone(),
        shutdown.clone(),
    ));
    let pacing = Arc::new(
        Pacing::new(config.pacing.delay, clock.clone()).with_shutdown(shutdown.clone()),
    );
    let gateway = HttpGateway::new(
        &config.server.endpoint,
        cookie.as_deref(),
        map.clone(),
        gate.clone(),
        pacing.clone(),
    )
    .context("failed to build HTTP gateway")?;

    let coordinator = DispatchCoordinator::new(
        gateway,
        DurationEstimator::new(&config.world, map),
        pacing,
        notifier,
        clock.clone(),
        shutdown.clone(),
        config.dispatch.clone(),
        config.account.clone(),
    );
    let runner = Runner::new(
        coordinator,
        SchedulePersistence::new(root),
        clock,
        shutdown,
        config.dispatch.horizon(),
        config.dispatch.tick(),
    );
    Ok(Engine { runner, gate })
}

/// Wait for a challenge left over from a previous run. `false` means
/// shutdown arrived first.
async fn clear_pending_gate(gate: &CaptchaGate) -> anyhow::Result<bool> {
    match gate.resume_if_pending().await {
        Ok(()) => Ok(true),
        Err(GateError::Cancelled) => Ok(false),
        Err(e) => Err(e).context("challenge gate failed"),
    }
}

fn spawn_ctrl_c(trigger: shutdown::ShutdownTrigger) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            trigger.trigger();
        }
    });
}

fn print_report(report: &DispatchReport) {
    println!("{}", report.summary());
    for r in &report.requests {
        println!("  {:<24} {:?}", r.id, r.outcome);
    }
    if let Some(ms) = report.dispatch_ms {
        println!("  dispatched in {ms} ms");
    }
}

// ---------------------------------------------------------------------------
// run-once
// ---------------------------------------------------------------------------

pub fn run_once(root: &Path, json: bool) -> anyhow::Result<()> {
    let persistence = SchedulePersistence::new(root);
    let mut store = persistence
        .load()
        .context("failed to read schedule snapshot")?;

    let (trigger, shutdown) = shutdown::channel();
    let Engine { mut runner, gate } = build(root, shutdown)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        spawn_ctrl_c(trigger);
        if !clear_pending_gate(&gate).await? {
            return Ok::<_, anyhow::Error>(None);
        }
        Ok(runner.run_once(&mut store).await)
    })?;

    let Some(report) = report else {
        if json {
            print_json(&serde_json::json!({ "report": null }))?;
        } else {
            println!("Nothing to dispatch.");
        }
        return Ok(());
    };

    if json {
        print_json(&serde_json::json!({ "report": report }))?;
    } else {
        print_report(&report);
    }

    match DispatchExit::from_report(&report) {
        Some(exit) => Err(exit.into()),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// run (control loop)
// ---------------------------------------------------------------------------

pub fn run_loop(root: &Path, file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let persistence = SchedulePersistence::new(root);
    let mut store = match file {
        Some(path) => {
            let (store, summary, added) = merge_input(root, path, &persistence)?;
            println!(
                "Loaded {}: {added} new, {} skipped",
                path.display(),
                summary.skipped.len()
            );
            store
        }
        None => persistence
            .load()
            .context("failed to read schedule snapshot")?,
    };

    let (trigger, shutdown) = shutdown::channel();
    let Engine { mut runner, gate } = build(root, shutdown)?;

    let rt = tokio::runtime::Runtime::new()?;
    let reports = rt.block_on(async move {
        spawn_ctrl_c(trigger);
        if !clear_pending_gate(&gate).await? {
            return Ok::<_, anyhow::Error>(Vec::new());
        }
        Ok(runner.run_loop(&mut store).await)
    })?;

    if json {
        print_json(&serde_json::json!({ "reports": reports }))?;
        return Ok(());
    }
    if reports.is_empty() {
        println!("Stopped. No batch ran.");
    } else {
        println!("Stopped after {} batch(es):", reports.len());
        for report in &reports {
            print_report(report);
        }
    }
    Ok(())
}
