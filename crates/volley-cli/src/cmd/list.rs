use crate::output::{fmt_secs, print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use volley_core::{
    config::Config, estimator::DurationEstimator, persistence::SchedulePersistence,
    report::fmt_ts, schedule::ScheduleStore, world::WorldMap,
};

#[derive(Serialize)]
struct EstimateRow {
    id: String,
    completion: i64,
    origin: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    travel_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    earliest_completion: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(root: &Path, estimate: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = SchedulePersistence::new(root)
        .load()
        .context("failed to read schedule snapshot")?;
    let now = Utc::now().timestamp();
    let overview = store.overview(now, config.dispatch.horizon());

    let estimates = if estimate {
        let map = WorldMap::load(root).context("failed to load world map")?;
        let estimator = DurationEstimator::new(&config.world, map);
        Some(estimate_rows(&store, &estimator, now))
    } else {
        None
    };

    if json {
        match estimates {
            Some(rows) => print_json(&serde_json::json!({
                "batches": overview,
                "estimates": rows,
            }))?,
            None => print_json(&overview)?,
        }
        return Ok(());
    }

    if overview.is_empty() {
        println!("No pending batches.");
        return Ok(());
    }

    let rows = overview
        .iter()
        .map(|b| {
            let activates = if b.expired {
                "expired".to_string()
            } else if b.activates_in == 0 {
                "now".to_string()
            } else {
                fmt_secs(b.activates_in)
            };
            vec![fmt_ts(b.completion), activates, b.request_ids.join(", ")]
        })
        .collect();
    print_table(&["COMPLETES (UTC)", "ACTIVATES IN", "REQUESTS"], rows);

    if let Some(rows) = estimates {
        println!();
        let rows = rows
            .into_iter()
            .map(|r| {
                let (travel, earliest) = match (r.travel_secs, r.earliest_completion) {
                    (Some(t), Some(e)) => {
                        let late = if e > r.completion { " (late)" } else { "" };
                        (fmt_secs(t as i64), format!("{}{late}", fmt_ts(e)))
                    }
                    _ => ("-".to_string(), r.error.unwrap_or_default()),
                };
                vec![r.id, r.origin, r.target, travel, earliest]
            })
            .collect();
        print_table(&["ID", "ORIGIN", "TARGET", "TRAVEL", "EARLIEST (UTC)"], rows);
    }
    Ok(())
}

fn estimate_rows(store: &ScheduleStore, estimator: &DurationEstimator, now: i64) -> Vec<EstimateRow> {
    store
        .batches()
        .flat_map(|(completion, batch)| batch.iter().map(move |req| (completion, req)))
        .map(|(completion, req)| {
            let mut row = EstimateRow {
                id: req.id.clone(),
                completion,
                origin: req.origin.clone(),
                target: req.target.to_string(),
                travel_secs: None,
                earliest_completion: None,
                error: None,
            };
            match estimator.estimate_request(req) {
                Ok(d) => {
                    row.travel_secs = Some(d.as_secs());
                    row.earliest_completion = estimator.earliest_completion(req, now).ok();
                }
                Err(e) => row.error = Some(e.to_string()),
            }
            row
        })
        .collect()
}
