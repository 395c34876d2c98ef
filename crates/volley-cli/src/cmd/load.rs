use crate::output::print_json;
use anyhow::Context;
use chrono::Local;
use std::path::{Path, PathBuf};
use volley_core::{
    config::Config, loader, persistence::SchedulePersistence, schedule::ScheduleStore,
    world::WorldMap,
};

pub fn run(root: &Path, file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    Config::load(root).context("failed to load config")?;
    let path = input_path(root, file);
    let persistence = SchedulePersistence::new(root);

    let (store, summary, added) = merge_input(root, &path, &persistence)?;

    if json {
        print_json(&serde_json::json!({
            "file": path,
            "summary": summary,
            "added": added,
            "batches": store.batch_count(),
            "requests": store.request_count(),
        }))?;
        return Ok(());
    }

    println!(
        "Loaded {}: {} scheduled, {} skipped ({} entries)",
        path.display(),
        summary.scheduled,
        summary.skipped.len(),
        summary.total
    );
    for s in &summary.skipped {
        println!("  skipped {}: {}", s.id, s.reason);
    }
    println!(
        "{added} new request(s); {} request(s) in {} batch(es) pending",
        store.request_count(),
        store.batch_count()
    );
    Ok(())
}

pub fn input_path(root: &Path, file: Option<&Path>) -> PathBuf {
    file.map(Path::to_path_buf)
        .unwrap_or_else(|| volley_core::paths::default_input_path(root))
}

/// Read `path`, merge it into the persisted schedule and write the snapshot
/// back. Returns the merged store, the load summary and how many requests
/// were new.
pub fn merge_input(
    root: &Path,
    path: &Path,
    persistence: &SchedulePersistence,
) -> anyhow::Result<(ScheduleStore, loader::LoadSummary, usize)> {
    let map = WorldMap::load(root).context("failed to load world map")?;
    let (loaded, summary) = loader::load_file(path, &map, &Local::now())
        .with_context(|| format!("failed to load {}", path.display()))?;

    let mut store = persistence.load().context("failed to read schedule snapshot")?;
    let added = store.merge(&loaded);
    persistence
        .save(&store)
        .context("failed to write schedule snapshot")?;
    Ok((store, summary, added))
}
