use anyhow::Context;
use serde_json::json;
use std::path::Path;
use volley_core::{config::Config, io, paths, world::WorldMap};

pub fn run(root: &Path) -> anyhow::Result<()> {
    let account = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    println!("Initializing volley in: {}", root.display());

    for dir in [paths::VOLLEY_DIR, paths::CACHE_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if !paths::config_path(root).exists() {
        Config::new(&account)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    if !paths::map_path(root).exists() {
        WorldMap::default()
            .save(root)
            .context("failed to write map.json")?;
        println!("  created: {}", paths::MAP_FILE);
    } else {
        println!("  exists:  {}", paths::MAP_FILE);
    }

    let example = serde_json::to_string_pretty(&example_schedule())?;
    let input = paths::default_input_path(root);
    if io::write_if_missing(&input, example.as_bytes())
        .with_context(|| format!("failed to write {}", input.display()))?
    {
        println!("  created: {}", paths::DEFAULT_INPUT);
    } else {
        println!("  exists:  {}", paths::DEFAULT_INPUT);
    }

    println!();
    println!("Next steps:");
    println!("  1. set server.endpoint in {}", paths::CONFIG_FILE);
    println!("  2. list your villages in {}", paths::MAP_FILE);
    println!("  3. volley session set '<cookie header from your browser>'");
    println!("  4. edit {} and run 'volley load'", paths::DEFAULT_INPUT);
    Ok(())
}

/// Two disabled entries showing both target styles.
fn example_schedule() -> serde_json::Value {
    json!({
        "attacks": [
            {
                "id": "example_attack",
                "source_village": "12345",
                "target_coordinates": [500, 500],
                "arrival_time": "tomorrow 08:00:00",
                "troops": { "axe": 3000, "light": 1500, "ram": 250 },
                "type": "attack",
                "enabled": false,
                "notes": "set enabled to true to schedule"
            },
            {
                "id": "example_support",
                "source_village": "12345",
                "target_village_id": "67890",
                "arrival_time": "25/12/2030 20:00:00",
                "troops": { "spear": 2000, "sword": 1000, "heavy": 200 },
                "type": "support",
                "enabled": false,
                "notes": "the target village must be listed in .volley/map.json"
            }
        ]
    })
}
