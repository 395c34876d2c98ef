use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use volley_core::sentinel::Sentinel;
use volley_engine::GateState;

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// Show whether a challenge is pending
    Status,

    /// Remove the sentinel after solving the challenge in a browser
    Clear,
}

pub fn run(root: &Path, subcmd: GateSubcommand, json: bool) -> anyhow::Result<()> {
    let sentinel = Sentinel::new(root);
    match subcmd {
        GateSubcommand::Status => status(&sentinel, json),
        GateSubcommand::Clear => clear(&sentinel, json),
    }
}

fn status(sentinel: &Sentinel, json: bool) -> anyhow::Result<()> {
    let state = if sentinel.is_raised() {
        GateState::Blocked
    } else {
        GateState::Open
    };
    if json {
        return print_json(&serde_json::json!({
            "state": state,
            "sentinel": sentinel.path(),
        }));
    }
    match state {
        GateState::Open => println!("open"),
        GateState::Blocked => {
            println!("blocked: solve the challenge in a browser, then run 'volley gate clear'");
            println!("sentinel: {}", sentinel.path().display());
        }
    }
    Ok(())
}

fn clear(sentinel: &Sentinel, json: bool) -> anyhow::Result<()> {
    let removed = sentinel
        .clear()
        .with_context(|| format!("failed to remove {}", sentinel.path().display()))?;
    if json {
        return print_json(&serde_json::json!({ "cleared": removed }));
    }
    if removed {
        println!("Sentinel removed. A waiting engine resumes on its next check.");
    } else {
        println!("No challenge pending.");
    }
    Ok(())
}
