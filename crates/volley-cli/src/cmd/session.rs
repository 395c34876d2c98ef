use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use volley_engine::SessionStore;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Store the Cookie header copied from a logged-in browser tab
    Set {
        /// Cookie header value, e.g. "sid=...; pl=..."
        cookie: String,
    },

    /// Show when the session was stored (the cookie itself is not printed)
    Show,

    /// Delete the stored session
    Clear,
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    let store = SessionStore::new(root);
    match subcmd {
        SessionSubcommand::Set { cookie } => {
            if cookie.trim().is_empty() {
                anyhow::bail!("cookie must not be empty");
            }
            store.save(&cookie).context("failed to write session")?;
            println!("Session stored.");
        }
        SessionSubcommand::Show => {
            let saved = store.load();
            if json {
                print_json(&serde_json::json!({
                    "present": saved.is_some(),
                    "updated_at": saved.as_ref().map(|s| s.updated_at),
                    "cookies": saved.as_ref().map(|s| cookie_names(&s.cookie)),
                }))?;
            } else {
                match saved {
                    Some(s) => println!(
                        "stored {} ({})",
                        s.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        cookie_names(&s.cookie).join(", ")
                    ),
                    None => println!("No session stored."),
                }
            }
        }
        SessionSubcommand::Clear => {
            store.clear().context("failed to delete session")?;
            println!("Session cleared.");
        }
    }
    Ok(())
}

fn cookie_names(header: &str) -> Vec<String> {
    header
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(name, _)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_cookie_names_without_values() {
        assert_eq!(cookie_names("sid=abc; pl=xyz;"), vec!["sid", "pl"]);
        assert!(cookie_names("garbage").is_empty());
    }
}
