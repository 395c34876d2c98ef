//! Declarative schedule input.
//!
//! The input is a JSON document, either a bare array of entries or an object
//! with an `attacks` array:
//!
//! ```json
//! {
//!   "attacks": [
//!     {
//!       "id": "noble-1",
//!       "source_village": "12345",
//!       "target_coordinates": [500, 500],
//!       "arrival_time": "tomorrow 20:00:00",
//!       "troops": {"axe": 3000, "light": 1500},
//!       "type": "attack",
//!       "enabled": true,
//!       "notes": "first wave"
//!     }
//!   ]
//! }
//! ```
//!
//! Bad entries are skipped and reported; only an unreadable document fails
//! the whole load.

use crate::error::{Result, VolleyError};
use crate::schedule::ScheduleStore;
use crate::types::{ActionKind, ActionRequest, Payload, Target};
use crate::world::WorldMap;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// Why a single entry was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {detail}")]
    InvalidField { field: &'static str, detail: String },

    #[error("no target: set target_coordinates or target_village_id")]
    NoTarget,

    #[error("target village '{0}' is not on the map")]
    UnresolvableTarget(String),

    #[error("no unit has a quantity above zero")]
    NoTroops,

    #[error("unrecognized completion time '{0}'")]
    InvalidTime(String),

    #[error("completion time {0} is in the past")]
    PastCompletion(i64),

    #[error("disabled")]
    Disabled,

    #[error("id already scheduled")]
    Duplicate,
}

// ---------------------------------------------------------------------------
// LoadSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub total: usize,
    pub scheduled: usize,
    pub skipped: Vec<SkippedEntry>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load entries from a file into a fresh store.
pub fn load_file<Tz: TimeZone>(
    path: &Path,
    map: &WorldMap,
    now: &DateTime<Tz>,
) -> Result<(ScheduleStore, LoadSummary)> {
    if !path.exists() {
        return Err(VolleyError::InputNotFound(path.display().to_string()));
    }
    let data = std::fs::read_to_string(path)?;
    load_str(&data, map, now)
}

pub fn load_str<Tz: TimeZone>(
    data: &str,
    map: &WorldMap,
    now: &DateTime<Tz>,
) -> Result<(ScheduleStore, LoadSummary)> {
    let doc: Value = serde_json::from_str(data)?;
    let entries = match &doc {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("attacks") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(VolleyError::InvalidInput(
                    "'attacks' must be an array".to_string(),
                ))
            }
            None => &[],
        },
        _ => {
            return Err(VolleyError::InvalidInput(
                "expected an array of entries or an object with 'attacks'".to_string(),
            ))
        }
    };

    let mut store = ScheduleStore::new();
    let mut summary = LoadSummary {
        total: entries.len(),
        ..Default::default()
    };

    for (index, entry) in entries.iter().enumerate() {
        let id = entry_id(entry, index);
        let outcome = parse_entry(entry, &id, map, now).and_then(|(completion, req)| {
            if store.insert(completion, req) {
                Ok(completion)
            } else {
                Err(LoadError::Duplicate)
            }
        });
        match outcome {
            Ok(completion) => {
                tracing::info!(id = %id, completion, "scheduled");
                summary.scheduled += 1;
            }
            Err(LoadError::Disabled) => {
                tracing::info!(id = %id, "disabled, skipping");
                summary.skipped.push(SkippedEntry {
                    id,
                    reason: LoadError::Disabled.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(id = %id, reason = %e, "skipping entry");
                summary.skipped.push(SkippedEntry {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        scheduled = summary.scheduled,
        skipped = summary.skipped.len(),
        total = summary.total,
        "schedule loaded"
    );
    Ok((store, summary))
}

fn entry_id(entry: &Value, index: usize) -> String {
    entry
        .get("id")
        .and_then(as_handle)
        .unwrap_or_else(|| format!("attack_{index}"))
}

fn parse_entry<Tz: TimeZone>(
    entry: &Value,
    id: &str,
    map: &WorldMap,
    now: &DateTime<Tz>,
) -> std::result::Result<(i64, ActionRequest), LoadError> {
    let obj = entry.as_object().ok_or(LoadError::NotAnObject)?;

    if !obj.get("enabled").and_then(Value::as_bool).unwrap_or(true) {
        return Err(LoadError::Disabled);
    }

    let origin = obj
        .get("source_village")
        .and_then(as_handle)
        .ok_or(LoadError::MissingField("source_village"))?;
    let raw_time = obj
        .get("arrival_time")
        .ok_or(LoadError::MissingField("arrival_time"))?;
    let troops = obj
        .get("troops")
        .ok_or(LoadError::MissingField("troops"))?;

    let target = parse_target(obj.get("target_village_id"), obj.get("target_coordinates"), map)?;
    let payload = parse_troops(troops)?;

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(raw) => raw.parse::<ActionKind>().map_err(|_| LoadError::InvalidField {
            field: "type",
            detail: format!("unknown kind '{raw}'"),
        })?,
        None => ActionKind::Attack,
    };

    let completion = match raw_time {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| LoadError::InvalidTime(n.to_string()))?,
        Value::String(s) => {
            parse_completion_time(s, now).ok_or_else(|| LoadError::InvalidTime(s.clone()))?
        }
        other => return Err(LoadError::InvalidTime(other.to_string())),
    };
    if completion <= now.timestamp() {
        return Err(LoadError::PastCompletion(completion));
    }

    let note = obj
        .get("notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let req = ActionRequest::new(id, origin, target, payload, kind)
        .map_err(|_| LoadError::NoTroops)?
        .with_note(note);
    Ok((completion, req))
}

/// A village handle may be written as a string or a bare number.
fn as_handle(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_target(
    village: Option<&Value>,
    coords: Option<&Value>,
    map: &WorldMap,
) -> std::result::Result<Target, LoadError> {
    let coords = coords.filter(|v| !v.is_null()).map(parse_coords).transpose()?;
    match (village.and_then(as_handle), coords) {
        (Some(id), fallback) => {
            if map.village(&id).is_some() {
                Ok(Target::Village { id })
            } else if let Some((x, y)) = fallback {
                Ok(Target::Coordinates { x, y })
            } else {
                Err(LoadError::UnresolvableTarget(id))
            }
        }
        (None, Some((x, y))) => Ok(Target::Coordinates { x, y }),
        (None, None) => Err(LoadError::NoTarget),
    }
}

/// Accepts `[x, y]` or `"x|y"`.
fn parse_coords(v: &Value) -> std::result::Result<(i32, i32), LoadError> {
    let invalid = |detail: &str| LoadError::InvalidField {
        field: "target_coordinates",
        detail: detail.to_string(),
    };
    match v {
        Value::Array(items) if items.len() == 2 => {
            let x = items[0].as_i64().ok_or_else(|| invalid("x is not an integer"))?;
            let y = items[1].as_i64().ok_or_else(|| invalid("y is not an integer"))?;
            Ok((
                i32::try_from(x).map_err(|_| invalid("x out of range"))?,
                i32::try_from(y).map_err(|_| invalid("y out of range"))?,
            ))
        }
        Value::String(s) => {
            let (x, y) = s.split_once('|').ok_or_else(|| invalid("expected 'x|y'"))?;
            Ok((
                x.trim().parse().map_err(|_| invalid("x is not an integer"))?,
                y.trim().parse().map_err(|_| invalid("y is not an integer"))?,
            ))
        }
        _ => Err(invalid("expected [x, y]")),
    }
}

fn parse_troops(v: &Value) -> std::result::Result<Payload, LoadError> {
    let obj = v.as_object().ok_or(LoadError::InvalidField {
        field: "troops",
        detail: "expected a unit → quantity object".to_string(),
    })?;
    let mut payload = Payload::new();
    for (unit, qty) in obj {
        let n = match qty {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let n = n.ok_or_else(|| LoadError::InvalidField {
            field: "troops",
            detail: format!("quantity for '{unit}' is not an integer"),
        })?;
        let n = u32::try_from(n).map_err(|_| LoadError::InvalidField {
            field: "troops",
            detail: format!("quantity for '{unit}' must be between 0 and {}", u32::MAX),
        })?;
        payload.insert(unit.clone(), n);
    }
    if !payload.values().any(|q| *q > 0) {
        return Err(LoadError::NoTroops);
    }
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Time parsing
// ---------------------------------------------------------------------------

const TODAY: &[&str] = &["today ", "hoje "];
const TOMORROW: &[&str] = &["tomorrow ", "amanhã "];

/// Parse a completion time into epoch seconds, interpreting wall-clock forms
/// in `now`'s time zone.
///
/// Accepted forms: epoch seconds, RFC 3339, `dd/mm/YYYY HH:MM:SS`,
/// `today HH:MM:SS` and `tomorrow HH:MM:SS`.
pub fn parse_completion_time<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }

    let today = now.date_naive();
    let relative = |prefixes: &[&str], date: NaiveDate| {
        prefixes.iter().find_map(|p| {
            raw.strip_prefix(p)
                .and_then(|rest| NaiveTime::parse_from_str(rest.trim(), "%H:%M:%S").ok())
                .map(|t| date.and_time(t))
        })
    };
    let naive = relative(TODAY, today)
        .or_else(|| relative(TOMORROW, today + ChronoDuration::days(1)))
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M:%S").ok())?;

    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use chrono::Utc;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn map() -> WorldMap {
        let mut m = WorldMap::default();
        m.insert("202", Position::new(510, 500));
        m
    }

    #[test]
    fn parses_absolute_and_relative_times() {
        let now = now();
        let expected_today = Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap();
        let expected_tomorrow = Utc.with_ymd_and_hms(2026, 3, 15, 6, 30, 5).unwrap();

        assert_eq!(
            parse_completion_time("today 20:00:00", &now),
            Some(expected_today.timestamp())
        );
        assert_eq!(
            parse_completion_time("hoje 20:00:00", &now),
            Some(expected_today.timestamp())
        );
        assert_eq!(
            parse_completion_time("tomorrow 06:30:05", &now),
            Some(expected_tomorrow.timestamp())
        );
        assert_eq!(
            parse_completion_time("15/03/2026 06:30:05", &now),
            Some(expected_tomorrow.timestamp())
        );
        assert_eq!(
            parse_completion_time("2026-03-14T20:00:00Z", &now),
            Some(expected_today.timestamp())
        );
        assert_eq!(parse_completion_time("1773518400", &now), Some(1_773_518_400));
        assert_eq!(parse_completion_time("next week", &now), None);
        assert_eq!(parse_completion_time("today 25:00:00", &now), None);
    }

    #[test]
    fn loads_valid_entries_and_skips_bad_ones() {
        let doc = r#"{
          "attacks": [
            {"id": "ok-coords", "source_village": "101", "target_coordinates": [500, 500],
             "arrival_time": "today 20:00:00", "troops": {"axe": 100}, "type": "attack"},
            {"id": "ok-handle", "source_village": 101, "target_village_id": 202,
             "arrival_time": "today 20:00:00", "troops": {"spear": "50"}, "type": "support",
             "notes": "stack"},
            {"id": "disabled", "source_village": "101", "target_coordinates": [1, 1],
             "arrival_time": "today 20:00:00", "troops": {"axe": 1}, "enabled": false},
            {"id": "no-time", "source_village": "101", "target_coordinates": [1, 1],
             "troops": {"axe": 1}},
            {"id": "zero", "source_village": "101", "target_coordinates": [1, 1],
             "arrival_time": "today 20:00:00", "troops": {"axe": 0}},
            {"id": "past", "source_village": "101", "target_coordinates": [1, 1],
             "arrival_time": "today 08:00:00", "troops": {"axe": 1}},
            {"id": "lost", "source_village": "101", "target_village_id": "999",
             "arrival_time": "today 20:00:00", "troops": {"axe": 1}},
            {"id": "nowhere", "source_village": "101",
             "arrival_time": "today 20:00:00", "troops": {"axe": 1}},
            {"id": "ok-coords", "source_village": "101", "target_coordinates": [2, 2],
             "arrival_time": "tomorrow 20:00:00", "troops": {"axe": 1}}
          ]
        }"#;
        let (store, summary) = load_str(doc, &map(), &now()).unwrap();
        assert_eq!(summary.total, 9);
        assert_eq!(summary.scheduled, 2);
        assert_eq!(summary.skipped.len(), 7);

        let reasons: Vec<(&str, &str)> = summary
            .skipped
            .iter()
            .map(|s| (s.id.as_str(), s.reason.as_str()))
            .collect();
        assert!(reasons.contains(&("disabled", "disabled")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "no-time" && r.contains("arrival_time")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "zero" && r.contains("above zero")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "past" && r.contains("past")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "lost" && r.contains("999")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "nowhere" && r.contains("no target")));
        assert!(reasons
            .iter()
            .any(|(id, r)| *id == "ok-coords" && r.contains("already")));

        let completion = Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap().timestamp();
        let batch = store.batch(completion).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].target, Target::Coordinates { x: 500, y: 500 });
        assert_eq!(batch[1].target, Target::Village { id: "202".into() });
        assert_eq!(batch[1].origin, "101");
        assert_eq!(batch[1].kind, ActionKind::Support);
        assert_eq!(batch[1].payload["spear"], 50);
        assert_eq!(batch[1].note, "stack");
    }

    #[test]
    fn missing_id_gets_positional_default() {
        let doc = r#"[{"source_village": "101", "target_coordinates": "500|501",
                       "arrival_time": "tomorrow 01:00:00", "troops": {"light": 5}}]"#;
        let (store, summary) = load_str(doc, &map(), &now()).unwrap();
        assert_eq!(summary.scheduled, 1);
        assert!(store.contains("attack_0"));
    }

    #[test]
    fn unresolvable_handle_falls_back_to_coordinates() {
        let doc = r#"[{"id": "x", "source_village": "101", "target_village_id": "999",
                       "target_coordinates": [7, 8],
                       "arrival_time": "tomorrow 01:00:00", "troops": {"light": 5}}]"#;
        let (store, _) = load_str(doc, &map(), &now()).unwrap();
        let completion = store.completion_of("x").unwrap();
        assert_eq!(
            store.batch(completion).unwrap()[0].target,
            Target::Coordinates { x: 7, y: 8 }
        );
    }

    #[test]
    fn malformed_document_fails_whole_load() {
        assert!(load_str("not json", &map(), &now()).is_err());
        assert!(matches!(
            load_str(r#"{"attacks": 5}"#, &map(), &now()),
            Err(VolleyError::InvalidInput(_))
        ));
        assert!(matches!(
            load_str("42", &map(), &now()),
            Err(VolleyError::InvalidInput(_))
        ));
    }

    #[test]
    fn object_without_attacks_is_empty_load() {
        let (store, summary) = load_str(r#"{"info": {}}"#, &map(), &now()).unwrap();
        assert!(store.is_empty());
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn missing_file_is_input_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_file(&dir.path().join("attacks.json"), &map(), &now()).unwrap_err();
        assert!(matches!(err, VolleyError::InputNotFound(_)));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let doc = r#"[{"id": "neg", "source_village": "101", "target_coordinates": [1, 1],
                       "arrival_time": "tomorrow 01:00:00", "troops": {"axe": -5, "spy": 1}}]"#;
        let (_, summary) = load_str(doc, &map(), &now()).unwrap();
        assert_eq!(summary.scheduled, 0);
        assert!(summary.skipped[0].reason.contains("axe"));
    }
}
