//! Coarse travel-time estimate used for advisory feasibility checks.
//!
//! The dispatch coordinator never uses this number to decide when to send.
//! The send instant always comes from the duration the server confirms for
//! the prepared order; this estimate only decides whether a request can be
//! placed on the map at all and warns early about tight schedules.

use crate::config::WorldConfig;
use crate::types::{ActionRequest, Payload, Position, Target};
use crate::world::WorldMap;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Estimates never go below one minute.
pub const MIN_ESTIMATE: Duration = Duration::from_secs(60);

/// Extra slack added when suggesting the earliest reachable completion.
pub const SUGGESTION_SLACK: Duration = Duration::from_secs(60);

/// Base minutes per field on a speed-1 world.
const BASE_UNIT_MINUTES: &[(&str, f64)] = &[
    ("spear", 18.0),
    ("sword", 22.0),
    ("axe", 18.0),
    ("archer", 18.0),
    ("spy", 9.0),
    ("light", 10.0),
    ("marcher", 10.0),
    ("heavy", 11.0),
    ("ram", 30.0),
    ("catapult", 30.0),
    ("knight", 10.0),
    ("snob", 35.0),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    #[error("cannot resolve {what} to a map position")]
    Unresolvable { what: String },
}

#[derive(Debug, Clone)]
pub struct DurationEstimator {
    map: WorldMap,
    minutes_per_field: BTreeMap<String, f64>,
    speed_factor: f64,
}

impl DurationEstimator {
    pub fn new(world: &WorldConfig, map: WorldMap) -> Self {
        let mut minutes_per_field: BTreeMap<String, f64> = BASE_UNIT_MINUTES
            .iter()
            .map(|(u, m)| (u.to_string(), *m))
            .collect();
        for (unit, minutes) in &world.units {
            minutes_per_field.insert(unit.clone(), *minutes);
        }
        Self {
            map,
            minutes_per_field,
            speed_factor: (world.speed * world.unit_speed).max(f64::MIN_POSITIVE),
        }
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    /// Travel time from `origin` (village id) to `target` for `payload`.
    pub fn estimate(
        &self,
        origin: &str,
        target: &Target,
        payload: &Payload,
    ) -> Result<Duration, EstimateError> {
        let from = self
            .map
            .village(origin)
            .ok_or_else(|| EstimateError::Unresolvable {
                what: format!("origin village {origin}"),
            })?;
        let to = self
            .map
            .resolve(target)
            .ok_or_else(|| EstimateError::Unresolvable {
                what: format!("target {target}"),
            })?;
        Ok(self.travel_time(&from, &to, payload))
    }

    pub fn estimate_request(&self, req: &ActionRequest) -> Result<Duration, EstimateError> {
        self.estimate(&req.origin, &req.target, &req.payload)
    }

    /// Earliest completion instant (epoch seconds) reachable if the request
    /// were sent right now.
    pub fn earliest_completion(
        &self,
        req: &ActionRequest,
        now_secs: i64,
    ) -> Result<i64, EstimateError> {
        let travel = self.estimate_request(req)?;
        Ok(now_secs + (travel + SUGGESTION_SLACK).as_secs() as i64)
    }

    fn travel_time(&self, from: &Position, to: &Position, payload: &Payload) -> Duration {
        let distance = from.distance(to);
        let minutes = self.slowest_minutes(payload);
        let secs = (distance * minutes * 60.0 / self.speed_factor).round();
        Duration::from_secs(secs as u64).max(MIN_ESTIMATE)
    }

    /// Minutes per field of the slowest unit with a positive quantity.
    /// Units missing from the table count as the slowest known unit.
    fn slowest_minutes(&self, payload: &Payload) -> f64 {
        let slowest_known = self
            .minutes_per_field
            .values()
            .copied()
            .fold(0.0_f64, f64::max);
        payload
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(unit, _)| {
                self.minutes_per_field
                    .get(unit)
                    .copied()
                    .unwrap_or(slowest_known)
            })
            .fold(0.0_f64, f64::max)
    }
}
