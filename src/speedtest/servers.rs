//! speedtest.net server records and best-server selection helpers

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Latency assigned to a probe that failed or returned the wrong body
pub const UNREACHABLE_LATENCY: Duration = Duration::from_secs(3600);

/// Probes sent to each candidate server
pub const LATENCY_SAMPLES: usize = 3;

/// Body a healthy server returns for `latency.txt`
pub const LATENCY_BODY: &str = "test=test";

/// One entry of the speedtest.net server list
///
/// Only the fields the client acts on are typed; the rest of the record
/// (id, coordinates, distance, ...) is carried through untouched so it can be
/// stored with the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Upload endpoint; transfer resources live next to it
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub host: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Server {
    /// Upload endpoint, optionally forced to https
    pub fn endpoint(&self, secure: bool) -> Result<Url> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            AppError::measurement(format!("Invalid server URL '{}': {}", self.url, e))
        })?;
        if secure && url.scheme() != "https" {
            url.set_scheme("https").map_err(|_| {
                AppError::measurement(format!("Cannot switch {} to https", self.url))
            })?;
        }
        Ok(url)
    }

    /// `<sponsor> (<name>, <country>)`
    pub fn describe(&self) -> String {
        format!("{} ({}, {})", self.sponsor, self.name, self.country)
    }

    /// Server record as stored with the result, with the measured latency added
    pub fn to_metadata(&self, latency_ms: f64) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("latency".to_string(), Value::from(latency_ms));
        }
        value
    }
}

/// Resource living in the same directory as the server's upload endpoint
pub fn resource_url(endpoint: &Url, name: &str) -> Result<Url> {
    endpoint
        .join(name)
        .map_err(|e| AppError::measurement(format!("Invalid resource '{}' for {}: {}", name, endpoint, e)))
}

/// Mean of the probe round trips in milliseconds; failed probes add the unreachable penalty
pub fn mean_latency_ms(samples: &[Option<Duration>]) -> f64 {
    if samples.is_empty() {
        return UNREACHABLE_LATENCY.as_secs_f64() * 1000.0;
    }
    let total: f64 = samples
        .iter()
        .map(|sample| sample.unwrap_or(UNREACHABLE_LATENCY).as_secs_f64() * 1000.0)
        .sum();
    total / samples.len() as f64
}

/// Whether every probe behind a mean latency failed
pub fn is_unreachable(latency_ms: f64) -> bool {
    latency_ms >= UNREACHABLE_LATENCY.as_secs_f64() * 1000.0
}

/// Candidate with its measured latency
#[derive(Debug, Clone, PartialEq)]
pub struct RankedServer {
    pub server: Server,
    pub endpoint: Url,
    pub latency_ms: f64,
}

/// Lowest latency wins; ties keep list order (nearest first)
pub fn pick_best(candidates: Vec<RankedServer>) -> Option<RankedServer> {
    candidates.into_iter().reduce(|best, candidate| {
        if candidate.latency_ms < best.latency_ms {
            candidate
        } else {
            best
        }
    })
}
