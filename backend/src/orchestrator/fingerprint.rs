//! Run identity
//!
//! Every started run gets a UUID and a SHA-256 fingerprint of the
//! configuration it runs with. A repeated `start` while running leaves
//! both untouched, which makes idempotence observable to hosts.

use crate::orchestrator::engine::{EngineConfig, ShiftConfig, SimulationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identity and effective configuration of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub run_id: Uuid,
    /// SHA-256 of the canonical JSON of config + shift + seed
    pub config_hash: String,
    pub shift: ShiftConfig,
    /// Seed actually used (drawn from the clock when not configured)
    pub rng_seed: u64,
    /// Wall-clock start, milliseconds since the Unix epoch
    pub started_at_ms: u64,
}

#[derive(Serialize)]
struct HashedConfig<'a> {
    engine: &'a EngineConfig,
    shift: &'a ShiftConfig,
    rng_seed: u64,
}

impl RunInfo {
    pub fn new(
        config: &EngineConfig,
        shift: &ShiftConfig,
        rng_seed: u64,
    ) -> Result<Self, SimulationError> {
        let config_hash = compute_config_hash(&HashedConfig {
            engine: config,
            shift,
            rng_seed,
        })?;
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            run_id: Uuid::new_v4(),
            config_hash,
            shift: *shift,
            rng_seed,
            started_at_ms,
        })
    }
}

/// Compute deterministic SHA256 hash of a config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field or map ordering.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
