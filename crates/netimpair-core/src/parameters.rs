//! The live-mutable, typed dictionary of impairment parameters, with a
//! validating update protocol.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// The four recognized impairment parameters shared by both directions of a
/// [`crate::pipe_pair::PipePair`].
///
/// `bandwidth <= 0` means unlimited; `buffer <= 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Bytes per second. `<= 0` means unlimited.
    pub bandwidth: i64,
    /// Max queue occupancy in bytes. `<= 0` means unbounded.
    pub buffer: i64,
    /// Constant additive one-way latency, in seconds. Always `>= 0`.
    pub delay: f64,
    /// Bernoulli drop probability in `[0.0, 1.0]`.
    pub loss: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self { bandwidth: -1, buffer: -1, delay: 0.0, loss: 0.0 }
    }
}

/// Validating, live-mutable store for [`Parameters`].
///
/// Internally synchronized, so callers outside the scheduler's own callback
/// context (HTTP handlers, adapters) can read/write safely through
/// [`crate::core_handle::CoreHandle`] without a separate marshaling step.
pub struct ParameterStore {
    initial: Parameters,
    current: Mutex<Parameters>,
}

impl ParameterStore {
    pub fn new(initial: Parameters) -> Self {
        Self { initial, current: Mutex::new(initial) }
    }

    /// The current parameters.
    pub fn snapshot(&self) -> Parameters {
        *self.current.lock().unwrap()
    }

    /// Validate and merge `candidate` into the store.
    ///
    /// Unknown keys are silently ignored. Each known key's value is coerced
    /// to its declared type (numeric strings are accepted); a coercion
    /// failure or an out-of-range value fails the *whole* update with
    /// [`Error::MalformedParameter`] and leaves the store unchanged.
    pub fn update(&self, candidate: &HashMap<String, Value>) -> Result<Parameters, Error> {
        let mut merged = self.snapshot();

        if let Some(v) = candidate.get("bandwidth") {
            merged.bandwidth = coerce_i64("bandwidth", v)?;
        }
        if let Some(v) = candidate.get("buffer") {
            merged.buffer = coerce_i64("buffer", v)?;
        }
        if let Some(v) = candidate.get("delay") {
            let delay = coerce_f64("delay", v)?;
            if delay < 0.0 {
                return Err(Error::MalformedParameter {
                    key: "delay".to_string(),
                    reason: "must be >= 0".to_string(),
                });
            }
            merged.delay = delay;
        }
        if let Some(v) = candidate.get("loss") {
            let loss = coerce_f64("loss", v)?;
            if !(0.0..=1.0).contains(&loss) {
                return Err(Error::MalformedParameter {
                    key: "loss".to_string(),
                    reason: "must be in [0.0, 1.0]".to_string(),
                });
            }
            merged.loss = loss;
        }

        *self.current.lock().unwrap() = merged;
        log::debug!("parameters updated: {merged:?}");
        Ok(merged)
    }

    /// Restore the parameters captured at construction.
    pub fn reset(&self) -> Parameters {
        *self.current.lock().unwrap() = self.initial;
        log::debug!("parameters reset to initial: {:?}", self.initial);
        self.initial
    }
}

fn coerce_i64(key: &str, value: &Value) -> Result<i64, Error> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| malformed(key, "not an integer")),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| malformed(key, "not a coercible integer")),
        _ => Err(malformed(key, "expected an integer or numeric string")),
    }
}

fn coerce_f64(key: &str, value: &Value) -> Result<f64, Error> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| malformed(key, "not a number")),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| malformed(key, "not a coercible number")),
        _ => Err(malformed(key, "expected a number or numeric string")),
    }
}

fn malformed(key: &str, reason: &str) -> Error {
    Error::MalformedParameter { key: key.to_string(), reason: reason.to_string() }
}
