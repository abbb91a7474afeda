//! Attribution models
//!
//! A model maps an ordered list of touchpoints to raw non-negative weights.
//! The calculator normalizes them, so models need not sum to exactly one.

use crate::{types::Touchpoint, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribution model
pub trait AttributionModel: Send + Sync {
    /// Model name recorded on the attribution record
    fn name(&self) -> &'static str;

    /// One weight per touchpoint; `touchpoints` is non-empty and time ordered
    fn weights(&self, touchpoints: &[Touchpoint], converted_at: DateTime<Utc>) -> Vec<f64>;
}

/// Full credit to the final touchpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct LastTouch;

impl AttributionModel for LastTouch {
    fn name(&self) -> &'static str {
        "last_touch"
    }

    fn weights(&self, touchpoints: &[Touchpoint], _converted_at: DateTime<Utc>) -> Vec<f64> {
        let mut weights = vec![0.0; touchpoints.len()];
        if let Some(last) = weights.last_mut() {
            *last = 1.0;
        }
        weights
    }
}

/// Full credit to the first touchpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstTouch;

impl AttributionModel for FirstTouch {
    fn name(&self) -> &'static str {
        "first_touch"
    }

    fn weights(&self, touchpoints: &[Touchpoint], _converted_at: DateTime<Utc>) -> Vec<f64> {
        let mut weights = vec![0.0; touchpoints.len()];
        if let Some(first) = weights.first_mut() {
            *first = 1.0;
        }
        weights
    }
}

/// Equal credit
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl AttributionModel for Linear {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn weights(&self, touchpoints: &[Touchpoint], _converted_at: DateTime<Utc>) -> Vec<f64> {
        vec![1.0; touchpoints.len()]
    }
}

/// Fixed shares to first and last, remainder split across the middle
#[derive(Debug, Clone, Copy)]
pub struct PositionBased {
    first: f64,
    last: f64,
}

impl PositionBased {
    /// Create with first/last shares; both ≥ 0 and `first + last ≤ 1`
    pub fn new(first: f64, last: f64) -> Result<Self> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if !valid(first) || !valid(last) || first + last > 1.0 {
            return Err(Error::InvalidModel(format!(
                "position_based shares first={} last={} must be non-negative and sum to at most 1",
                first, last
            )));
        }
        Ok(Self { first, last })
    }
}

impl Default for PositionBased {
    fn default() -> Self {
        Self {
            first: 0.4,
            last: 0.4,
        }
    }
}

impl AttributionModel for PositionBased {
    fn name(&self) -> &'static str {
        "position_based"
    }

    fn weights(&self, touchpoints: &[Touchpoint], _converted_at: DateTime<Utc>) -> Vec<f64> {
        let n = touchpoints.len();
        match n {
            0 => Vec::new(),
            1 => vec![1.0],
            2 => {
                // No middle: split between the ends in proportion
                let ends = self.first + self.last;
                if ends > 0.0 {
                    vec![self.first / ends, self.last / ends]
                } else {
                    vec![0.5, 0.5]
                }
            }
            _ => {
                let middle = (1.0 - self.first - self.last).max(0.0) / (n - 2) as f64;
                let mut weights = vec![middle; n];
                weights[0] = self.first;
                weights[n - 1] = self.last;
                weights
            }
        }
    }
}

/// Credit halves every `half_life_hours` before the conversion
#[derive(Debug, Clone, Copy)]
pub struct TimeDecay {
    half_life_hours: f64,
}

impl TimeDecay {
    /// Create with a positive half-life
    pub fn new(half_life_hours: f64) -> Result<Self> {
        if !half_life_hours.is_finite() || half_life_hours <= 0.0 {
            return Err(Error::InvalidModel(format!(
                "time_decay half_life_hours {} must be positive",
                half_life_hours
            )));
        }
        Ok(Self { half_life_hours })
    }
}

impl Default for TimeDecay {
    fn default() -> Self {
        Self {
            half_life_hours: 168.0,
        }
    }
}

impl AttributionModel for TimeDecay {
    fn name(&self) -> &'static str {
        "time_decay"
    }

    fn weights(&self, touchpoints: &[Touchpoint], converted_at: DateTime<Utc>) -> Vec<f64> {
        touchpoints
            .iter()
            .map(|t| {
                let age_hours = (converted_at - t.occurred_at).num_seconds().max(0) as f64 / 3600.0;
                (-age_hours / self.half_life_hours).exp2()
            })
            .collect()
    }
}

fn default_first() -> f64 {
    0.4
}

fn default_last() -> f64 {
    0.4
}

fn default_half_life() -> f64 {
    168.0
}

/// Serializable model selection
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    /// Last touch
    #[default]
    LastTouch,
    /// First touch
    FirstTouch,
    /// Linear
    Linear,
    /// Position based
    PositionBased {
        /// Share of the first touchpoint
        #[serde(default = "default_first")]
        first: f64,
        /// Share of the last touchpoint
        #[serde(default = "default_last")]
        last: f64,
    },
    /// Exponential time decay
    TimeDecay {
        /// Hours for credit to halve
        #[serde(default = "default_half_life")]
        half_life_hours: f64,
    },
}

impl ModelKind {
    /// Build a validated model
    pub fn build(&self) -> Result<Box<dyn AttributionModel>> {
        Ok(match *self {
            ModelKind::LastTouch => Box::new(LastTouch),
            ModelKind::FirstTouch => Box::new(FirstTouch),
            ModelKind::Linear => Box::new(Linear),
            ModelKind::PositionBased { first, last } => Box::new(PositionBased::new(first, last)?),
            ModelKind::TimeDecay { half_life_hours } => Box::new(TimeDecay::new(half_life_hours)?),
        })
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    /// Parse a model name with default parameters
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_touch" | "last" => Ok(ModelKind::LastTouch),
            "first_touch" | "first" => Ok(ModelKind::FirstTouch),
            "linear" => Ok(ModelKind::Linear),
            "position_based" | "u_shaped" => Ok(ModelKind::PositionBased {
                first: default_first(),
                last: default_last(),
            }),
            "time_decay" => Ok(ModelKind::TimeDecay {
                half_life_hours: default_half_life(),
            }),
            other => Err(Error::InvalidModel(format!("unknown model '{}'", other))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::LastTouch => "last_touch",
            ModelKind::FirstTouch => "first_touch",
            ModelKind::Linear => "linear",
            ModelKind::PositionBased { .. } => "position_based",
            ModelKind::TimeDecay { .. } => "time_decay",
        };
        f.write_str(name)
    }
}
