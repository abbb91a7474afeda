//! Attribution configuration

use crate::{model::ModelKind, Error, Result};
use serde::{Deserialize, Serialize};

/// Attribution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Default model
    pub model: ModelKind,

    /// Look-back window for touchpoints (days)
    pub window_days: u32,

    /// Upper bound on touchpoints per conversion; oldest are dropped
    pub max_touchpoints: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::LastTouch,
            window_days: 30,
            max_touchpoints: 50,
        }
    }
}

impl AttributionConfig {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if self.window_days == 0 {
            return Err(Error::InvalidConfig("window_days must be positive".to_string()));
        }
        if self.max_touchpoints == 0 {
            return Err(Error::InvalidConfig(
                "max_touchpoints must be positive".to_string(),
            ));
        }
        self.model.build().map(|_| ())
    }
}
