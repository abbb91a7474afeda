//! Rule Engine
//!
//! Category commission rates and configurable conditional rules. Produces
//! the commission and cashback for a conversion.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod rates;
pub mod types;

pub use config::{load_rules, RuleEngineConfig};
pub use engine::{RateDecision, RateSource, RuleEngine};
pub use error::{Error, Result};
pub use rates::CategoryRates;
pub use types::{Action, Condition, ConversionRule, Field, Operator, RulePolicy, RuleValue};
