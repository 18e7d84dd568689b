//! TrustDesk Fraud Risk Scoring
//!
//! Scores a booking attempt from a handful of behavioural signals and maps the
//! score to an ALLOW / REVIEW / BLOCK verdict.
//!
//! ## Key Components
//!
//! - [`signal::RiskSignal`] - validated input, built through [`signal::RiskSignalBuilder`]
//! - [`engine::FraudRiskEngine`] - weighted rules, no early exit
//! - [`config::RiskPolicy`] - weights and bands, loadable from JSON
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = FraudRiskEngine::new(RiskPolicy::default());
//! let decision = engine.evaluate(&signal);
//! if decision.verdict >= Verdict::Review {
//!     // hold the booking
//! }
//! ```

pub mod config;
pub mod decision;
pub mod engine;
pub mod signal;

pub use config::{RiskPolicy, MAX_RULE_WEIGHT};
pub use decision::{rules, RiskDecision, RuleHit, Verdict};
pub use engine::FraudRiskEngine;
pub use signal::{RiskSignal, RiskSignalBuilder};
