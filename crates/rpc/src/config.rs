//! Application configuration
//!
//! One JSON document with a section per component. Every section and field is
//! optional; anything missing falls back to its default.
//!
//! ```json
//! {
//!   "risk": { "block_threshold": 75 },
//!   "identity": { "max_failed_attempts": 3 },
//!   "dispute": { "allow_window_hours": 48 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use trustdesk_core::TrustResult;
use trustdesk_dispute::DisputePolicy;
use trustdesk_identity::IdentityPolicy;
use trustdesk_risk::RiskPolicy;

/// Environment variable naming the config file when `--config` is absent
pub const CONFIG_ENV: &str = "TRUSTDESK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub risk: RiskPolicy,

    #[serde(default)]
    pub identity: IdentityPolicy,

    #[serde(default)]
    pub dispute: DisputePolicy,
}

impl TrustConfig {
    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Resolve the config source: explicit path, then `TRUSTDESK_CONFIG`, then defaults
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)
                    .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrustResult<()> {
        self.risk.validate()?;
        self.identity.validate()?;
        self.dispute.validate()?;
        Ok(())
    }
}
