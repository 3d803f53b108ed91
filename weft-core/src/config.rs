//! Runtime configuration.
//!
//! A runtime is configured once, at construction. Hosts can build the
//! configuration in code, parse it from JSON, or read it from the
//! environment:
//!
//! ```rust
//! use weft_core::{Runtime, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "dev_mode": true, "label": "app" }"#).unwrap();
//! let runtime = Runtime::with_config(config);
//! assert!(runtime.config().dev_mode);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable toggling development diagnostics.
pub const DEV_MODE_ENV: &str = "WEFT_DEV_MODE";

/// Environment variable naming the runtime in log output.
pub const LABEL_ENV: &str = "WEFT_LABEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Emit development diagnostics: double-destroy warnings, duplicate list
    /// keys, value-keyed lists.
    pub dev_mode: bool,

    /// Name attached to log events emitted by this runtime.
    pub label: String,

    /// Upper bound on flush/teardown rounds in [`Runtime::settle`].
    ///
    /// [`Runtime::settle`]: crate::Runtime::settle
    pub max_settle_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(debug_assertions),
            label: "weft".to_string(),
            max_settle_rounds: 100,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a configuration from the defaults overridden by the
    /// environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(DEV_MODE_ENV) {
            config.dev_mode = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }
        if let Ok(label) = std::env::var(LABEL_ENV) {
            if !label.trim().is_empty() {
                config.label = label.trim().to_string();
            }
        }
        config
    }
}
