//! Configuration source tracking.
//!
//! Records where each configuration value came from so the daemon can log
//! which endpoint override is in effect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a configuration value originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default value.
    Default,
    /// Environment variable.
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("default"),
            ConfigSource::Environment => f.write_str("environment"),
        }
    }
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable name when the value came from the environment.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn from_env(value: T, var_name: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var_name.into()),
        }
    }

    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    /// Map the value while preserving source.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
            env_var: self.env_var,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Sourced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "{} (from {})", self.value, var),
            None => write!(f, "{} ({})", self.value, self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sourced_display_names_env_var() {
        let sourced = Sourced::from_env("http://collector/vite".to_string(), "VITE_ENDPOINT");
        assert_eq!(sourced.to_string(), "http://collector/vite (from VITE_ENDPOINT)");

        let sourced = Sourced::default_value(5u32);
        assert_eq!(sourced.to_string(), "5 (default)");
    }

    #[test]
    fn test_map_keeps_origin() {
        let disabled: Sourced<Option<String>> = Sourced::from_env(None, "WEBPACK_ENDPOINT");
        let shown = disabled.map(|url| url.unwrap_or_else(|| "disabled".to_string()));
        assert_eq!(shown.value, "disabled");
        assert_eq!(shown.source, ConfigSource::Environment);
        assert_eq!(shown.env_var.as_deref(), Some("WEBPACK_ENDPOINT"));
    }
}
