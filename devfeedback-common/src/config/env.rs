//! Environment variable parsing.
//!
//! Collects parse errors instead of failing fast so every bad variable can be
//! reported once logging is up, and tracks which variable produced each value.

use super::source::{ConfigSource, Sourced};
use std::env;
use thiserror::Error;

/// Prefix for devfeedback's own variables.
const PREFIX: &str = "DEVFEEDBACK_";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Reads `DEVFEEDBACK_*` (or bare) variables, recording what went wrong.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Parser for `DEVFEEDBACK_`-prefixed variables.
    pub fn new() -> Self {
        Self {
            prefix: PREFIX,
            errors: Vec::new(),
        }
    }

    /// Parser for bare variable names (e.g. `VITE_ENDPOINT`).
    pub fn unprefixed() -> Self {
        Self {
            prefix: "",
            errors: Vec::new(),
        }
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Lowercased log level; an unknown level keeps `default`.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default.to_string());
        };
        let lower = value.trim().to_lowercase();
        if LOG_LEVELS.contains(&lower.as_str()) {
            Sourced::from_env(lower, var_name)
        } else {
            self.errors.push(EnvError::InvalidLogLevel {
                var: var_name.clone(),
                value,
            });
            Sourced::from_env(default.to_string(), var_name)
        }
    }

    /// `None` if unset or blank.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.trim().is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }

    /// A value `parse` accepts; anything else is recorded and yields `None`.
    pub fn get_choice<T>(
        &mut self,
        name: &str,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Sourced<Option<T>> {
        let raw = self.get_optional_string(name);
        let Some(value) = raw.value.clone() else {
            return raw.map(|_| None);
        };
        match parse(value.trim()) {
            Some(choice) => raw.map(|_| Some(choice)),
            None => {
                let var = raw.env_var.unwrap_or_else(|| self.var_name(name));
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected,
                    value,
                });
                Sourced::default_value(None)
            }
        }
    }

    /// A URL that falls back to `default` when unset.
    ///
    /// A variable that is set but blank yields `None`, which callers treat as
    /// "explicitly disabled".
    pub fn get_endpoint(&mut self, name: &str, default: &str) -> Sourced<Option<String>> {
        let sourced = self.get_optional_string(name);
        if sourced.source == ConfigSource::Default {
            return Sourced::default_value(Some(default.to_string()));
        }
        sourced.map(|value| value.map(|v| v.trim().to_string()))
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: each test owns distinct variable names
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: each test owns distinct variable names
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_log_level_invalid() {
        let vars = ["DEVFEEDBACK_TEST_LEVEL"];
        cleanup_env(&vars);

        set_env("DEVFEEDBACK_TEST_LEVEL", "verbose");
        let mut parser = EnvParser::new();
        let result = parser.get_log_level("TEST_LEVEL", "info");
        assert_eq!(result.value, "info");
        let errors = parser.take_errors();
        assert!(matches!(errors[0], EnvError::InvalidLogLevel { .. }));

        set_env("DEVFEEDBACK_TEST_LEVEL", " DEBUG ");
        let result = parser.get_log_level("TEST_LEVEL", "info");
        assert_eq!(result.value, "debug");
        assert!(parser.take_errors().is_empty());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_choice_records_unknown_value() {
        let vars = ["DEVFEEDBACK_TEST_CHOICE"];
        cleanup_env(&vars);
        let parse = |v: &str| (v == "json").then_some(1u8);

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_choice("TEST_CHOICE", "json", parse).value, None);

        set_env("DEVFEEDBACK_TEST_CHOICE", "json");
        let result = parser.get_choice("TEST_CHOICE", "json", parse);
        assert_eq!(result.value, Some(1));
        assert_eq!(result.env_var.as_deref(), Some("DEVFEEDBACK_TEST_CHOICE"));

        set_env("DEVFEEDBACK_TEST_CHOICE", "xml");
        assert_eq!(parser.get_choice("TEST_CHOICE", "json", parse).value, None);
        let errors = parser.take_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "Invalid value for DEVFEEDBACK_TEST_CHOICE: expected json, got 'xml'"
        );

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_endpoint_default_override_and_disable() {
        let vars = ["DF_TEST_ENDPOINT"];
        cleanup_env(&vars);

        let mut parser = EnvParser::unprefixed();
        let result = parser.get_endpoint("DF_TEST_ENDPOINT", "http://collector/default");
        assert_eq!(result.value.as_deref(), Some("http://collector/default"));
        assert_eq!(result.source, ConfigSource::Default);

        set_env("DF_TEST_ENDPOINT", " http://collector/override ");
        let result = parser.get_endpoint("DF_TEST_ENDPOINT", "http://collector/default");
        assert_eq!(result.value.as_deref(), Some("http://collector/override"));
        assert_eq!(result.env_var.as_deref(), Some("DF_TEST_ENDPOINT"));

        set_env("DF_TEST_ENDPOINT", "");
        let result = parser.get_endpoint("DF_TEST_ENDPOINT", "http://collector/default");
        assert!(result.value.is_none());
        assert_eq!(result.source, ConfigSource::Environment);

        cleanup_env(&vars);
    }
}
