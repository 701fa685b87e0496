//! Scheduler configuration structures.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Environment variable holding comma-separated queue names.
pub const ENV_QUEUES: &str = "RUNLOOP_QUEUES";
/// Environment variable naming the default queue.
pub const ENV_DEFAULT_QUEUE: &str = "RUNLOOP_DEFAULT_QUEUE";
/// Environment variable enabling debug stack capture.
pub const ENV_DEBUG: &str = "RUNLOOP_DEBUG";

/// Static part of a scheduler's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Queue names in flush order.
    pub queues: Vec<String>,
    /// Queue used by `later`; defaults to the first declared queue.
    #[serde(default)]
    pub default_queue: Option<String>,
    /// Capture a stack at every scheduling call.
    #[serde(default)]
    pub debug: bool,
}

impl SchedulerConfig {
    /// Configuration with the given queues and defaults elsewhere.
    pub fn new<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queues: queues.into_iter().map(Into::into).collect(),
            default_queue: None,
            debug: false,
        }
    }

    /// Check queue names and the default queue.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.queues.is_empty() {
            return Err(invalid("at least one queue must be declared"));
        }
        let mut seen = HashSet::new();
        for name in &self.queues {
            if name.trim().is_empty() {
                return Err(invalid("queue names must not be blank"));
            }
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("queue `{name}` declared twice")));
            }
        }
        if let Some(default) = &self.default_queue {
            if !seen.contains(default.as_str()) {
                return Err(invalid(format!("default queue `{default}` is not declared")));
            }
        }
        Ok(())
    }

    /// The effective default queue.
    #[must_use]
    pub fn resolved_default_queue(&self) -> Option<&str> {
        self.default_queue
            .as_deref()
            .or_else(|| self.queues.first().map(String::as_str))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] on a parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| invalid(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from the environment, loading `.env` first if
    /// present.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if `RUNLOOP_QUEUES` is missing or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, SchedulerError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("failed to load .env: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the `RUNLOOP_*` names.
    ///
    /// # Errors
    ///
    /// As [`SchedulerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SchedulerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queues = lookup(ENV_QUEUES).ok_or_else(|| invalid(format!("{ENV_QUEUES} is not set")))?;
        let cfg = Self {
            queues: queues
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            default_queue: lookup(ENV_DEFAULT_QUEUE).filter(|s| !s.trim().is_empty()),
            debug: lookup(ENV_DEBUG).is_some_and(|v| parse_flag(&v)),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn invalid(msg: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_validate() {
        assert!(SchedulerConfig::new(["sync", "render"]).validate().is_ok());
        assert!(SchedulerConfig::new(Vec::<String>::new()).validate().is_err());
        assert!(SchedulerConfig::new(["a", "a"]).validate().is_err());
        assert!(SchedulerConfig::new(["a", " "]).validate().is_err());

        let mut cfg = SchedulerConfig::new(["a"]);
        cfg.default_queue = Some("b".into());
        assert!(matches!(cfg.validate(), Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_default_queue_falls_back_to_first() {
        let cfg = SchedulerConfig::new(["sync", "render"]);
        assert_eq!(cfg.resolved_default_queue(), Some("sync"));
    }

    #[test]
    fn test_from_json_str() {
        let cfg = SchedulerConfig::from_json_str(
            r#"{"queues": ["sync", "actions"], "default_queue": "actions"}"#,
        )
        .unwrap();
        assert_eq!(cfg.queues, vec!["sync", "actions"]);
        assert_eq!(cfg.resolved_default_queue(), Some("actions"));
        assert!(!cfg.debug);

        let err = SchedulerConfig::from_json_str("{").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_QUEUES, "sync, actions ,render"),
            (ENV_DEFAULT_QUEUE, "render"),
            (ENV_DEBUG, "TRUE"),
        ]
        .into_iter()
        .collect();
        let cfg = SchedulerConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.queues, vec!["sync", "actions", "render"]);
        assert_eq!(cfg.default_queue.as_deref(), Some("render"));
        assert!(cfg.debug);

        assert!(SchedulerConfig::from_lookup(|_| None).is_err());
    }
}
