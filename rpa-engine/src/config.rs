//! Engine configuration

use crate::error::FlowResult;
use crate::flow::browser::BrowserOptions;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which of a step's satisfied transitions are followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Every satisfied transition fires, in list order
    #[default]
    All,
    /// Only the first satisfied transition fires
    FirstMatch,
}

/// What the dispatcher does with an action kind it has no handler for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    #[default]
    Ignore,
    Reject,
}

/// Runtime settings shared by every run of an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for `waitForSelector` and `click` when the action sets none
    pub default_timeout_ms: u64,
    /// Sleep between `waitWhile` polls
    pub poll_interval_ms: u64,
    /// Deadline for `waitWhile` when the action sets none
    pub wait_while_timeout_ms: u64,
    /// Maximum nesting of step executions
    pub max_depth: usize,
    pub transition_mode: TransitionMode,
    pub unknown_actions: UnknownActionPolicy,
    /// Pool `goto` picks a user agent from
    pub user_agents: Vec<String>,
    /// Forces headless mode regardless of the flow's own setting
    pub headless: Option<bool>,
    pub browser: BrowserOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            poll_interval_ms: 100,
            wait_while_timeout_ms: 60_000,
            max_depth: 512,
            transition_mode: TransitionMode::default(),
            unknown_actions: UnknownActionPolicy::default(),
            user_agents: default_user_agents(),
            headless: None,
            browser: BrowserOptions::default(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
    .iter()
    .map(|ua| ua.to_string())
    .collect()
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> FlowResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Random entry of the user-agent pool
    pub fn random_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}
