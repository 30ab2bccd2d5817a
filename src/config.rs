use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_SERVERS: [&str; 2] = ["ws://localhost:3001/ws", "ws://127.0.0.1:3001/ws"];
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_PASSES: usize = 2;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_OPPONENT_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1500);
const DEFAULT_STATE_FILE: &str = "tictactoe_session.json";

pub const DEFAULT_REPLIES: [&str; 6] = [
    "Good move!",
    "Nice one!",
    "Hmm, let me think...",
    "You're good at this!",
    "I'll get you next time!",
    "Interesting strategy...",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Tried in this order.
    pub candidates: Vec<String>,
    pub connect_timeout: Duration,
    /// Full passes over `candidates` before `connect` gives up.
    pub max_passes: usize,
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            candidates: DEFAULT_SERVERS.iter().map(ToString::to_string).collect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_passes: DEFAULT_MAX_PASSES,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub opponent_delay: Duration,
    pub reply_delay: Duration,
    pub replies: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            opponent_delay: DEFAULT_OPPONENT_DELAY,
            reply_delay: DEFAULT_REPLY_DELAY,
            replies: DEFAULT_REPLIES.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub simulation: SimulationConfig,
    pub state_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connection: ConnectionConfig::default(),
            simulation: SimulationConfig::default(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from defaults overridden by whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(servers) = lookup("TTT_SERVERS") {
            let candidates: Vec<String> = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
            if candidates.is_empty() {
                return Err(ClientError::Config("TTT_SERVERS lists no servers".into()));
            }
            config.connection.candidates = candidates;
        }
        if let Some(value) = lookup("TTT_CONNECT_TIMEOUT_MS") {
            config.connection.connect_timeout = parse_millis("TTT_CONNECT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("TTT_MAX_PASSES") {
            let passes = value
                .parse::<usize>()
                .map_err(|e| ClientError::Config(format!("TTT_MAX_PASSES: {e}")))?;
            if passes == 0 {
                return Err(ClientError::Config("TTT_MAX_PASSES must be at least 1".into()));
            }
            config.connection.max_passes = passes;
        }
        if let Some(value) = lookup("TTT_RECONNECT_DELAY_MS") {
            config.connection.reconnect_delay = parse_millis("TTT_RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TTT_OPPONENT_DELAY_MS") {
            config.simulation.opponent_delay = parse_millis("TTT_OPPONENT_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TTT_REPLY_DELAY_MS") {
            config.simulation.reply_delay = parse_millis("TTT_REPLY_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TTT_STATE_FILE") {
            config.state_file = PathBuf::from(value);
        }

        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ClientError::Config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connection.candidates.len(), 2);
    }

    #[test]
    fn overrides_are_applied_in_order() {
        let config = Config::from_lookup(lookup(&[
            ("TTT_SERVERS", "ws://a:1/ws, ws://b:2/ws ,"),
            ("TTT_CONNECT_TIMEOUT_MS", "250"),
            ("TTT_MAX_PASSES", "3"),
        ]))
        .unwrap();
        assert_eq!(config.connection.candidates, vec!["ws://a:1/ws", "ws://b:2/ws"]);
        assert_eq!(config.connection.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.connection.max_passes, 3);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("TTT_MAX_PASSES", "0")])),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TTT_REPLY_DELAY_MS", "soon")])),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TTT_SERVERS", " , ")])),
            Err(ClientError::Config(_))
        ));
    }
}
