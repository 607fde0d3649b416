//! Application-level configuration loading: game rules, scoring policy and decoy pool.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::scoring::ScoringPolicy;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BALDERDASH_BACK_CONFIG_PATH";
/// Default bound on a single store round-trip.
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Limits applied while a game is played.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Players required before the host can launch.
    pub min_players: usize,
    /// Players allowed in one game.
    pub max_players: usize,
    /// Round limit used when a session does not define one.
    pub default_rounds: u32,
    /// Smallest round limit a game can be launched with.
    pub min_rounds: u32,
    /// Largest round limit a game can be launched with.
    pub max_rounds: u32,
    /// Shortest custom prompt, in characters.
    pub prompt_min_length: usize,
    /// Longest custom prompt, in characters.
    pub prompt_max_length: usize,
    /// Shortest custom true response, in characters.
    pub response_min_length: usize,
    /// Longest custom true response, in characters.
    pub response_max_length: usize,
    /// Guessing time given to new rounds, in seconds.
    pub default_timer: u32,
    /// Normalized guesses are truncated to this many characters.
    pub max_guess_length: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 12,
            default_rounds: 4,
            min_rounds: 4,
            max_rounds: 15,
            prompt_min_length: 2,
            prompt_max_length: 64,
            response_min_length: 4,
            response_max_length: 300,
            default_timer: 60,
            max_guess_length: 300,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Limits applied while playing.
    pub rules: GameRules,
    /// Points awarded when a round is tallied.
    pub scoring: ScoringPolicy,
    /// Texts handed to synthetic decoys.
    pub decoys: Vec<String>,
    /// Bound on a single session store round-trip.
    pub store_timeout: Duration,
    /// Seed for the shared random generator; OS entropy when absent.
    pub rng_seed: Option<u64>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        decoys = app_config.decoys.len(),
                        seeded = app_config.rng_seed.is_some(),
                        "loaded game configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    rules: GameRules,
    scoring: ScoringPolicy,
    decoys: Option<Vec<String>>,
    store_timeout_ms: Option<u64>,
    rng_seed: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let decoys = value
            .decoys
            .filter(|decoys| !decoys.is_empty())
            .unwrap_or_else(default_decoys);
        Self {
            rules: value.rules,
            scoring: value.scoring,
            decoys,
            store_timeout: Duration::from_millis(
                value.store_timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
            ),
            rng_seed: value.rng_seed,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in decoy texts shipped with the binary.
fn default_decoys() -> Vec<String> {
    [
        "A small wooden boat used for river fishing.",
        "The act of whispering to livestock.",
        "A dance performed at harvest festivals.",
        "An old word for a broken umbrella.",
        "A type of soft cheese from the Alps.",
        "A law forbidding hats in church.",
        "The fear of running out of socks.",
        "A tool for measuring rainfall on rooftops.",
        "A famous escape artist from the 1800s.",
        "A sweet bread baked only on Tuesdays.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
