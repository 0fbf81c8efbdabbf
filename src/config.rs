use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    game_theme::GameTheme,
    network::NetworkConfig,
    session::{GameSettings, PaddleBounds},
};

const DEFAULT_LOG_FILE: &str = "net-pong.log";

/// Everything the client reads from the environment (or `.env`) at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    /// Play without a broker
    pub offline: bool,
    pub settings: GameSettings,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// How long a key counts as held on terminals that never report releases
    pub key_hold: Duration,
    pub theme: GameTheme,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            offline: false,
            settings: GameSettings::default(),
            tick_rate: 60,
            key_hold: Duration::from_millis(150),
            theme: GameTheme::Monokai,
        }
    }
}

/// Overwrite `target` with the parsed value of `name`, keeping the default on bad input.
fn read_var<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!("Invalid {} '{}' ({}), using default", name, raw, e),
        }
    }
}

impl AppConfig {
    /// Read ahead of everything else so the rest of loading can already log.
    pub fn log_file_from_env() -> PathBuf {
        std::env::var("PONG_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_FILE))
    }

    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("PONG_BROKER_HOST") {
            config.network.broker_host = host;
        }
        read_var(&lookup, "PONG_BROKER_PORT", &mut config.network.broker_port);
        if let Some(game_id) = lookup("PONG_GAME_ID") {
            config.network.game_id = game_id;
        }
        config.network.username = lookup("PONG_USERNAME");
        config.network.password = lookup("PONG_PASSWORD");
        read_var(&lookup, "PONG_OFFLINE", &mut config.offline);

        let rules = &mut config.settings.rules;
        read_var(&lookup, "PONG_ACCELERATE_BOTH_SIDES", &mut rules.accelerate_both_sides);
        read_var(&lookup, "PONG_ENFORCE_SPEED_CAP", &mut rules.enforce_speed_cap);
        read_var::<PaddleBounds, _>(&lookup, "PONG_PADDLE_BOUNDS", &mut rules.paddle_bounds);

        read_var(&lookup, "PONG_TICK_RATE", &mut config.tick_rate);
        let mut hold_ms = config.key_hold.as_millis() as u64;
        read_var(&lookup, "PONG_KEY_HOLD_MS", &mut hold_ms);
        config.key_hold = Duration::from_millis(hold_ms);

        read_var(&lookup, "PONG_THEME", &mut config.theme);

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err(format!("PONG_TICK_RATE must be 1-240, got {}", self.tick_rate));
        }
        if self.key_hold.is_zero() {
            return Err("PONG_KEY_HOLD_MS must be at least 1".to_string());
        }
        if !self.offline {
            if self.network.broker_port == 0 {
                return Err("PONG_BROKER_PORT cannot be 0".to_string());
            }
            if self.network.game_id.trim().is_empty() {
                return Err("PONG_GAME_ID cannot be empty".to_string());
            }
            if self.network.game_id.contains(['/', '+', '#']) {
                return Err("PONG_GAME_ID cannot contain MQTT topic characters".to_string());
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }
}
