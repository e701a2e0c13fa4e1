use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Sqlite,
    Memory,
}

impl FromStr for Storage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Storage::Sqlite),
            "memory" => Ok(Storage::Memory),
            other => bail!("unknown storage backend '{}', expected sqlite or memory", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: Storage,
    pub db_path: PathBuf,
    pub session_ttl: chrono::Duration,
    pub reaper_interval: Duration,
    pub delivery_interval: Duration,
    pub confirm_window: chrono::Duration,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: get("ROUSE_HOST", "0.0.0.0"),
            port: parse(&get("ROUSE_PORT", "3000"), "ROUSE_PORT")?,
            storage: parse(&get("ROUSE_STORAGE", "sqlite"), "ROUSE_STORAGE")?,
            db_path: PathBuf::from(get("ROUSE_DB_PATH", "rouse.db")),
            session_ttl: chrono::Duration::minutes(positive(
                &get("ROUSE_SESSION_TTL_MINUTES", "1440"),
                "ROUSE_SESSION_TTL_MINUTES",
            )? as i64),
            reaper_interval: Duration::from_secs(positive(
                &get("ROUSE_REAPER_INTERVAL_SECS", "300"),
                "ROUSE_REAPER_INTERVAL_SECS",
            )?),
            delivery_interval: Duration::from_secs(positive(
                &get("ROUSE_DELIVERY_INTERVAL_SECS", "30"),
                "ROUSE_DELIVERY_INTERVAL_SECS",
            )?),
            confirm_window: chrono::Duration::minutes(positive(
                &get("ROUSE_CONFIRM_WINDOW_MINUTES", "60"),
                "ROUSE_CONFIRM_WINDOW_MINUTES",
            )? as i64),
            cookie_secure: parse(&get("ROUSE_COOKIE_SECURE", "false"), "ROUSE_COOKIE_SECURE")?,
        })
    }
}

fn parse<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid value '{}' for {}", value, key))
}

/// Durations are whole units, at most i32::MAX so chrono cannot overflow.
fn positive(value: &str, key: &str) -> anyhow::Result<u64> {
    let n: u32 = parse(value, key)?;
    if n == 0 || n > i32::MAX as u32 {
        bail!("{} must be between 1 and {}", key, i32::MAX);
    }
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.port, 3000);
        assert_eq!(c.storage, Storage::Sqlite);
        assert_eq!(c.db_path, PathBuf::from("rouse.db"));
        assert_eq!(c.session_ttl, chrono::Duration::hours(24));
        assert_eq!(c.reaper_interval, Duration::from_secs(300));
        assert_eq!(c.delivery_interval, Duration::from_secs(30));
        assert_eq!(c.confirm_window, chrono::Duration::minutes(60));
        assert!(!c.cookie_secure);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("ROUSE_PORT", "8080"),
            ("ROUSE_STORAGE", "Memory"),
            ("ROUSE_SESSION_TTL_MINUTES", "15"),
            ("ROUSE_COOKIE_SECURE", "true"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.storage, Storage::Memory);
        assert_eq!(c.session_ttl, chrono::Duration::minutes(15));
        assert!(c.cookie_secure);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config(&[("ROUSE_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("ROUSE_PORT"));

        let err = config(&[("ROUSE_REAPER_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("ROUSE_REAPER_INTERVAL_SECS"));

        assert!(config(&[("ROUSE_STORAGE", "postgres")]).is_err());
    }
}
