use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub session_idle_minutes: i64,
    pub translate_url: String,
    pub translate_email: Option<String>,
    pub translate_timeout: Duration,
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads the environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3001"),
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 16)?,
            session_idle_minutes: parsed_or("SESSION_IDLE_MINUTES", 60)?,
            translate_url: var_or("TRANSLATE_URL", "https://api.mymemory.translated.net"),
            translate_email: dotenv::var("TRANSLATE_EMAIL").ok().filter(|email| !email.is_empty()),
            translate_timeout: Duration::from_millis(parsed_or("TRANSLATE_TIMEOUT_MS", 3000)?),
        })
    }
}
