use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://estoinbox.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub admin_email: String,
    pub admin_password: String,
    pub session_minutes: i64,
    pub push_capacity: usize,
    pub cors_origin: Option<String>,
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = var(key).unwrap_or_else(|| default.to_owned());
    raw.parse().with_context(|| format!("{key}={raw} is not valid"))
}

impl Config {
    /// Reads the process environment, falling back to a `.env` file.
    pub fn from_env() -> anyhow::Result<Config> {
        Ok(Config {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            bind_addr: parsed("BIND_ADDR", DEFAULT_BIND_ADDR)?,
            admin_email: var("ADMIN_EMAIL").context("ADMIN_EMAIL must be set")?,
            admin_password: var("ADMIN_PASSWORD").context("ADMIN_PASSWORD must be set")?,
            session_minutes: parsed("SESSION_MINUTES", "30")?,
            push_capacity: parsed("PUSH_CAPACITY", "256")?,
            cors_origin: var("CORS_ORIGIN"),
        })
    }
}
