//! Process settings resolved once from the environment at startup.
//!
//! Every variable has a default except where the deployment environment makes
//! one unsafe (`APP_ENV=production` requires an explicit database host and
//! password). Empty values count as unset.

use crate::error::ConfigError;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASSWORD: &str = "postgres";
pub const DEFAULT_DB_NAME: &str = "fastapidb";
pub const DEFAULT_APP_PORT: u16 = 80;
const DEFAULT_APP_HOST: &str = "0.0.0.0";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err("expected development, production or test".into()),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub create_if_missing: bool,
}

impl DatabaseSettings {
    /// Connection options for the application database.
    pub fn connect_options(&self) -> PgConnectOptions {
        self.connect_options_for(&self.name)
    }

    /// Connection options for another database on the same server (e.g. `postgres` for admin work).
    pub fn connect_options_for(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }

    /// `host:port/name` without credentials, for logs and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("connect_retries", &self.connect_retries)
            .field("create_if_missing", &self.create_if_missing)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub environment: Environment,
    pub app_host: IpAddr,
    pub app_port: u16,
    pub database: DatabaseSettings,
    pub cors_origins: CorsOrigins,
}

impl Settings {
    /// Load `.env` (if present) and resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = match get("APP_ENV") {
            Some(v) => parse_value("APP_ENV", &v)?,
            None => Environment::Development,
        };
        let production = environment == Environment::Production;

        let host = match get("POSTGRES_HOST") {
            Some(h) => h,
            None if production => return Err(ConfigError::Missing("POSTGRES_HOST")),
            None => DEFAULT_DB_HOST.to_string(),
        };
        let password = match get("POSTGRES_PASSWORD") {
            Some(p) => p,
            None if production => return Err(ConfigError::Missing("POSTGRES_PASSWORD")),
            None => DEFAULT_DB_PASSWORD.to_string(),
        };
        let port = match get("POSTGRES_PORT") {
            Some(v) => parse_port("POSTGRES_PORT", &v)?,
            None => DEFAULT_DB_PORT,
        };

        let app_port = match (get("APP_PORT"), get("APP_EXPOSED_PORT")) {
            (Some(v), _) => parse_port("APP_PORT", &v)?,
            (None, Some(v)) => parse_port("APP_EXPOSED_PORT", &v)?,
            (None, None) => DEFAULT_APP_PORT,
        };
        let app_host: IpAddr = parse_value(
            "APP_HOST",
            &get("APP_HOST").unwrap_or_else(|| DEFAULT_APP_HOST.into()),
        )?;

        let max_connections: u32 = match get("DB_MAX_CONNECTIONS") {
            Some(v) => parse_value("DB_MAX_CONNECTIONS", &v)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".into(),
                reason: "pool needs at least one connection".into(),
            });
        }
        let connect_timeout_secs: u64 = match get("DB_CONNECT_TIMEOUT_SECS") {
            Some(v) => parse_value("DB_CONNECT_TIMEOUT_SECS", &v)?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };
        let connect_retries: u32 = match get("DB_CONNECT_RETRIES") {
            Some(v) => parse_value("DB_CONNECT_RETRIES", &v)?,
            None => DEFAULT_CONNECT_RETRIES,
        };
        let create_if_missing = match get("DB_CREATE_DATABASE") {
            Some(v) => parse_bool("DB_CREATE_DATABASE", &v)?,
            None => false,
        };

        let cors_origins = match get("CORS_ALLOW_ORIGINS") {
            None => CorsOrigins::Any,
            Some(v) if v == "*" => CorsOrigins::Any,
            Some(v) => CorsOrigins::List(
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            ),
        };

        Ok(Settings {
            environment,
            app_host,
            app_port,
            database: DatabaseSettings {
                host,
                port,
                user: get("POSTGRES_USER").unwrap_or_else(|| DEFAULT_DB_USER.into()),
                password,
                name: get("POSTGRES_DB").unwrap_or_else(|| DEFAULT_DB_NAME.into()),
                max_connections,
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                connect_retries,
                create_if_missing,
            },
            cors_origins,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.app_host, self.app_port)
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, ConfigError> {
    let port: u16 = parse_value(key, value)?;
    if port == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "port must be non-zero".into(),
        });
    }
    Ok(port)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.app_port, 80);
        assert_eq!(s.database.host, "127.0.0.1");
        assert_eq!(s.database.port, 5432);
        assert_eq!(s.database.name, "fastapidb");
        assert_eq!(s.database.max_connections, 5);
        assert_eq!(s.cors_origins, CorsOrigins::Any);
        assert_eq!(s.listen_addr().to_string(), "0.0.0.0:80");
    }

    #[test]
    fn app_port_prefers_app_port_then_exposed_port() {
        assert_eq!(settings(&[("APP_PORT", "8080")]).unwrap().app_port, 8080);
        assert_eq!(settings(&[("APP_EXPOSED_PORT", "9000")]).unwrap().app_port, 9000);
        let both = settings(&[("APP_PORT", "8080"), ("APP_EXPOSED_PORT", "9000")]).unwrap();
        assert_eq!(both.app_port, 8080);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = settings(&[("APP_PORT", "  "), ("POSTGRES_DB", "")]).unwrap();
        assert_eq!(s.app_port, DEFAULT_APP_PORT);
        assert_eq!(s.database.name, DEFAULT_DB_NAME);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = settings(&[("POSTGRES_PORT", "fivefour")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "POSTGRES_PORT", .. }));
        let err = settings(&[("APP_PORT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "APP_PORT", .. }));
    }

    #[test]
    fn production_requires_database_host() {
        let err = settings(&[("APP_ENV", "production"), ("POSTGRES_PASSWORD", "s3cret")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("POSTGRES_HOST"));
        let ok = settings(&[
            ("APP_ENV", "production"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PASSWORD", "s3cret"),
        ])
        .unwrap();
        assert_eq!(ok.database.host, "db");
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err = settings(&[("DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn cors_origins_are_split() {
        let s = settings(&[("CORS_ALLOW_ORIGINS", "http://a.test, http://b.test")]).unwrap();
        assert_eq!(
            s.cors_origins,
            CorsOrigins::List(vec!["http://a.test".into(), "http://b.test".into()])
        );
    }

    #[test]
    fn debug_output_redacts_password() {
        let s = settings(&[("POSTGRES_PASSWORD", "hunter2")]).unwrap();
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("hunter2"));
        assert_eq!(s.database.target(), "127.0.0.1:5432/fastapidb");
    }
}
