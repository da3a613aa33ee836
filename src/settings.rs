use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::repositories::referrals::{DEFAULT_CODE_ATTEMPTS, DEFAULT_MAX_CHAIN_DEPTH};

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Default, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub backend: Backend,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Referrals {
    pub max_chain_depth: u32,
    pub default_tree_depth: u32,
    pub max_tree_depth: u32,
    pub page_size: usize,
    pub code_attempts: u32,
}

impl Default for Referrals {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            default_tree_depth: 3,
            max_tree_depth: 10,
            page_size: 10,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub store: Store,
    pub postgres: Option<Postgres>,
    #[serde(default)]
    pub referrals: Referrals,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("REFERRALS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use config::FileFormat;

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn missing_sections_take_defaults() {
        let settings = parse("").unwrap();

        assert_eq!(settings.server.listen, "0.0.0.0:8080");
        assert_eq!(settings.store.backend, Backend::Memory);
        assert!(settings.postgres.is_none());
        assert_eq!(settings.referrals.page_size, 10);
        assert_eq!(settings.referrals.max_chain_depth, DEFAULT_MAX_CHAIN_DEPTH);
    }

    #[test]
    fn full_file() {
        let settings = parse(
            r#"
                [server]
                listen = "127.0.0.1:9000"

                [store]
                backend = "postgres"

                [postgres]
                url = "postgres://referrals@localhost/referrals"

                [referrals]
                max_chain_depth = 16
                page_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.listen, "127.0.0.1:9000");
        assert_eq!(settings.store.backend, Backend::Postgres);
        assert_eq!(settings.postgres.unwrap().max_connections, 5);
        assert_eq!(settings.referrals.max_chain_depth, 16);
        assert_eq!(settings.referrals.page_size, 25);
        assert_eq!(settings.referrals.default_tree_depth, 3);
    }

    #[test]
    fn unknown_backends_are_rejected() {
        assert!(parse("[store]\nbackend = \"redis\"").is_err());
    }
}
