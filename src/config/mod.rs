//! Startup configuration. Binaries take positional arguments like the other servers in this crate,
//! the IEX key comes from the environment so it never shows up in a process listing.
use anyhow::{anyhow, Result};

pub const API_KEY_VAR: &str = "API_KEY";

/// Symbols served with random prices when running in memory without an API key.
pub const DEMO_SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "NFLX", "TSLA"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Postgres {
        host: String,
        user: String,
        password: String,
        dbname: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub store: StoreConfig,
    pub api_key: Option<String>,
}

impl ServerConfig {
    /// Parses `<address> <port> (--memory | <host> <user> <password> <dbname>)`. `args` excludes
    /// the program name.
    pub fn from_args(args: &[String], api_key: Option<String>) -> Result<Self> {
        let usage = "usage: finance_server <address> <port> (--memory | <host> <user> <password> <dbname>)";

        let address = args.first().ok_or_else(|| anyhow!(usage))?.clone();
        let port: u16 = args
            .get(1)
            .ok_or_else(|| anyhow!(usage))?
            .parse()
            .map_err(|e| anyhow!("invalid port: {e}"))?;

        let store = match &args[2..] {
            [flag] if flag == "--memory" => StoreConfig::Memory,
            [host, user, password, dbname] => StoreConfig::Postgres {
                host: host.clone(),
                user: user.clone(),
                password: password.clone(),
                dbname: dbname.clone(),
            },
            _ => return Err(anyhow!(usage)),
        };

        let api_key = api_key.filter(|key| !key.is_empty());
        if api_key.is_none() && store != StoreConfig::Memory {
            return Err(anyhow!("{API_KEY_VAR} not set"));
        }

        Ok(Self {
            address,
            port,
            store,
            api_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_args(&args, std::env::var(API_KEY_VAR).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::{ServerConfig, StoreConfig};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_that_postgres_config_needs_api_key() {
        let values = args(&["127.0.0.1", "8080", "localhost", "finance", "pw", "finance"]);
        assert!(ServerConfig::from_args(&values, None).is_err());
        assert!(ServerConfig::from_args(&values, Some("".to_string())).is_err());

        let config = ServerConfig::from_args(&values, Some("key".to_string())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                host: "localhost".to_string(),
                user: "finance".to_string(),
                password: "pw".to_string(),
                dbname: "finance".to_string(),
            }
        );
    }

    #[test]
    fn test_that_memory_config_runs_without_api_key() {
        let config =
            ServerConfig::from_args(&args(&["0.0.0.0", "3000", "--memory"]), None).unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_that_bad_arguments_are_rejected() {
        assert!(ServerConfig::from_args(&args(&[]), None).is_err());
        assert!(ServerConfig::from_args(&args(&["0.0.0.0", "port", "--memory"]), None).is_err());
        assert!(ServerConfig::from_args(&args(&["0.0.0.0", "3000"]), None).is_err());
        assert!(ServerConfig::from_args(&args(&["0.0.0.0", "3000", "a", "b"]), None).is_err());
    }
}
