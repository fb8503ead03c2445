use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ptb_bus::{BrokerConfig, BrokerCredentials, DEFAULT_CONNECT_TIMEOUT, TransportSecurity};
use ptb_core::ExchangeConfig;
use ptb_correlation::CorrelationStoreConfig;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_BROKER_HOST: &str = "127.0.0.1";
const DEFAULT_BROKER_PORT: u16 = 4222;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub broker: BrokerConfig,
    pub exchange: ExchangeConfig,
    pub correlation: CorrelationStoreConfig,
    /// YAML device directory; an empty directory is used when unset.
    pub directory_path: Option<PathBuf>,
    /// SQLite exchange log; entries stay in memory when unset.
    pub exchange_log_path: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let addr = get("GATEWAY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into());
        let addr = SocketAddr::from_str(addr.trim()).context("invalid GATEWAY_ADDR")?;

        let broker = BrokerConfig {
            host: get("BROKER_HOST").unwrap_or_else(|| DEFAULT_BROKER_HOST.into()),
            port: parse(&get, "BROKER_PORT")?.unwrap_or(DEFAULT_BROKER_PORT),
            security: TransportSecurity::from_label(get("BROKER_PROTOCOL").as_deref()),
            credentials: BrokerCredentials::from_parts(
                get("BROKER_USERNAME"),
                get("BROKER_PASSWORD"),
            ),
            ca_path: get("BROKER_CA_PATH").map(PathBuf::from),
            connect_timeout: parse(&get, "BROKER_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        };

        let defaults = ExchangeConfig::default();
        let exchange = ExchangeConfig {
            timeout: parse(&get, "EXCHANGE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            poll_interval: parse(&get, "EXCHANGE_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            record_ttl: parse(&get, "CORRELATION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.record_ttl),
        };
        if exchange.poll_interval.is_zero() {
            bail!("EXCHANGE_POLL_INTERVAL_MS must be greater than zero");
        }
        if exchange.record_ttl.is_zero() {
            bail!("CORRELATION_TTL_SECS must be greater than zero");
        }
        if exchange.timeout >= exchange.record_ttl {
            bail!(
                "EXCHANGE_TIMEOUT_SECS ({}s) must be shorter than CORRELATION_TTL_SECS ({}s)",
                exchange.timeout.as_secs(),
                exchange.record_ttl.as_secs()
            );
        }

        Ok(Self {
            addr,
            broker,
            exchange,
            correlation: CorrelationStoreConfig {
                redis_url: get("CORRELATION_REDIS_URL"),
                namespace: get("CORRELATION_NAMESPACE"),
            },
            directory_path: get("DEVICE_DIRECTORY_PATH").map(PathBuf::from),
            exchange_log_path: get("EXCHANGE_LOG_PATH").map(PathBuf::from),
        })
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        GatewayConfig::from_lookup(move |key: &str| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.broker.server_url(), "nats://127.0.0.1:4222");
        assert!(cfg.broker.credentials.is_none());
        assert_eq!(cfg.exchange, ExchangeConfig::default());
        assert!(cfg.correlation.redis_url.is_none());
        assert!(cfg.directory_path.is_none());
        assert!(cfg.exchange_log_path.is_none());
    }

    #[test]
    fn reads_broker_and_exchange_settings() {
        let cfg = config_from(&[
            ("GATEWAY_ADDR", "127.0.0.1:9090"),
            ("BROKER_HOST", "broker.local"),
            ("BROKER_PORT", "8883"),
            ("BROKER_PROTOCOL", "ssl"),
            ("BROKER_USERNAME", "pos"),
            ("BROKER_PASSWORD", "s3cret"),
            ("EXCHANGE_TIMEOUT_SECS", "5"),
            ("EXCHANGE_POLL_INTERVAL_MS", "250"),
            ("CORRELATION_TTL_SECS", "60"),
            ("CORRELATION_REDIS_URL", "redis://127.0.0.1/"),
        ])
        .unwrap();

        assert_eq!(cfg.addr.port(), 9090);
        assert_eq!(cfg.broker.server_url(), "tls://broker.local:8883");
        assert_eq!(cfg.broker.credentials.unwrap().username, "pos");
        assert_eq!(cfg.exchange.timeout, Duration::from_secs(5));
        assert_eq!(cfg.exchange.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.exchange.record_ttl, Duration::from_secs(60));
        assert_eq!(cfg.correlation.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = config_from(&[("BROKER_PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("BROKER_PORT"));
        assert!(config_from(&[("EXCHANGE_POLL_INTERVAL_MS", "0")]).is_err());
    }

    #[test]
    fn exchange_budget_must_fit_inside_record_ttl() {
        let err = config_from(&[("EXCHANGE_TIMEOUT_SECS", "60")]).unwrap_err();
        assert!(err.to_string().contains("CORRELATION_TTL_SECS"));
        assert!(
            config_from(&[("EXCHANGE_TIMEOUT_SECS", "40"), ("CORRELATION_TTL_SECS", "40")])
                .is_err()
        );

        let cfg =
            config_from(&[("EXCHANGE_TIMEOUT_SECS", "60"), ("CORRELATION_TTL_SECS", "90")])
                .unwrap();
        assert_eq!(cfg.exchange.timeout, Duration::from_secs(60));
    }
}
